//! In-memory document store for testing.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};

use super::{
    BackendError, BulkItem, BulkResponse, ClusterHealth, DocRef, Document, DocumentBackend, HealthStatus,
    SearchPage, SearchRequest, WriteOp,
};
use crate::query::filter::Filter;

/// Kind of a round trip recorded in the request log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    /// `index_exists`.
    IndexExists,
    /// `create_index`.
    CreateIndex,
    /// `cluster_health`.
    ClusterHealth,
    /// `put_mapping`.
    PutMapping,
    /// Single `Index` write.
    Index,
    /// Single `Update` write.
    Update,
    /// Single `Delete` write.
    Delete,
    /// `bulk`.
    Bulk,
    /// `multi_get`.
    MultiGet,
    /// `search`.
    Search,
    /// `scroll`.
    Scroll,
    /// `clear_scroll`.
    ClearScroll,
    /// `refresh`.
    Refresh,
    /// `delete_by_query`.
    DeleteByQuery,
}

impl RequestKind {
    /// Whether the request writes documents.
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            Self::Index | Self::Update | Self::Delete | Self::Bulk | Self::DeleteByQuery
        )
    }
}

/// One logged round trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestRecord {
    /// What was requested.
    pub kind: RequestKind,
    /// Document ids the request named, in request order.
    pub ids: Vec<String>,
}

#[derive(Debug, Default)]
struct IndexState {
    mappings: BTreeMap<String, serde_json::Value>,
    docs: BTreeMap<(String, String), Document>,
}

struct ScrollState {
    size: usize,
    total: u64,
    remaining: VecDeque<Document>,
}

/// In-memory document store.
///
/// Documents iterate ordered by (index, type, id) so searches are
/// deterministic. Every round trip is appended to a request log.
pub struct InMemoryBackend {
    indices: RwLock<BTreeMap<String, IndexState>>,
    scrolls: Mutex<HashMap<String, ScrollState>>,
    next_scroll: AtomicU64,
    health: Mutex<HealthStatus>,
    reject_mappings: Mutex<bool>,
    requests: Mutex<Vec<RequestRecord>>,
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBackend {
    /// Create an empty store reporting green health.
    pub fn new() -> Self {
        Self {
            indices: RwLock::new(BTreeMap::new()),
            scrolls: Mutex::new(HashMap::new()),
            next_scroll: AtomicU64::new(1),
            health: Mutex::new(HealthStatus::Green),
            reject_mappings: Mutex::new(false),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Set the health status reported to `cluster_health`.
    pub fn set_health(&self, status: HealthStatus) {
        *self.health.lock() = status;
    }

    /// Make `put_mapping` fail with a rejection.
    pub fn reject_mappings(&self, reject: bool) {
        *self.reject_mappings.lock() = reject;
    }

    fn log(&self, kind: RequestKind, ids: Vec<String>) {
        self.requests.lock().push(RequestRecord { kind, ids });
    }

    /// Every logged round trip, oldest first.
    pub fn requests(&self) -> Vec<RequestRecord> {
        self.requests.lock().clone()
    }

    /// Number of logged round trips of a kind.
    pub fn request_count(&self, kind: RequestKind) -> usize {
        self.requests.lock().iter().filter(|r| r.kind == kind).count()
    }

    /// Number of logged round trips that write documents.
    pub fn write_count(&self) -> usize {
        self.requests.lock().iter().filter(|r| r.kind.is_write()).count()
    }

    /// Clear the request log.
    pub fn clear_requests(&self) {
        self.requests.lock().clear();
    }

    /// Fetch one document without logging.
    pub fn get(&self, index: &str, doc_type: &str, id: &str) -> Option<Document> {
        self.indices
            .read()
            .get(index)
            .and_then(|s| s.docs.get(&(doc_type.to_string(), id.to_string())).cloned())
    }

    /// All documents of an index, without logging.
    pub fn documents(&self, index: &str) -> Vec<Document> {
        self.indices
            .read()
            .get(index)
            .map(|s| s.docs.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Installed mapping for a type, without logging.
    pub fn mapping(&self, index: &str, doc_type: &str) -> Option<serde_json::Value> {
        self.indices
            .read()
            .get(index)
            .and_then(|s| s.mappings.get(doc_type).cloned())
    }

    fn apply(&self, op: WriteOp) -> Result<(), BackendError> {
        let mut indices = self.indices.write();
        match op {
            WriteOp::Index {
                target,
                routing,
                source,
                create,
            } => {
                let state = indices.entry(target.index.clone()).or_default();
                let doc_type = target.doc_type.clone().unwrap_or_default();
                let key = (doc_type.clone(), target.id.clone());
                if create && state.docs.contains_key(&key) {
                    return Err(BackendError::DocumentAlreadyExists {
                        index: target.index,
                        id: target.id,
                    });
                }
                let mut doc = Document::new(target.index, doc_type, target.id, source);
                doc.routing = routing;
                state.docs.insert(key, doc);
                Ok(())
            }
            WriteOp::Update {
                target,
                routing,
                doc,
                upsert,
            } => {
                let state = indices.entry(target.index.clone()).or_default();
                let doc_type = target.doc_type.clone().unwrap_or_default();
                let key = (doc_type.clone(), target.id.clone());
                match state.docs.get_mut(&key) {
                    Some(existing) => {
                        let mut merged = existing.source.clone();
                        for (k, v) in doc {
                            merged.insert(k, v);
                        }
                        // no-op detection
                        if merged != existing.source {
                            existing.source = merged;
                        }
                        Ok(())
                    }
                    None if upsert => {
                        let mut created = Document::new(target.index, doc_type, target.id, doc);
                        created.routing = routing;
                        state.docs.insert(key, created);
                        Ok(())
                    }
                    None => Err(BackendError::DocumentMissing {
                        index: target.index,
                        id: target.id,
                    }),
                }
            }
            WriteOp::Delete { target, .. } => {
                if let Some(state) = indices.get_mut(&target.index) {
                    match &target.doc_type {
                        Some(t) => {
                            state.docs.remove(&(t.clone(), target.id.clone()));
                        }
                        None => state.docs.retain(|(_, id), _| *id != target.id),
                    }
                }
                Ok(())
            }
        }
    }

    fn matching(&self, indices: &[String], filter: &Filter) -> Vec<Document> {
        let guard = self.indices.read();
        let mut hits = Vec::new();
        for (name, state) in guard.iter() {
            if !indices.is_empty() && !indices.iter().any(|i| i == name) {
                continue;
            }
            hits.extend(state.docs.values().filter(|d| filter.matches(d)).cloned());
        }
        hits
    }

    fn page(scroll: &mut ScrollState, scroll_id: String) -> SearchPage {
        let take = scroll.size.min(scroll.remaining.len());
        SearchPage {
            scroll_id: Some(scroll_id),
            total: scroll.total,
            hits: scroll.remaining.drain(..take).collect(),
        }
    }
}

impl DocumentBackend for InMemoryBackend {
    fn index_exists(&self, index: &str) -> Result<bool, BackendError> {
        self.log(RequestKind::IndexExists, Vec::new());
        Ok(self.indices.read().contains_key(index))
    }

    fn create_index(&self, index: &str, _settings: &serde_json::Value) -> Result<(), BackendError> {
        self.log(RequestKind::CreateIndex, Vec::new());
        let mut indices = self.indices.write();
        if indices.contains_key(index) {
            return Err(BackendError::Rejected {
                status: 400,
                reason: format!("index_already_exists_exception: {}", index),
            });
        }
        indices.insert(index.to_string(), IndexState::default());
        Ok(())
    }

    fn cluster_health(
        &self,
        _index: &str,
        wait_for: HealthStatus,
        _timeout: Duration,
    ) -> Result<ClusterHealth, BackendError> {
        self.log(RequestKind::ClusterHealth, Vec::new());
        let status = *self.health.lock();
        Ok(ClusterHealth {
            status,
            timed_out: status < wait_for,
        })
    }

    fn put_mapping(&self, index: &str, doc_type: &str, mapping: &serde_json::Value) -> Result<(), BackendError> {
        self.log(RequestKind::PutMapping, vec![doc_type.to_string()]);
        if *self.reject_mappings.lock() {
            return Err(BackendError::Rejected {
                status: 400,
                reason: "mapper_parsing_exception".to_string(),
            });
        }
        self.indices
            .write()
            .entry(index.to_string())
            .or_default()
            .mappings
            .insert(doc_type.to_string(), mapping.clone());
        Ok(())
    }

    fn execute(&self, op: WriteOp) -> Result<(), BackendError> {
        let kind = match &op {
            WriteOp::Index { .. } => RequestKind::Index,
            WriteOp::Update { .. } => RequestKind::Update,
            WriteOp::Delete { .. } => RequestKind::Delete,
        };
        self.log(kind, vec![op.target().id.clone()]);
        self.apply(op)
    }

    fn bulk(&self, ops: Vec<WriteOp>) -> Result<BulkResponse, BackendError> {
        self.log(RequestKind::Bulk, ops.iter().map(|op| op.target().id.clone()).collect());
        let items = ops
            .into_iter()
            .map(|op| {
                let target = op.target().clone();
                BulkItem {
                    target,
                    error: self.apply(op).err(),
                }
            })
            .collect();
        Ok(BulkResponse { items })
    }

    fn multi_get(&self, refs: &[DocRef]) -> Result<Vec<Option<Document>>, BackendError> {
        self.log(RequestKind::MultiGet, refs.iter().map(|r| r.id.clone()).collect());
        let guard = self.indices.read();
        Ok(refs
            .iter()
            .map(|r| {
                let state = guard.get(&r.index)?;
                match &r.doc_type {
                    Some(t) => state.docs.get(&(t.clone(), r.id.clone())).cloned(),
                    None => state.docs.values().find(|d| d.id == r.id).cloned(),
                }
            })
            .collect())
    }

    fn search(&self, request: &SearchRequest) -> Result<SearchPage, BackendError> {
        self.log(RequestKind::Search, Vec::new());
        let hits = self.matching(&request.indices, &request.filter);
        let mut scroll = ScrollState {
            size: request.size,
            total: hits.len() as u64,
            remaining: hits.into(),
        };
        if request.scroll.is_none() {
            let mut page = Self::page(&mut scroll, String::new());
            page.scroll_id = None;
            return Ok(page);
        }
        let id = format!("scroll-{}", self.next_scroll.fetch_add(1, Ordering::Relaxed));
        let page = Self::page(&mut scroll, id.clone());
        self.scrolls.lock().insert(id, scroll);
        Ok(page)
    }

    fn scroll(&self, scroll_id: &str, _keep_alive: Duration) -> Result<SearchPage, BackendError> {
        self.log(RequestKind::Scroll, Vec::new());
        let mut scrolls = self.scrolls.lock();
        let scroll = scrolls
            .get_mut(scroll_id)
            .ok_or_else(|| BackendError::ScrollNotFound(scroll_id.to_string()))?;
        Ok(Self::page(scroll, scroll_id.to_string()))
    }

    fn clear_scroll(&self, scroll_id: &str) -> Result<(), BackendError> {
        self.log(RequestKind::ClearScroll, Vec::new());
        self.scrolls.lock().remove(scroll_id);
        Ok(())
    }

    fn refresh(&self, _indices: &[String]) -> Result<(), BackendError> {
        self.log(RequestKind::Refresh, Vec::new());
        Ok(())
    }

    fn delete_by_query(&self, index: &str, filter: &Filter) -> Result<u64, BackendError> {
        self.log(RequestKind::DeleteByQuery, Vec::new());
        let mut indices = self.indices.write();
        let Some(state) = indices.get_mut(index) else {
            return Ok(0);
        };
        let before = state.docs.len();
        state.docs.retain(|_, d| !filter.matches(d));
        Ok((before - state.docs.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Fields;
    use serde_json::json;

    fn fields(v: serde_json::Value) -> Fields {
        v.as_object().cloned().unwrap_or_default()
    }

    fn index_op(id: &str, source: serde_json::Value, create: bool) -> WriteOp {
        WriteOp::Index {
            target: DocRef::new("graph", "person", id),
            routing: None,
            source: fields(source),
            create,
        }
    }

    #[test]
    fn test_create_conflict_is_distinguishable() {
        let backend = InMemoryBackend::new();
        backend.execute(index_op("1", json!({"name": "marko"}), true)).unwrap();
        let err = backend.execute(index_op("1", json!({}), true)).unwrap_err();
        assert!(matches!(err, BackendError::DocumentAlreadyExists { .. }));
        // plain index overwrites
        backend.execute(index_op("1", json!({"name": "vadas"}), false)).unwrap();
        assert_eq!(
            backend.get("graph", "person", "1").unwrap().source.get("name"),
            Some(&json!("vadas"))
        );
    }

    #[test]
    fn test_update_merges_and_upserts() {
        let backend = InMemoryBackend::new();
        let update = |id: &str, doc: serde_json::Value, upsert: bool| WriteOp::Update {
            target: DocRef::new("graph", "person", id),
            routing: None,
            doc: fields(doc),
            upsert,
        };
        assert!(matches!(
            backend.execute(update("1", json!({"age": 1}), false)),
            Err(BackendError::DocumentMissing { .. })
        ));
        backend.execute(update("1", json!({"age": 1}), true)).unwrap();
        backend.execute(update("1", json!({"name": "marko"}), false)).unwrap();
        let doc = backend.get("graph", "person", "1").unwrap();
        assert_eq!(doc.source, fields(json!({"age": 1, "name": "marko"})));
    }

    #[test]
    fn test_bulk_applies_in_order() {
        let backend = InMemoryBackend::new();
        let resp = backend
            .bulk(vec![
                index_op("1", json!({"v": 1}), true),
                index_op("1", json!({"v": 2}), false),
                index_op("1", json!({"v": 3}), true),
            ])
            .unwrap();
        assert!(resp.has_failures());
        assert_eq!(resp.failures().count(), 1);
        assert_eq!(backend.documents("graph").len(), 1);
        assert_eq!(backend.get("graph", "person", "1").unwrap().source.get("v"), Some(&json!(2)));
        assert_eq!(backend.request_count(RequestKind::Bulk), 1);
    }

    #[test]
    fn test_multi_get_missing_is_none() {
        let backend = InMemoryBackend::new();
        backend.execute(index_op("1", json!({}), true)).unwrap();
        let got = backend
            .multi_get(&[DocRef::new("graph", "person", "1"), DocRef::untyped("graph", "2")])
            .unwrap();
        assert!(got[0].is_some());
        assert!(got[1].is_none());
        assert_eq!(backend.requests().last().unwrap().ids, vec!["1", "2"]);
    }

    #[test]
    fn test_health_and_unknown_scroll() {
        let backend = InMemoryBackend::new();
        backend.set_health(HealthStatus::Red);
        let health = backend
            .cluster_health("graph", HealthStatus::Yellow, Duration::from_secs(1))
            .unwrap();
        assert!(health.timed_out);
        assert!(matches!(
            backend.scroll("nope", Duration::from_secs(1)),
            Err(BackendError::ScrollNotFound(_))
        ));
    }
}

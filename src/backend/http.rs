//! REST document store backend.
//!
//! Speaks the typed-document REST API over blocking HTTP. Enabled by the
//! `http` feature.

use std::fmt;
use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{
    BackendError, BulkItem, BulkResponse, ClusterHealth, DocRef, Document, DocumentBackend, Fields, HealthStatus,
    SearchPage, SearchRequest, WriteOp,
};
use crate::query::filter::Filter;

/// Connection settings for [`HttpBackend`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpBackendConfig {
    /// Base URL of the store.
    pub endpoint: String,
    /// Connect timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
    /// Optional bearer token.
    pub auth_token: Option<String>,
}

impl HttpBackendConfig {
    /// Create configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            endpoint: std::env::var("DOCGRAPH_ENDPOINT").unwrap_or_else(|_| "http://localhost:9200".to_string()),
            connect_timeout_secs: std::env::var("DOCGRAPH_CONNECT_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5),
            request_timeout_secs: std::env::var("DOCGRAPH_REQUEST_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30),
            auth_token: std::env::var("DOCGRAPH_AUTH_TOKEN").ok().filter(|t| !t.is_empty()),
        }
    }
}

impl Default for HttpBackendConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Blocking REST client for the document store.
pub struct HttpBackend {
    client: Client,
    endpoint: String,
    auth_token: Option<String>,
}

impl fmt::Debug for HttpBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpBackend")
            .field("endpoint", &self.endpoint)
            .field("has_auth_token", &self.auth_token.is_some())
            .finish()
    }
}

fn transport(e: reqwest::Error) -> BackendError {
    if e.is_timeout() {
        BackendError::Timeout(e.to_string())
    } else {
        BackendError::Transport(e.to_string())
    }
}

fn secs(d: Duration) -> String {
    format!("{}s", d.as_secs().max(1))
}

/// Extract the store's error reason from a response body.
fn reason_of(body: &serde_json::Value) -> String {
    body.pointer("/error/reason")
        .or_else(|| body.get("error"))
        .map(|v| match v {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .unwrap_or_else(|| body.to_string())
}

/// Rejection for a non-success status. The body may not be JSON (a proxy
/// error page, for one); its text is kept as the reason.
fn rejection(status: StatusCode, text: &str) -> BackendError {
    let reason = match serde_json::from_str::<serde_json::Value>(text) {
        Ok(body) => reason_of(&body),
        Err(_) if text.trim().is_empty() => status.canonical_reason().unwrap_or_default().to_string(),
        Err(_) => text.trim().chars().take(512).collect(),
    };
    BackendError::Rejected {
        status: status.as_u16(),
        reason,
    }
}

/// Decode a JSON body, checking the status first.
fn success_body(response: Response) -> Result<serde_json::Value, BackendError> {
    let status = response.status();
    if !status.is_success() {
        let text = response.text().unwrap_or_default();
        return Err(rejection(status, &text));
    }
    response.json().map_err(transport)
}

#[derive(Deserialize)]
struct RawHit {
    #[serde(rename = "_index")]
    index: String,
    #[serde(rename = "_type", default)]
    doc_type: String,
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_routing", default)]
    routing: Option<String>,
    #[serde(rename = "_source", default)]
    source: Fields,
    #[serde(default = "default_found")]
    found: bool,
}

fn default_found() -> bool {
    true
}

impl From<RawHit> for Document {
    fn from(hit: RawHit) -> Self {
        Self {
            index: hit.index,
            doc_type: hit.doc_type,
            id: hit.id,
            routing: hit.routing,
            source: hit.source,
        }
    }
}

fn parse_page(body: serde_json::Value) -> Result<SearchPage, BackendError> {
    let scroll_id = body.get("_scroll_id").and_then(|v| v.as_str()).map(str::to_string);
    let hits = body.get("hits").cloned().unwrap_or_default();
    let total = match hits.get("total") {
        Some(serde_json::Value::Number(n)) => n.as_u64().unwrap_or(0),
        Some(obj) => obj.get("value").and_then(|v| v.as_u64()).unwrap_or(0),
        None => 0,
    };
    let raw: Vec<RawHit> = serde_json::from_value(hits.get("hits").cloned().unwrap_or_else(|| json!([])))?;
    Ok(SearchPage {
        scroll_id,
        total,
        hits: raw.into_iter().map(Document::from).collect(),
    })
}

fn doc_path(target: &DocRef) -> String {
    format!(
        "{}/{}/{}",
        target.index,
        target.doc_type.as_deref().unwrap_or("_doc"),
        target.id
    )
}

impl HttpBackend {
    /// Create a client.
    pub fn new(config: HttpBackendConfig) -> Result<Self, BackendError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| BackendError::Transport(format!("Failed to create HTTP client: {}", e)))?;
        tracing::info!(endpoint = %config.endpoint, "Initializing document store client");
        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            auth_token: config.auth_token,
        })
    }

    /// Create a client from environment variables.
    pub fn from_env() -> Result<Self, BackendError> {
        Self::new(HttpBackendConfig::from_env())
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.endpoint, path.trim_start_matches('/'))
    }

    fn send(&self, request: RequestBuilder) -> Result<Response, BackendError> {
        let request = match &self.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };
        request.send().map_err(transport)
    }

    /// Send and decode a JSON body, mapping non-success statuses to
    /// [`BackendError::Rejected`].
    fn send_json(&self, request: RequestBuilder) -> Result<serde_json::Value, BackendError> {
        success_body(self.send(request)?)
    }

    fn write_request(&self, op: &WriteOp) -> RequestBuilder {
        match op {
            WriteOp::Index {
                target,
                routing,
                source,
                create,
            } => {
                let mut req = self.client.put(self.url(&doc_path(target))).json(source);
                if *create {
                    req = req.query(&[("op_type", "create")]);
                }
                if let Some(r) = routing {
                    req = req.query(&[("routing", r)]);
                }
                req
            }
            WriteOp::Update {
                target,
                routing,
                doc,
                upsert,
            } => {
                let body = json!({ "doc": doc, "doc_as_upsert": upsert, "detect_noop": upsert });
                let mut req = self
                    .client
                    .post(self.url(&format!("{}/_update", doc_path(target))))
                    .json(&body);
                if let Some(r) = routing {
                    req = req.query(&[("routing", r)]);
                }
                req
            }
            WriteOp::Delete { target, routing } => {
                let mut req = self.client.delete(self.url(&doc_path(target)));
                if let Some(r) = routing {
                    req = req.query(&[("routing", r)]);
                }
                req
            }
        }
    }

    fn bulk_body(ops: &[WriteOp]) -> Result<String, BackendError> {
        let mut body = String::new();
        for op in ops {
            let target = op.target();
            let mut meta = serde_json::Map::new();
            meta.insert("_index".into(), json!(target.index));
            if let Some(t) = &target.doc_type {
                meta.insert("_type".into(), json!(t));
            }
            meta.insert("_id".into(), json!(target.id));
            let (action, routing, source) = match op {
                WriteOp::Index {
                    routing,
                    source,
                    create,
                    ..
                } => (
                    if *create { "create" } else { "index" },
                    routing,
                    Some(serde_json::Value::Object(source.clone())),
                ),
                WriteOp::Update {
                    routing, doc, upsert, ..
                } => (
                    "update",
                    routing,
                    Some(json!({ "doc": doc, "doc_as_upsert": upsert, "detect_noop": upsert })),
                ),
                WriteOp::Delete { routing, .. } => ("delete", routing, None),
            };
            if let Some(r) = routing {
                meta.insert("routing".into(), json!(r));
            }
            let mut line = serde_json::Map::new();
            line.insert(action.to_string(), serde_json::Value::Object(meta));
            body.push_str(&serde_json::to_string(&line)?);
            body.push('\n');
            if let Some(source) = source {
                body.push_str(&serde_json::to_string(&source)?);
                body.push('\n');
            }
        }
        Ok(body)
    }

    fn bulk_item_error(target: &DocRef, item: &serde_json::Value) -> Option<BackendError> {
        let result = item.as_object()?.values().next()?;
        let status = result.get("status").and_then(|s| s.as_u64()).unwrap_or(200) as u16;
        if result.get("error").is_none() && status < 300 {
            return None;
        }
        Some(match status {
            409 => BackendError::DocumentAlreadyExists {
                index: target.index.clone(),
                id: target.id.clone(),
            },
            404 => BackendError::DocumentMissing {
                index: target.index.clone(),
                id: target.id.clone(),
            },
            _ => BackendError::Rejected {
                status,
                reason: reason_of(result),
            },
        })
    }
}

impl DocumentBackend for HttpBackend {
    fn index_exists(&self, index: &str) -> Result<bool, BackendError> {
        let response = self.send(self.client.head(self.url(index)))?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            s if s.is_success() => Ok(true),
            s => Err(BackendError::Rejected {
                status: s.as_u16(),
                reason: format!("index existence check for '{}'", index),
            }),
        }
    }

    fn create_index(&self, index: &str, settings: &serde_json::Value) -> Result<(), BackendError> {
        let body = json!({ "settings": settings });
        self.send_json(self.client.put(self.url(index)).json(&body))?;
        Ok(())
    }

    fn cluster_health(
        &self,
        index: &str,
        wait_for: HealthStatus,
        timeout: Duration,
    ) -> Result<ClusterHealth, BackendError> {
        let request = self
            .client
            .get(self.url(&format!("_cluster/health/{}", index)))
            .query(&[("wait_for_status", wait_for.to_string()), ("timeout", secs(timeout))]);
        let response = self.send(request)?;
        // a timed-out wait answers 408 with a normal health body
        let status = response.status();
        if !status.is_success() && status != StatusCode::REQUEST_TIMEOUT {
            return Err(rejection(status, &response.text().unwrap_or_default()));
        }
        let body: serde_json::Value = response.json().map_err(transport)?;
        let status = body
            .get("status")
            .and_then(|s| s.as_str())
            .and_then(HealthStatus::from_str)
            .ok_or_else(|| BackendError::Serialization(format!("unexpected health body: {}", body)))?;
        let timed_out = body.get("timed_out").and_then(|t| t.as_bool()).unwrap_or(false);
        Ok(ClusterHealth { status, timed_out })
    }

    fn put_mapping(&self, index: &str, doc_type: &str, mapping: &serde_json::Value) -> Result<(), BackendError> {
        self.send_json(
            self.client
                .put(self.url(&format!("{}/_mapping/{}", index, doc_type)))
                .json(mapping),
        )?;
        Ok(())
    }

    fn execute(&self, op: WriteOp) -> Result<(), BackendError> {
        let target = op.target().clone();
        let response = self.send(self.write_request(&op))?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        match (status, &op) {
            (StatusCode::CONFLICT, WriteOp::Index { create: true, .. }) => Err(BackendError::DocumentAlreadyExists {
                index: target.index,
                id: target.id,
            }),
            (StatusCode::NOT_FOUND, WriteOp::Delete { .. }) => Ok(()),
            (StatusCode::NOT_FOUND, WriteOp::Update { .. }) => Err(BackendError::DocumentMissing {
                index: target.index,
                id: target.id,
            }),
            _ => Err(rejection(status, &response.text().unwrap_or_default())),
        }
    }

    fn bulk(&self, ops: Vec<WriteOp>) -> Result<BulkResponse, BackendError> {
        let body = Self::bulk_body(&ops)?;
        let response = self.send_json(
            self.client
                .post(self.url("_bulk"))
                .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
                .body(body),
        )?;
        let raw_items = response
            .get("items")
            .and_then(|i| i.as_array())
            .cloned()
            .unwrap_or_default();
        let items = ops
            .iter()
            .enumerate()
            .map(|(i, op)| {
                let target = op.target().clone();
                let error = raw_items.get(i).and_then(|item| Self::bulk_item_error(&target, item));
                BulkItem { target, error }
            })
            .collect();
        Ok(BulkResponse { items })
    }

    fn multi_get(&self, refs: &[DocRef]) -> Result<Vec<Option<Document>>, BackendError> {
        if refs.is_empty() {
            return Ok(Vec::new());
        }
        let docs: Vec<_> = refs
            .iter()
            .map(|r| {
                let mut d = json!({ "_index": r.index, "_id": r.id });
                if let Some(t) = &r.doc_type {
                    d["_type"] = json!(t);
                }
                d
            })
            .collect();
        let body = self.send_json(self.client.post(self.url("_mget")).json(&json!({ "docs": docs })))?;
        let raw: Vec<RawHit> = serde_json::from_value(body.get("docs").cloned().unwrap_or_else(|| json!([])))?;
        Ok(raw
            .into_iter()
            .map(|hit| if hit.found { Some(Document::from(hit)) } else { None })
            .collect())
    }

    fn search(&self, request: &SearchRequest) -> Result<SearchPage, BackendError> {
        let path = format!("{}/_search", request.indices.join(","));
        let mut req = self.client.post(self.url(&path)).json(&json!({
            "size": request.size,
            "query": request.filter.to_query_json(),
        }));
        if let Some(keep_alive) = request.scroll {
            req = req.query(&[("scroll", secs(keep_alive))]);
        }
        parse_page(self.send_json(req)?)
    }

    fn scroll(&self, scroll_id: &str, keep_alive: Duration) -> Result<SearchPage, BackendError> {
        let body = json!({ "scroll": secs(keep_alive), "scroll_id": scroll_id });
        let response = self.send(self.client.post(self.url("_search/scroll")).json(&body))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(BackendError::ScrollNotFound(scroll_id.to_string()));
        }
        parse_page(success_body(response)?)
    }

    fn clear_scroll(&self, scroll_id: &str) -> Result<(), BackendError> {
        let body = json!({ "scroll_id": [scroll_id] });
        let response = self.send(self.client.delete(self.url("_search/scroll")).json(&body))?;
        match response.status() {
            s if s.is_success() || s == StatusCode::NOT_FOUND => Ok(()),
            s => Err(BackendError::Rejected {
                status: s.as_u16(),
                reason: "clear scroll".to_string(),
            }),
        }
    }

    fn refresh(&self, indices: &[String]) -> Result<(), BackendError> {
        self.send_json(self.client.post(self.url(&format!("{}/_refresh", indices.join(",")))))?;
        Ok(())
    }

    fn delete_by_query(&self, index: &str, filter: &Filter) -> Result<u64, BackendError> {
        let body = self.send_json(
            self.client
                .post(self.url(&format!("{}/_delete_by_query", index)))
                .json(&json!({ "query": filter.to_query_json() })),
        )?;
        Ok(body.get("deleted").and_then(|d| d.as_u64()).unwrap_or(0))
    }
}

//! Index bootstrap and dynamic mapping templates.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::json;

use crate::backend::{DocumentBackend, HealthStatus};
use crate::error::{GraphError, GraphResult};
use crate::query::filter::Filter;
use crate::timing::TimingAccessor;

/// Ensures the index exists and installs per-type mapping templates.
///
/// The set of types that already have a template is owned by this
/// instance and starts empty.
pub struct SchemaProvider {
    backend: Arc<dyn DocumentBackend>,
    index: String,
    health_timeout: Duration,
    templated: Mutex<HashSet<String>>,
    timing: TimingAccessor,
}

impl SchemaProvider {
    /// Create a provider for one index.
    pub fn new(
        backend: Arc<dyn DocumentBackend>,
        index: impl Into<String>,
        health_timeout: Duration,
        timing: TimingAccessor,
    ) -> Self {
        Self {
            backend,
            index: index.into(),
            health_timeout,
            templated: Mutex::new(HashSet::new()),
            timing,
        }
    }

    /// Index settings used on creation: exact-match string analysis.
    pub fn index_settings() -> serde_json::Value {
        json!({ "index.analysis.analyzer.default.type": "keyword" })
    }

    /// Dynamic template for a type: no `_all` field, every field indexed
    /// as its inferred type without analysis.
    pub fn template(doc_type: &str) -> serde_json::Value {
        json!({
            doc_type: {
                "_all": { "enabled": false },
                "dynamic_templates": [
                    {
                        "default_template": {
                            "match": "*",
                            "mapping": {
                                "type": "{dynamic_type}",
                                "index": "not_analyzed"
                            }
                        }
                    }
                ]
            }
        })
    }

    /// Create the index if missing and wait for yellow health.
    ///
    /// A health wait that times out is fatal.
    pub fn init(&self) -> GraphResult<()> {
        let _t = self.timing.time("schema_init");
        if !self.backend.index_exists(&self.index)? {
            self.backend.create_index(&self.index, &Self::index_settings())?;
            tracing::info!(index = %self.index, "Created index");
        }

        let health = self
            .backend
            .cluster_health(&self.index, HealthStatus::Yellow, self.health_timeout)?;
        if health.timed_out {
            return Err(GraphError::Startup(format!(
                "{} status returned for index '{}' after {:?}",
                health.status, self.index, self.health_timeout
            )));
        }
        tracing::info!(index = %self.index, status = %health.status, "Index ready");
        Ok(())
    }

    /// Install the dynamic template for a type on first use.
    ///
    /// Failures are logged and not retried; the triggering write proceeds.
    pub fn ensure_template(&self, doc_type: &str) {
        if !self.templated.lock().insert(doc_type.to_string()) {
            return;
        }
        let _t = self.timing.time("put_mapping");
        match self
            .backend
            .put_mapping(&self.index, doc_type, &Self::template(doc_type))
        {
            Ok(()) => tracing::debug!(index = %self.index, doc_type, "Installed default template"),
            Err(e) => tracing::warn!(
                index = %self.index,
                doc_type,
                error = %e,
                "Creating default template failed"
            ),
        }
    }

    /// Delete every document in the index.
    pub fn clear_all_data(&self) -> GraphResult<u64> {
        let deleted = self.backend.delete_by_query(&self.index, &Filter::MatchAll)?;
        tracing::info!(index = %self.index, deleted, "Cleared all data");
        Ok(deleted)
    }

    /// The managed index.
    pub fn index(&self) -> &str {
        &self.index
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{InMemoryBackend, RequestKind};

    fn provider(backend: Arc<InMemoryBackend>) -> SchemaProvider {
        SchemaProvider::new(backend, "graph", Duration::from_secs(10), TimingAccessor::new())
    }

    #[test]
    fn test_init_creates_index_once() {
        let backend = Arc::new(InMemoryBackend::new());
        provider(backend.clone()).init().unwrap();
        provider(backend.clone()).init().unwrap();
        assert_eq!(backend.request_count(RequestKind::CreateIndex), 1);
    }

    #[test]
    fn test_health_timeout_is_fatal() {
        let backend = Arc::new(InMemoryBackend::new());
        backend.set_health(HealthStatus::Red);
        assert!(matches!(provider(backend).init(), Err(GraphError::Startup(_))));
    }

    #[test]
    fn test_template_installed_once_and_failures_tolerated() {
        let backend = Arc::new(InMemoryBackend::new());
        let schema = provider(backend.clone());
        schema.ensure_template("person");
        schema.ensure_template("person");
        assert_eq!(backend.request_count(RequestKind::PutMapping), 1);
        assert_eq!(
            backend.mapping("graph", "person").unwrap()["person"]["_all"]["enabled"],
            json!(false)
        );

        backend.reject_mappings(true);
        schema.ensure_template("software");
        assert!(backend.mapping("graph", "software").is_none());

        // a second provider starts with its own empty set
        provider(backend.clone()).ensure_template("person");
        assert_eq!(backend.request_count(RequestKind::PutMapping), 3);
    }
}

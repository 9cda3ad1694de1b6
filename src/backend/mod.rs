//! Document store backends.
//!
//! The graph layer talks to its store only through [`DocumentBackend`]:
//! per-document writes, bulk writes, multi-get and filtered scroll search.
//! All calls are synchronous and block until the store acknowledges them.

pub mod memory;

#[cfg(feature = "http")]
pub mod http;

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::query::filter::Filter;

pub use memory::{InMemoryBackend, RequestKind};

#[cfg(feature = "http")]
pub use http::{HttpBackend, HttpBackendConfig};

/// Flat field map of a stored document.
pub type Fields = serde_json::Map<String, serde_json::Value>;

/// Address of a document.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocRef {
    /// Physical index.
    pub index: String,
    /// Physical type; `None` matches any type on reads.
    pub doc_type: Option<String>,
    /// Document id.
    pub id: String,
}

impl DocRef {
    /// Address a document with a known type.
    pub fn new(index: impl Into<String>, doc_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            index: index.into(),
            doc_type: Some(doc_type.into()),
            id: id.into(),
        }
    }

    /// Address a document whose type is unknown.
    pub fn untyped(index: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            index: index.into(),
            doc_type: None,
            id: id.into(),
        }
    }
}

/// A stored document as returned by reads and searches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Physical index.
    pub index: String,
    /// Physical type.
    pub doc_type: String,
    /// Document id.
    pub id: String,
    /// Routing key, if the document was routed.
    pub routing: Option<String>,
    /// Document fields.
    pub source: Fields,
}

impl Document {
    /// Create a document.
    pub fn new(
        index: impl Into<String>,
        doc_type: impl Into<String>,
        id: impl Into<String>,
        source: Fields,
    ) -> Self {
        Self {
            index: index.into(),
            doc_type: doc_type.into(),
            id: id.into(),
            routing: None,
            source,
        }
    }

    /// The document's address.
    pub fn doc_ref(&self) -> DocRef {
        DocRef::new(self.index.clone(), self.doc_type.clone(), self.id.clone())
    }
}

/// A single write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WriteOp {
    /// Index a full document; with `create`, fail if the id is taken.
    Index {
        /// Target document.
        target: DocRef,
        /// Optional routing key.
        routing: Option<String>,
        /// Full source.
        source: Fields,
        /// Fail with `DocumentAlreadyExists` if the document exists.
        create: bool,
    },
    /// Merge top-level fields into an existing document.
    Update {
        /// Target document.
        target: DocRef,
        /// Optional routing key.
        routing: Option<String>,
        /// Partial source to merge.
        doc: Fields,
        /// Create the document if absent and skip identical rewrites.
        upsert: bool,
    },
    /// Delete a document.
    Delete {
        /// Target document.
        target: DocRef,
        /// Optional routing key.
        routing: Option<String>,
    },
}

impl WriteOp {
    /// The document this write targets.
    pub fn target(&self) -> &DocRef {
        match self {
            Self::Index { target, .. } | Self::Update { target, .. } | Self::Delete { target, .. } => {
                target
            }
        }
    }
}

/// Outcome of one item in a bulk request.
#[derive(Debug, Clone)]
pub struct BulkItem {
    /// The targeted document.
    pub target: DocRef,
    /// Failure, if the item was rejected.
    pub error: Option<BackendError>,
}

/// Response to a bulk request.
#[derive(Debug, Clone, Default)]
pub struct BulkResponse {
    /// Per-item outcomes in request order.
    pub items: Vec<BulkItem>,
}

impl BulkResponse {
    /// Whether any item failed.
    pub fn has_failures(&self) -> bool {
        self.items.iter().any(|i| i.error.is_some())
    }

    /// Failed items.
    pub fn failures(&self) -> impl Iterator<Item = &BulkItem> {
        self.items.iter().filter(|i| i.error.is_some())
    }
}

/// A filtered search, optionally opening a scroll.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    /// Indices to search.
    pub indices: Vec<String>,
    /// Filter applied to every document.
    pub filter: Filter,
    /// Page size.
    pub size: usize,
    /// Keep-alive for the scroll context; `None` means a single page.
    pub scroll: Option<Duration>,
}

/// One page of search hits.
#[derive(Debug, Clone, Default)]
pub struct SearchPage {
    /// Continuation token for the next page.
    pub scroll_id: Option<String>,
    /// Total number of matching documents.
    pub total: u64,
    /// Hits on this page.
    pub hits: Vec<Document>,
}

/// Cluster health levels, ordered worst to best.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Primary shards unassigned.
    Red,
    /// Primaries assigned, replicas missing.
    Yellow,
    /// Fully allocated.
    Green,
}

impl HealthStatus {
    /// Parse a status string.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "red" => Some(Self::Red),
            "yellow" => Some(Self::Yellow),
            "green" => Some(Self::Green),
            _ => None,
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Red => write!(f, "red"),
            Self::Yellow => write!(f, "yellow"),
            Self::Green => write!(f, "green"),
        }
    }
}

/// Result of a cluster health wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClusterHealth {
    /// Current status.
    pub status: HealthStatus,
    /// Whether the wait elapsed before the requested status was reached.
    pub timed_out: bool,
}

/// Error type for backend operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BackendError {
    /// A create targeted an id that already exists.
    #[error("Document already exists: {index}/{id}")]
    DocumentAlreadyExists {
        /// Index of the conflicting document.
        index: String,
        /// Conflicting id.
        id: String,
    },
    /// An update targeted a missing document.
    #[error("Document missing: {index}/{id}")]
    DocumentMissing {
        /// Index searched.
        index: String,
        /// Missing id.
        id: String,
    },
    /// A scroll id is unknown or expired.
    #[error("Scroll context not found: {0}")]
    ScrollNotFound(String),
    /// The store rejected the request.
    #[error("Request rejected ({status}): {reason}")]
    Rejected {
        /// Status code reported by the store.
        status: u16,
        /// Reason reported by the store.
        reason: String,
    },
    /// The request did not complete in time.
    #[error("Request timed out: {0}")]
    Timeout(String),
    /// Connection-level failure.
    #[error("Transport error: {0}")]
    Transport(String),
    /// Request or response body could not be (de)serialized.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for BackendError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Trait for document store backends.
///
/// Implementations must be safe to share across threads; the graph layer
/// holds one instance behind an `Arc` for the lifetime of the process.
pub trait DocumentBackend: Send + Sync {
    /// Check whether an index exists.
    fn index_exists(&self, index: &str) -> Result<bool, BackendError>;

    /// Create an index with the given settings.
    fn create_index(&self, index: &str, settings: &serde_json::Value) -> Result<(), BackendError>;

    /// Wait up to `timeout` for the index to reach `wait_for` or better.
    fn cluster_health(
        &self,
        index: &str,
        wait_for: HealthStatus,
        timeout: Duration,
    ) -> Result<ClusterHealth, BackendError>;

    /// Install a type mapping.
    fn put_mapping(&self, index: &str, doc_type: &str, mapping: &serde_json::Value) -> Result<(), BackendError>;

    /// Perform a single write.
    fn execute(&self, op: WriteOp) -> Result<(), BackendError>;

    /// Perform several writes in one request, in order.
    fn bulk(&self, ops: Vec<WriteOp>) -> Result<BulkResponse, BackendError>;

    /// Fetch several documents in one request; missing documents are `None`.
    fn multi_get(&self, refs: &[DocRef]) -> Result<Vec<Option<Document>>, BackendError>;

    /// Run a filtered search, returning the first page.
    fn search(&self, request: &SearchRequest) -> Result<SearchPage, BackendError>;

    /// Fetch the next page of a scroll.
    fn scroll(&self, scroll_id: &str, keep_alive: Duration) -> Result<SearchPage, BackendError>;

    /// Release a scroll context.
    fn clear_scroll(&self, scroll_id: &str) -> Result<(), BackendError>;

    /// Make recent writes visible to search.
    fn refresh(&self, indices: &[String]) -> Result<(), BackendError>;

    /// Delete every document matching the filter; returns the count deleted.
    fn delete_by_query(&self, index: &str, filter: &Filter) -> Result<u64, BackendError>;
}

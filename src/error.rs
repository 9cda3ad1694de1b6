//! Error types for the graph layer.

use crate::backend::BackendError;
use crate::types::{ElementId, ElementKind};

/// Convenience alias used throughout the crate.
pub type GraphResult<T> = Result<T, GraphError>;

/// Error type for graph operations.
///
/// Variants map onto four families:
/// - configuration: `UnknownLabel`, `InvalidMapping`, `InvalidConfig`
/// - constraint: `AlreadyExists`, `InvalidProperty`, `ElementRemoved`
/// - referential: `NoEdgeContainer`, `BatchSealed`
/// - backend: `Backend`, `BulkFailed`, `Startup`, `Decode`
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// No handler is registered for the label.
    #[error("No handler registered for label: {0}")]
    UnknownLabel(String),

    /// The edge mapping set is inconsistent.
    #[error("Invalid edge mapping: {0}")]
    InvalidMapping(String),

    /// A configuration value is out of range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// An element with the same id already exists.
    #[error("{kind} with id {id} already exists")]
    AlreadyExists {
        /// Vertex or edge.
        kind: ElementKind,
        /// The conflicting id.
        id: ElementId,
    },

    /// A property key collides with a reserved field or is otherwise unusable.
    #[error("Invalid property key '{key}': {reason}")]
    InvalidProperty {
        /// The rejected key.
        key: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The element was removed; no further mutation is allowed.
    #[error("{kind} with id {id} was removed")]
    ElementRemoved {
        /// Vertex or edge.
        kind: ElementKind,
        /// Id of the removed element.
        id: ElementId,
    },

    /// Neither endpoint can store the edge and its label is not standalone.
    #[error(
        "Neither in nor out vertex can contain the edge. \
         edgeLabel: {label}, Ids - inV: {in_id}, outV: {out_id}, edge: {edge_id}"
    )]
    NoEdgeContainer {
        /// Edge label.
        label: String,
        /// Out endpoint id.
        out_id: ElementId,
        /// In endpoint id.
        in_id: ElementId,
        /// Requested edge id.
        edge_id: ElementId,
    },

    /// A lazy getter window was sealed before the registration.
    #[error("Lazy getter already resolved; register with a new batch")]
    BatchSealed,

    /// Index bootstrap failed (health check timed out).
    #[error("Startup failed: {0}")]
    Startup(String),

    /// One or more operations of a bulk flush failed.
    #[error("Bulk request failed for {} operation(s): {}", failures.len(), failures.join("; "))]
    BulkFailed {
        /// Per-operation failure messages.
        failures: Vec<String>,
    },

    /// A stored document could not be decoded into an element.
    #[error("Malformed document {id}: {reason}")]
    Decode {
        /// Document id.
        id: String,
        /// What was wrong with it.
        reason: String,
    },

    /// Backend failure, surfaced unmodified.
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),
}

impl GraphError {
    /// Build an `InvalidProperty` error.
    pub fn invalid_property(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidProperty {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Build a `Decode` error.
    pub fn decode(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Decode {
            id: id.into(),
            reason: reason.into(),
        }
    }

    /// Map a create conflict onto the element-level `AlreadyExists` error.
    ///
    /// Any other error passes through unchanged.
    pub fn on_conflict(self, kind: ElementKind, id: &ElementId) -> Self {
        match self {
            Self::Backend(BackendError::DocumentAlreadyExists { .. }) => Self::AlreadyExists {
                kind,
                id: id.clone(),
            },
            other => other,
        }
    }
}

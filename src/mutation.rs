//! Write batching.
//!
//! In [`BatchMode::Immediate`] every write is its own round trip. In
//! [`BatchMode::Bulk`] writes accumulate until [`MutationBatcher::commit`]
//! sends them as one bulk request, applied in enqueue order, so the last
//! write to a document id wins.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::backend::{DocRef, DocumentBackend, Fields, WriteOp};
use crate::error::{GraphError, GraphResult};
use crate::timing::TimingAccessor;
use crate::types::{ElementId, ElementKind};

/// When writes reach the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchMode {
    /// One round trip per write.
    #[default]
    Immediate,
    /// Accumulate until commit.
    Bulk,
}

/// An element that can be written as a document.
pub trait DocumentSource {
    /// Document id.
    fn document_id(&self) -> &ElementId;

    /// Vertex or edge, for conflict reporting.
    fn document_kind(&self) -> ElementKind;

    /// Physical document type.
    fn document_type(&self) -> String;

    /// Full document source.
    fn to_source(&self) -> Fields;
}

/// Accumulates or forwards document writes.
pub struct MutationBatcher {
    backend: Arc<dyn DocumentBackend>,
    mode: BatchMode,
    pending: Mutex<Vec<WriteOp>>,
    timing: TimingAccessor,
}

impl MutationBatcher {
    /// Create a batcher.
    pub fn new(backend: Arc<dyn DocumentBackend>, mode: BatchMode, timing: TimingAccessor) -> Self {
        Self {
            backend,
            mode,
            pending: Mutex::new(Vec::new()),
            timing,
        }
    }

    /// Current mode.
    pub fn mode(&self) -> BatchMode {
        self.mode
    }

    /// Number of writes waiting for commit.
    pub fn pending(&self) -> usize {
        self.pending.lock().len()
    }

    fn target(element: &dyn DocumentSource, index: &str) -> DocRef {
        DocRef::new(index, element.document_type(), element.document_id().as_str())
    }

    fn submit(&self, op: WriteOp) -> GraphResult<()> {
        match self.mode {
            BatchMode::Bulk => {
                self.pending.lock().push(op);
                Ok(())
            }
            BatchMode::Immediate => {
                let _t = self.timing.time("write");
                tracing::debug!(id = %op.target().id, "Immediate write");
                self.backend.execute(op)?;
                Ok(())
            }
        }
    }

    /// Index the element's full document.
    ///
    /// With `fail_if_exists`, an existing id surfaces as
    /// [`GraphError::AlreadyExists`]. In bulk mode the conflict surfaces
    /// from [`commit`](Self::commit) instead.
    pub fn add_element(
        &self,
        element: &dyn DocumentSource,
        index: &str,
        routing: Option<&str>,
        fail_if_exists: bool,
    ) -> GraphResult<()> {
        let op = WriteOp::Index {
            target: Self::target(element, index),
            routing: routing.map(str::to_string),
            source: element.to_source(),
            create: fail_if_exists,
        };
        self.submit(op)
            .map_err(|e| e.on_conflict(element.document_kind(), element.document_id()))
    }

    /// Merge the element's full document into the stored one.
    ///
    /// With `upsert`, a missing document is created.
    pub fn update_element(
        &self,
        element: &dyn DocumentSource,
        index: &str,
        routing: Option<&str>,
        upsert: bool,
    ) -> GraphResult<()> {
        self.update_fields(element, index, routing, element.to_source(), upsert)
    }

    /// Merge selected top-level fields into the element's document.
    pub fn update_fields(
        &self,
        element: &dyn DocumentSource,
        index: &str,
        routing: Option<&str>,
        doc: Fields,
        upsert: bool,
    ) -> GraphResult<()> {
        self.submit(WriteOp::Update {
            target: Self::target(element, index),
            routing: routing.map(str::to_string),
            doc,
            upsert,
        })
    }

    /// Delete the element's document.
    pub fn delete_element(&self, element: &dyn DocumentSource, index: &str, routing: Option<&str>) -> GraphResult<()> {
        self.submit(WriteOp::Delete {
            target: Self::target(element, index),
            routing: routing.map(str::to_string),
        })
    }

    /// Send every pending write in one bulk request and reset the buffer.
    ///
    /// Returns the number of writes sent. Per-item failures are collected
    /// into [`GraphError::BulkFailed`]; the buffer is reset either way.
    pub fn commit(&self) -> GraphResult<usize> {
        let ops = std::mem::take(&mut *self.pending.lock());
        if ops.is_empty() {
            return Ok(0);
        }
        let count = ops.len();
        let response = {
            let _t = self.timing.time("bulk");
            self.backend.bulk(ops)?
        };
        tracing::debug!(count, "Bulk flush");
        if response.has_failures() {
            let failures: Vec<String> = response
                .failures()
                .map(|item| {
                    let reason = item.error.as_ref().map(ToString::to_string).unwrap_or_default();
                    format!("{}: {}", item.target.id, reason)
                })
                .collect();
            tracing::warn!(failed = failures.len(), count, "Bulk flush had failures");
            return Err(GraphError::BulkFailed { failures });
        }
        Ok(count)
    }
}

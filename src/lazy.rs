//! Batched, deferred endpoint resolution.
//!
//! Decoding a page of embedded vertices yields many edges whose far
//! endpoint is known only by id. Each of those ids is registered with a
//! [`LazyGetter`]; the first resolution fetches every registered id with a
//! single multi-get and seals the getter. A [`BatchContext`] owns the
//! current getter and swaps in a fresh one once it is sealed.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::backend::{DocRef, Document};
use crate::error::{GraphError, GraphResult};
use crate::graph::Graph;
use crate::types::{ElementId, Vertex};

/// Arena slot handed out by [`LazyGetter::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Placeholder(usize);

#[derive(Debug)]
enum Window {
    Open,
    Sealed,
}

#[derive(Debug)]
struct Slot {
    doc_ref: DocRef,
    resolved: Option<Document>,
}

/// Two-phase registration window over one multi-get.
#[derive(Debug)]
pub struct LazyGetter {
    slots: Vec<Slot>,
    by_ref: HashMap<DocRef, Placeholder>,
    window: Window,
}

impl Default for LazyGetter {
    fn default() -> Self {
        Self::new()
    }
}

impl LazyGetter {
    /// Open a new registration window.
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            by_ref: HashMap::new(),
            window: Window::Open,
        }
    }

    /// Whether registrations are still accepted.
    pub fn can_register(&self) -> bool {
        matches!(self.window, Window::Open)
    }

    /// Number of distinct registered documents.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether nothing was registered.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Register a document for deferred fetch; duplicates share a slot.
    pub fn register(&mut self, doc_ref: DocRef) -> GraphResult<Placeholder> {
        if !self.can_register() {
            return Err(GraphError::BatchSealed);
        }
        if let Some(p) = self.by_ref.get(&doc_ref) {
            return Ok(*p);
        }
        let p = Placeholder(self.slots.len());
        self.by_ref.insert(doc_ref.clone(), p);
        self.slots.push(Slot {
            doc_ref,
            resolved: None,
        });
        Ok(p)
    }

    /// Resolve a placeholder, fetching the whole window on first use.
    ///
    /// Documents the backend does not return resolve to `None`.
    pub fn get_or_fetch(&mut self, placeholder: Placeholder, graph: &Graph) -> GraphResult<Option<Document>> {
        if self.can_register() {
            self.fetch(graph)?;
        }
        Ok(self
            .slots
            .get(placeholder.0)
            .and_then(|s| s.resolved.clone()))
    }

    fn fetch(&mut self, graph: &Graph) -> GraphResult<()> {
        let refs: Vec<DocRef> = self.slots.iter().map(|s| s.doc_ref.clone()).collect();
        if !refs.is_empty() {
            let docs = {
                let _t = graph.timing().time("multi_get");
                graph.backend().multi_get(&refs)?
            };
            tracing::debug!(count = refs.len(), "Resolved lazy batch");
            for (slot, doc) in self.slots.iter_mut().zip(docs) {
                slot.resolved = doc;
            }
        }
        self.window = Window::Sealed;
        Ok(())
    }
}

/// A registered slot in a shared getter.
#[derive(Debug, Clone)]
pub struct LazySlot {
    getter: Arc<Mutex<LazyGetter>>,
    placeholder: Placeholder,
}

impl LazySlot {
    /// Resolve through the owning getter.
    pub fn get_or_fetch(&self, graph: &Graph) -> GraphResult<Option<Document>> {
        self.getter.lock().get_or_fetch(self.placeholder, graph)
    }
}

/// Holds the current registration window for one decode scope.
///
/// Sealed getters are replaced on the next registration, so late
/// registrations land in a fresh window instead of failing.
#[derive(Debug, Clone, Default)]
pub struct BatchContext {
    current: Arc<Mutex<Arc<Mutex<LazyGetter>>>>,
}

impl BatchContext {
    /// A context with an empty open window.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a document in the current window.
    pub fn register(&self, doc_ref: DocRef) -> GraphResult<LazySlot> {
        let mut current = self.current.lock();
        if !current.lock().can_register() {
            *current = Arc::new(Mutex::new(LazyGetter::new()));
        }
        let placeholder = current.lock().register(doc_ref)?;
        Ok(LazySlot {
            getter: Arc::clone(&current),
            placeholder,
        })
    }

    /// Register a vertex by id and label.
    pub fn vertex(&self, graph: &Arc<Graph>, id: ElementId, label: &str) -> GraphResult<LazyVertex> {
        let doc_ref = DocRef::new(
            graph.config().index_name.clone(),
            graph.layout().doc_type(label),
            id.as_str(),
        );
        Ok(LazyVertex {
            id,
            label: label.to_string(),
            slot: self.register(doc_ref)?,
            graph: Arc::clone(graph),
            resolved: Arc::new(Mutex::new(None)),
        })
    }
}

/// A vertex known by id and label whose document is fetched on demand.
#[derive(Debug, Clone)]
pub struct LazyVertex {
    id: ElementId,
    label: String,
    slot: LazySlot,
    graph: Arc<Graph>,
    resolved: Arc<Mutex<Option<Vertex>>>,
}

impl LazyVertex {
    /// Vertex id.
    pub fn id(&self) -> &ElementId {
        &self.id
    }

    /// Vertex label.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Fetch and decode the vertex; a dangling reference is `Ok(None)`.
    pub fn resolve(&self) -> GraphResult<Option<Vertex>> {
        if let Some(v) = self.resolved.lock().as_ref() {
            return Ok(Some(v.clone()));
        }
        let Some(doc) = self.slot.get_or_fetch(&self.graph)? else {
            return Ok(None);
        };
        let vertex = Vertex::from_document(&self.graph, doc, &BatchContext::new())?;
        *self.resolved.lock() = Some(vertex.clone());
        Ok(Some(vertex))
    }
}

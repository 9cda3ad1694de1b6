//! Edge handles.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use super::vertex::PropertyMap;
use super::{
    is_reserved_key, validate_key, Direction, Element, ElementId, ElementKind, Value, Vertex, IN_ID_FIELD,
    IN_LABEL_FIELD, OUT_ID_FIELD, OUT_LABEL_FIELD,
};
use crate::backend::{Document, Fields};
use crate::error::{GraphError, GraphResult};
use crate::graph::Graph;
use crate::lazy::{BatchContext, LazyVertex};
use crate::mutation::DocumentSource;

/// One endpoint of an edge: either already loaded or fetched on demand.
#[derive(Debug, Clone)]
pub(crate) enum Endpoint {
    Loaded(Vertex),
    Lazy(LazyVertex),
}

impl Endpoint {
    fn id(&self) -> &ElementId {
        match self {
            Self::Loaded(v) => v.id(),
            Self::Lazy(l) => l.id(),
        }
    }

    fn label(&self) -> &str {
        match self {
            Self::Loaded(v) => v.label(),
            Self::Lazy(l) => l.label(),
        }
    }

    fn resolve(&self) -> GraphResult<Option<Vertex>> {
        match self {
            Self::Loaded(v) => Ok(Some(v.clone())),
            Self::Lazy(l) => l.resolve(),
        }
    }

    fn lazy_or_known(
        graph: &Arc<Graph>,
        batch: &BatchContext,
        known: &HashMap<ElementId, Vertex>,
        id: ElementId,
        label: &str,
    ) -> GraphResult<Self> {
        match known.get(&id) {
            Some(v) => Ok(Self::Loaded(v.clone())),
            None => Ok(Self::Lazy(batch.vertex(graph, id, label)?)),
        }
    }
}

/// Where an edge is physically stored.
#[derive(Debug, Clone)]
pub enum EdgeLocation {
    /// Its own document, routed by the out-vertex id.
    Standalone,
    /// A group inside `container`'s document.
    Embedded {
        /// The vertex whose document holds the edge.
        container: Vertex,
        /// Position of the mapping in the container's mapping set.
        mapping: usize,
    },
}

#[derive(Debug, Default)]
struct EdgeState {
    properties: PropertyMap,
    removed: bool,
}

struct EdgeInner {
    id: ElementId,
    label: String,
    graph: Arc<Graph>,
    out: Endpoint,
    inn: Endpoint,
    location: EdgeLocation,
    state: RwLock<EdgeState>,
}

/// Shared handle to an edge.
#[derive(Clone)]
pub struct Edge {
    inner: Arc<EdgeInner>,
}

impl Edge {
    #[allow(clippy::too_many_arguments)]
    fn assemble(
        graph: &Arc<Graph>,
        id: ElementId,
        label: String,
        out: Endpoint,
        inn: Endpoint,
        location: EdgeLocation,
        properties: PropertyMap,
    ) -> Self {
        Self {
            inner: Arc::new(EdgeInner {
                id,
                label,
                graph: Arc::clone(graph),
                out,
                inn,
                location,
                state: RwLock::new(EdgeState {
                    properties,
                    removed: false,
                }),
            }),
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn embedded(
        graph: &Arc<Graph>,
        id: ElementId,
        label: String,
        out: Endpoint,
        inn: Endpoint,
        container: Vertex,
        mapping: usize,
        properties: PropertyMap,
    ) -> Self {
        Self::assemble(
            graph,
            id,
            label,
            out,
            inn,
            EdgeLocation::Embedded { container, mapping },
            properties,
        )
    }

    /// Build an unsaved standalone edge between two loaded vertices.
    pub(crate) fn standalone(
        graph: &Arc<Graph>,
        id: ElementId,
        label: &str,
        out: &Vertex,
        inn: &Vertex,
        properties: PropertyMap,
    ) -> GraphResult<Self> {
        for key in properties.keys() {
            validate_key(key)?;
        }
        Ok(Self::assemble(
            graph,
            id,
            label.to_string(),
            Endpoint::Loaded(out.clone()),
            Endpoint::Loaded(inn.clone()),
            EdgeLocation::Standalone,
            properties,
        ))
    }

    /// Decode a standalone edge document.
    ///
    /// Endpoints found in `known` are attached directly; the rest are
    /// registered lazily in `batch`.
    pub fn from_document(
        graph: &Arc<Graph>,
        doc: Document,
        batch: &BatchContext,
        known: &HashMap<ElementId, Vertex>,
    ) -> GraphResult<Self> {
        let label = graph
            .layout()
            .label_of(&doc)
            .ok_or_else(|| GraphError::decode(&doc.id, "document has no label"))?;
        let field = |name: &str| {
            doc.source
                .get(name)
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .ok_or_else(|| GraphError::decode(&doc.id, format!("edge document missing '{}'", name)))
        };
        let out_id = ElementId::new(field(OUT_ID_FIELD)?);
        let in_id = ElementId::new(field(IN_ID_FIELD)?);
        let out_label = field(OUT_LABEL_FIELD)?;
        let in_label = field(IN_LABEL_FIELD)?;

        let out = Endpoint::lazy_or_known(graph, batch, known, out_id, &out_label)?;
        let inn = Endpoint::lazy_or_known(graph, batch, known, in_id, &in_label)?;
        let properties = doc
            .source
            .iter()
            .filter(|(k, _)| !is_reserved_key(k))
            .filter_map(|(k, v)| Value::from_json(v).map(|v| (k.clone(), v)))
            .collect();
        Ok(Self::assemble(
            graph,
            ElementId::new(doc.id),
            label,
            out,
            inn,
            EdgeLocation::Standalone,
            properties,
        ))
    }

    /// Physical location.
    pub fn location(&self) -> &EdgeLocation {
        &self.inner.location
    }

    /// Whether the edge is stored inside a vertex document.
    pub fn is_embedded(&self) -> bool {
        matches!(self.inner.location, EdgeLocation::Embedded { .. })
    }

    /// Out-vertex id.
    pub fn out_id(&self) -> &ElementId {
        self.inner.out.id()
    }

    /// In-vertex id.
    pub fn in_id(&self) -> &ElementId {
        self.inner.inn.id()
    }

    /// Out-vertex label.
    pub fn out_label(&self) -> &str {
        self.inner.out.label()
    }

    /// In-vertex label.
    pub fn in_label(&self) -> &str {
        self.inner.inn.label()
    }

    /// Endpoint id in a concrete direction; `Both` yields the out id.
    pub fn vertex_id(&self, direction: Direction) -> &ElementId {
        match direction {
            Direction::In => self.in_id(),
            Direction::Out | Direction::Both => self.out_id(),
        }
    }

    /// Resolve the out vertex; `None` for a dangling reference.
    pub fn out_vertex(&self) -> GraphResult<Option<Vertex>> {
        self.inner.out.resolve()
    }

    /// Resolve the in vertex; `None` for a dangling reference.
    pub fn in_vertex(&self) -> GraphResult<Option<Vertex>> {
        self.inner.inn.resolve()
    }

    /// Resolve the endpoints selected by a direction.
    pub fn vertices(&self, direction: Direction) -> GraphResult<Vec<Vertex>> {
        let mut out = Vec::new();
        if direction.admits(Direction::Out) {
            out.extend(self.out_vertex()?);
        }
        if direction.admits(Direction::In) {
            out.extend(self.in_vertex()?);
        }
        Ok(out)
    }

    /// Resolve the endpoint opposite to `from`.
    pub fn other_vertex(&self, from: &ElementId) -> GraphResult<Option<Vertex>> {
        if self.out_id() == from {
            self.in_vertex()
        } else {
            self.out_vertex()
        }
    }

    fn removed_error(&self) -> GraphError {
        GraphError::ElementRemoved {
            kind: ElementKind::Edge,
            id: self.inner.id.clone(),
        }
    }

    fn ensure_live(&self) -> GraphResult<()> {
        if self.inner.state.read().removed {
            return Err(self.removed_error());
        }
        Ok(())
    }

    fn routing(&self) -> &str {
        self.out_id().as_str()
    }

    /// Set a property.
    ///
    /// Embedded edges rewrite their container; standalone edges update
    /// their own document.
    pub fn set_property(&self, key: &str, value: impl Into<Value>) -> GraphResult<()> {
        validate_key(key)?;
        let value = value.into();
        self.ensure_live()?;
        let graph = &self.inner.graph;
        match &self.inner.location {
            EdgeLocation::Embedded { container, .. } => {
                container.update_group(&self.inner.id, |g| {
                    g.properties.insert(key.to_string(), value.clone());
                })?;
            }
            EdgeLocation::Standalone => {
                let mut doc = Fields::new();
                doc.insert(key.to_string(), value.to_json());
                graph
                    .mutations()
                    .update_fields(self, graph.index(), Some(self.routing()), doc, false)?;
            }
        }
        self.inner.state.write().properties.insert(key.to_string(), value);
        Ok(())
    }

    /// Remove a property, returning its previous value.
    pub fn remove_property(&self, key: &str) -> GraphResult<Option<Value>> {
        self.ensure_live()?;
        if self.value(key).is_none() {
            return Ok(None);
        }
        let graph = &self.inner.graph;
        match &self.inner.location {
            EdgeLocation::Embedded { container, .. } => {
                container.update_group(&self.inner.id, |g| {
                    g.properties.remove(key);
                })?;
            }
            EdgeLocation::Standalone => {
                let mut doc = Fields::new();
                doc.insert(key.to_string(), serde_json::Value::Null);
                graph
                    .mutations()
                    .update_fields(self, graph.index(), Some(self.routing()), doc, false)?;
            }
        }
        Ok(self.inner.state.write().properties.remove(key))
    }

    /// Delete the edge. Later mutations fail.
    pub fn remove(&self) -> GraphResult<()> {
        self.ensure_live()?;
        let graph = &self.inner.graph;
        match &self.inner.location {
            EdgeLocation::Embedded { container, .. } => container.remove_group(&self.inner.id)?,
            EdgeLocation::Standalone => {
                graph
                    .mutations()
                    .delete_element(self, graph.index(), Some(self.routing()))?
            }
        }
        self.inner.state.write().removed = true;
        tracing::debug!(id = %self.inner.id, label = %self.inner.label, "Removed edge");
        Ok(())
    }
}

impl Element for Edge {
    fn id(&self) -> &ElementId {
        &self.inner.id
    }

    fn label(&self) -> &str {
        &self.inner.label
    }

    fn kind(&self) -> ElementKind {
        ElementKind::Edge
    }

    fn value(&self, key: &str) -> Option<Value> {
        self.inner.state.read().properties.get(key).cloned()
    }

    fn keys(&self) -> Vec<String> {
        self.inner.state.read().properties.keys().cloned().collect()
    }

    fn is_removed(&self) -> bool {
        self.inner.state.read().removed
    }
}

impl DocumentSource for Edge {
    fn document_id(&self) -> &ElementId {
        &self.inner.id
    }

    fn document_kind(&self) -> ElementKind {
        ElementKind::Edge
    }

    fn document_type(&self) -> String {
        self.inner.graph.layout().doc_type(&self.inner.label)
    }

    fn to_source(&self) -> Fields {
        let mut source = self
            .inner
            .graph
            .layout()
            .discriminators(ElementKind::Edge, &self.inner.label);
        source.insert(OUT_ID_FIELD.to_string(), self.out_id().as_str().into());
        source.insert(IN_ID_FIELD.to_string(), self.in_id().as_str().into());
        source.insert(OUT_LABEL_FIELD.to_string(), self.out_label().into());
        source.insert(IN_LABEL_FIELD.to_string(), self.in_label().into());
        for (k, v) in &self.inner.state.read().properties {
            source.insert(k.clone(), v.to_json());
        }
        source
    }
}

impl PartialEq for Edge {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Edge {}

impl fmt::Debug for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Edge")
            .field("id", &self.inner.id)
            .field("label", &self.inner.label)
            .field("out", self.out_id())
            .field("in", self.in_id())
            .field("embedded", &self.is_embedded())
            .finish()
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "e[{}][{}-{}->{}]",
            self.inner.id,
            self.out_id(),
            self.inner.label,
            self.in_id()
        )
    }
}

//! Vertex handles and inner-edge groups.
//!
//! A vertex of an embedded label carries, per applicable mapping, an array
//! of inner-edge groups under the mapping's field:
//!
//! ```text
//! { "name": "marko",
//!   "knows":   [ { "~eid": "7", "~vid": "2", "weight": 0.5 } ],
//!   "created": [ { "~eid": "9", "~vid": "3", "weight": 0.4 } ] }
//! ```
//!
//! Group changes upsert only the touched mapping field of the owning
//! document; no separate edge document exists.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use super::edge::{Edge, Endpoint};
use super::{
    is_reserved_key, validate_key, Direction, Element, ElementId, ElementKind, Value, INNER_EDGE_ID,
    INNER_VERTEX_ID,
};
use crate::backend::{Document, Fields};
use crate::error::{GraphError, GraphResult};
use crate::graph::Graph;
use crate::lazy::BatchContext;
use crate::mapping::MappingSet;
use crate::mutation::DocumentSource;
use crate::query::predicate::Predicates;

/// Property values keyed by property key.
pub type PropertyMap = BTreeMap<String, Value>;

/// One embedded edge stored inside its container vertex.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct InnerEdgeGroup {
    /// Position of the mapping in the container's mapping set.
    pub(crate) mapping: usize,
    pub(crate) edge_id: ElementId,
    /// Id of the endpoint that is not the container.
    pub(crate) other_id: ElementId,
    pub(crate) properties: PropertyMap,
}

impl InnerEdgeGroup {
    fn to_json(&self) -> serde_json::Value {
        let mut obj = Fields::new();
        obj.insert(INNER_EDGE_ID.to_string(), self.edge_id.as_str().into());
        obj.insert(INNER_VERTEX_ID.to_string(), self.other_id.as_str().into());
        for (k, v) in &self.properties {
            obj.insert(k.clone(), v.to_json());
        }
        serde_json::Value::Object(obj)
    }

    fn from_json(mapping: usize, owner: &str, json: &serde_json::Value) -> GraphResult<Self> {
        let obj = json
            .as_object()
            .ok_or_else(|| GraphError::decode(owner, "inner edge group is not an object"))?;
        let id_of = |field: &str| {
            obj.get(field)
                .and_then(|v| match v {
                    serde_json::Value::String(s) => Some(s.clone()),
                    serde_json::Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .map(ElementId::new)
                .ok_or_else(|| GraphError::decode(owner, format!("inner edge group missing '{}'", field)))
        };
        let edge_id = id_of(INNER_EDGE_ID)?;
        let other_id = id_of(INNER_VERTEX_ID)?;
        let properties = obj
            .iter()
            .filter(|(k, _)| !is_reserved_key(k))
            .filter_map(|(k, v)| Value::from_json(v).map(|v| (k.clone(), v)))
            .collect();
        Ok(Self {
            mapping,
            edge_id,
            other_id,
            properties,
        })
    }
}

#[derive(Debug, Default)]
struct VertexState {
    properties: PropertyMap,
    /// Keys removed since load; written as null so merges clear them.
    cleared: BTreeSet<String>,
    groups: Vec<InnerEdgeGroup>,
    removed: bool,
}

struct VertexInner {
    id: ElementId,
    label: String,
    graph: Arc<Graph>,
    /// Mapping set captured when the vertex was created or loaded.
    mappings: Option<Arc<MappingSet>>,
    batch: BatchContext,
    state: RwLock<VertexState>,
}

/// Shared handle to a vertex.
///
/// Clones observe the same state, including the terminal `removed` flag.
#[derive(Clone)]
pub struct Vertex {
    inner: Arc<VertexInner>,
}

impl Vertex {
    fn assemble(
        graph: &Arc<Graph>,
        id: ElementId,
        label: String,
        mappings: Option<Arc<MappingSet>>,
        batch: BatchContext,
        state: VertexState,
    ) -> Self {
        Self {
            inner: Arc::new(VertexInner {
                id,
                label,
                graph: Arc::clone(graph),
                mappings,
                batch,
                state: RwLock::new(state),
            }),
        }
    }

    /// Build an unsaved vertex, validating property keys.
    pub(crate) fn new(graph: &Arc<Graph>, id: ElementId, label: &str, properties: PropertyMap) -> GraphResult<Self> {
        let mappings = graph.registry().encoding(label)?.mappings().cloned();
        for key in properties.keys() {
            check_key(mappings.as_deref(), key)?;
        }
        Ok(Self::assemble(
            graph,
            id,
            label.to_string(),
            mappings,
            BatchContext::new(),
            VertexState {
                properties,
                ..Default::default()
            },
        ))
    }

    /// Decode a stored document.
    ///
    /// Far endpoints of inner edges are registered lazily in `batch`.
    pub fn from_document(graph: &Arc<Graph>, doc: Document, batch: &BatchContext) -> GraphResult<Self> {
        let label = graph
            .layout()
            .label_of(&doc)
            .ok_or_else(|| GraphError::decode(&doc.id, "document has no label"))?;
        let mappings = graph.registry().encoding(&label)?.mappings().cloned();

        let mut state = VertexState::default();
        for (key, json) in &doc.source {
            if is_reserved_key(key) {
                continue;
            }
            if let Some(pos) = mappings.as_ref().and_then(|m| m.position_of_field(key)) {
                match json {
                    serde_json::Value::Array(items) => {
                        for item in items {
                            state.groups.push(InnerEdgeGroup::from_json(pos, &doc.id, item)?);
                        }
                    }
                    serde_json::Value::Null => {}
                    _ => {
                        return Err(GraphError::decode(
                            &doc.id,
                            format!("edge field '{}' is not an array", key),
                        ))
                    }
                }
                continue;
            }
            if let Some(v) = Value::from_json(json) {
                state.properties.insert(key.clone(), v);
            }
        }

        Ok(Self::assemble(
            graph,
            ElementId::new(doc.id),
            label,
            mappings,
            batch.clone(),
            state,
        ))
    }

    /// Owning graph.
    pub fn graph(&self) -> &Arc<Graph> {
        &self.inner.graph
    }

    /// Whether this vertex uses the embedded encoding.
    pub fn is_embedded(&self) -> bool {
        self.inner.mappings.is_some()
    }

    /// Mapping set captured at creation, for embedded vertices.
    pub fn mappings(&self) -> Option<&Arc<MappingSet>> {
        self.inner.mappings.as_ref()
    }

    pub(crate) fn batch(&self) -> &BatchContext {
        &self.inner.batch
    }

    fn removed_error(&self) -> GraphError {
        GraphError::ElementRemoved {
            kind: ElementKind::Vertex,
            id: self.inner.id.clone(),
        }
    }

    pub(crate) fn ensure_live(&self) -> GraphResult<()> {
        if self.inner.state.read().removed {
            return Err(self.removed_error());
        }
        Ok(())
    }

    /// Set a property with a partial update of that field.
    pub fn set_property(&self, key: &str, value: impl Into<Value>) -> GraphResult<()> {
        check_key(self.inner.mappings.as_deref(), key)?;
        let value = value.into();
        {
            let mut state = self.inner.state.write();
            if state.removed {
                return Err(self.removed_error());
            }
            state.properties.insert(key.to_string(), value.clone());
            state.cleared.remove(key);
        }
        let mut doc = Fields::new();
        doc.insert(key.to_string(), value.to_json());
        let graph = self.graph();
        graph.mutations().update_fields(self, graph.index(), None, doc, false)
    }

    /// Remove a property, returning its previous value.
    pub fn remove_property(&self, key: &str) -> GraphResult<Option<Value>> {
        let previous = {
            let mut state = self.inner.state.write();
            if state.removed {
                return Err(self.removed_error());
            }
            let previous = state.properties.remove(key);
            if previous.is_some() {
                state.cleared.insert(key.to_string());
            }
            previous
        };
        if previous.is_some() {
            let mut doc = Fields::new();
            doc.insert(key.to_string(), serde_json::Value::Null);
            let graph = self.graph();
            graph.mutations().update_fields(self, graph.index(), None, doc, false)?;
        }
        Ok(previous)
    }

    /// Delete the vertex document. Later mutations fail.
    ///
    /// Edges stored elsewhere that point at this vertex are left in place
    /// and resolve to a dangling reference.
    pub fn remove(&self) -> GraphResult<()> {
        self.ensure_live()?;
        let graph = self.graph();
        graph.mutations().delete_element(self, graph.index(), None)?;
        self.inner.state.write().removed = true;
        tracing::debug!(id = %self.inner.id, label = %self.inner.label, "Removed vertex");
        Ok(())
    }

    /// Mapping position that lets this vertex store the edge, if any.
    ///
    /// `current` is the graph the edge is being added through. A vertex
    /// owned by another graph, or whose captured mapping set differs from
    /// the label's set in `current`, cannot embed anything.
    pub fn can_embed(&self, current: &Arc<Graph>, edge_label: &str, direction: Direction, other_label: &str) -> Option<usize> {
        if !Arc::ptr_eq(self.graph(), current) {
            return None;
        }
        let own = self.inner.mappings.as_ref()?;
        let registered = current.registry().encoding(&self.inner.label).ok()?.mappings()?;
        if own != registered {
            return None;
        }
        own.find(edge_label, direction, other_label).map(|(i, _)| i)
    }

    /// Append an inner-edge group and rewrite its mapping field.
    pub fn add_inner_edge(
        &self,
        mapping: usize,
        edge_id: ElementId,
        label: &str,
        other: &Vertex,
        properties: PropertyMap,
    ) -> GraphResult<Edge> {
        let set = self
            .inner
            .mappings
            .as_ref()
            .ok_or_else(|| GraphError::InvalidMapping(format!("'{}' is not an embedded label", self.inner.label)))?;
        let m = set
            .get(mapping)
            .ok_or_else(|| GraphError::InvalidMapping(format!("no mapping at position {}", mapping)))?;
        if m.edge_label != label || m.external_vertex_label != other.label() {
            return Err(GraphError::InvalidMapping(format!(
                "mapping '{}' does not store '{}' edges to '{}'",
                m.field,
                label,
                other.label()
            )));
        }
        for key in properties.keys() {
            validate_key(key)?;
        }
        other.ensure_live()?;

        let group = InnerEdgeGroup {
            mapping,
            edge_id: edge_id.clone(),
            other_id: other.id().clone(),
            properties,
        };
        {
            let mut state = self.inner.state.write();
            if state.removed {
                return Err(self.removed_error());
            }
            if state.groups.iter().any(|g| g.edge_id == edge_id) {
                return Err(GraphError::AlreadyExists {
                    kind: ElementKind::Edge,
                    id: edge_id,
                });
            }
            state.groups.push(group.clone());
        }
        if let Err(e) = self.write_groups(mapping) {
            self.inner.state.write().groups.retain(|g| g.edge_id != edge_id);
            return Err(e);
        }
        self.group_edge(&group, Some(other.clone()))
    }

    /// Inner edges matching a direction, label set and predicates.
    ///
    /// Filtering is a local scan over the groups already loaded.
    pub fn inner_edges(
        &self,
        direction: Direction,
        edge_labels: &[String],
        predicates: &Predicates,
    ) -> GraphResult<Vec<Edge>> {
        let Some(set) = self.inner.mappings.clone() else {
            return Ok(Vec::new());
        };
        let mut edges = Vec::new();
        for group in self.groups() {
            let Some(m) = set.get(group.mapping) else {
                continue;
            };
            if !direction.admits(m.direction) || !m.matches_labels(edge_labels) {
                continue;
            }
            let edge = self.group_edge(&group, None)?;
            if predicates.test(&edge) {
                edges.push(edge);
            }
        }
        Ok(predicates.window(edges.into_iter()).collect())
    }

    pub(crate) fn groups(&self) -> Vec<InnerEdgeGroup> {
        self.inner.state.read().groups.clone()
    }

    /// Build the edge object for a group. `known` supplies far endpoints
    /// already in hand; others are registered in this vertex's batch.
    pub(crate) fn group_edge_with(
        &self,
        group: &InnerEdgeGroup,
        known: &HashMap<ElementId, Vertex>,
    ) -> GraphResult<Edge> {
        self.group_edge(group, known.get(&group.other_id).cloned())
    }

    fn group_edge(&self, group: &InnerEdgeGroup, other: Option<Vertex>) -> GraphResult<Edge> {
        let m = self
            .inner
            .mappings
            .as_ref()
            .and_then(|set| set.get(group.mapping))
            .ok_or_else(|| GraphError::decode(self.inner.id.as_str(), "inner edge without mapping"))?;
        let far = match other {
            Some(v) => Endpoint::Loaded(v),
            None if group.other_id == self.inner.id => Endpoint::Loaded(self.clone()),
            None => Endpoint::Lazy(self.inner.batch.vertex(
                self.graph(),
                group.other_id.clone(),
                &m.external_vertex_label,
            )?),
        };
        let own = Endpoint::Loaded(self.clone());
        let (out, inn) = match m.direction {
            Direction::In => (far, own),
            _ => (own, far),
        };
        Ok(Edge::embedded(
            self.graph(),
            group.edge_id.clone(),
            m.edge_label.clone(),
            out,
            inn,
            self.clone(),
            group.mapping,
            group.properties.clone(),
        ))
    }

    /// Apply a change to one group and rewrite its mapping field.
    pub(crate) fn update_group(&self, edge_id: &ElementId, change: impl FnOnce(&mut InnerEdgeGroup)) -> GraphResult<()> {
        let mapping = {
            let mut state = self.inner.state.write();
            if state.removed {
                return Err(self.removed_error());
            }
            let group = state
                .groups
                .iter_mut()
                .find(|g| g.edge_id == *edge_id)
                .ok_or_else(|| GraphError::ElementRemoved {
                    kind: ElementKind::Edge,
                    id: edge_id.clone(),
                })?;
            change(group);
            group.mapping
        };
        self.write_groups(mapping)
    }

    /// Drop one group and rewrite its mapping field.
    pub(crate) fn remove_group(&self, edge_id: &ElementId) -> GraphResult<()> {
        let mapping = {
            let mut state = self.inner.state.write();
            if state.removed {
                return Err(self.removed_error());
            }
            let pos = state
                .groups
                .iter()
                .position(|g| g.edge_id == *edge_id)
                .ok_or_else(|| GraphError::ElementRemoved {
                    kind: ElementKind::Edge,
                    id: edge_id.clone(),
                })?;
            let removed = state.groups.remove(pos);
            removed.mapping
        };
        self.write_groups(mapping)
    }

    /// Upsert one mapping field with this handle's groups for it.
    ///
    /// Properties and other mapping fields are left to the stored document.
    fn write_groups(&self, mapping: usize) -> GraphResult<()> {
        let field = self
            .inner
            .mappings
            .as_ref()
            .and_then(|set| set.get(mapping))
            .map(|m| m.field.clone())
            .ok_or_else(|| GraphError::InvalidMapping(format!("no mapping at position {}", mapping)))?;
        let graph = self.graph();
        let mut doc = graph.layout().discriminators(ElementKind::Vertex, &self.inner.label);
        let groups: Vec<_> = self
            .inner
            .state
            .read()
            .groups
            .iter()
            .filter(|g| g.mapping == mapping)
            .map(InnerEdgeGroup::to_json)
            .collect();
        doc.insert(field, serde_json::Value::Array(groups));
        graph.mutations().update_fields(self, graph.index(), None, doc, true)
    }
}

fn check_key(mappings: Option<&MappingSet>, key: &str) -> GraphResult<()> {
    validate_key(key)?;
    if mappings.map(|m| m.is_field(key)).unwrap_or(false) {
        return Err(GraphError::invalid_property(key, "key is used by an edge mapping"));
    }
    Ok(())
}

impl Element for Vertex {
    fn id(&self) -> &ElementId {
        &self.inner.id
    }

    fn label(&self) -> &str {
        &self.inner.label
    }

    fn kind(&self) -> ElementKind {
        ElementKind::Vertex
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

impl DocumentSource for Vertex {
    fn document_id(&self) -> &ElementId {
        &self.inner.id
    }

    fn document_kind(&self) -> ElementKind {
        ElementKind::Vertex
    }

    fn document_type(&self) -> String {
        self.graph().layout().doc_type(&self.inner.label)
    }

    fn to_source(&self) -> Fields {
        let state = self.inner.state.read();
        let mut source = self
            .graph()
            .layout()
            .discriminators(ElementKind::Vertex, &self.inner.label);
        for key in &state.cleared {
            source.insert(key.clone(), serde_json::Value::Null);
        }
        for (k, v) in &state.properties {
            source.insert(k.clone(), v.to_json());
        }
        if let Some(set) = &self.inner.mappings {
            for (pos, m) in set.iter().enumerate() {
                let groups: Vec<_> = state
                    .groups
                    .iter()
                    .filter(|g| g.mapping == pos)
                    .map(InnerEdgeGroup::to_json)
                    .collect();
                source.insert(m.field.clone(), serde_json::Value::Array(groups));
            }
        }
        source
    }
}

impl PartialEq for Vertex {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Vertex {}

impl fmt::Debug for Vertex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vertex")
            .field("id", &self.inner.id)
            .field("label", &self.inner.label)
            .field("embedded", &self.is_embedded())
            .finish()
    }
}

impl fmt::Display for Vertex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v[{}]", self.inner.id)
    }
}

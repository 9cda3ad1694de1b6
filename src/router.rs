//! Query router: one graph interface over both encodings.
//!
//! ```text
//! add_edge(out, in, label)
//!   in  can embed (label, IN,  out.label)?  → group inside in's document
//!   out can embed (label, OUT, in.label)?   → group inside out's document
//!   label declared standalone?              → own edge document
//!   otherwise                               → NoEdgeContainer
//! ```

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

use crate::backend::DocumentBackend;
use crate::config::GraphConfig;
use crate::error::{GraphError, GraphResult};
use crate::graph::Graph;
use crate::handler::{window, AdjacentEdges, ElementHandler, ElementIter, EmbeddedHandler, StandaloneHandler};
use crate::lazy::{BatchContext, LazyVertex};
use crate::layout::TypeLayout;
use crate::mapping::{EdgeMapping, Encoding, LabelRegistry, MappingSet};
use crate::query::predicate::{Compare, Predicates, PropertyKey};
use crate::timing::TimingAccessor;
use crate::types::vertex::PropertyMap;
use crate::types::{Direction, Edge, Element, ElementId, Value, Vertex};

/// Collect key/value pairs into a property map.
pub fn properties<K, V, I>(pairs: I) -> PropertyMap
where
    K: Into<String>,
    V: Into<Value>,
    I: IntoIterator<Item = (K, V)>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect()
}

/// Builds a [`QueryRouter`] from label registrations.
///
/// Registration errors are deferred to [`build`](Self::build).
pub struct RouterBuilder {
    config: GraphConfig,
    backend: Arc<dyn DocumentBackend>,
    registry: LabelRegistry,
    error: Option<GraphError>,
}

impl RouterBuilder {
    /// Start a builder.
    pub fn new(config: GraphConfig, backend: Arc<dyn DocumentBackend>) -> Self {
        Self {
            config,
            backend,
            registry: LabelRegistry::new(),
            error: None,
        }
    }

    fn record(mut self, result: GraphResult<()>) -> Self {
        if let Err(e) = result {
            self.error.get_or_insert(e);
        }
        self
    }

    /// Register a vertex label with the embedded encoding.
    pub fn embedded(mut self, label: &str, mappings: Vec<EdgeMapping>) -> Self {
        let result = MappingSet::new(mappings).and_then(|set| self.registry.register_embedded(label, set));
        self.record(result)
    }

    /// Register a vertex label with the standalone encoding.
    pub fn standalone(mut self, label: &str) -> Self {
        let result = self.registry.register_standalone(label);
        self.record(result)
    }

    /// Declare an edge label stored as standalone documents.
    pub fn standalone_edges(mut self, label: &str) -> Self {
        let result = self.registry.register_standalone_edge(label);
        self.record(result)
    }

    /// Validate, bootstrap the index and assemble the router.
    pub fn build(self) -> GraphResult<QueryRouter> {
        if let Some(e) = self.error {
            return Err(e);
        }
        if self.config.layout == TypeLayout::PerLabel {
            for label in self.registry.standalone_edge_labels() {
                if self.registry.is_vertex_label(&label) {
                    return Err(GraphError::InvalidConfig(format!(
                        "'{}' is both a vertex and an edge label; per-label types need distinct names",
                        label
                    )));
                }
            }
        }

        let graph = Arc::new(Graph::new(self.config, self.backend, self.registry)?);
        graph.schema().init()?;

        let mut embedded = BTreeMap::new();
        for (label, encoding) in graph.registry().vertex_labels() {
            if let Encoding::Embedded(_) = encoding {
                embedded.insert(label.clone(), Arc::new(EmbeddedHandler::new(Arc::clone(&graph), label.clone())?));
            }
        }
        let standalone = Arc::new(StandaloneHandler::new(Arc::clone(&graph)));

        tracing::info!(
            index = %graph.index(),
            embedded = embedded.len(),
            standalone_vertex_labels = standalone.vertex_labels().len(),
            standalone_edge_labels = standalone.edge_labels().len(),
            "Query router ready"
        );
        Ok(QueryRouter {
            graph,
            embedded,
            standalone,
            refs: BatchContext::new(),
        })
    }
}

/// Routes graph operations to the encoding registered for each label.
pub struct QueryRouter {
    graph: Arc<Graph>,
    embedded: BTreeMap<String, Arc<EmbeddedHandler>>,
    standalone: Arc<StandaloneHandler>,
    /// Window for `vertex_ref`, replaced once sealed.
    refs: BatchContext,
}

impl QueryRouter {
    /// Start a builder.
    pub fn builder(config: GraphConfig, backend: Arc<dyn DocumentBackend>) -> RouterBuilder {
        RouterBuilder::new(config, backend)
    }

    /// Shared graph context.
    pub fn graph(&self) -> &Arc<Graph> {
        &self.graph
    }

    /// Round-trip timers.
    pub fn timing(&self) -> &TimingAccessor {
        self.graph.timing()
    }

    /// Every handler, embedded labels first in label order.
    fn handlers(&self) -> Vec<Arc<dyn ElementHandler>> {
        let mut all: Vec<Arc<dyn ElementHandler>> = self
            .embedded
            .values()
            .map(|h| Arc::clone(h) as Arc<dyn ElementHandler>)
            .collect();
        all.push(Arc::clone(&self.standalone) as Arc<dyn ElementHandler>);
        all
    }

    fn handler_for(&self, label: &str) -> GraphResult<Arc<dyn ElementHandler>> {
        match self.graph.registry().encoding(label)? {
            Encoding::Embedded(_) => self
                .embedded
                .get(label)
                .map(|h| Arc::clone(h) as Arc<dyn ElementHandler>)
                .ok_or_else(|| GraphError::UnknownLabel(label.to_string())),
            Encoding::Standalone => Ok(Arc::clone(&self.standalone) as Arc<dyn ElementHandler>),
        }
    }

    /// Handlers serving the given labels, without repeats.
    fn handlers_for(&self, labels: &[String]) -> GraphResult<Vec<Arc<dyn ElementHandler>>> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for label in labels {
            let handler = self.handler_for(label)?;
            let key = Arc::as_ptr(&handler) as *const () as usize;
            if seen.insert(key) {
                out.push(handler);
            }
        }
        Ok(out)
    }

    /// Create a vertex; `None` generates an id.
    pub fn add_vertex<K, V, I>(&self, id: Option<ElementId>, label: &str, props: I) -> GraphResult<Vertex>
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        self.handler_for(label)?.add_vertex(id, label, properties(props))
    }

    /// Every vertex.
    pub fn vertices(&self) -> GraphResult<ElementIter<Vertex>> {
        self.vertices_matching(&Predicates::new())
    }

    /// Vertices matching the predicates.
    ///
    /// A label constraint routes to that label's handler; otherwise every
    /// handler is queried and the sequences are concatenated lazily, with
    /// the row window applied to the concatenation.
    pub fn vertices_matching(&self, predicates: &Predicates) -> GraphResult<ElementIter<Vertex>> {
        let handlers = match predicates.labels() {
            Some(labels) => self.handlers_for(&labels)?,
            None => self.handlers(),
        };
        if handlers.len() == 1 {
            return handlers[0].vertices(predicates);
        }
        let unwindowed = predicates.without_window();
        let mut parts = Vec::with_capacity(handlers.len());
        for handler in &handlers {
            parts.push(handler.vertices(&unwindowed)?);
        }
        Ok(window(parts.into_iter().flatten(), predicates))
    }

    /// Vertices by id, in request order; unknown ids are skipped.
    pub fn vertices_by_ids(&self, ids: &[ElementId]) -> GraphResult<Vec<Vertex>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let predicates = Predicates::new().has(
            PropertyKey::Id,
            Compare::Within(ids.iter().map(|id| Value::from(id.as_str())).collect()),
        );
        let mut found: BTreeMap<ElementId, Vertex> = BTreeMap::new();
        for v in self.vertices_matching(&predicates)? {
            let v = v?;
            found.entry(v.id().clone()).or_insert(v);
        }
        Ok(ids.iter().filter_map(|id| found.get(id).cloned()).collect())
    }

    /// One vertex by id.
    pub fn vertex(&self, id: &ElementId) -> GraphResult<Option<Vertex>> {
        Ok(self.vertices_by_ids(std::slice::from_ref(id))?.into_iter().next())
    }

    /// A deferred vertex reference.
    ///
    /// References share the router's registration window until one of
    /// them resolves; later references open a new window.
    pub fn vertex_ref(&self, id: impl Into<ElementId>, label: &str) -> GraphResult<LazyVertex> {
        self.graph.registry().encoding(label)?;
        self.refs.vertex(&self.graph, id.into(), label)
    }

    /// Create an edge in the first location that can hold it.
    pub fn add_edge<K, V, I>(
        &self,
        out: &Vertex,
        inn: &Vertex,
        label: &str,
        id: Option<ElementId>,
        props: I,
    ) -> GraphResult<Edge>
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        out.ensure_live()?;
        inn.ensure_live()?;
        let id = id.unwrap_or_else(ElementId::generate);
        let props = properties(props);

        if let Some(pos) = inn.can_embed(&self.graph, label, Direction::In, out.label()) {
            return inn.add_inner_edge(pos, id, label, out, props);
        }
        if let Some(pos) = out.can_embed(&self.graph, label, Direction::Out, inn.label()) {
            return out.add_inner_edge(pos, id, label, inn, props);
        }
        if self.graph.registry().is_standalone_edge(label) {
            return self.standalone.add_edge(id, label, out, inn, props);
        }
        Err(GraphError::NoEdgeContainer {
            label: label.to_string(),
            out_id: out.id().clone(),
            in_id: inn.id().clone(),
            edge_id: id,
        })
    }

    /// Every edge.
    pub fn edges(&self) -> GraphResult<ElementIter<Edge>> {
        self.edges_matching(&Predicates::new())
    }

    /// Edges matching the predicates, across all encodings.
    pub fn edges_matching(&self, predicates: &Predicates) -> GraphResult<ElementIter<Edge>> {
        let unwindowed = predicates.without_window();
        let mut parts = Vec::new();
        for handler in self.handlers() {
            parts.push(handler.edges(&unwindowed)?);
        }
        Ok(window(parts.into_iter().flatten(), predicates))
    }

    /// Edges by id, in request order; unknown ids are skipped.
    pub fn edges_by_ids(&self, ids: &[ElementId]) -> GraphResult<Vec<Edge>> {
        let mut found: BTreeMap<ElementId, Edge> = BTreeMap::new();
        for handler in self.handlers() {
            for edge in handler.edges_by_ids(ids)? {
                found.entry(edge.id().clone()).or_insert(edge);
            }
        }
        Ok(ids.iter().filter_map(|id| found.get(id).cloned()).collect())
    }

    /// Edges of one vertex.
    pub fn vertex_edges(
        &self,
        vertex: &Vertex,
        direction: Direction,
        edge_labels: &[String],
        predicates: &Predicates,
    ) -> GraphResult<Vec<Edge>> {
        let mut grouped = self.edges_bulk(std::slice::from_ref(vertex), direction, edge_labels, predicates)?;
        Ok(grouped.remove(vertex.id()).unwrap_or_default())
    }

    /// Adjacent edges for many seeds with one search per encoding.
    ///
    /// Merges each seed's own inner edges with edges found in other
    /// documents, drops duplicates by edge id, then applies the row window
    /// per seed.
    pub fn edges_bulk(
        &self,
        seeds: &[Vertex],
        direction: Direction,
        edge_labels: &[String],
        predicates: &Predicates,
    ) -> GraphResult<AdjacentEdges> {
        let unwindowed = predicates.without_window();
        let mut merged = AdjacentEdges::new();
        for seed in seeds {
            merged
                .entry(seed.id().clone())
                .or_default()
                .extend(seed.inner_edges(direction, edge_labels, &unwindowed)?);
        }
        for handler in self.handlers() {
            for (seed_id, edges) in handler.adjacent_edges(seeds, direction, edge_labels, &unwindowed)? {
                merged.entry(seed_id).or_default().extend(edges);
            }
        }

        let mut result = AdjacentEdges::new();
        for (seed_id, edges) in merged {
            let mut seen = BTreeSet::new();
            let unique = edges.into_iter().filter(|e| seen.insert(e.id().clone()));
            result.insert(seed_id, predicates.window(unique).collect());
        }
        Ok(result)
    }

    /// Flush pending bulk writes.
    pub fn commit(&self) -> GraphResult<usize> {
        self.graph.mutations().commit()
    }

    /// Delete every document in the graph's index.
    pub fn clear_all_data(&self) -> GraphResult<u64> {
        self.graph.schema().clear_all_data()
    }
}

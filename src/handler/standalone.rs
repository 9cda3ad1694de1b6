//! Handler for standalone-encoding vertices and standalone edges.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use super::{empty, search_elements, vertex_decoder, AdjacentEdges, ElementHandler, ElementIter};
use crate::backend::Document;
use crate::error::{GraphError, GraphResult};
use crate::graph::Graph;
use crate::lazy::BatchContext;
use crate::query::filter::Filter;
use crate::query::predicate::{Compare, Predicates, PropertyKey};
use crate::types::vertex::PropertyMap;
use crate::types::{Direction, Edge, Element, ElementId, ElementKind, Value, Vertex, IN_ID_FIELD, OUT_ID_FIELD};

/// Serves every standalone vertex label and every declared standalone
/// edge label. Edges are their own documents, routed by out-vertex id.
pub struct StandaloneHandler {
    graph: Arc<Graph>,
    vertex_labels: Vec<String>,
    edge_labels: Vec<String>,
}

fn edge_decoder(
    graph: &Arc<Graph>,
    known: HashMap<ElementId, Vertex>,
) -> impl FnMut(Vec<Document>) -> GraphResult<Vec<Edge>> + Send + 'static {
    let graph = Arc::clone(graph);
    move |docs| {
        let batch = BatchContext::new();
        docs.into_iter()
            .map(|doc| Edge::from_document(&graph, doc, &batch, &known))
            .collect()
    }
}

impl StandaloneHandler {
    /// Create a handler from the registry's standalone labels.
    pub fn new(graph: Arc<Graph>) -> Self {
        let vertex_labels = graph.registry().standalone_vertex_labels();
        let edge_labels = graph.registry().standalone_edge_labels();
        Self {
            graph,
            vertex_labels,
            edge_labels,
        }
    }

    /// Declared standalone edge labels.
    pub fn edge_labels(&self) -> &[String] {
        &self.edge_labels
    }

    /// Standalone edge labels selected by a (possibly empty) label filter.
    fn selected_edge_labels(&self, edge_labels: &[String]) -> Vec<String> {
        if edge_labels.is_empty() {
            return self.edge_labels.clone();
        }
        self.edge_labels
            .iter()
            .filter(|l| edge_labels.contains(l))
            .cloned()
            .collect()
    }

    /// Write a new edge document between two vertices.
    pub fn add_edge(
        &self,
        id: ElementId,
        label: &str,
        out: &Vertex,
        inn: &Vertex,
        properties: PropertyMap,
    ) -> GraphResult<Edge> {
        if !self.edge_labels.iter().any(|l| l == label) {
            return Err(GraphError::UnknownLabel(label.to_string()));
        }
        let edge = Edge::standalone(&self.graph, id, label, out, inn, properties)?;
        self.graph.schema().ensure_template(&self.graph.layout().doc_type(label));
        self.graph
            .mutations()
            .add_element(&edge, self.graph.index(), Some(out.id().as_str()), true)?;
        tracing::debug!(id = %edge.id(), label, out = %out.id(), "in" = %inn.id(), "Added standalone edge");
        Ok(edge)
    }
}

impl ElementHandler for StandaloneHandler {
    fn vertex_labels(&self) -> Vec<String> {
        self.vertex_labels.clone()
    }

    fn vertices(&self, predicates: &Predicates) -> GraphResult<ElementIter<Vertex>> {
        if self.vertex_labels.is_empty() {
            return Ok(empty());
        }
        let translation = self
            .graph
            .translator()
            .scoped(predicates, ElementKind::Vertex, &self.vertex_labels);
        Ok(search_elements(
            &self.graph,
            translation,
            predicates,
            vertex_decoder(&self.graph),
        ))
    }

    fn add_vertex(&self, id: Option<ElementId>, label: &str, properties: PropertyMap) -> GraphResult<Vertex> {
        if !self.vertex_labels.iter().any(|l| l == label) {
            return Err(GraphError::UnknownLabel(label.to_string()));
        }
        let vertex = Vertex::new(&self.graph, id.unwrap_or_else(ElementId::generate), label, properties)?;
        self.graph.schema().ensure_template(&self.graph.layout().doc_type(label));
        self.graph
            .mutations()
            .add_element(&vertex, self.graph.index(), None, true)?;
        tracing::debug!(id = %vertex.id(), label, "Added standalone vertex");
        Ok(vertex)
    }

    fn edges(&self, predicates: &Predicates) -> GraphResult<ElementIter<Edge>> {
        if self.edge_labels.is_empty() {
            return Ok(empty());
        }
        let translation = self
            .graph
            .translator()
            .scoped(predicates, ElementKind::Edge, &self.edge_labels);
        Ok(search_elements(
            &self.graph,
            translation,
            predicates,
            edge_decoder(&self.graph, HashMap::new()),
        ))
    }

    fn edges_by_ids(&self, ids: &[ElementId]) -> GraphResult<Vec<Edge>> {
        if ids.is_empty() || self.edge_labels.is_empty() {
            return Ok(Vec::new());
        }
        let predicates = Predicates::new().has(
            PropertyKey::Id,
            Compare::Within(ids.iter().map(|id| Value::from(id.as_str())).collect()),
        );
        self.edges(&predicates)?.collect()
    }

    fn adjacent_edges(
        &self,
        seeds: &[Vertex],
        direction: Direction,
        edge_labels: &[String],
        predicates: &Predicates,
    ) -> GraphResult<AdjacentEdges> {
        let labels = self.selected_edge_labels(edge_labels);
        let mut result = AdjacentEdges::new();
        if labels.is_empty() || seeds.is_empty() {
            return Ok(result);
        }

        let seed_ids: BTreeSet<ElementId> = seeds.iter().map(|s| s.id().clone()).collect();
        let id_values = || seed_ids.iter().map(|id| Value::from(id.as_str()));
        let endpoint = match direction {
            Direction::Out => Filter::terms(OUT_ID_FIELD, id_values()),
            Direction::In => Filter::terms(IN_ID_FIELD, id_values()),
            Direction::Both => Filter::any_of(vec![
                Filter::terms(OUT_ID_FIELD, id_values()),
                Filter::terms(IN_ID_FIELD, id_values()),
            ]),
        };
        let translation = self
            .graph
            .translator()
            .scoped(&predicates.without_window(), ElementKind::Edge, &labels);
        let filter = translation.filter.clone().and(endpoint);
        tracing::debug!(seeds = seeds.len(), %direction, "Standalone traversal");

        let known: HashMap<ElementId, Vertex> = seeds.iter().map(|s| (s.id().clone(), s.clone())).collect();
        let cursor = self.graph.search(filter, None, edge_decoder(&self.graph, known));
        for edge in cursor {
            let edge = edge?;
            if !translation.test_local(&edge) {
                continue;
            }
            let out_hit = direction.admits(Direction::Out) && seed_ids.contains(edge.out_id());
            let in_hit = direction.admits(Direction::In) && seed_ids.contains(edge.in_id());
            if out_hit {
                result.entry(edge.out_id().clone()).or_default().push(edge.clone());
            }
            if in_hit && !(out_hit && edge.out_id() == edge.in_id()) {
                result.entry(edge.in_id().clone()).or_default().push(edge);
            }
        }
        Ok(result)
    }
}

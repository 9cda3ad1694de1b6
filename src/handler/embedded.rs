//! Handler for one embedded-encoding vertex label.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use super::{empty, search_elements, vertex_decoder, window, AdjacentEdges, ElementHandler, ElementIter};
use crate::error::{GraphError, GraphResult};
use crate::graph::Graph;
use crate::mapping::MappingSet;
use crate::query::filter::Filter;
use crate::query::predicate::Predicates;
use crate::types::vertex::PropertyMap;
use crate::types::{Direction, Edge, Element, ElementId, ElementKind, Vertex};

/// Serves a label whose adjacent edges live inside its documents.
pub struct EmbeddedHandler {
    graph: Arc<Graph>,
    label: String,
    mappings: Arc<MappingSet>,
}

impl EmbeddedHandler {
    /// Create a handler for a registered embedded label.
    pub fn new(graph: Arc<Graph>, label: impl Into<String>) -> GraphResult<Self> {
        let label = label.into();
        let mappings = graph
            .registry()
            .encoding(&label)?
            .mappings()
            .cloned()
            .ok_or_else(|| GraphError::InvalidConfig(format!("label '{}' is not embedded", label)))?;
        Ok(Self {
            graph,
            label,
            mappings,
        })
    }

    /// The served label.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// The label's mapping set.
    pub fn mappings(&self) -> &Arc<MappingSet> {
        &self.mappings
    }

    fn scope(&self) -> Filter {
        self.graph
            .translator()
            .scoped(&Predicates::new(), ElementKind::Vertex, &[self.label.clone()])
            .filter
    }

    /// Mapping positions whose edge label passes the filter.
    fn positions_for(&self, edge_labels: &[String]) -> Vec<usize> {
        self.mappings
            .iter()
            .enumerate()
            .filter(|(_, m)| m.matches_labels(edge_labels))
            .map(|(i, _)| i)
            .collect()
    }

    /// Every container of this label also matching `extra`.
    fn containers(&self, extra: Filter) -> ElementIter<Vertex> {
        let filter = self.scope().and(extra);
        Box::new(self.graph.search(filter, None, vertex_decoder(&self.graph)))
    }
}

impl ElementHandler for EmbeddedHandler {
    fn vertex_labels(&self) -> Vec<String> {
        vec![self.label.clone()]
    }

    fn vertices(&self, predicates: &Predicates) -> GraphResult<ElementIter<Vertex>> {
        let translation =
            self.graph
                .translator()
                .scoped(predicates, ElementKind::Vertex, &[self.label.clone()]);
        Ok(search_elements(
            &self.graph,
            translation,
            predicates,
            vertex_decoder(&self.graph),
        ))
    }

    fn add_vertex(&self, id: Option<ElementId>, label: &str, properties: PropertyMap) -> GraphResult<Vertex> {
        if label != self.label {
            return Err(GraphError::UnknownLabel(label.to_string()));
        }
        let vertex = Vertex::new(&self.graph, id.unwrap_or_else(ElementId::generate), label, properties)?;
        let doc_type = self.graph.layout().doc_type(label);
        self.graph.schema().ensure_template(&doc_type);
        self.graph
            .mutations()
            .add_element(&vertex, self.graph.index(), None, true)?;
        tracing::debug!(id = %vertex.id(), label, "Added embedded vertex");
        Ok(vertex)
    }

    fn edges(&self, predicates: &Predicates) -> GraphResult<ElementIter<Edge>> {
        let labels = predicates.labels().unwrap_or_default();
        let positions = self.positions_for(&labels);
        if positions.is_empty() {
            return Ok(empty());
        }
        let present = Filter::any_of(
            positions
                .iter()
                .filter_map(|&p| self.mappings.get(p))
                .map(|m| Filter::exists(m.field.clone()))
                .collect(),
        );
        let local = predicates.without_window();
        let edges = self.containers(present).flat_map(move |r| -> Vec<GraphResult<Edge>> {
            match r {
                Err(e) => vec![Err(e)],
                Ok(container) => match container.inner_edges(Direction::Both, &labels, &local) {
                    Ok(edges) => edges.into_iter().map(Ok).collect(),
                    Err(e) => vec![Err(e)],
                },
            }
        });
        Ok(window(edges, predicates))
    }

    fn edges_by_ids(&self, ids: &[ElementId]) -> GraphResult<Vec<Edge>> {
        if ids.is_empty() || self.mappings.is_empty() {
            return Ok(Vec::new());
        }
        let wanted: BTreeSet<&ElementId> = ids.iter().collect();
        let filter = Filter::any_of(
            self.mappings
                .iter()
                .map(|m| Filter::terms(m.edge_id_path(), ids.iter().map(|id| id.as_str())))
                .collect(),
        );
        let mut found = Vec::new();
        for container in self.containers(filter) {
            let container = container?;
            for edge in container.inner_edges(Direction::Both, &[], &Predicates::new())? {
                if wanted.contains(edge.id()) {
                    found.push(edge);
                }
            }
        }
        Ok(found)
    }

    fn adjacent_edges(
        &self,
        seeds: &[Vertex],
        direction: Direction,
        edge_labels: &[String],
        predicates: &Predicates,
    ) -> GraphResult<AdjacentEdges> {
        // mapping position -> seed ids the mapping can point at
        let mut targets: HashMap<usize, BTreeSet<ElementId>> = HashMap::new();
        for (pos, m) in self.mappings.iter().enumerate() {
            if !m.matches_labels(edge_labels) || !direction.admits(m.direction.opposite()) {
                continue;
            }
            let ids: BTreeSet<ElementId> = seeds
                .iter()
                .filter(|s| s.label() == m.external_vertex_label)
                .map(|s| s.id().clone())
                .collect();
            if !ids.is_empty() {
                targets.insert(pos, ids);
            }
        }
        let mut result = AdjacentEdges::new();
        if targets.is_empty() {
            return Ok(result);
        }

        let mut positions: Vec<_> = targets.keys().copied().collect();
        positions.sort_unstable();
        let filter = Filter::any_of(
            positions
                .iter()
                .filter_map(|p| self.mappings.get(*p).map(|m| (m, &targets[p])))
                .map(|(m, ids)| Filter::terms(m.vertex_id_path(), ids.iter().map(|id| id.as_str())))
                .collect(),
        );
        tracing::debug!(
            label = %self.label,
            seeds = seeds.len(),
            mappings = positions.len(),
            "Embedded bulk traversal"
        );

        let known: HashMap<ElementId, Vertex> = seeds.iter().map(|s| (s.id().clone(), s.clone())).collect();
        for container in self.containers(filter) {
            let container = container?;
            for group in container.groups() {
                let hit = targets
                    .get(&group.mapping)
                    .map(|ids| ids.contains(&group.other_id))
                    .unwrap_or(false);
                if !hit {
                    continue;
                }
                let edge = container.group_edge_with(&group, &known)?;
                if predicates.test(&edge) {
                    result.entry(group.other_id.clone()).or_default().push(edge);
                }
            }
        }
        Ok(result)
    }
}

//! Edge mappings and per-label encoding selection.
//!
//! An [`EdgeMapping`] declares that edges of a label and direction, whose
//! *other* endpoint carries a given label, may be stored inside the
//! containing vertex's document under `field`. The set of mappings attached
//! to a vertex label makes that label use the embedded encoding; every other
//! registered label uses the standalone encoding.
//!
//! ```text
//! person doc ─┬─ name: "marko"
//!             └─ knows: [ { ~eid: e7, ~vid: v2, weight: 0.5 }, ... ]
//!                  ▲ EdgeMapping("knows", "person", OUT, "knows")
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{GraphError, GraphResult};
use crate::types::{is_reserved_key, Direction, INNER_EDGE_ID, INNER_VERTEX_ID};

/// One embeddable (edge label, direction, other-endpoint label) triple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EdgeMapping {
    /// Edge label this mapping applies to.
    pub edge_label: String,
    /// Label the *other* endpoint must carry.
    pub external_vertex_label: String,
    /// Direction of the edge relative to the containing vertex.
    pub direction: Direction,
    /// Document field holding the inner-edge groups.
    pub field: String,
}

impl EdgeMapping {
    /// Create a new mapping.
    pub fn new(
        edge_label: impl Into<String>,
        external_vertex_label: impl Into<String>,
        direction: Direction,
        field: impl Into<String>,
    ) -> Self {
        Self {
            edge_label: edge_label.into(),
            external_vertex_label: external_vertex_label.into(),
            direction,
            field: field.into(),
        }
    }

    /// Search path of the other endpoint's id inside this mapping's groups.
    pub fn vertex_id_path(&self) -> String {
        format!("{}.{}", self.field, INNER_VERTEX_ID)
    }

    /// Search path of the edge id inside this mapping's groups.
    pub fn edge_id_path(&self) -> String {
        format!("{}.{}", self.field, INNER_EDGE_ID)
    }

    /// Whether this mapping is selected by a (possibly empty) label filter.
    pub fn matches_labels(&self, edge_labels: &[String]) -> bool {
        edge_labels.is_empty() || edge_labels.iter().any(|l| *l == self.edge_label)
    }

    /// Whether an edge with this label, direction and other endpoint label fits.
    pub fn applies_to(&self, edge_label: &str, direction: Direction, other_label: &str) -> bool {
        self.edge_label == edge_label
            && self.direction == direction
            && self.external_vertex_label == other_label
    }
}

/// Validated, ordered set of mappings owned by one embedded label.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MappingSet {
    mappings: Vec<EdgeMapping>,
}

impl MappingSet {
    /// Validate and build a mapping set.
    ///
    /// Rejects `Both` directions, empty names, reserved field names, two
    /// mappings sharing a field, and two mappings with the same
    /// (label, direction, other label) triple.
    pub fn new(mappings: Vec<EdgeMapping>) -> GraphResult<Self> {
        let mut fields = BTreeSet::new();
        let mut triples = BTreeSet::new();
        for m in &mappings {
            if m.edge_label.is_empty() || m.external_vertex_label.is_empty() || m.field.is_empty() {
                return Err(GraphError::InvalidMapping(format!(
                    "empty label or field in {:?}",
                    m
                )));
            }
            if m.direction == Direction::Both {
                return Err(GraphError::InvalidMapping(format!(
                    "mapping for '{}' must be OUT or IN",
                    m.edge_label
                )));
            }
            if is_reserved_key(&m.field) || m.field.contains('.') {
                return Err(GraphError::InvalidMapping(format!(
                    "field '{}' is reserved or not a plain field name",
                    m.field
                )));
            }
            if !fields.insert(m.field.as_str()) {
                return Err(GraphError::InvalidMapping(format!(
                    "field '{}' is used by more than one mapping",
                    m.field
                )));
            }
            if !triples.insert((m.edge_label.as_str(), m.direction, m.external_vertex_label.as_str())) {
                return Err(GraphError::InvalidMapping(format!(
                    "duplicate mapping for edge '{}' {} '{}'",
                    m.edge_label, m.direction, m.external_vertex_label
                )));
            }
        }
        Ok(Self { mappings })
    }

    /// Mapping by position.
    pub fn get(&self, index: usize) -> Option<&EdgeMapping> {
        self.mappings.get(index)
    }

    /// Find the mapping that can store this edge, with its position.
    pub fn find(
        &self,
        edge_label: &str,
        direction: Direction,
        other_label: &str,
    ) -> Option<(usize, &EdgeMapping)> {
        self.mappings
            .iter()
            .enumerate()
            .find(|(_, m)| m.applies_to(edge_label, direction, other_label))
    }

    /// Position of the mapping stored under `field`.
    pub fn position_of_field(&self, field: &str) -> Option<usize> {
        self.mappings.iter().position(|m| m.field == field)
    }

    /// Whether `key` is one of this set's group fields.
    pub fn is_field(&self, key: &str) -> bool {
        self.position_of_field(key).is_some()
    }

    /// Iterate mappings in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &EdgeMapping> {
        self.mappings.iter()
    }

    /// Number of mappings.
    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    /// Whether the set has no mappings.
    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }
}

/// Physical encoding of a vertex label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Encoding {
    /// Adjacent edges matching the mapping set live inside the vertex document.
    Embedded(Arc<MappingSet>),
    /// The vertex document holds only its own properties.
    Standalone,
}

impl Encoding {
    /// The mapping set, for embedded labels.
    pub fn mappings(&self) -> Option<&Arc<MappingSet>> {
        match self {
            Self::Embedded(set) => Some(set),
            Self::Standalone => None,
        }
    }
}

/// Label-to-encoding registry, fixed once the graph is built.
#[derive(Debug, Clone, Default)]
pub struct LabelRegistry {
    vertex_labels: BTreeMap<String, Encoding>,
    standalone_edge_labels: BTreeSet<String>,
}

impl LabelRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a label with the embedded encoding.
    pub fn register_embedded(&mut self, label: impl Into<String>, mappings: MappingSet) -> GraphResult<()> {
        self.insert(label.into(), Encoding::Embedded(Arc::new(mappings)))
    }

    /// Register a label with the standalone encoding.
    pub fn register_standalone(&mut self, label: impl Into<String>) -> GraphResult<()> {
        self.insert(label.into(), Encoding::Standalone)
    }

    /// Declare an edge label whose edges are stored as their own documents.
    pub fn register_standalone_edge(&mut self, label: impl Into<String>) -> GraphResult<()> {
        let label = label.into();
        if label.is_empty() {
            return Err(GraphError::InvalidConfig("edge label must not be empty".to_string()));
        }
        self.standalone_edge_labels.insert(label);
        Ok(())
    }

    fn insert(&mut self, label: String, encoding: Encoding) -> GraphResult<()> {
        if label.is_empty() {
            return Err(GraphError::InvalidConfig("vertex label must not be empty".to_string()));
        }
        if self.vertex_labels.contains_key(&label) {
            return Err(GraphError::InvalidConfig(format!(
                "label '{}' registered twice",
                label
            )));
        }
        self.vertex_labels.insert(label, encoding);
        Ok(())
    }

    /// Encoding of a vertex label.
    pub fn encoding(&self, label: &str) -> GraphResult<&Encoding> {
        self.vertex_labels
            .get(label)
            .ok_or_else(|| GraphError::UnknownLabel(label.to_string()))
    }

    /// Whether the label is a registered vertex label.
    pub fn is_vertex_label(&self, label: &str) -> bool {
        self.vertex_labels.contains_key(label)
    }

    /// Whether edges of this label are stored standalone.
    pub fn is_standalone_edge(&self, label: &str) -> bool {
        self.standalone_edge_labels.contains(label)
    }

    /// Registered vertex labels with their encodings, sorted by label.
    pub fn vertex_labels(&self) -> impl Iterator<Item = (&String, &Encoding)> {
        self.vertex_labels.iter()
    }

    /// Declared standalone edge labels, sorted.
    pub fn standalone_edge_labels(&self) -> Vec<String> {
        self.standalone_edge_labels.iter().cloned().collect()
    }

    /// Labels that use the standalone vertex encoding, sorted.
    pub fn standalone_vertex_labels(&self) -> Vec<String> {
        self.vertex_labels
            .iter()
            .filter(|(_, e)| matches!(e, Encoding::Standalone))
            .map(|(l, _)| l.clone())
            .collect()
    }
}

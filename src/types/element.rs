//! The capability set shared by vertices and edges.

use serde::{Deserialize, Serialize};

use super::{ElementId, ElementKind, Value};

/// A key/value pair read from an element.
///
/// `owner` identifies the element the property was read from; it is a
/// reference by id, not a handle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    /// Property key.
    pub key: String,
    /// Property value.
    pub value: Value,
    /// Kind of the owning element.
    pub owner_kind: ElementKind,
    /// Id of the owning element.
    pub owner_id: ElementId,
}

/// Common read access to vertices and edges.
pub trait Element {
    /// Stable id.
    fn id(&self) -> &ElementId;

    /// Immutable label.
    fn label(&self) -> &str;

    /// Vertex or edge.
    fn kind(&self) -> ElementKind;

    /// Current value of a property, if set.
    fn value(&self, key: &str) -> Option<Value>;

    /// Property keys, sorted.
    fn keys(&self) -> Vec<String>;

    /// Whether the element has been removed.
    fn is_removed(&self) -> bool;

    /// Property by key.
    fn property(&self, key: &str) -> Option<Property> {
        self.value(key).map(|value| Property {
            key: key.to_string(),
            value,
            owner_kind: self.kind(),
            owner_id: self.id().clone(),
        })
    }

    /// All properties, sorted by key.
    fn properties(&self) -> Vec<Property> {
        self.keys().iter().filter_map(|k| self.property(k)).collect()
    }
}

//! Core graph types.
//!
//! Vertices and edges are shared handles over one mutable state block, so
//! every clone of an element observes the same properties and the same
//! terminal `removed` flag.

pub mod edge;
pub mod element;
pub mod id;
pub mod value;
pub mod vertex;

pub use edge::{Edge, EdgeLocation};
pub use element::{Element, Property};
pub use id::{Direction, ElementId, ElementKind};
pub use value::Value;
pub use vertex::Vertex;

/// Logical label discriminator in shared-type layouts.
pub const LABEL_FIELD: &str = "~label";
/// Element kind discriminator (`vertex` / `edge`) in shared-type layouts.
pub const KIND_FIELD: &str = "~kind";
/// Out-vertex id of a standalone edge.
pub const OUT_ID_FIELD: &str = "~out";
/// In-vertex id of a standalone edge.
pub const IN_ID_FIELD: &str = "~in";
/// Out-vertex label of a standalone edge.
pub const OUT_LABEL_FIELD: &str = "~outLabel";
/// In-vertex label of a standalone edge.
pub const IN_LABEL_FIELD: &str = "~inLabel";
/// Edge id inside an inner-edge group.
pub const INNER_EDGE_ID: &str = "~eid";
/// Other-endpoint id inside an inner-edge group.
pub const INNER_VERTEX_ID: &str = "~vid";

/// Whether a key is reserved for bookkeeping fields.
pub fn is_reserved_key(key: &str) -> bool {
    key.starts_with('~')
}

/// Reject keys that cannot be used as user property keys.
pub(crate) fn validate_key(key: &str) -> crate::error::GraphResult<()> {
    if key.is_empty() {
        return Err(crate::error::GraphError::invalid_property(key, "empty key"));
    }
    if is_reserved_key(key) {
        return Err(crate::error::GraphError::invalid_property(
            key,
            "keys starting with '~' are reserved",
        ));
    }
    if key.contains('.') {
        return Err(crate::error::GraphError::invalid_property(
            key,
            "'.' is a path separator",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved_keys() {
        for key in [LABEL_FIELD, KIND_FIELD, OUT_ID_FIELD, IN_ID_FIELD, INNER_EDGE_ID, INNER_VERTEX_ID] {
            assert!(is_reserved_key(key));
            assert!(validate_key(key).is_err());
        }
        assert!(validate_key("name").is_ok());
        assert!(validate_key("a.b").is_err());
        assert!(validate_key("").is_err());
    }
}

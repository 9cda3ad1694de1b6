//! Physical type layout.
//!
//! Labels map either one-to-one onto document types, or all share one type
//! and are told apart by the `~label` / `~kind` discriminator fields.

use serde::{Deserialize, Serialize};

use crate::backend::{Document, Fields};
use crate::query::filter::Filter;
use crate::types::{ElementKind, Value, KIND_FIELD, LABEL_FIELD};

/// How logical labels map onto physical document types.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TypeLayout {
    /// One document type per label.
    #[default]
    PerLabel,
    /// One shared document type plus discriminator fields.
    Shared {
        /// The shared type name.
        doc_type: String,
    },
}

impl TypeLayout {
    /// Document type for a label.
    pub fn doc_type(&self, label: &str) -> String {
        match self {
            Self::PerLabel => label.to_string(),
            Self::Shared { doc_type } => doc_type.clone(),
        }
    }

    /// Whether several labels share one physical type.
    pub fn is_shared(&self) -> bool {
        matches!(self, Self::Shared { .. })
    }

    /// Field that label constraints are translated to.
    pub fn label_field(&self) -> &'static str {
        match self {
            Self::PerLabel => "_type",
            Self::Shared { .. } => LABEL_FIELD,
        }
    }

    /// Discriminator fields written into every document.
    pub fn discriminators(&self, kind: ElementKind, label: &str) -> Fields {
        let mut fields = Fields::new();
        if self.is_shared() {
            fields.insert(LABEL_FIELD.to_string(), serde_json::Value::String(label.to_string()));
            fields.insert(KIND_FIELD.to_string(), serde_json::Value::String(kind.as_str().to_string()));
        }
        fields
    }

    /// Filter restricting a search to one element kind.
    ///
    /// Per-label layouts keep kinds apart by type name, so this is
    /// match-all there.
    pub fn kind_filter(&self, kind: ElementKind) -> Filter {
        match self {
            Self::PerLabel => Filter::MatchAll,
            Self::Shared { .. } => Filter::term(KIND_FIELD, kind.as_str()),
        }
    }

    /// Filter restricting a search to a set of labels.
    pub fn labels_filter(&self, labels: &[String]) -> Filter {
        match labels {
            [] => Filter::MatchAll,
            [one] => Filter::term(self.label_field(), one.as_str()),
            many => Filter::terms(self.label_field(), many.iter().map(|l| Value::from(l.as_str()))),
        }
    }

    /// Logical label of a stored document.
    pub fn label_of(&self, doc: &Document) -> Option<String> {
        match self {
            Self::PerLabel => Some(doc.doc_type.clone()),
            Self::Shared { .. } => doc
                .source
                .get(LABEL_FIELD)
                .and_then(|v| v.as_str())
                .map(str::to_string),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_layout_discriminators() {
        let layout = TypeLayout::Shared { doc_type: "element".into() };
        assert_eq!(layout.doc_type("person"), "element");
        let fields = layout.discriminators(ElementKind::Edge, "knows");
        assert_eq!(fields.get(LABEL_FIELD), Some(&serde_json::json!("knows")));
        assert_eq!(fields.get(KIND_FIELD), Some(&serde_json::json!("edge")));
        assert_eq!(layout.kind_filter(ElementKind::Vertex), Filter::term(KIND_FIELD, "vertex"));
    }

    #[test]
    fn test_per_label_layout() {
        let layout = TypeLayout::PerLabel;
        assert!(layout.discriminators(ElementKind::Vertex, "person").is_empty());
        assert_eq!(layout.kind_filter(ElementKind::Vertex), Filter::MatchAll);
        assert_eq!(
            layout.labels_filter(&["person".to_string()]),
            Filter::term("_type", "person")
        );
        let doc = Document::new("graph", "software", "3", Fields::new());
        assert_eq!(layout.label_of(&doc).as_deref(), Some("software"));
    }
}

//! Predicate translation into backend filters.

use crate::layout::TypeLayout;
use crate::query::filter::{Filter, RangeBounds};
use crate::query::predicate::{Compare, HasContainer, Predicates, PropertyKey};
use crate::types::{Element, ElementKind, Value};

/// A translated predicate list.
#[derive(Debug, Clone, PartialEq)]
pub struct Translation {
    /// Filter sent to the backend.
    pub filter: Filter,
    /// Constraints the backend cannot evaluate; apply after fetch.
    pub local: Vec<HasContainer>,
}

impl Translation {
    /// Whether the backend filter alone decides membership.
    pub fn is_exact(&self) -> bool {
        self.local.is_empty()
    }

    /// Apply the local constraints.
    pub fn test_local<E: Element + ?Sized>(&self, element: &E) -> bool {
        self.local.iter().all(|h| h.test(element))
    }
}

/// Converts [`Predicates`] into the backend filter tree for a layout.
#[derive(Debug, Clone)]
pub struct PredicateTranslator {
    layout: TypeLayout,
}

impl PredicateTranslator {
    /// Create a translator for a layout.
    pub fn new(layout: TypeLayout) -> Self {
        Self { layout }
    }

    /// The layout translated against.
    pub fn layout(&self) -> &TypeLayout {
        &self.layout
    }

    /// Translate constraints alone. An empty list is match-all.
    pub fn translate(&self, predicates: &Predicates) -> Translation {
        let mut filter = Filter::MatchAll;
        let mut local = Vec::new();
        for has in &predicates.has_containers {
            match self.constraint(has) {
                Some(f) => filter = filter.and(f),
                None => local.push(has.clone()),
            }
        }
        Translation { filter, local }
    }

    /// Translate constraints scoped to an element kind and label set.
    ///
    /// In a shared layout the kind discriminator is always conjoined, even
    /// for an empty predicate list; label scoping narrows further.
    pub fn scoped(&self, predicates: &Predicates, kind: ElementKind, labels: &[String]) -> Translation {
        let translation = self.translate(predicates);
        let scope = self
            .layout
            .kind_filter(kind)
            .and(self.layout.labels_filter(labels));
        Translation {
            filter: scope.and(translation.filter),
            local: translation.local,
        }
    }

    fn constraint(&self, has: &HasContainer) -> Option<Filter> {
        let field = match &has.key {
            PropertyKey::Id => "_id".to_string(),
            PropertyKey::Label => self.layout.label_field().to_string(),
            PropertyKey::Property(k) => k.clone(),
        };
        let property = matches!(has.key, PropertyKey::Property(_));
        // ids and labels are stored as strings
        let norm = |v: &Value| match (&has.key, v) {
            (PropertyKey::Property(_), v) => v.clone(),
            (_, Value::String(s)) => Value::String(s.clone()),
            (_, other) => Value::String(other.to_string()),
        };
        let range = |bounds: RangeBounds| {
            property.then(|| Filter::Range {
                field: field.clone(),
                bounds,
            })
        };

        match &has.predicate {
            Compare::Eq(v) => Some(Filter::term(field.clone(), norm(v))),
            Compare::Neq(v) => Some(Filter::not(Filter::term(field.clone(), norm(v)))),
            Compare::Within(vs) => Some(Filter::terms(field.clone(), vs.iter().map(norm))),
            Compare::Without(vs) => Some(Filter::not(Filter::terms(field.clone(), vs.iter().map(norm)))),
            Compare::Gt(v) => range(RangeBounds { gt: Some(v.clone()), ..Default::default() }),
            Compare::Gte(v) => range(RangeBounds { gte: Some(v.clone()), ..Default::default() }),
            Compare::Lt(v) => range(RangeBounds { lt: Some(v.clone()), ..Default::default() }),
            Compare::Lte(v) => range(RangeBounds { lte: Some(v.clone()), ..Default::default() }),
            Compare::Between(lo, hi) => range(RangeBounds {
                gte: Some(lo.clone()),
                lt: Some(hi.clone()),
                ..Default::default()
            }),
            Compare::Contains(_) => None,
        }
    }
}

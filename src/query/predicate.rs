//! Graph predicates: ordered (key, comparison) constraints plus a row window.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::types::{Element, Value};

/// What a constraint is evaluated against.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PropertyKey {
    /// The element id.
    Id,
    /// The element label.
    Label,
    /// A user property.
    Property(String),
}

impl From<&str> for PropertyKey {
    fn from(key: &str) -> Self {
        match key {
            "~id" => Self::Id,
            "~label" => Self::Label,
            other => Self::Property(other.to_string()),
        }
    }
}

/// Comparison operator with its operand(s).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Compare {
    /// Equal to.
    Eq(Value),
    /// Not equal to (also true when the key is absent).
    Neq(Value),
    /// Equal to one of.
    Within(Vec<Value>),
    /// Equal to none of (also true when the key is absent).
    Without(Vec<Value>),
    /// Greater than.
    Gt(Value),
    /// Greater than or equal.
    Gte(Value),
    /// Less than.
    Lt(Value),
    /// Less than or equal.
    Lte(Value),
    /// Half-open range `[low, high)`.
    Between(Value, Value),
    /// String value contains the substring. Never pushed down.
    Contains(String),
}

impl Compare {
    /// Test a (possibly absent) value.
    pub fn test(&self, value: Option<&Value>) -> bool {
        let ordered = |v: Option<&Value>, operand: &Value, ok: fn(Ordering) -> bool| {
            v.and_then(|v| v.compare(operand)).map(ok).unwrap_or(false)
        };
        match self {
            Self::Eq(x) => value.map(|v| v.loosely_equals(x)).unwrap_or(false),
            Self::Neq(x) => !value.map(|v| v.loosely_equals(x)).unwrap_or(false),
            Self::Within(xs) => value.map(|v| xs.iter().any(|x| v.loosely_equals(x))).unwrap_or(false),
            Self::Without(xs) => !value.map(|v| xs.iter().any(|x| v.loosely_equals(x))).unwrap_or(false),
            Self::Gt(x) => ordered(value, x, |o| o == Ordering::Greater),
            Self::Gte(x) => ordered(value, x, |o| o != Ordering::Less),
            Self::Lt(x) => ordered(value, x, |o| o == Ordering::Less),
            Self::Lte(x) => ordered(value, x, |o| o != Ordering::Greater),
            Self::Between(lo, hi) => {
                ordered(value, lo, |o| o != Ordering::Less) && ordered(value, hi, |o| o == Ordering::Less)
            }
            Self::Contains(s) => value
                .and_then(Value::as_str)
                .map(|v| v.contains(s.as_str()))
                .unwrap_or(false),
        }
    }
}

/// One constraint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HasContainer {
    /// Constrained key.
    pub key: PropertyKey,
    /// Comparison.
    pub predicate: Compare,
}

impl HasContainer {
    /// Create a constraint.
    pub fn new(key: impl Into<PropertyKey>, predicate: Compare) -> Self {
        Self {
            key: key.into(),
            predicate,
        }
    }

    /// Evaluate against an element.
    pub fn test<E: Element + ?Sized>(&self, element: &E) -> bool {
        match &self.key {
            PropertyKey::Id => self
                .predicate
                .test(Some(&Value::String(element.id().as_str().to_string()))),
            PropertyKey::Label => self.predicate.test(Some(&Value::String(element.label().to_string()))),
            PropertyKey::Property(k) => self.predicate.test(element.value(k).as_ref()),
        }
    }
}

/// Ordered conjunction of constraints with an optional row window.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Predicates {
    /// Constraints, all of which must hold.
    pub has_containers: Vec<HasContainer>,
    /// First row of the window (inclusive).
    pub limit_low: usize,
    /// End of the window (exclusive); `None` means unbounded.
    pub limit_high: Option<usize>,
}

impl Predicates {
    /// No constraints, no window.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a constraint.
    pub fn has(mut self, key: impl Into<PropertyKey>, predicate: Compare) -> Self {
        self.has_containers.push(HasContainer::new(key, predicate));
        self
    }

    /// Restrict to the row window `[low, high)`.
    pub fn range(mut self, low: usize, high: usize) -> Self {
        self.limit_low = low;
        self.limit_high = Some(high.max(low));
        self
    }

    /// Keep at most `n` rows.
    pub fn limit(self, n: usize) -> Self {
        self.range(0, n)
    }

    /// Whether there are no constraints.
    pub fn is_empty(&self) -> bool {
        self.has_containers.is_empty()
    }

    /// Whether a row window is set.
    pub fn has_window(&self) -> bool {
        self.limit_low > 0 || self.limit_high.is_some()
    }

    /// Number of rows the window admits, if bounded.
    pub fn window_len(&self) -> Option<usize> {
        self.limit_high.map(|h| h.saturating_sub(self.limit_low))
    }

    /// Evaluate every constraint against an element.
    pub fn test<E: Element + ?Sized>(&self, element: &E) -> bool {
        self.has_containers.iter().all(|h| h.test(element))
    }

    /// Label values this predicate list pins, if any constraint is
    /// `label == x` or `label within {..}`.
    pub fn labels(&self) -> Option<Vec<String>> {
        self.has_containers.iter().find_map(|h| match (&h.key, &h.predicate) {
            (PropertyKey::Label, Compare::Eq(v)) => Some(vec![v.to_string()]),
            (PropertyKey::Label, Compare::Within(vs)) => Some(vs.iter().map(Value::to_string).collect()),
            _ => None,
        })
    }

    /// Same constraints without a window.
    pub fn without_window(&self) -> Self {
        Self {
            has_containers: self.has_containers.clone(),
            limit_low: 0,
            limit_high: None,
        }
    }

    /// Apply the row window to an iterator.
    pub fn window<I: Iterator>(&self, iter: I) -> std::iter::Take<std::iter::Skip<I>> {
        let take = self.window_len().unwrap_or(usize::MAX);
        iter.skip(self.limit_low).take(take)
    }
}

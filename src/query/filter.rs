//! Backend filter tree.
//!
//! A [`Filter`] is the boolean filter expression sent with every search.
//! It serializes to the document store's query DSL and can also be
//! evaluated directly against a [`Document`] by the in-memory backend.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::backend::Document;
use crate::types::Value;

/// Bounds of a range filter; unset bounds are open.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RangeBounds {
    /// Exclusive lower bound.
    pub gt: Option<Value>,
    /// Inclusive lower bound.
    pub gte: Option<Value>,
    /// Exclusive upper bound.
    pub lt: Option<Value>,
    /// Inclusive upper bound.
    pub lte: Option<Value>,
}

impl RangeBounds {
    fn admits(&self, v: &Value) -> bool {
        let check = |bound: &Option<Value>, ok: fn(Ordering) -> bool| match bound {
            None => true,
            Some(b) => v.compare(b).map(ok).unwrap_or(false),
        };
        check(&self.gt, |o| o == Ordering::Greater)
            && check(&self.gte, |o| o != Ordering::Less)
            && check(&self.lt, |o| o == Ordering::Less)
            && check(&self.lte, |o| o != Ordering::Greater)
    }
}

/// Boolean filter expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Filter {
    /// Matches every document.
    MatchAll,
    /// Field equals value.
    Term {
        /// Field path (`_id`, `_type` or a dotted source path).
        field: String,
        /// Expected value.
        value: Value,
    },
    /// Field equals any of the values.
    Terms {
        /// Field path.
        field: String,
        /// Accepted values.
        values: Vec<Value>,
    },
    /// Field lies within bounds.
    Range {
        /// Field path.
        field: String,
        /// Bounds.
        bounds: RangeBounds,
    },
    /// Field is present and not null.
    Exists {
        /// Field path.
        field: String,
    },
    /// All sub-filters match.
    And(Vec<Filter>),
    /// At least one sub-filter matches.
    Or(Vec<Filter>),
    /// The sub-filter does not match.
    Not(Box<Filter>),
}

impl Filter {
    /// Equality filter.
    pub fn term(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Term {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Membership filter.
    pub fn terms<V: Into<Value>>(field: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        Self::Terms {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// Presence filter.
    pub fn exists(field: impl Into<String>) -> Self {
        Self::Exists { field: field.into() }
    }

    /// Negation.
    #[allow(clippy::should_implement_trait)]
    pub fn not(inner: Filter) -> Self {
        Self::Not(Box::new(inner))
    }

    /// Disjunction; a single alternative is returned as-is.
    pub fn any_of(mut filters: Vec<Filter>) -> Self {
        match filters.len() {
            1 => filters.remove(0),
            _ => Self::Or(filters),
        }
    }

    /// Conjoin another filter.
    ///
    /// `MatchAll` operands vanish, and conjunctions are flattened into one
    /// top-level `And` instead of nesting.
    pub fn and(self, other: Filter) -> Self {
        match (self, other) {
            (Self::MatchAll, f) | (f, Self::MatchAll) => f,
            (Self::And(mut a), Self::And(b)) => {
                a.extend(b);
                Self::And(a)
            }
            (Self::And(mut a), f) => {
                a.push(f);
                Self::And(a)
            }
            (f, Self::And(mut b)) => {
                b.insert(0, f);
                Self::And(b)
            }
            (a, b) => Self::And(vec![a, b]),
        }
    }

    /// Whether this is the match-all filter.
    pub fn is_match_all(&self) -> bool {
        matches!(self, Self::MatchAll)
    }

    /// Render as a query DSL filter clause.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::MatchAll => json!({ "match_all": {} }),
            Self::Term { field, value } => json!({ "term": { field.as_str(): value.to_json() } }),
            Self::Terms { field, values } => {
                let values: Vec<_> = values.iter().map(Value::to_json).collect();
                json!({ "terms": { field.as_str(): values } })
            }
            Self::Range { field, bounds } => {
                let mut body = serde_json::Map::new();
                for (name, bound) in [
                    ("gt", &bounds.gt),
                    ("gte", &bounds.gte),
                    ("lt", &bounds.lt),
                    ("lte", &bounds.lte),
                ] {
                    if let Some(v) = bound {
                        body.insert(name.to_string(), v.to_json());
                    }
                }
                json!({ "range": { field.as_str(): body } })
            }
            Self::Exists { field } => json!({ "exists": { "field": field } }),
            Self::And(fs) => {
                let fs: Vec<_> = fs.iter().map(Filter::to_json).collect();
                json!({ "bool": { "must": fs } })
            }
            Self::Or(fs) => {
                let fs: Vec<_> = fs.iter().map(Filter::to_json).collect();
                json!({ "bool": { "should": fs, "minimum_should_match": 1 } })
            }
            Self::Not(f) => json!({ "bool": { "must_not": [f.to_json()] } }),
        }
    }

    /// Render as a complete search query.
    pub fn to_query_json(&self) -> serde_json::Value {
        json!({ "constant_score": { "filter": self.to_json() } })
    }

    /// Evaluate against a document.
    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Self::MatchAll => true,
            Self::Term { field, value } => field_values(doc, field).iter().any(|v| v.loosely_equals(value)),
            Self::Terms { field, values } => field_values(doc, field)
                .iter()
                .any(|v| values.iter().any(|x| v.loosely_equals(x))),
            Self::Range { field, bounds } => field_values(doc, field).iter().any(|v| bounds.admits(v)),
            Self::Exists { field } => !field_values(doc, field).is_empty(),
            Self::And(fs) => fs.iter().all(|f| f.matches(doc)),
            Self::Or(fs) => fs.iter().any(|f| f.matches(doc)),
            Self::Not(f) => !f.matches(doc),
        }
    }
}

/// Collect every scalar found at a dotted path, flattening arrays the way
/// the store indexes them.
fn field_values(doc: &Document, path: &str) -> Vec<Value> {
    match path {
        "_id" => return vec![Value::String(doc.id.clone())],
        "_type" => return vec![Value::String(doc.doc_type.clone())],
        _ => {}
    }
    let mut current: Vec<&serde_json::Value> = Vec::new();
    let mut segments = path.split('.');
    if let Some(first) = segments.next() {
        if let Some(v) = doc.source.get(first) {
            current.push(v);
        }
    }
    for segment in segments {
        let mut next = Vec::new();
        for v in current {
            collect_child(v, segment, &mut next);
        }
        current = next;
    }
    let mut out = Vec::new();
    for v in current {
        flatten_scalars(v, &mut out);
    }
    out
}

fn collect_child<'a>(v: &'a serde_json::Value, key: &str, out: &mut Vec<&'a serde_json::Value>) {
    match v {
        serde_json::Value::Object(map) => {
            if let Some(child) = map.get(key) {
                out.push(child);
            }
        }
        serde_json::Value::Array(items) => {
            for item in items {
                collect_child(item, key, out);
            }
        }
        _ => {}
    }
}

fn flatten_scalars(v: &serde_json::Value, out: &mut Vec<Value>) {
    match v {
        serde_json::Value::Array(items) => items.iter().for_each(|i| flatten_scalars(i, out)),
        other => {
            if let Some(value) = Value::from_json(other) {
                out.push(value);
            }
        }
    }
}

//! Metadata filters passed through to the vector store.
//!
//! Filters mirror the store's operator set (`$eq`, `$ne`, `$gt`, `$gte`,
//! `$lt`, `$lte`, `$in`, `$nin`, `$and`, `$or`). `to_json` renders the
//! wire form for remote backends; `matches` evaluates a filter locally
//! for the in-memory backend.

use std::cmp::Ordering;

use serde_json::{json, Value};
use vectorize_types::{Metadata, MetadataValue};

/// A metadata filter expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, MetadataValue),
    Ne(String, MetadataValue),
    Gt(String, MetadataValue),
    Gte(String, MetadataValue),
    Lt(String, MetadataValue),
    Lte(String, MetadataValue),
    In(String, Vec<MetadataValue>),
    Nin(String, Vec<MetadataValue>),
    And(Vec<Filter>),
    Or(Vec<Filter>),
}

impl Filter {
    /// Conjunction helper that flattens the trivial cases.
    pub fn and(mut clauses: Vec<Filter>) -> Filter {
        if clauses.len() == 1 {
            clauses.remove(0)
        } else {
            Filter::And(clauses)
        }
    }

    /// Render the store's JSON wire form.
    pub fn to_json(&self) -> Value {
        fn value_json(v: &MetadataValue) -> Value {
            serde_json::to_value(v).unwrap_or(Value::Null)
        }
        match self {
            Filter::Eq(k, v) => json!({ k: { "$eq": value_json(v) } }),
            Filter::Ne(k, v) => json!({ k: { "$ne": value_json(v) } }),
            Filter::Gt(k, v) => json!({ k: { "$gt": value_json(v) } }),
            Filter::Gte(k, v) => json!({ k: { "$gte": value_json(v) } }),
            Filter::Lt(k, v) => json!({ k: { "$lt": value_json(v) } }),
            Filter::Lte(k, v) => json!({ k: { "$lte": value_json(v) } }),
            Filter::In(k, vs) => {
                json!({ k: { "$in": vs.iter().map(value_json).collect::<Vec<_>>() } })
            }
            Filter::Nin(k, vs) => {
                json!({ k: { "$nin": vs.iter().map(value_json).collect::<Vec<_>>() } })
            }
            Filter::And(clauses) => {
                json!({ "$and": clauses.iter().map(Filter::to_json).collect::<Vec<_>>() })
            }
            Filter::Or(clauses) => {
                json!({ "$or": clauses.iter().map(Filter::to_json).collect::<Vec<_>>() })
            }
        }
    }

    /// Evaluate the filter against one document's metadata.
    ///
    /// A comparison on an absent key is false (and so is its `Ne`/`Nin`
    /// dual, matching the store's null semantics).
    pub fn matches(&self, metadata: &Metadata) -> bool {
        match self {
            Filter::Eq(k, v) => metadata.get(k).is_some_and(|m| values_equal(m, v)),
            Filter::Ne(k, v) => metadata.get(k).is_some_and(|m| !values_equal(m, v)),
            Filter::Gt(k, v) => compare(metadata.get(k), v).is_some_and(|o| o == Ordering::Greater),
            Filter::Gte(k, v) => compare(metadata.get(k), v).is_some_and(|o| o != Ordering::Less),
            Filter::Lt(k, v) => compare(metadata.get(k), v).is_some_and(|o| o == Ordering::Less),
            Filter::Lte(k, v) => {
                compare(metadata.get(k), v).is_some_and(|o| o != Ordering::Greater)
            }
            Filter::In(k, vs) => metadata
                .get(k)
                .is_some_and(|m| vs.iter().any(|v| values_equal(m, v))),
            Filter::Nin(k, vs) => metadata
                .get(k)
                .is_some_and(|m| !vs.iter().any(|v| values_equal(m, v))),
            Filter::And(clauses) => clauses.iter().all(|c| c.matches(metadata)),
            Filter::Or(clauses) => clauses.iter().any(|c| c.matches(metadata)),
        }
    }
}

fn as_number(value: &MetadataValue) -> Option<f64> {
    match value {
        MetadataValue::Int(i) => Some(*i as f64),
        MetadataValue::Float(f) => Some(*f),
        _ => None,
    }
}

fn values_equal(a: &MetadataValue, b: &MetadataValue) -> bool {
    match (as_number(a), as_number(b)) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn compare(found: Option<&MetadataValue>, against: &MetadataValue) -> Option<Ordering> {
    let found = found?;
    if let (Some(x), Some(y)) = (as_number(found), as_number(against)) {
        return x.partial_cmp(&y);
    }
    match (found, against) {
        (MetadataValue::Str(a), MetadataValue::Str(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

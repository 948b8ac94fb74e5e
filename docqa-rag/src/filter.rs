//! Payload filters shared by every vector store backend.
//!
//! A [`Filter`] is a conjunction of equality predicates over scalar payload
//! fields. Backends translate it into their native filter language; the
//! in-memory store evaluates it directly with [`Filter::matches`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Scalar fields stored alongside a vector.
pub type Payload = serde_json::Map<String, Value>;

/// A value a payload field can be compared against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MatchValue {
    /// Exact string match.
    Keyword(String),
    /// Exact integer match.
    Integer(i64),
}

impl MatchValue {
    fn matches(&self, value: &Value) -> bool {
        match (self, value) {
            (Self::Keyword(expected), Value::String(actual)) => expected == actual,
            (Self::Integer(expected), Value::Number(actual)) => actual.as_i64() == Some(*expected),
            _ => false,
        }
    }
}

impl From<&str> for MatchValue {
    fn from(value: &str) -> Self {
        Self::Keyword(value.to_string())
    }
}

impl From<String> for MatchValue {
    fn from(value: String) -> Self {
        Self::Keyword(value)
    }
}

impl From<i64> for MatchValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

/// One `field == value` predicate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMatch {
    /// The payload field name.
    pub field: String,
    /// The required value.
    pub value: MatchValue,
}

/// A conjunction of [`FieldMatch`] predicates. The empty filter matches every row.
///
/// # Example
///
/// ```rust
/// use docqa_rag::filter::Filter;
///
/// let filter = Filter::eq("document_type", "manual").and_eq("index_id", "2024");
/// assert_eq!(filter.conditions().len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    must: Vec<FieldMatch>,
}

impl Filter {
    /// A filter that matches every row.
    pub fn all() -> Self {
        Self::default()
    }

    /// A filter with a single equality predicate.
    pub fn eq(field: impl Into<String>, value: impl Into<MatchValue>) -> Self {
        Self::default().and_eq(field, value)
    }

    /// Add another equality predicate to the conjunction.
    pub fn and_eq(mut self, field: impl Into<String>, value: impl Into<MatchValue>) -> Self {
        self.must.push(FieldMatch { field: field.into(), value: value.into() });
        self
    }

    /// The predicates of this filter, in insertion order.
    pub fn conditions(&self) -> &[FieldMatch] {
        &self.must
    }

    /// Returns `true` if this filter has no predicates.
    pub fn is_empty(&self) -> bool {
        self.must.is_empty()
    }

    /// Evaluate the filter against a payload. Missing fields never match.
    pub fn matches(&self, payload: &Payload) -> bool {
        self.must.iter().all(|condition| {
            payload.get(&condition.field).is_some_and(|value| condition.value.matches(value))
        })
    }
}

/// Read a string field from a payload.
pub fn payload_str<'a>(payload: &'a Payload, field: &str) -> Option<&'a str> {
    payload.get(field).and_then(Value::as_str)
}

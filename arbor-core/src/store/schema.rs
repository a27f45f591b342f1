//! Declared types for observable nodes.
//!
//! A `Schema` describes the shape a node's value must have. Writes are
//! validated against it before any storage is touched, so a rejected value
//! never leaves a half-applied mutation behind.

use indexmap::IndexMap;
use serde_json::Value;

/// The declared type of an observable node.
#[derive(Debug, Clone, PartialEq)]
pub enum Schema {
    /// A boolean leaf.
    Bool,
    /// A numeric leaf.
    Number,
    /// A string leaf.
    String,
    /// Accepts any value. Composites are inferred from the value's shape:
    /// objects become maps, arrays become lists, everything else is a leaf.
    Any,
    /// A fixed set of named fields, each with its own schema.
    Record(IndexMap<String, Schema>),
    /// A homogeneous ordered sequence.
    List(Box<Schema>),
    /// A homogeneous associative map with open key set.
    Map(Box<Schema>),
    /// A tagged union: the node is bound to whichever candidate accepts
    /// its current value.
    Variant(Vec<Schema>),
}

impl Schema {
    /// Build a record schema from field pairs.
    pub fn record<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = (S, Schema)>,
        S: Into<String>,
    {
        Self::Record(fields.into_iter().map(|(k, s)| (k.into(), s)).collect())
    }

    /// Build a list schema.
    pub fn list(element: Schema) -> Self {
        Self::List(Box::new(element))
    }

    /// Build a map schema.
    pub fn map(value: Schema) -> Self {
        Self::Map(Box::new(value))
    }

    /// Build a variant schema from candidate sub-schemas.
    pub fn variant<I: IntoIterator<Item = Schema>>(candidates: I) -> Self {
        Self::Variant(candidates.into_iter().collect())
    }

    /// Check whether a value conforms to this schema.
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            Schema::Bool => value.is_boolean(),
            Schema::Number => value.is_number(),
            Schema::String => value.is_string(),
            Schema::Any => true,
            Schema::Record(fields) => match value.as_object() {
                Some(obj) => {
                    obj.len() == fields.len()
                        && fields
                            .iter()
                            .all(|(k, s)| obj.get(k).is_some_and(|v| s.accepts(v)))
                }
                None => false,
            },
            Schema::List(elem) => match value.as_array() {
                Some(items) => items.iter().all(|v| elem.accepts(v)),
                None => false,
            },
            Schema::Map(elem) => match value.as_object() {
                Some(obj) => obj.values().all(|v| elem.accepts(v)),
                None => false,
            },
            Schema::Variant(candidates) => candidates.iter().any(|c| c.accepts(value)),
        }
    }

    /// For a variant, find the first candidate accepting the value.
    ///
    /// Returns `None` for non-variant schemas or when no candidate matches.
    pub fn candidate_for(&self, value: &Value) -> Option<(usize, &Schema)> {
        match self {
            Schema::Variant(candidates) => candidates
                .iter()
                .enumerate()
                .find(|(_, c)| c.accepts(value)),
            _ => None,
        }
    }

    /// Whether values of this schema are stored as a single leaf.
    pub fn is_leaf(&self) -> bool {
        matches!(
            self,
            Schema::Bool | Schema::Number | Schema::String
        )
    }
}

//! `Record`/`RecordId` — the generic carrier of data moved in and out of a
//! store (spec.md §3.1 "Records", SPEC_FULL.md §3 "Record representation").
//!
//! Model declarations are runtime builder calls rather than derive-macro
//! codegen (see `model::Field`/`model::Relation`), so there is no generated
//! Rust struct per model to hold a "compiled model record type" the way
//! spec.md describes it. A `Record` is the dynamically-typed stand-in: an
//! ordered JSON object with typed accessors, matching how the document
//! backend already represents rows and how the kv backend already stores
//! RedisJSON documents (`str11ngfello-snugom/snugom/src/search/mod.rs`'s
//! `extract_json_payload`/`normalize_json_payload`).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Backend-tagged primary-key value (spec.md §3.1 ModelSpec: "relational:
/// auto-increment integer; document: 12-byte object id; kv: string primary
/// key").
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    Int(i64),
    ObjectId(String),
    Str(String),
}

impl RecordId {
    pub fn as_str(&self) -> std::borrow::Cow<'_, str> {
        match self {
            RecordId::Int(v) => std::borrow::Cow::Owned(v.to_string()),
            RecordId::ObjectId(v) | RecordId::Str(v) => std::borrow::Cow::Borrowed(v),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            RecordId::Int(v) => Some(*v),
            _ => None,
        }
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single row/document, keyed by field name in declaration order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    pub fn new() -> Self {
        Self(Map::new())
    }

    pub fn from_map(map: Map<String, Value>) -> Self {
        Self(map)
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.0.insert(field.into(), value.into());
        self
    }

    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.0.shift_remove(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn id(&self, primary_key_field: &str) -> Option<RecordId> {
        match self.0.get(primary_key_field)? {
            Value::Number(n) => n.as_i64().map(RecordId::Int),
            Value::String(s) => Some(RecordId::Str(s.clone())),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(|s| s.as_str())
    }

    pub fn as_json(&self) -> &Map<String, Value> {
        &self.0
    }
}

impl From<Map<String, Value>> for Record {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl FromIterator<(String, Value)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_id_extraction_prefers_declared_type() {
        let mut record = Record::new();
        record.set("id", 42);
        assert_eq!(record.id("id"), Some(RecordId::Int(42)));

        let mut record = Record::new();
        record.set("id", "abc123");
        assert_eq!(record.id("id"), Some(RecordId::Str("abc123".to_string())));
    }

    #[test]
    fn remove_returns_prior_value() {
        let mut record = Record::new();
        record.set("name", "Hoima");
        assert_eq!(record.remove("name"), Some(Value::String("Hoima".to_string())));
        assert!(!record.contains("name"));
    }
}

//! Field & Schema model (spec.md §3.1, §4.1) — C1.
//!
//! Grounded in `str11ngfello-snugom/snugom/src/types.rs`
//! (`FieldDescriptor`/`RelationDescriptor`/`EntityDescriptor`), generalized
//! from a fixed, macro-generated entity shape to a runtime builder API:
//! `Field(...)`/`Relation(...)` return plain `FieldSpec`/`RelationSpec`
//! values instead of being emitted by a derive macro.

mod compiled;
mod compiler;
mod field;
mod relation;
mod spec;

pub use compiled::{CompiledField, CompiledModel, CompiledRelation, RecordIdKind};
pub use compiler::{ModelRegistry, compile};
pub use field::Field;
pub use relation::Relation;
pub use spec::{FieldSpec, ModelSpec, RelationSpec};

use std::collections::BTreeSet;

/// One of the three backends a model can be compiled for (GLOSSARY "Backend").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Backend {
    Relational,
    Document,
    Kv,
}

impl Backend {
    pub const ALL: [Backend; 3] = [Backend::Relational, Backend::Document, Backend::Kv];
}

/// Semantic type of a field, independent of any backend's physical column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SemanticType {
    Int,
    Float,
    String,
    Bool,
    Timestamp,
    Bytes,
    Json,
    Reference,
}

/// Cardinality of a relation (spec.md §3.1 RelationSpec).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    One,
    Many,
}

/// Relational-only referential action on the parent's deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnDelete {
    Cascade,
    SetNull,
    Restrict,
}

/// kv-backend vector index configuration for a field (spec.md §4.1).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VectorOptions {
    pub dimensions: usize,
    pub metric: VectorMetric,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorMetric {
    Cosine,
    Euclidean,
    DotProduct,
}

/// A default value or a factory invoked at insert time when the caller omits
/// the field.
#[derive(Clone)]
pub enum FieldDefault {
    Value(serde_json::Value),
    Factory(std::sync::Arc<dyn Fn() -> serde_json::Value + Send + Sync>),
}

impl std::fmt::Debug for FieldDefault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldDefault::Value(v) => f.debug_tuple("Value").field(v).finish(),
            FieldDefault::Factory(_) => f.write_str("Factory(..)"),
        }
    }
}

impl FieldDefault {
    pub fn resolve(&self) -> serde_json::Value {
        match self {
            FieldDefault::Value(v) => v.clone(),
            FieldDefault::Factory(f) => f(),
        }
    }
}

pub type BackendSet = BTreeSet<Backend>;

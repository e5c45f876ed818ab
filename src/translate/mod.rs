//! Query Translator (spec.md §4.4) — C4, "the hardest, most educative
//! engineering" (spec.md §1).
//!
//! `translate` is a pure function of `(backend, model, selector)` (spec.md
//! §3.2 invariant 5): no I/O, no mutable state beyond the tree being walked.
//! Dotted-path resolution (invariant 1) and the disabled-field/relation
//! check (invariant 4) are shared across all three backends in
//! [`resolve_path`]; each backend module owns only the native-filter shape
//! and the leaf-emission rules particular to it.

pub mod document;
pub mod kv;
pub mod relational;

pub use document::DocumentFilter;
pub use kv::{KvExpr, KvFilter};
pub use relational::{CompareOp, JoinSpec, RelExpr, RelationalFilter};

use crate::errors::TranslationError;
use crate::model::{Backend, Cardinality, CompiledField, CompiledModel, ModelRegistry};
use crate::selector::SelectorNode;

/// A skipped backend-only operator, surfaced to the caller alongside the
/// native filter (spec.md §4.4 "Backend-only operators", §7 "warnings
/// through a logging sink").
#[derive(Debug, Clone, PartialEq)]
pub struct Warning {
    pub operator: String,
    pub field: Option<String>,
    pub backend: Backend,
}

impl Warning {
    pub fn new(operator: impl Into<String>, field: Option<String>, backend: Backend) -> Self {
        Self {
            operator: operator.into(),
            field,
            backend,
        }
    }
}

/// The native filter produced for one of the three backends.
#[derive(Debug, Clone)]
pub enum NativeFilter {
    Relational(RelationalFilter),
    Document(DocumentFilter),
    Kv(KvFilter),
}

/// `Translate(backend, model, selector) → (nativeFilter, warnings)` (spec.md §4.4).
pub fn translate(
    registry: &ModelRegistry,
    backend: Backend,
    model: &CompiledModel,
    selector: &SelectorNode,
) -> Result<(NativeFilter, Vec<Warning>), TranslationError> {
    match backend {
        Backend::Relational => {
            let (filter, warnings) = relational::translate(registry, model, selector)?;
            Ok((NativeFilter::Relational(filter), warnings))
        }
        Backend::Document => {
            let (filter, warnings) = document::translate(registry, model, selector)?;
            Ok((NativeFilter::Document(filter), warnings))
        }
        Backend::Kv => {
            let (filter, warnings) = kv::translate(registry, model, selector)?;
            Ok((NativeFilter::Kv(filter), warnings))
        }
    }
}

/// One relation hop crossed while resolving a dotted path.
#[derive(Debug, Clone)]
pub(crate) struct RelationHop {
    pub relation_name: String,
    pub from_model: String,
    pub to_model: String,
    pub cardinality: Cardinality,
    pub is_many_to_many: bool,
}

/// Where a dotted path lands: the chain of relations crossed plus the
/// terminal field on the terminal model (spec.md §3.2 invariant 1).
#[derive(Debug, Clone)]
pub(crate) struct ResolvedPath {
    pub hops: Vec<RelationHop>,
    pub model_name: String,
    pub field: CompiledField,
}

impl ResolvedPath {
    pub fn crosses_collection(&self) -> bool {
        self.hops.iter().any(|h| h.cardinality == Cardinality::Many)
    }
}

/// Walks `path` segment by segment against `model`, following relations by
/// name through `registry` (spec.md §3.2 invariant 1). Distinguishes a path
/// that doesn't exist at all from one that exists but is disabled on
/// `backend` (invariant 4), since the compiled model has already dropped
/// disabled members and can no longer tell the two apart on its own.
pub(crate) fn resolve_path(
    registry: &ModelRegistry,
    backend: Backend,
    model: &CompiledModel,
    path: &str,
) -> Result<ResolvedPath, TranslationError> {
    let segments: Vec<&str> = path.split('.').collect();
    let mut hops = Vec::new();
    let mut current_name = model.name.clone();
    let mut current = model.clone();

    for (i, seg) in segments.iter().enumerate() {
        let is_last = i == segments.len() - 1;
        if is_last {
            if let Some(field) = current.field(seg) {
                return Ok(ResolvedPath {
                    hops,
                    model_name: current_name,
                    field: field.clone(),
                });
            }
            return Err(field_resolution_error(registry, backend, &current_name, seg, path));
        }

        let Some(relation) = current.relation(seg) else {
            return Err(relation_resolution_error(registry, backend, &current_name, seg, path));
        };
        hops.push(RelationHop {
            relation_name: (*seg).to_string(),
            from_model: current_name.clone(),
            to_model: relation.target.clone(),
            cardinality: relation.cardinality(),
            is_many_to_many: relation.is_many_to_many(),
        });
        let target_name = relation.target.clone();
        current = registry.compile(&target_name, backend).map_err(|_| TranslationError::UnresolvedPath {
            model: current_name.clone(),
            path: path.to_string(),
        })?;
        current_name = target_name;
    }

    unreachable!("path.split('.') always yields at least one segment")
}

fn field_resolution_error(
    registry: &ModelRegistry,
    backend: Backend,
    model_name: &str,
    field_name: &str,
    full_path: &str,
) -> TranslationError {
    if let Some(spec) = registry.get(model_name) {
        if spec.field(field_name).is_some_and(|f| f.disabled_on.contains(&backend)) {
            return TranslationError::DisabledField {
                field: field_name.to_string(),
                backend,
            };
        }
    }
    TranslationError::UnresolvedPath {
        model: model_name.to_string(),
        path: full_path.to_string(),
    }
}

fn relation_resolution_error(
    registry: &ModelRegistry,
    backend: Backend,
    model_name: &str,
    relation_name: &str,
    full_path: &str,
) -> TranslationError {
    if let Some(spec) = registry.get(model_name) {
        if spec.relations.get(relation_name).is_some_and(|r| r.disabled_on.contains(&backend)) {
            return TranslationError::DisabledRelation {
                relation: relation_name.to_string(),
                backend,
            };
        }
    }
    TranslationError::UnresolvedPath {
        model: model_name.to_string(),
        path: full_path.to_string(),
    }
}

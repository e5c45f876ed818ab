//! Error taxonomy surfaced to callers of the store and translator layers.
//!
//! Grounded in `str11ngfello-snugom/snugom/src/errors.rs`: a single top-level
//! `thiserror` enum with `#[from]` conversions from the underlying driver
//! error types, plus a dedicated validation-issue list type.

use std::borrow::Cow;

use thiserror::Error;

use crate::model::Backend;

/// Top-level error type returned by every store and translator operation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Invalid field/relation declaration, raised at model registration.
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    /// The selector references an unknown field, uses an operator unsupported
    /// by the target backend in non-silent mode, or violates a payload shape
    /// invariant.
    #[error("translation error: {0}")]
    Translation(#[from] TranslationError),

    /// The driver could not be reached or the store is unregistered.
    #[error("backend {backend:?} unavailable: {message}")]
    BackendUnavailable { backend: Backend, message: String },

    /// Uniqueness violation on insert, surfaced only when the conflict policy
    /// that would otherwise silently elide the row has been disabled.
    #[error("conflict: {0}")]
    Conflict(#[from] ConflictError),

    /// Validation failed for one or more fields of a record.
    #[error("validation failed")]
    Validation(#[from] ValidationError),

    /// Catch-all for driver-reported failures that propagate untouched.
    #[error("{message}")]
    Other { message: Cow<'static, str> },
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        StoreError::BackendUnavailable {
            backend: Backend::Kv,
            message: err.to_string(),
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::BackendUnavailable {
            backend: Backend::Relational,
            message: err.to_string(),
        }
    }
}

impl From<mongodb::error::Error> for StoreError {
    fn from(err: mongodb::error::Error) -> Self {
        StoreError::BackendUnavailable {
            backend: Backend::Document,
            message: err.to_string(),
        }
    }
}

/// Invalid field/relation declaration.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("model '{0}' is already registered")]
    DuplicateModel(String),

    #[error("model '{0}' is not registered")]
    UnknownModel(String),

    #[error("field '{field}' on model '{model}' declares foreign_key without a relational target")]
    DanglingForeignKey { model: String, field: String },

    #[error("relation '{relation}' on model '{model}' targets unknown model '{target}'")]
    UnknownRelationTarget {
        model: String,
        relation: String,
        target: String,
    },

    #[error("link model '{link_model}' required by many-to-many relation '{relation}' on model '{model}' is not registered")]
    MissingLinkModel {
        model: String,
        relation: String,
        link_model: String,
    },

    #[error("model '{0}' has no primary key field")]
    MissingPrimaryKey(String),
}

/// Selector references an unknown field, uses an unsupported operator, or
/// violates a payload-shape invariant (spec.md §3.2, invariants 1-4).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TranslationError {
    #[error("field path '{path}' does not resolve against model '{model}'")]
    UnresolvedPath { model: String, path: String },

    #[error("field '{field}' is disabled on backend {backend:?}")]
    DisabledField { field: String, backend: Backend },

    #[error("relation '{relation}' is disabled on backend {backend:?}")]
    DisabledRelation { relation: String, backend: Backend },

    #[error("operator '{operator}' on field '{field}' requires a scalar value")]
    ExpectedScalar { operator: String, field: String },

    #[error("operator '{operator}' on field '{field}' requires a sequence value")]
    ExpectedSequence { operator: String, field: String },

    #[error("$not on field '{field}' requires an operator map, not a logical list")]
    NotRequiresOperatorMap { field: String },

    #[error("$regex on field '{field}' requires a string pattern")]
    ExpectedStringPattern { field: String },

    #[error("unknown operator '{0}'")]
    UnknownOperator(String),

    #[error("operator '{operator}' is not supported by the {backend:?} backend")]
    UnsupportedOperator { operator: String, backend: Backend },

    #[error(
        "dotted path '{path}' crosses a collection relation on the kv backend; only $in over an indexed field is supported there"
    )]
    KvCollectionTraversal { path: String },

    #[error("mixed update payload: '{field}' combines an operator key with a plain scalar key")]
    MixedUpdatePayload { field: String },
}

/// The driver could not be reached, or the store is unregistered (spec.md §7).
#[derive(Debug, Error)]
pub enum BackendUnavailableError {
    #[error("no store registered for uri '{0}'")]
    NotRegistered(String),

    #[error("backend {backend:?} connection failure: {message}")]
    ConnectionFailure { backend: Backend, message: String },
}

/// Uniqueness violation on insert (spec.md §7).
#[derive(Debug, Error)]
#[error("unique constraint violation on {model}.{fields:?}: values {values:?} already present")]
pub struct ConflictError {
    pub model: String,
    pub fields: Vec<String>,
    pub values: Vec<String>,
}

/// Collection of validation issues encountered while preparing a mutation.
#[derive(Debug, Error, Clone)]
#[error("validation errors: {issues:?}")]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationError {
    pub fn new<I>(issues: I) -> Self
    where
        I: IntoIterator<Item = ValidationIssue>,
    {
        Self {
            issues: issues.into_iter().collect(),
        }
    }

    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new([ValidationIssue::new(field, message)])
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidationIssue {
    pub field: String,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

//! Store interface (spec.md §4.5, §6.3) — C5, plus the process-scoped
//! registry (§4.6) — C6.

pub mod document;
pub mod kv;
pub mod registry;
pub mod relational;

pub use registry::{clear_stores, get_store};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::errors::{StoreError, StoreResult};
use crate::model::{Backend, ModelSpec};
use crate::record::Record;
use crate::selector::SelectorNode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Relational,
    Document,
    Kv,
}

impl StoreKind {
    pub fn backend(self) -> Backend {
        match self {
            StoreKind::Relational => Backend::Relational,
            StoreKind::Document => Backend::Document,
            StoreKind::Kv => Backend::Kv,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone)]
pub struct SortSpec {
    pub field: String,
    pub direction: SortDirection,
}

impl SortSpec {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Desc,
        }
    }
}

/// Options recognized by every store operation (spec.md §6.3 "opts
/// recognized").
#[derive(Debug, Clone, Default)]
pub struct StoreOptions {
    pub skip: Option<u64>,
    pub limit: Option<u64>,
    pub sort: Vec<SortSpec>,
    /// `update`-only: insert when no row matches the filter.
    pub upsert: bool,
    /// Relational-only: relation names to eager-load even when untouched by
    /// any filter (spec.md §4.5.1 "outer loader options").
    pub eager_load: Vec<String>,
    pub cancellation: Option<CancellationToken>,
}

impl StoreOptions {
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.as_ref().is_some_and(|t| t.is_cancelled())
    }
}

/// Races `fut` against the cancellation token carried on `opts`, so firing
/// the token while a driver call is suspended at any `.await` aborts the
/// operation immediately rather than only being checked once up front
/// (SPEC_FULL.md §5 "each suspension point calls `token.cancelled()` in a
/// `tokio::select!`"). With no token attached, `fut` just runs to
/// completion.
pub(crate) async fn run_cancellable<T>(opts: &StoreOptions, fut: impl std::future::Future<Output = StoreResult<T>>) -> StoreResult<T> {
    let Some(token) = &opts.cancellation else {
        return fut.await;
    };
    tokio::select! {
        _ = token.cancelled() => Err(StoreError::Other { message: "cancelled".into() }),
        result = fut => result,
    }
}

/// The five-method contract every backend implements identically (spec.md
/// §9 "Duck-typed backend interfaces → explicit Store interface"). Each
/// concrete store additionally exposes backend-specific inherent methods
/// (e.g. accepting a raw native filter) beyond this shared, object-safe
/// surface.
#[async_trait]
pub trait Store: Send + Sync {
    fn kind(&self) -> StoreKind;

    async fn register(&self, models: &[ModelSpec]) -> StoreResult<()>;

    async fn insert(&self, model: &str, items: Vec<Record>, opts: &StoreOptions) -> StoreResult<Vec<Record>>;

    async fn find(&self, model: &str, selector: Option<&SelectorNode>, opts: &StoreOptions) -> StoreResult<Vec<Record>>;

    async fn update(
        &self,
        model: &str,
        selector: Option<&SelectorNode>,
        updates: Record,
        opts: &StoreOptions,
    ) -> StoreResult<Vec<Record>>;

    async fn delete(&self, model: &str, selector: Option<&SelectorNode>, opts: &StoreOptions) -> StoreResult<Vec<Record>>;
}

//! Unified async CRUD and portable MongoDB-style query translation over a
//! relational engine, a document store, and a key/value store with
//! secondary indexes.
//!
//! The three backends share one [`selector`] language and one
//! [`translate`] entry point; [`model`] declares schemas once and compiles
//! a backend-specific projection for each; [`store`] implements the CRUD
//! surface against a registered connection.

pub mod config;
pub mod errors;
pub mod model;
pub mod record;
pub mod selector;
pub mod store;
pub mod translate;

pub use errors::{StoreError, StoreResult};
pub use model::{Backend, Field, ModelRegistry, ModelSpec, Relation, RelationSpec};
pub use record::{Record, RecordId};
pub use selector::{parse_selector, SelectorNode};
pub use store::{clear_stores, get_store, Store, StoreKind, StoreOptions};

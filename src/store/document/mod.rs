//! Document Store driver (spec.md §4.5.2) — insert refetches by inserted
//! id, update wraps a bare update dict in `$set` unless it already carries
//! an operator, delete snapshots via find before removing.

pub mod mongo_adapter;

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use bson::{Bson, Document};
use tracing::warn;

use crate::errors::{SchemaError, StoreError, StoreResult, TranslationError};
use crate::model::{Backend, CompiledModel, ModelRegistry, ModelSpec};
use crate::record::Record;
use crate::selector::SelectorNode;
use crate::translate::{self, DocumentFilter};

use super::{run_cancellable, Store, StoreKind, StoreOptions};

/// The operations this crate requires of a document driver (SPEC_FULL.md
/// C7): plain CRUD against one collection per model, native filters and
/// update documents already in Mongo's own shape.
#[async_trait]
pub trait DocumentConnection: Send + Sync {
    async fn ensure_collection(&self, name: &str) -> StoreResult<()>;
    async fn insert_many(&self, collection: &str, documents: Vec<Document>) -> StoreResult<Vec<Bson>>;
    async fn find(&self, collection: &str, filter: &Document, opts: &StoreOptions) -> StoreResult<Vec<Document>>;
    async fn update_many(&self, collection: &str, filter: &Document, update: &Document) -> StoreResult<u64>;
    async fn delete_many(&self, collection: &str, filter: &Document) -> StoreResult<u64>;
}

pub struct DocumentStore<C: DocumentConnection> {
    connection: C,
    registry: RwLock<ModelRegistry>,
    compiled: RwLock<HashMap<String, CompiledModel>>,
}

impl<C: DocumentConnection> DocumentStore<C> {
    pub fn new(connection: C) -> Self {
        Self {
            connection,
            registry: RwLock::new(ModelRegistry::new()),
            compiled: RwLock::new(HashMap::new()),
        }
    }

    fn compiled_model(&self, name: &str) -> StoreResult<CompiledModel> {
        self.compiled
            .read()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::Schema(SchemaError::UnknownModel(name.to_string())))
    }

    fn collection_name(compiled: &CompiledModel) -> &str {
        &compiled.table_name
    }

    fn translate_filter(&self, compiled: &CompiledModel, selector: Option<&SelectorNode>) -> StoreResult<DocumentFilter> {
        let Some(selector) = selector else {
            return Ok(Document::new());
        };
        let registry = self.registry.read().unwrap();
        let (filter, warnings) = translate::document::translate(&registry, compiled, selector)?;
        for warning in warnings {
            warn!(operator = %warning.operator, field = ?warning.field, backend = ?warning.backend, "operator skipped by translator");
        }
        Ok(filter)
    }

    /// Keeps only fields that survived compilation for this backend
    /// (spec.md §3.2 invariant 4 "disabled fields invisible"); a bare
    /// `record_to_document` would otherwise pass disabled fields through
    /// untouched since it has no schema to check against.
    fn project(compiled: &CompiledModel, record: &Record) -> Record {
        let mut projected = Record::new();
        for field in &compiled.fields {
            if let Some(value) = record.get(field.name()) {
                projected.set(field.name().to_string(), value.clone());
            }
        }
        projected
    }

    fn record_to_document(record: &Record) -> Document {
        let mut doc = Document::new();
        for (key, value) in record.iter() {
            doc.insert(key.clone(), bson::to_bson(value).unwrap_or(Bson::Null));
        }
        doc
    }

    fn document_to_record(doc: Document) -> Record {
        let value = bson::Bson::Document(doc).into_relaxed_extjson();
        match value {
            serde_json::Value::Object(map) => Record::from_map(map),
            _ => Record::new(),
        }
    }

    /// Wraps a bare update dict in `$set` unless it already carries an
    /// update operator, and rejects mixing the two (spec.md §9 "mixed
    /// update dict" ambiguity, resolved here as a hard error).
    fn build_update_document(updates: &Record) -> StoreResult<Document> {
        let has_operator = updates.fields().any(|f| f.starts_with('$'));
        let has_scalar = updates.fields().any(|f| !f.starts_with('$'));
        if has_operator && has_scalar {
            let offending = updates.fields().find(|f| !f.starts_with('$')).unwrap_or_default();
            return Err(StoreError::Translation(TranslationError::MixedUpdatePayload {
                field: offending.to_string(),
            }));
        }
        let doc = Self::record_to_document(updates);
        if has_operator {
            Ok(doc)
        } else {
            let mut wrapped = Document::new();
            wrapped.insert("$set", Bson::Document(doc));
            Ok(wrapped)
        }
    }
}

#[async_trait]
impl<C: DocumentConnection> Store for DocumentStore<C> {
    fn kind(&self) -> StoreKind {
        StoreKind::Document
    }

    async fn register(&self, models: &[ModelSpec]) -> StoreResult<()> {
        let compiled: Vec<(String, CompiledModel)> = {
            let mut registry = self.registry.write().unwrap();
            for spec in models {
                registry.register(spec.clone())?;
            }
            models
                .iter()
                .map(|spec| Ok((spec.name.clone(), registry.compile(&spec.name, Backend::Document)?)))
                .collect::<StoreResult<Vec<_>>>()?
        };
        for (_, compiled_model) in &compiled {
            self.connection.ensure_collection(Self::collection_name(compiled_model)).await?;
        }
        let mut compiled_guard = self.compiled.write().unwrap();
        for (name, compiled_model) in compiled {
            compiled_guard.insert(name, compiled_model);
        }
        Ok(())
    }

    async fn insert(&self, model: &str, items: Vec<Record>, opts: &StoreOptions) -> StoreResult<Vec<Record>> {
        run_cancellable(opts, async move {
            let compiled = self.compiled_model(model)?;
            let documents = items.iter().map(|item| Self::record_to_document(&Self::project(&compiled, item))).collect();
            let inserted_ids = self.connection.insert_many(Self::collection_name(&compiled), documents).await?;
            if inserted_ids.is_empty() {
                return Ok(vec![]);
            }
            let mut filter = Document::new();
            filter.insert("_id", bson::doc! { "$in": Bson::Array(inserted_ids) });
            let rows = self.connection.find(Self::collection_name(&compiled), &filter, &StoreOptions::default()).await?;
            Ok(rows.into_iter().map(Self::document_to_record).collect())
        })
        .await
    }

    async fn find(&self, model: &str, selector: Option<&SelectorNode>, opts: &StoreOptions) -> StoreResult<Vec<Record>> {
        run_cancellable(opts, async move {
            let compiled = self.compiled_model(model)?;
            let filter = self.translate_filter(&compiled, selector)?;
            let rows = self.connection.find(Self::collection_name(&compiled), &filter, opts).await?;
            Ok(rows.into_iter().map(Self::document_to_record).collect())
        })
        .await
    }

    async fn update(
        &self,
        model: &str,
        selector: Option<&SelectorNode>,
        updates: Record,
        opts: &StoreOptions,
    ) -> StoreResult<Vec<Record>> {
        run_cancellable(opts, async move {
            let compiled = self.compiled_model(model)?;
            let filter = self.translate_filter(&compiled, selector)?;
            let update_doc = Self::build_update_document(&updates)?;
            self.connection.update_many(Self::collection_name(&compiled), &filter, &update_doc).await?;
            let rows = self.connection.find(Self::collection_name(&compiled), &filter, &StoreOptions::default()).await?;
            Ok(rows.into_iter().map(Self::document_to_record).collect())
        })
        .await
    }

    async fn delete(&self, model: &str, selector: Option<&SelectorNode>, opts: &StoreOptions) -> StoreResult<Vec<Record>> {
        run_cancellable(opts, async move {
            let compiled = self.compiled_model(model)?;
            let filter = self.translate_filter(&compiled, selector)?;
            let pre_image = self.connection.find(Self::collection_name(&compiled), &filter, opts).await?;
            self.connection.delete_many(Self::collection_name(&compiled), &filter).await?;
            Ok(pre_image.into_iter().map(Self::document_to_record).collect())
        })
        .await
    }
}

//! Kv Store driver (spec.md §4.5.3) — one RedisJSON document per record,
//! with a RediSearch index over `indexed` fields standing in for the
//! relational backend's secondary indexes. Generalized from the teacher's
//! fixed-entity `Repo<T>`/`search` pair
//! (`str11ngfello-snugom/snugom/src/repository/mod.rs`,
//! `.../search/mod.rs`) to any `CompiledModel`.

pub mod redis_adapter;

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use nanoid::nanoid;
use tracing::warn;

use crate::errors::{SchemaError, StoreError, StoreResult};
use crate::model::{Backend, CompiledModel, ModelRegistry, ModelSpec};
use crate::record::Record;
use crate::selector::SelectorNode;
use crate::translate::{self, KvFilter};

use super::{run_cancellable, Store, StoreKind, StoreOptions};

/// The operations this crate requires of a kv driver (SPEC_FULL.md C7):
/// per-record JSON get/set/delete plus a secondary-index scan returning
/// matching primary keys.
#[async_trait]
pub trait KvConnection: Send + Sync {
    async fn ensure_index(&self, model: &CompiledModel) -> StoreResult<()>;
    async fn get(&self, model: &CompiledModel, pk: &str) -> StoreResult<Option<Record>>;
    async fn set(&self, model: &CompiledModel, pk: &str, record: &Record) -> StoreResult<()>;
    async fn delete(&self, model: &CompiledModel, pk: &str) -> StoreResult<()>;
    async fn scan_index(&self, model: &CompiledModel, filter: &KvFilter, opts: &StoreOptions) -> StoreResult<Vec<String>>;
}

pub struct KvStore<C: KvConnection> {
    connection: C,
    registry: RwLock<ModelRegistry>,
    compiled: RwLock<HashMap<String, CompiledModel>>,
}

impl<C: KvConnection> KvStore<C> {
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

    fn translate_filter(&self, compiled: &CompiledModel, selector: Option<&SelectorNode>) -> StoreResult<KvFilter> {
        let Some(selector) = selector else {
            return Ok(KvFilter::default());
        };
        let registry = self.registry.read().unwrap();
        let (filter, warnings) = translate::kv::translate(&registry, compiled, selector)?;
        for warning in warnings {
            warn!(operator = %warning.operator, field = ?warning.field, backend = ?warning.backend, "operator skipped by translator");
        }
        Ok(filter)
    }

    async fn resolve_pks(&self, compiled: &CompiledModel, selector: Option<&SelectorNode>, opts: &StoreOptions) -> StoreResult<Vec<String>> {
        let filter = self.translate_filter(compiled, selector)?;
        self.connection.scan_index(compiled, &filter, opts).await
    }
}

#[async_trait]
impl<C: KvConnection> Store for KvStore<C> {
    fn kind(&self) -> StoreKind {
        StoreKind::Kv
    }

    async fn register(&self, models: &[ModelSpec]) -> StoreResult<()> {
        let compiled: Vec<(String, CompiledModel)> = {
            let mut registry = self.registry.write().unwrap();
            for spec in models {
                registry.register(spec.clone())?;
            }
            models
                .iter()
                .map(|spec| Ok((spec.name.clone(), registry.compile(&spec.name, Backend::Kv)?)))
                .collect::<StoreResult<Vec<_>>>()?
        };
        for (_, compiled_model) in &compiled {
            self.connection.ensure_index(compiled_model).await?;
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
            let mut inserted = Vec::with_capacity(items.len());
            for item in items {
                // Only fields that survived compilation are visible on this
                // backend (spec.md §3.2 invariant 4).
                let mut item = {
                    let mut projected = Record::new();
                    for field in &compiled.fields {
                        if let Some(value) = item.get(field.name()) {
                            projected.set(field.name().to_string(), value.clone());
                        }
                    }
                    projected
                };
                let pk = match item.get(&compiled.primary_key_field) {
                    Some(value) => value.as_str().map(str::to_string).unwrap_or_else(|| nanoid!()),
                    None => {
                        let generated = nanoid!();
                        item.set(compiled.primary_key_field.clone(), generated.clone());
                        generated
                    }
                };
                self.connection.set(&compiled, &pk, &item).await?;
                inserted.push(item);
            }
            Ok(inserted)
        })
        .await
    }

    async fn find(&self, model: &str, selector: Option<&SelectorNode>, opts: &StoreOptions) -> StoreResult<Vec<Record>> {
        run_cancellable(opts, async move {
            let compiled = self.compiled_model(model)?;
            let pks = self.resolve_pks(&compiled, selector, opts).await?;
            let mut records = Vec::with_capacity(pks.len());
            for pk in pks {
                if let Some(record) = self.connection.get(&compiled, &pk).await? {
                    records.push(record);
                }
            }
            Ok(records)
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
            let pks = self.resolve_pks(&compiled, selector, opts).await?;
            let mut updated = Vec::with_capacity(pks.len());
            for pk in pks {
                let Some(mut record) = self.connection.get(&compiled, &pk).await? else {
                    continue;
                };
                for (field, value) in updates.iter() {
                    if field == &compiled.primary_key_field {
                        continue;
                    }
                    record.set(field.clone(), value.clone());
                }
                self.connection.set(&compiled, &pk, &record).await?;
                updated.push(record);
            }
            Ok(updated)
        })
        .await
    }

    async fn delete(&self, model: &str, selector: Option<&SelectorNode>, opts: &StoreOptions) -> StoreResult<Vec<Record>> {
        run_cancellable(opts, async move {
            let compiled = self.compiled_model(model)?;
            let pks = self.resolve_pks(&compiled, selector, opts).await?;
            let mut removed = Vec::with_capacity(pks.len());
            for pk in pks {
                if let Some(record) = self.connection.get(&compiled, &pk).await? {
                    self.connection.delete(&compiled, &pk).await?;
                    removed.push(record);
                }
            }
            Ok(removed)
        })
        .await
    }
}

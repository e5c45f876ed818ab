//! Process-scoped store registry (spec.md §4.6) — C6.
//!
//! Grounded in the same `OnceLock<RwLock<HashMap<_>>>` shape the teacher
//! uses for its descriptor registry; lazy insertion is additionally guarded
//! by a `tokio::sync::Mutex` so the slow path (driver connect) can `.await`
//! without poisoning a std lock, while reads after initialization stay
//! lock-free per spec.md §5 "Shared-resource policy".

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, OnceLock, RwLock};

use tokio::sync::Mutex;

use crate::errors::StoreResult;

use super::Store;

fn entries() -> &'static RwLock<HashMap<String, Arc<dyn Store>>> {
    static ENTRIES: OnceLock<RwLock<HashMap<String, Arc<dyn Store>>>> = OnceLock::new();
    ENTRIES.get_or_init(|| RwLock::new(HashMap::new()))
}

fn init_lock() -> &'static Mutex<()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
}

/// `GetStore(kind, uri[, database])` (spec.md §6.3): returns the store
/// already registered for `uri`, or builds one via `init` and registers it.
/// `init` runs at most once per `uri` even under concurrent callers.
pub async fn get_store<F, Fut>(uri: &str, init: F) -> StoreResult<Arc<dyn Store>>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = StoreResult<Arc<dyn Store>>>,
{
    if let Some(store) = entries().read().unwrap().get(uri) {
        return Ok(store.clone());
    }

    let _guard = init_lock().lock().await;
    if let Some(store) = entries().read().unwrap().get(uri) {
        return Ok(store.clone());
    }

    let store = init().await?;
    entries().write().unwrap().insert(uri.to_string(), store.clone());
    Ok(store)
}

/// `ClearStores()` (spec.md §6.3): drops every registered store, for
/// shutdown or test isolation (spec.md §9 "Global registries → explicit
/// lifecycle").
pub fn clear_stores() {
    entries().write().unwrap().clear();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelSpec;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct NoopStore;

    #[async_trait]
    impl Store for NoopStore {
        fn kind(&self) -> super::super::StoreKind {
            super::super::StoreKind::Kv
        }
        async fn register(&self, _models: &[ModelSpec]) -> StoreResult<()> {
            Ok(())
        }
        async fn insert(
            &self,
            _model: &str,
            items: Vec<crate::record::Record>,
            _opts: &super::super::StoreOptions,
        ) -> StoreResult<Vec<crate::record::Record>> {
            Ok(items)
        }
        async fn find(
            &self,
            _model: &str,
            _selector: Option<&crate::selector::SelectorNode>,
            _opts: &super::super::StoreOptions,
        ) -> StoreResult<Vec<crate::record::Record>> {
            Ok(vec![])
        }
        async fn update(
            &self,
            _model: &str,
            _selector: Option<&crate::selector::SelectorNode>,
            _updates: crate::record::Record,
            _opts: &super::super::StoreOptions,
        ) -> StoreResult<Vec<crate::record::Record>> {
            Ok(vec![])
        }
        async fn delete(
            &self,
            _model: &str,
            _selector: Option<&crate::selector::SelectorNode>,
            _opts: &super::super::StoreOptions,
        ) -> StoreResult<Vec<crate::record::Record>> {
            Ok(vec![])
        }
    }

    #[tokio::test]
    async fn reuses_existing_store_for_same_uri() {
        clear_stores();
        let calls = AtomicUsize::new(0);
        let uri = "kv://test-registry-reuse";
        let first = get_store(uri, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(NoopStore) as Arc<dyn Store>)
        })
        .await
        .unwrap();
        let second = get_store(uri, || async { unreachable!("init must not run twice") }).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        clear_stores();
    }
}

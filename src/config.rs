//! Connection pool sizing, timeouts, and the backend URI scheme — loadable
//! from TOML or environment (SPEC_FULL.md C10), consulted by
//! [`crate::store::registry`] when a store is lazily created.

use std::time::Duration;

use serde::Deserialize;

use crate::errors::{StoreError, StoreResult};
use crate::model::Backend;

/// Connection pool shape shared by the relational and document backends;
/// the kv backend's single multiplexed connection (spec.md §5) has no
/// pool of its own.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
    pub idle_timeout_secs: Option<u64>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 0,
            connect_timeout_secs: 10,
            idle_timeout_secs: Some(600),
        }
    }
}

impl PoolConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout_secs.map(Duration::from_secs)
    }
}

/// Configuration for one registered store (spec.md §4.6 `GetStore(kind, uri,
/// database)`).
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    pub backend: BackendKind,
    pub uri: String,
    pub database: Option<String>,
    #[serde(default)]
    pub pool: PoolConfig,
}

/// Mirrors [`Backend`] for deserialization; kept separate so the wire/TOML
/// vocabulary (`relational`/`document`/`kv`) doesn't leak into the compiler
/// and translator's internal type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Relational,
    Document,
    Kv,
}

impl From<BackendKind> for Backend {
    fn from(kind: BackendKind) -> Self {
        match kind {
            BackendKind::Relational => Backend::Relational,
            BackendKind::Document => Backend::Document,
            BackendKind::Kv => Backend::Kv,
        }
    }
}

impl StoreConfig {
    pub fn from_toml(text: &str) -> StoreResult<Self> {
        toml::from_str(text).map_err(|err| StoreError::Other {
            message: format!("invalid store config: {err}").into(),
        })
    }

    /// Reads `{prefix}_BACKEND`, `{prefix}_URI`, `{prefix}_DATABASE`, and
    /// `{prefix}_POOL_MAX_CONNECTIONS` from the environment (teacher pattern
    /// of flat env-var configuration, generalized to three backend kinds).
    pub fn from_env(prefix: &str) -> StoreResult<Self> {
        let backend_raw = std::env::var(format!("{prefix}_BACKEND")).map_err(|_| {
            StoreError::Other {
                message: format!("missing {prefix}_BACKEND").into(),
            }
        })?;
        let backend = match backend_raw.to_lowercase().as_str() {
            "relational" => BackendKind::Relational,
            "document" => BackendKind::Document,
            "kv" => BackendKind::Kv,
            other => {
                return Err(StoreError::Other {
                    message: format!("unknown backend kind '{other}'").into(),
                })
            }
        };
        let uri = std::env::var(format!("{prefix}_URI")).map_err(|_| StoreError::Other {
            message: format!("missing {prefix}_URI").into(),
        })?;
        let database = std::env::var(format!("{prefix}_DATABASE")).ok();
        let mut pool = PoolConfig::default();
        if let Ok(raw) = std::env::var(format!("{prefix}_POOL_MAX_CONNECTIONS")) {
            pool.max_connections = raw.parse().map_err(|_| StoreError::Other {
                message: "invalid pool max_connections".into(),
            })?;
        }
        Ok(Self { backend, uri, database, pool })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_toml() {
        let config = StoreConfig::from_toml(
            r#"
            backend = "relational"
            uri = "sqlite::memory:"
            "#,
        )
        .unwrap();
        assert_eq!(config.backend, BackendKind::Relational);
        assert_eq!(config.pool.max_connections, 10);
    }

    #[test]
    fn rejects_malformed_toml() {
        assert!(StoreConfig::from_toml("not valid toml [[[").is_err());
    }
}

//! `sqlx`-backed [`RelationalConnection`], targeting SQLite to match the
//! `?`-placeholder dialect the translator emits (spec.md §4.4). `postgres`
//! stays in the dependency stack for a future dialect (see DESIGN.md); this
//! adapter only wires the `sqlite` feature up.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Row, SqlitePool};

use crate::errors::StoreResult;
use crate::record::Record;

use super::{RelationalConnection, RelationalTransaction};

macro_rules! bind_params {
    ($query:expr, $params:expr) => {{
        let mut query = $query;
        for param in $params {
            query = match param {
                Value::Null => query.bind(None::<String>),
                Value::Bool(b) => query.bind(*b),
                Value::Number(n) => match n.as_i64() {
                    Some(i) => query.bind(i),
                    None => query.bind(n.as_f64().unwrap_or(0.0)),
                },
                Value::String(s) => query.bind(s.clone()),
                other => query.bind(other.to_string()),
            };
        }
        query
    }};
}

pub struct SqlxRelationalConnection {
    pool: SqlitePool,
}

impl SqlxRelationalConnection {
    /// Wraps an already-connected pool as-is. Callers that need `$regex`
    /// support (spec.md §4.4) must go through [`Self::connect`] instead,
    /// since SQLite has no built-in `REGEXP` and the function has to be
    /// installed on every pooled connection individually.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Opens a pool at `url`, backing the `REGEXP` operator `render_expr`
    /// emits for `$regex` selectors. sqlx's sqlite driver registers a
    /// native `regexp` scalar function on every connection it opens, so
    /// no per-connection setup is required here.
    pub async fn connect(url: &str) -> StoreResult<Self> {
        let pool = SqlitePoolOptions::new().connect(url).await?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl RelationalConnection for SqlxRelationalConnection {
    async fn ensure_table(&self, ddl: &str) -> StoreResult<()> {
        sqlx::query(ddl).execute(&self.pool).await?;
        Ok(())
    }

    async fn fetch_rows(&self, sql: &str, params: &[Value]) -> StoreResult<Vec<Record>> {
        let rows = bind_params!(sqlx::query(sql), params).fetch_all(&self.pool).await?;
        Ok(rows.iter().map(row_to_record).collect())
    }

    async fn execute_returning(&self, sql: &str, params: &[Value]) -> StoreResult<Vec<Record>> {
        let rows = bind_params!(sqlx::query(sql), params).fetch_all(&self.pool).await?;
        Ok(rows.iter().map(row_to_record).collect())
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> StoreResult<u64> {
        let result = bind_params!(sqlx::query(sql), params).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn transaction(&self) -> StoreResult<Box<dyn RelationalTransaction>> {
        let inner = self.pool.begin().await?;
        Ok(Box::new(SqlxTransaction { inner }))
    }
}

struct SqlxTransaction {
    inner: sqlx::Transaction<'static, sqlx::Sqlite>,
}

#[async_trait]
impl RelationalTransaction for SqlxTransaction {
    async fn execute(&mut self, sql: &str, params: &[Value]) -> StoreResult<u64> {
        let result = bind_params!(sqlx::query(sql), params).execute(&mut *self.inner).await?;
        Ok(result.rows_affected())
    }

    async fn execute_returning(&mut self, sql: &str, params: &[Value]) -> StoreResult<Vec<Record>> {
        let rows = bind_params!(sqlx::query(sql), params).fetch_all(&mut *self.inner).await?;
        Ok(rows.iter().map(row_to_record).collect())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.inner.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        self.inner.rollback().await?;
        Ok(())
    }
}

/// SQLite is dynamically typed at storage level, so columns are probed in
/// order (integer, real, bool, text) rather than read against a schema the
/// connection doesn't have access to.
fn row_to_record(row: &SqliteRow) -> Record {
    let mut map = serde_json::Map::new();
    for (index, column) in row.columns().iter().enumerate() {
        map.insert(column.name().to_string(), column_value(row, index));
    }
    Record::from_map(map)
}

fn column_value(row: &SqliteRow, index: usize) -> Value {
    if let Ok(v) = row.try_get::<Option<i64>, _>(index) {
        return v.map(Value::from).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(index) {
        return v
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<bool>, _>(index) {
        return v.map(Value::Bool).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<String>, _>(index) {
        return v.map(Value::String).unwrap_or(Value::Null);
    }
    Value::Null
}

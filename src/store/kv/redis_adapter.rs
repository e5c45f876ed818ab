//! RediSearch-backed [`KvConnection`], generalized from the teacher's
//! fixed-entity `ensure_index`/`execute_search` pair
//! (`str11ngfello-snugom/snugom/src/search/mod.rs`) to any `CompiledModel`:
//! one JSON document per record under `{prefix}:{model}:{pk}`, one
//! `FT.CREATE` index per model over its `indexed` fields.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{cmd, from_redis_value, Value as RedisValue};

use crate::errors::StoreResult;
use crate::model::{CompiledModel, SemanticType};
use crate::record::Record;
use crate::translate::{CompareOp, KvExpr, KvFilter};

use super::KvConnection;
use crate::store::{SortDirection, StoreOptions};

const TAG_SEPARATOR: &str = "|";

pub struct RedisKvConnection {
    connection: ConnectionManager,
    key_prefix: String,
}

impl RedisKvConnection {
    pub fn new(connection: ConnectionManager, key_prefix: impl Into<String>) -> Self {
        Self {
            connection,
            key_prefix: key_prefix.into(),
        }
    }

    fn entity_key(&self, model: &CompiledModel, pk: &str) -> String {
        format!("{}:{}:{}", self.key_prefix, model.table_name, pk)
    }

    fn key_prefix_pattern(&self, model: &CompiledModel) -> String {
        format!("{}:{}:", self.key_prefix, model.table_name)
    }

    fn index_name(&self, model: &CompiledModel) -> String {
        format!("idx:{}:{}", self.key_prefix, model.table_name)
    }
}

#[async_trait]
impl KvConnection for RedisKvConnection {
    async fn ensure_index(&self, model: &CompiledModel) -> StoreResult<()> {
        let mut conn = self.connection.clone();
        let index_name = self.index_name(model);
        let existing: Vec<String> = cmd("FT._LIST").query_async(&mut conn).await?;
        if existing.iter().any(|name| name == &index_name) {
            return Ok(());
        }

        let mut command = cmd("FT.CREATE");
        command.arg(&index_name);
        command.arg("ON").arg("JSON");
        command.arg("PREFIX").arg(1).arg(self.key_prefix_pattern(model));
        command.arg("SCHEMA");
        let mut has_schema_field = false;
        for field in &model.fields {
            if !field.spec.indexed {
                continue;
            }
            has_schema_field = true;
            command.arg(format!("$.{}", field.name()));
            command.arg("AS").arg(field.name());
            match field.semantic_type() {
                SemanticType::Int | SemanticType::Float | SemanticType::Timestamp => {
                    command.arg("NUMERIC");
                }
                SemanticType::Bool => {
                    command.arg("TAG");
                }
                _ => {
                    command.arg("TAG").arg("SEPARATOR").arg(TAG_SEPARATOR);
                }
            }
            if field.spec.sortable {
                command.arg("SORTABLE");
            }
        }
        if !has_schema_field {
            return Ok(());
        }

        if let Err(err) = command.query_async::<()>(&mut conn).await {
            let message = err.to_string().to_ascii_lowercase();
            if message.contains("already exists") && message.contains("index") {
                return Ok(());
            }
            return Err(err.into());
        }
        Ok(())
    }

    async fn get(&self, model: &CompiledModel, pk: &str) -> StoreResult<Option<Record>> {
        let mut conn = self.connection.clone();
        let key = self.entity_key(model, pk);
        let raw: Option<String> = cmd("JSON.GET").arg(&key).query_async(&mut conn).await?;
        Ok(raw.and_then(|json| serde_json::from_str::<serde_json::Value>(&json).ok()).and_then(|v| match v {
            serde_json::Value::Object(map) => Some(Record::from_map(map)),
            _ => None,
        }))
    }

    async fn set(&self, model: &CompiledModel, pk: &str, record: &Record) -> StoreResult<()> {
        let mut conn = self.connection.clone();
        let key = self.entity_key(model, pk);
        let payload = serde_json::Value::Object(record.as_json().clone()).to_string();
        cmd("JSON.SET").arg(&key).arg("$").arg(payload).query_async::<()>(&mut conn).await?;
        Ok(())
    }

    async fn delete(&self, model: &CompiledModel, pk: &str) -> StoreResult<()> {
        let mut conn = self.connection.clone();
        let key = self.entity_key(model, pk);
        cmd("DEL").arg(&key).query_async::<()>(&mut conn).await?;
        Ok(())
    }

    async fn scan_index(&self, model: &CompiledModel, filter: &KvFilter, opts: &StoreOptions) -> StoreResult<Vec<String>> {
        let mut conn = self.connection.clone();
        let index_name = self.index_name(model);
        let query = filter.expr.as_ref().map(render_expr).unwrap_or_else(|| "*".to_string());

        let mut command = cmd("FT.SEARCH");
        command.arg(&index_name);
        command.arg(&query);
        command.arg("NOCONTENT");
        if let Some(sort) = opts.sort.first() {
            let direction = match sort.direction {
                SortDirection::Asc => "ASC",
                SortDirection::Desc => "DESC",
            };
            command.arg("SORTBY").arg(&sort.field).arg(direction);
        }
        let start = opts.skip.unwrap_or(0);
        let count = opts.limit.unwrap_or(10_000);
        command.arg("LIMIT").arg(start).arg(count);
        command.arg("DIALECT").arg(2);

        let raw: RedisValue = command.query_async(&mut conn).await?;
        let values: Vec<RedisValue> = from_redis_value(&raw).map_err(|err| crate::errors::StoreError::Other {
            message: format!("malformed FT.SEARCH response: {err}").into(),
        })?;
        let prefix = self.key_prefix_pattern(model);
        let keys = values.into_iter().skip(1).filter_map(|v| {
            let key: String = from_redis_value(&v).ok()?;
            key.strip_prefix(&prefix).map(str::to_string)
        });
        Ok(keys.collect())
    }
}

fn render_expr(expr: &KvExpr) -> String {
    match expr {
        KvExpr::Compare { field, op, value } => {
            let v = scalar_repr(value);
            match op {
                CompareOp::Eq => format!("@{field}:{{{v}}}"),
                CompareOp::Ne => format!("-@{field}:{{{v}}}"),
                CompareOp::Gt => format!("@{field}:[({v} +inf]"),
                CompareOp::Gte => format!("@{field}:[{v} +inf]"),
                CompareOp::Lt => format!("@{field}:[-inf ({v}]"),
                CompareOp::Lte => format!("@{field}:[-inf {v}]"),
            }
        }
        KvExpr::In { field, values } => {
            let joined = values.iter().map(scalar_repr).collect::<Vec<_>>().join(TAG_SEPARATOR);
            format!("@{field}:{{{joined}}}")
        }
        KvExpr::NotIn { field, values } => {
            let joined = values.iter().map(scalar_repr).collect::<Vec<_>>().join(TAG_SEPARATOR);
            format!("-@{field}:{{{joined}}}")
        }
        KvExpr::IsNull { field } => format!("-@{field}:*"),
        KvExpr::And(parts) => format!("({})", parts.iter().map(render_expr).collect::<Vec<_>>().join(" ")),
        KvExpr::Or(parts) => format!("({})", parts.iter().map(render_expr).collect::<Vec<_>>().join(" | ")),
        KvExpr::Not(inner) => format!("-({})", render_expr(inner)),
    }
}

/// Escapes a scalar for a RediSearch TAG clause (spec.md §4.4 delegates
/// escaping to the driver). Mirrors the teacher's `escape_for_tag_query`
/// character set (`$ { } \ | - .`).
fn scalar_repr(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => escape_tag(s),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        other => escape_tag(&other.to_string()),
    }
}

fn escape_tag(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        if matches!(ch, '$' | '{' | '}' | '\\' | '|' | '-' | '.') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

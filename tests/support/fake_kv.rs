//! In-memory stand-in for [`KvConnection`]: one `HashMap<pk, Record>` per
//! model, `scan_index` evaluating the [`KvExpr`] tree directly instead of
//! building a RediSearch query string.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;
use storecraft::errors::StoreResult;
use storecraft::model::CompiledModel;
use storecraft::record::Record;
use storecraft::store::kv::KvConnection;
use storecraft::store::{SortDirection, StoreOptions};
use storecraft::translate::{CompareOp, KvExpr, KvFilter};

#[derive(Default)]
pub struct FakeKvConnection {
    tables: Mutex<HashMap<String, HashMap<String, Record>>>,
}

impl FakeKvConnection {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvConnection for FakeKvConnection {
    async fn ensure_index(&self, model: &CompiledModel) -> StoreResult<()> {
        self.tables.lock().unwrap().entry(model.table_name.clone()).or_default();
        Ok(())
    }

    async fn get(&self, model: &CompiledModel, pk: &str) -> StoreResult<Option<Record>> {
        Ok(self.tables.lock().unwrap().get(&model.table_name).and_then(|t| t.get(pk)).cloned())
    }

    async fn set(&self, model: &CompiledModel, pk: &str, record: &Record) -> StoreResult<()> {
        self.tables
            .lock()
            .unwrap()
            .entry(model.table_name.clone())
            .or_default()
            .insert(pk.to_string(), record.clone());
        Ok(())
    }

    async fn delete(&self, model: &CompiledModel, pk: &str) -> StoreResult<()> {
        if let Some(table) = self.tables.lock().unwrap().get_mut(&model.table_name) {
            table.remove(pk);
        }
        Ok(())
    }

    async fn scan_index(&self, model: &CompiledModel, filter: &KvFilter, opts: &StoreOptions) -> StoreResult<Vec<String>> {
        let guard = self.tables.lock().unwrap();
        let Some(table) = guard.get(&model.table_name) else {
            return Ok(vec![]);
        };
        let mut matched: Vec<(String, Record)> = table
            .iter()
            .filter(|(_, record)| filter.expr.as_ref().is_none_or(|expr| eval(expr, record)))
            .map(|(pk, record)| (pk.clone(), record.clone()))
            .collect();

        for sort in opts.sort.iter().rev() {
            matched.sort_by(|(_, a), (_, b)| {
                let key = |r: &Record| r.get(&sort.field).map(|v| v.to_string()).unwrap_or_default();
                let ordering = key(a).cmp(&key(b));
                match sort.direction {
                    SortDirection::Asc => ordering,
                    SortDirection::Desc => ordering.reverse(),
                }
            });
        }
        if let Some(skip) = opts.skip {
            matched = matched.into_iter().skip(skip as usize).collect();
        }
        if let Some(limit) = opts.limit {
            matched.truncate(limit as usize);
        }
        Ok(matched.into_iter().map(|(pk, _)| pk).collect())
    }
}

fn eval(expr: &KvExpr, record: &Record) -> bool {
    match expr {
        KvExpr::Compare { field, op, value } => {
            let Some(actual) = record.get(field) else { return false };
            compare(actual, op, value)
        }
        KvExpr::In { field, values } => record.get(field).is_some_and(|v| values.contains(v)),
        KvExpr::NotIn { field, values } => record.get(field).is_none_or(|v| !values.contains(v)),
        KvExpr::IsNull { field } => record.get(field).is_none_or(Value::is_null),
        KvExpr::And(parts) => parts.iter().all(|p| eval(p, record)),
        KvExpr::Or(parts) => parts.iter().any(|p| eval(p, record)),
        KvExpr::Not(inner) => !eval(inner, record),
    }
}

fn compare(actual: &Value, op: &CompareOp, expected: &Value) -> bool {
    match op {
        CompareOp::Eq => actual == expected,
        CompareOp::Ne => actual != expected,
        CompareOp::Gt => numeric_cmp(actual, expected) == Some(std::cmp::Ordering::Greater),
        CompareOp::Gte => matches!(numeric_cmp(actual, expected), Some(std::cmp::Ordering::Greater | std::cmp::Ordering::Equal)),
        CompareOp::Lt => numeric_cmp(actual, expected) == Some(std::cmp::Ordering::Less),
        CompareOp::Lte => matches!(numeric_cmp(actual, expected), Some(std::cmp::Ordering::Less | std::cmp::Ordering::Equal)),
    }
}

fn numeric_cmp(a: &Value, b: &Value) -> Option<std::cmp::Ordering> {
    a.as_f64()?.partial_cmp(&b.as_f64()?)
}

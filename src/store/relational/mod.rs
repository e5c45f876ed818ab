//! Relational Store driver (spec.md §4.5.1) — the hard half of C5: bulk
//! embedded-relation inserts, replace-semantics on update, and the
//! `id IN (subquery)` rewrite for predicates that cross a relation.

pub mod sqlx_adapter;

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use crate::errors::{SchemaError, StoreError, StoreResult};
use crate::model::{Backend, Cardinality, CompiledModel, ModelRegistry, ModelSpec};
use crate::record::Record;
use crate::selector::SelectorNode;
use crate::translate::{self, CompareOp, JoinSpec, RelExpr, RelationalFilter};

use super::{run_cancellable, SortDirection, Store, StoreKind, StoreOptions};

/// The minimal operations this crate requires of a relational driver
/// (SPEC_FULL.md C7), enough to implement insert/find/update/delete with
/// the join and subquery rewrites of spec.md §4.4/§4.5.1.
#[async_trait]
pub trait RelationalConnection: Send + Sync {
    async fn ensure_table(&self, ddl: &str) -> StoreResult<()>;
    async fn fetch_rows(&self, sql: &str, params: &[Value]) -> StoreResult<Vec<Record>>;
    async fn execute_returning(&self, sql: &str, params: &[Value]) -> StoreResult<Vec<Record>>;
    async fn execute(&self, sql: &str, params: &[Value]) -> StoreResult<u64>;
    async fn transaction(&self) -> StoreResult<Box<dyn RelationalTransaction>>;
}

/// A scope in which the delete-then-insert pair of a relation replace runs
/// atomically (spec.md §5 "committed atomically").
#[async_trait]
pub trait RelationalTransaction: Send + Sync {
    async fn execute(&mut self, sql: &str, params: &[Value]) -> StoreResult<u64>;
    async fn execute_returning(&mut self, sql: &str, params: &[Value]) -> StoreResult<Vec<Record>>;
    async fn commit(self: Box<Self>) -> StoreResult<()>;
    async fn rollback(self: Box<Self>) -> StoreResult<()>;
}

pub struct RelationalStore<C: RelationalConnection> {
    connection: C,
    registry: RwLock<ModelRegistry>,
    compiled: RwLock<HashMap<String, CompiledModel>>,
}

impl<C: RelationalConnection> RelationalStore<C> {
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

    fn translate_filter(&self, compiled: &CompiledModel, selector: Option<&SelectorNode>) -> StoreResult<RelationalFilter> {
        let Some(selector) = selector else {
            return Ok(RelationalFilter::default());
        };
        let registry = self.registry.read().unwrap();
        let (filter, warnings) = translate::relational::translate(&registry, compiled, selector)?;
        for warning in warnings {
            warn!(operator = %warning.operator, field = ?warning.field, backend = ?warning.backend, "operator skipped by translator");
        }
        Ok(filter)
    }

    fn sql_type(ty: crate::model::SemanticType) -> &'static str {
        use crate::model::SemanticType::*;
        match ty {
            Int | Reference => "INTEGER",
            Float => "REAL",
            String | Json => "TEXT",
            Bool => "BOOLEAN",
            Timestamp => "TIMESTAMP",
            Bytes => "BLOB",
        }
    }

    fn child_fk_column(parent_model: &str) -> String {
        format!("{}_id", parent_model.to_lowercase())
    }

    fn build_create_table(&self, compiled: &CompiledModel) -> String {
        let mut columns = Vec::with_capacity(compiled.fields.len() + compiled.relations.len());
        for field in &compiled.fields {
            let mut column = format!("{} {}", field.name(), Self::sql_type(field.semantic_type()));
            if field.is_primary_key {
                column.push_str(" PRIMARY KEY AUTOINCREMENT");
            } else if !field.spec.nullable {
                column.push_str(" NOT NULL");
            }
            if field.spec.unique && !field.is_primary_key {
                column.push_str(" UNIQUE");
            }
            columns.push(column);
        }
        format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            compiled.table_name,
            columns.join(", ")
        )
    }

    /// DDL for the implicit child/link tables a one-to-many or many-to-many
    /// relation needs (spec.md §6.4 "columns include foreign-key
    /// constraints").
    fn build_relation_tables(&self, registry: &ModelRegistry, compiled: &CompiledModel) -> Vec<String> {
        let mut ddl = Vec::new();
        for relation in compiled.relations.values() {
            if relation.cardinality() != Cardinality::Many {
                continue;
            }
            if let Some(link_model) = &relation.spec.link_model {
                if let Ok(link_compiled) = registry.compile(link_model, Backend::Relational) {
                    let parent_fk = Self::child_fk_column(&compiled.name);
                    let child_fk = Self::child_fk_column(&relation.target);
                    ddl.push(format!(
                        "CREATE TABLE IF NOT EXISTS {} ({} INTEGER PRIMARY KEY, {} INTEGER NOT NULL, {} INTEGER NOT NULL)",
                        link_compiled.table_name, link_compiled.primary_key_field, parent_fk, child_fk
                    ));
                }
            } else if let Ok(child_compiled) = registry.compile(&relation.target, Backend::Relational) {
                let fk = Self::child_fk_column(&compiled.name);
                ddl.push(format!(
                    "ALTER TABLE {} ADD COLUMN {} INTEGER REFERENCES {}({})",
                    child_compiled.table_name, fk, compiled.table_name, compiled.primary_key_field
                ));
            }
        }
        ddl
    }

    fn build_select(&self, compiled: &CompiledModel, filter: &RelationalFilter, opts: &StoreOptions) -> (String, Vec<Value>) {
        // The translator emits base-table leaf predicates aliased as the
        // model's own table name (not a synthetic "self"), so the base
        // table must be scanned under that same name for `WHERE` to resolve.
        let self_alias = compiled.table_name.as_str();
        let mut sql = format!("SELECT DISTINCT {self_alias}.* FROM {}", compiled.table_name);
        let registry = self.registry.read().unwrap();
        for join in &filter.joins {
            sql.push_str(&self.join_clause(&registry, compiled, self_alias, join));
        }
        let mut params = Vec::new();
        if let Some(expr) = &filter.expr {
            sql.push_str(" WHERE ");
            sql.push_str(&render_expr(expr, self_alias, &mut params));
        }
        if !opts.sort.is_empty() {
            let order = opts
                .sort
                .iter()
                .map(|s| {
                    let dir = match s.direction {
                        SortDirection::Asc => "ASC",
                        SortDirection::Desc => "DESC",
                    };
                    format!("{self_alias}.{} {dir}", s.field)
                })
                .collect::<Vec<_>>()
                .join(", ");
            sql.push_str(&format!(" ORDER BY {order}"));
        }
        if let Some(limit) = opts.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        if let Some(skip) = opts.skip {
            sql.push_str(&format!(" OFFSET {skip}"));
        }
        (sql, params)
    }

    fn join_clause(&self, registry: &ModelRegistry, compiled: &CompiledModel, self_alias: &str, join: &JoinSpec) -> String {
        let child = registry
            .compile(&join.to_model, Backend::Relational)
            .unwrap_or_else(|_| panic!("join target '{}' must be registered", join.to_model));
        if join.is_many_to_many {
            let relation = compiled.relation(&join.relation_name);
            let link_model = relation.and_then(|r| r.spec.link_model.clone()).unwrap_or_default();
            let link = registry.compile(&link_model, Backend::Relational).unwrap_or_else(|_| panic!("link model '{link_model}' must be registered"));
            let link_alias = format!("{}_link", join.alias);
            let parent_fk = Self::child_fk_column(&join.from_model);
            let child_fk = Self::child_fk_column(&join.to_model);
            format!(
                " INNER JOIN {} AS {link_alias} ON {self_alias}.{} = {link_alias}.{parent_fk} INNER JOIN {} AS {} ON {link_alias}.{child_fk} = {}.{}",
                link.table_name, compiled.primary_key_field, child.table_name, join.alias, join.alias, child.primary_key_field
            )
        } else {
            let fk = Self::child_fk_column(&join.from_model);
            format!(
                " INNER JOIN {} AS {} ON {self_alias}.{} = {}.{fk}",
                child.table_name, join.alias, compiled.primary_key_field, join.alias
            )
        }
    }

    /// The `id IN (subquery)` rewrite required for update/delete whose
    /// predicate crosses a relation (spec.md §4.4).
    fn build_predicate(&self, compiled: &CompiledModel, filter: &RelationalFilter) -> (String, Vec<Value>) {
        if filter.touches_relations() {
            let (select_sql, params) = self.build_select(compiled, filter, &StoreOptions::default());
            let subquery = select_sql.replacen(
                &format!("SELECT DISTINCT {0}.* FROM {0}", compiled.table_name),
                &format!("SELECT DISTINCT {0}.{1} FROM {0}", compiled.table_name, compiled.primary_key_field),
                1,
            );
            (format!("{} IN ({})", compiled.primary_key_field, subquery), params)
        } else {
            let mut params = Vec::new();
            let expr = filter
                .expr
                .as_ref()
                .map(|e| render_expr(e, &compiled.table_name, &mut params))
                .unwrap_or_else(|| "1=1".to_string());
            (expr, params)
        }
    }

    async fn fetch_ids(&self, compiled: &CompiledModel, filter: &RelationalFilter) -> StoreResult<Vec<Value>> {
        let (predicate, params) = self.build_predicate(compiled, filter);
        let sql = format!("SELECT {} FROM {} WHERE {predicate}", compiled.primary_key_field, compiled.table_name);
        let rows = self.connection.fetch_rows(&sql, &params).await?;
        Ok(rows.into_iter().filter_map(|r| r.get(&compiled.primary_key_field).cloned()).collect())
    }

    async fn fetch_relations(&self, compiled: &CompiledModel, parent_ids: &[Value]) -> StoreResult<HashMap<String, Record>> {
        let mut by_id: HashMap<String, Record> = HashMap::new();
        if parent_ids.is_empty() {
            return Ok(by_id);
        }
        let placeholders = std::iter::repeat("?").take(parent_ids.len()).collect::<Vec<_>>().join(",");
        let sql = format!(
            "SELECT * FROM {} WHERE {} IN ({placeholders})",
            compiled.table_name, compiled.primary_key_field
        );
        let rows = self.connection.fetch_rows(&sql, parent_ids).await?;
        for row in rows {
            if let Some(id) = row.get(&compiled.primary_key_field) {
                by_id.insert(id.to_string(), row);
            }
        }

        let registry = self.registry.read().unwrap();
        for (relation_name, relation) in &compiled.relations {
            if relation.cardinality() != Cardinality::Many {
                continue;
            }
            let Ok(child_compiled) = registry.compile(&relation.target, Backend::Relational) else {
                continue;
            };
            let grouped = if relation.is_many_to_many() {
                self.fetch_many_to_many_children(&registry, compiled, &child_compiled, relation, parent_ids).await?
            } else {
                self.fetch_one_to_many_children(compiled, &child_compiled, parent_ids).await?
            };
            for (parent_id, children) in grouped {
                if let Some(parent) = by_id.get_mut(&parent_id) {
                    parent.set(relation_name.clone(), Value::Array(children.into_iter().map(|c| c.as_json().clone().into()).collect()));
                }
            }
        }
        Ok(by_id)
    }

    async fn fetch_one_to_many_children(
        &self,
        compiled: &CompiledModel,
        child_compiled: &CompiledModel,
        parent_ids: &[Value],
    ) -> StoreResult<HashMap<String, Vec<Record>>> {
        let fk = Self::child_fk_column(&compiled.name);
        let placeholders = std::iter::repeat("?").take(parent_ids.len()).collect::<Vec<_>>().join(",");
        let sql = format!("SELECT * FROM {} WHERE {fk} IN ({placeholders})", child_compiled.table_name);
        let rows = self.connection.fetch_rows(&sql, parent_ids).await?;
        let mut grouped: HashMap<String, Vec<Record>> = HashMap::new();
        for row in rows {
            if let Some(parent_id) = row.get(&fk) {
                grouped.entry(parent_id.to_string()).or_default().push(row);
            }
        }
        Ok(grouped)
    }

    async fn fetch_many_to_many_children(
        &self,
        registry: &ModelRegistry,
        compiled: &CompiledModel,
        child_compiled: &CompiledModel,
        relation: &crate::model::CompiledRelation,
        parent_ids: &[Value],
    ) -> StoreResult<HashMap<String, Vec<Record>>> {
        let link_model = relation.spec.link_model.clone().unwrap_or_default();
        let link_compiled = registry.compile(&link_model, Backend::Relational)?;
        let parent_fk = Self::child_fk_column(&compiled.name);
        let child_fk = Self::child_fk_column(&relation.target);
        let placeholders = std::iter::repeat("?").take(parent_ids.len()).collect::<Vec<_>>().join(",");
        let sql = format!(
            "SELECT link.{parent_fk} AS __parent_id, child.* FROM {} AS link INNER JOIN {} AS child ON link.{child_fk} = child.{} WHERE link.{parent_fk} IN ({placeholders})",
            link_compiled.table_name, child_compiled.table_name, child_compiled.primary_key_field
        );
        let rows = self.connection.fetch_rows(&sql, parent_ids).await?;
        let mut grouped: HashMap<String, Vec<Record>> = HashMap::new();
        for mut row in rows {
            if let Some(parent_id) = row.remove("__parent_id") {
                grouped.entry(parent_id.to_string()).or_default().push(row);
            }
        }
        Ok(grouped)
    }

    async fn insert_embedded_relations(&self, compiled: &CompiledModel, parent_id: &Value, item: &Record) -> StoreResult<()> {
        let registry = self.registry.read().unwrap();
        for (relation_name, relation) in &compiled.relations {
            let Some(Value::Array(children)) = item.get(relation_name) else {
                continue;
            };
            let Ok(child_compiled) = registry.compile(&relation.target, Backend::Relational) else {
                continue;
            };
            if relation.is_many_to_many() {
                self.insert_many_to_many(&registry, compiled, &child_compiled, relation, parent_id, children).await?;
            } else {
                self.insert_one_to_many(compiled, &child_compiled, parent_id, children).await?;
            }
        }
        Ok(())
    }

    async fn insert_one_to_many(&self, compiled: &CompiledModel, child_compiled: &CompiledModel, parent_id: &Value, children: &[Value]) -> StoreResult<()> {
        let fk = Self::child_fk_column(&compiled.name);
        for child in children {
            let Value::Object(fields) = child else { continue };
            let mut columns: Vec<String> = fields.keys().cloned().collect();
            let mut values: Vec<Value> = fields.values().cloned().collect();
            columns.push(fk.clone());
            values.push(parent_id.clone());
            let placeholders = vec!["?"; values.len()].join(",");
            let sql = format!(
                "INSERT INTO {} ({}) VALUES ({placeholders}) ON CONFLICT DO NOTHING",
                child_compiled.table_name,
                columns.join(",")
            );
            self.connection.execute(&sql, &values).await?;
        }
        Ok(())
    }

    async fn insert_many_to_many(
        &self,
        registry: &ModelRegistry,
        compiled: &CompiledModel,
        child_compiled: &CompiledModel,
        relation: &crate::model::CompiledRelation,
        parent_id: &Value,
        children: &[Value],
    ) -> StoreResult<()> {
        let link_model = relation.spec.link_model.clone().unwrap_or_default();
        let link_compiled = registry.compile(&link_model, Backend::Relational)?;
        let parent_fk = Self::child_fk_column(&compiled.name);
        let child_fk = Self::child_fk_column(&relation.target);
        for child in children {
            let Value::Object(fields) = child else { continue };
            let child_id = match fields.get(&child_compiled.primary_key_field) {
                Some(existing) => existing.clone(),
                None => {
                    let columns: Vec<String> = fields.keys().cloned().collect();
                    let values: Vec<Value> = fields.values().cloned().collect();
                    let placeholders = vec!["?"; values.len()].join(",");
                    let sql = format!(
                        "INSERT INTO {} ({}) VALUES ({placeholders}) ON CONFLICT DO NOTHING RETURNING *",
                        child_compiled.table_name,
                        columns.join(",")
                    );
                    let inserted = self.connection.execute_returning(&sql, &values).await?;
                    inserted
                        .first()
                        .and_then(|r| r.get(&child_compiled.primary_key_field).cloned())
                        .ok_or_else(|| StoreError::Other {
                            message: "many-to-many child insert returned no id".into(),
                        })?
                }
            };
            // Link-row ids assigned from `max(id)+1` (spec.md §4.5.1 step 4).
            let sql = format!(
                "INSERT INTO {} ({}, {parent_fk}, {child_fk}) VALUES ((SELECT COALESCE(MAX({}), 0) + 1 FROM {}), ?, ?)",
                link_compiled.table_name, link_compiled.primary_key_field, link_compiled.primary_key_field, link_compiled.table_name
            );
            self.connection.execute(&sql, &[parent_id.clone(), child_id]).await?;
        }
        Ok(())
    }

    async fn replace_relation(&self, compiled: &CompiledModel, relation_name: &str, parent_ids: &[Value], new_children: &[Value]) -> StoreResult<()> {
        let registry = self.registry.read().unwrap();
        let Some(relation) = compiled.relation(relation_name) else {
            return Err(StoreError::Other {
                message: format!("unknown relation '{relation_name}' on model '{}'", compiled.name).into(),
            });
        };
        let child_compiled = registry.compile(&relation.target, Backend::Relational)?;
        let mut txn = self.connection.transaction().await?;
        let result: StoreResult<()> = async {
            if relation.is_many_to_many() {
                let link_model = relation.spec.link_model.clone().unwrap_or_default();
                let link_compiled = registry.compile(&link_model, Backend::Relational)?;
                let parent_fk = Self::child_fk_column(&compiled.name);
                let placeholders = vec!["?"; parent_ids.len()].join(",");
                txn.execute(
                    &format!("DELETE FROM {} WHERE {parent_fk} IN ({placeholders})", link_compiled.table_name),
                    parent_ids,
                )
                .await?;
            } else {
                let fk = Self::child_fk_column(&compiled.name);
                let placeholders = vec!["?"; parent_ids.len()].join(",");
                txn.execute(
                    &format!("DELETE FROM {} WHERE {fk} IN ({placeholders})", child_compiled.table_name),
                    parent_ids,
                )
                .await?;
            }
            for parent_id in parent_ids {
                for child in new_children {
                    let Value::Object(fields) = child else { continue };
                    if relation.is_many_to_many() {
                        let link_model = relation.spec.link_model.clone().unwrap_or_default();
                        let link_compiled = registry.compile(&link_model, Backend::Relational)?;
                        let parent_fk = Self::child_fk_column(&compiled.name);
                        let child_fk = Self::child_fk_column(&relation.target);
                        let child_columns: Vec<String> = fields.keys().cloned().collect();
                        let child_values: Vec<Value> = fields.values().cloned().collect();
                        let child_placeholders = vec!["?"; child_values.len()].join(",");
                        let inserted = txn
                            .execute_returning(
                                &format!(
                                    "INSERT INTO {} ({}) VALUES ({child_placeholders}) ON CONFLICT DO NOTHING RETURNING *",
                                    child_compiled.table_name,
                                    child_columns.join(",")
                                ),
                                &child_values,
                            )
                            .await?;
                        let child_id = inserted.first().and_then(|r| r.get(&child_compiled.primary_key_field).cloned()).unwrap_or(Value::Null);
                        txn.execute(
                            &format!(
                                "INSERT INTO {} ({}, {parent_fk}, {child_fk}) VALUES ((SELECT COALESCE(MAX({}), 0) + 1 FROM {}), ?, ?)",
                                link_compiled.table_name, link_compiled.primary_key_field, link_compiled.primary_key_field, link_compiled.table_name
                            ),
                            &[parent_id.clone(), child_id],
                        )
                        .await?;
                    } else {
                        let fk = Self::child_fk_column(&compiled.name);
                        let mut columns: Vec<String> = fields.keys().cloned().collect();
                        let mut values: Vec<Value> = fields.values().cloned().collect();
                        columns.push(fk.clone());
                        values.push(parent_id.clone());
                        let placeholders = vec!["?"; values.len()].join(",");
                        txn.execute(
                            &format!("INSERT INTO {} ({}) VALUES ({placeholders})", child_compiled.table_name, columns.join(",")),
                            &values,
                        )
                        .await?;
                    }
                }
            }
            Ok(())
        }
        .await;

        match result {
            Ok(()) => txn.commit().await,
            Err(err) => {
                txn.rollback().await?;
                Err(err)
            }
        }
    }
}

fn render_expr(expr: &RelExpr, default_alias: &str, params: &mut Vec<Value>) -> String {
    match expr {
        RelExpr::Compare { alias, column, op, value } => {
            params.push(value.clone());
            format!("{alias}.{column} {} ?", compare_sql(*op))
        }
        RelExpr::In { alias, column, values } => {
            let placeholders = vec!["?"; values.len()].join(",");
            params.extend(values.iter().cloned());
            format!("{alias}.{column} IN ({placeholders})")
        }
        RelExpr::NotIn { alias, column, values } => {
            let placeholders = vec!["?"; values.len()].join(",");
            params.extend(values.iter().cloned());
            format!("{alias}.{column} NOT IN ({placeholders})")
        }
        RelExpr::Regex { alias, column, pattern, flags } => {
            let pattern = match flags {
                Some(f) => format!("(?{f}){pattern}"),
                None => pattern.clone(),
            };
            params.push(Value::String(pattern));
            // SQLite has no built-in REGEXP; `SqlxRelationalConnection::connect`
            // installs the `regexp` scalar function this operator dispatches to.
            format!("{alias}.{column} REGEXP ?")
        }
        RelExpr::IsNull { alias, column } => format!("{alias}.{column} IS NULL"),
        RelExpr::IsNotNull { alias, column } => format!("{alias}.{column} IS NOT NULL"),
        RelExpr::And(parts) => format!("({})", parts.iter().map(|p| render_expr(p, default_alias, params)).collect::<Vec<_>>().join(" AND ")),
        RelExpr::Or(parts) => format!("({})", parts.iter().map(|p| render_expr(p, default_alias, params)).collect::<Vec<_>>().join(" OR ")),
        RelExpr::Not(inner) => format!("NOT ({})", render_expr(inner, default_alias, params)),
    }
}

fn compare_sql(op: CompareOp) -> &'static str {
    match op {
        CompareOp::Eq => "=",
        CompareOp::Ne => "!=",
        CompareOp::Gt => ">",
        CompareOp::Gte => ">=",
        CompareOp::Lt => "<",
        CompareOp::Lte => "<=",
    }
}

#[async_trait]
impl<C: RelationalConnection> Store for RelationalStore<C> {
    fn kind(&self) -> StoreKind {
        StoreKind::Relational
    }

    async fn register(&self, models: &[ModelSpec]) -> StoreResult<()> {
        {
            let mut registry = self.registry.write().unwrap();
            for spec in models {
                registry.register(spec.clone())?;
            }
        }
        let registry = self.registry.read().unwrap();
        let mut compiled_guard = self.compiled.write().unwrap();
        for spec in models {
            let compiled = registry.compile(&spec.name, Backend::Relational)?;
            self.connection.ensure_table(&self.build_create_table(&compiled)).await?;
            for ddl in self.build_relation_tables(&registry, &compiled) {
                self.connection.ensure_table(&ddl).await?;
            }
            compiled_guard.insert(spec.name.clone(), compiled);
        }
        Ok(())
    }

    async fn insert(&self, model: &str, items: Vec<Record>, opts: &StoreOptions) -> StoreResult<Vec<Record>> {
        run_cancellable(opts, async move {
            let compiled = self.compiled_model(model)?;
            let mut inserted_ids = Vec::with_capacity(items.len());
            for item in &items {
                let mut columns = Vec::new();
                let mut values = Vec::new();
                for field in &compiled.fields {
                    if field.is_primary_key && item.get(field.name()).is_none() {
                        continue;
                    }
                    if let Some(value) = item.get(field.name()) {
                        columns.push(field.name().to_string());
                        values.push(value.clone());
                    }
                }
                let placeholders = vec!["?"; values.len()].join(",");
                let sql = format!(
                    "INSERT INTO {} ({}) VALUES ({placeholders}) ON CONFLICT DO NOTHING RETURNING *",
                    compiled.table_name,
                    columns.join(",")
                );
                let rows = self.connection.execute_returning(&sql, &values).await?;
                let Some(row) = rows.into_iter().next() else {
                    continue;
                };
                let parent_id = row.get(&compiled.primary_key_field).cloned().ok_or_else(|| StoreError::Other {
                    message: "insert did not return a primary key".into(),
                })?;
                self.insert_embedded_relations(&compiled, &parent_id, item).await?;
                inserted_ids.push(parent_id);
            }
            let by_id = self.fetch_relations(&compiled, &inserted_ids).await?;
            Ok(inserted_ids.into_iter().filter_map(|id| by_id.get(&id.to_string()).cloned()).collect())
        })
        .await
    }

    async fn find(&self, model: &str, selector: Option<&SelectorNode>, opts: &StoreOptions) -> StoreResult<Vec<Record>> {
        run_cancellable(opts, async move {
            let compiled = self.compiled_model(model)?;
            let filter = self.translate_filter(&compiled, selector)?;
            let (sql, params) = self.build_select(&compiled, &filter, opts);
            let rows = self.connection.fetch_rows(&sql, &params).await?;
            let ids: Vec<Value> = rows.iter().filter_map(|r| r.get(&compiled.primary_key_field).cloned()).collect();
            let by_id = self.fetch_relations(&compiled, &ids).await?;
            Ok(ids.into_iter().filter_map(|id| by_id.get(&id.to_string()).cloned()).collect())
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
            let ids = self.fetch_ids(&compiled, &filter).await?;
            if ids.is_empty() {
                return Ok(vec![]);
            }

            let mut scalar_assignments = Vec::new();
            let mut scalar_values = Vec::new();
            for field in &compiled.fields {
                if field.is_primary_key {
                    continue;
                }
                if let Some(value) = updates.get(field.name()) {
                    scalar_assignments.push(format!("{} = ?", field.name()));
                    scalar_values.push(value.clone());
                }
            }
            if !scalar_assignments.is_empty() {
                let placeholders = vec!["?"; ids.len()].join(",");
                let sql = format!(
                    "UPDATE {} SET {} WHERE {} IN ({placeholders})",
                    compiled.table_name,
                    scalar_assignments.join(", "),
                    compiled.primary_key_field
                );
                scalar_values.extend(ids.iter().cloned());
                self.connection.execute(&sql, &scalar_values).await?;
            }

            for (relation_name, _relation) in &compiled.relations {
                if let Some(Value::Array(new_children)) = updates.get(relation_name) {
                    self.replace_relation(&compiled, relation_name, &ids, new_children).await?;
                }
            }

            let by_id = self.fetch_relations(&compiled, &ids).await?;
            Ok(ids.into_iter().filter_map(|id| by_id.get(&id.to_string()).cloned()).collect())
        })
        .await
    }

    async fn delete(&self, model: &str, selector: Option<&SelectorNode>, opts: &StoreOptions) -> StoreResult<Vec<Record>> {
        run_cancellable(opts, async move {
            let compiled = self.compiled_model(model)?;
            let filter = self.translate_filter(&compiled, selector)?;
            let pre_image = self.find(model, selector, opts).await?;
            let ids = self.fetch_ids(&compiled, &filter).await?;
            if !ids.is_empty() {
                let placeholders = vec!["?"; ids.len()].join(",");
                let sql = format!("DELETE FROM {} WHERE {} IN ({placeholders})", compiled.table_name, compiled.primary_key_field);
                self.connection.execute(&sql, &ids).await?;
            }
            Ok(pre_image)
        })
        .await
    }
}

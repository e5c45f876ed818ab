//! Relational emission (spec.md §4.4): a tree of column-expressions plus
//! the join set needed to reach every relation a filter touches. The Store
//! layer is responsible for turning this into SQL text and, for
//! update/delete, for applying the `id IN (subquery)` rewrite (spec.md
//! §4.4 "Dotted-path resolution").

use serde_json::Value;

use crate::errors::TranslationError;
use crate::model::{Backend, CompiledModel, ModelRegistry};
use crate::selector::{OperatorNode, SelectorNode};

use super::{resolve_path, Warning};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

/// A single relation crossed by some filter in the tree, to be realized as
/// an `INNER JOIN` by the relational store (spec.md §4.5.1 step 2).
#[derive(Debug, Clone, PartialEq)]
pub struct JoinSpec {
    pub alias: String,
    pub relation_name: String,
    pub from_model: String,
    pub to_model: String,
    pub is_many_to_many: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RelExpr {
    Compare {
        alias: String,
        column: String,
        op: CompareOp,
        value: Value,
    },
    In {
        alias: String,
        column: String,
        values: Vec<Value>,
    },
    NotIn {
        alias: String,
        column: String,
        values: Vec<Value>,
    },
    /// `flags` carries the `$options` string; the SQLite dialect prepends
    /// `(?flags)` to the pattern itself (spec.md §4.4 "Regex semantics").
    Regex {
        alias: String,
        column: String,
        pattern: String,
        flags: Option<String>,
    },
    IsNull {
        alias: String,
        column: String,
    },
    IsNotNull {
        alias: String,
        column: String,
    },
    And(Vec<RelExpr>),
    Or(Vec<RelExpr>),
    Not(Box<RelExpr>),
}

#[derive(Debug, Clone, Default)]
pub struct RelationalFilter {
    pub expr: Option<RelExpr>,
    pub joins: Vec<JoinSpec>,
}

impl RelationalFilter {
    /// `true` when the filter references at least one related table, which
    /// is what triggers the `id IN (subquery)` rewrite on update/delete
    /// (spec.md §4.4).
    pub fn touches_relations(&self) -> bool {
        !self.joins.is_empty()
    }
}

pub fn translate(
    registry: &ModelRegistry,
    model: &CompiledModel,
    selector: &SelectorNode,
) -> Result<(RelationalFilter, Vec<Warning>), TranslationError> {
    let mut joins: Vec<JoinSpec> = Vec::new();
    let mut warnings = Vec::new();
    let expr = emit_node(registry, model, selector, &mut joins, &mut warnings)?;
    Ok((RelationalFilter { expr, joins }, warnings))
}

fn emit_node(
    registry: &ModelRegistry,
    model: &CompiledModel,
    node: &SelectorNode,
    joins: &mut Vec<JoinSpec>,
    warnings: &mut Vec<Warning>,
) -> Result<Option<RelExpr>, TranslationError> {
    match node {
        SelectorNode::Root(children) | SelectorNode::And(children) => {
            let parts = emit_many(registry, model, children, joins, warnings)?;
            Ok(and_of(parts))
        }
        SelectorNode::Or(children) => {
            let parts = emit_many(registry, model, children, joins, warnings)?;
            Ok(or_of(parts))
        }
        SelectorNode::Nor(children) => {
            let parts = emit_many(registry, model, children, joins, warnings)?;
            Ok(or_of(parts).map(|or| RelExpr::Not(Box::new(or))))
        }
        SelectorNode::Field { path, children } => {
            let resolved = resolve_path(registry, Backend::Relational, model, path)?;
            for hop in &resolved.hops {
                push_join(joins, hop);
            }
            let alias = resolved
                .hops
                .last()
                .map(|h| h.relation_name.clone())
                .unwrap_or_else(|| model.table_name.clone());
            let column = resolved.field.name().to_string();

            let mut parts = Vec::with_capacity(children.len());
            for op in children {
                if let Some(expr) = emit_operator(&alias, &column, op, path, warnings)? {
                    parts.push(expr);
                }
            }
            Ok(and_of(parts))
        }
        SelectorNode::BackendOnly { operator, backends, .. } => {
            if !backends.contains(&Backend::Relational) {
                warnings.push(Warning::new(operator.clone(), None, Backend::Relational));
            }
            Ok(None)
        }
    }
}

fn emit_many(
    registry: &ModelRegistry,
    model: &CompiledModel,
    nodes: &[SelectorNode],
    joins: &mut Vec<JoinSpec>,
    warnings: &mut Vec<Warning>,
) -> Result<Vec<RelExpr>, TranslationError> {
    let mut parts = Vec::with_capacity(nodes.len());
    for node in nodes {
        if let Some(expr) = emit_node(registry, model, node, joins, warnings)? {
            parts.push(expr);
        }
    }
    Ok(parts)
}

fn emit_operator(
    alias: &str,
    column: &str,
    op: &OperatorNode,
    path: &str,
    warnings: &mut Vec<Warning>,
) -> Result<Option<RelExpr>, TranslationError> {
    let cmp = |op: CompareOp, v: &Value| RelExpr::Compare {
        alias: alias.to_string(),
        column: column.to_string(),
        op,
        value: v.clone(),
    };
    Ok(match op {
        OperatorNode::Eq(v) if v.is_null() => Some(RelExpr::IsNull {
            alias: alias.to_string(),
            column: column.to_string(),
        }),
        OperatorNode::Ne(v) if v.is_null() => Some(RelExpr::IsNotNull {
            alias: alias.to_string(),
            column: column.to_string(),
        }),
        OperatorNode::Eq(v) => Some(cmp(CompareOp::Eq, v)),
        OperatorNode::Ne(v) => Some(cmp(CompareOp::Ne, v)),
        OperatorNode::Gt(v) => Some(cmp(CompareOp::Gt, v)),
        OperatorNode::Gte(v) => Some(cmp(CompareOp::Gte, v)),
        OperatorNode::Lt(v) => Some(cmp(CompareOp::Lt, v)),
        OperatorNode::Lte(v) => Some(cmp(CompareOp::Lte, v)),
        OperatorNode::In(values) => Some(RelExpr::In {
            alias: alias.to_string(),
            column: column.to_string(),
            values: values.clone(),
        }),
        OperatorNode::Nin(values) => Some(RelExpr::NotIn {
            alias: alias.to_string(),
            column: column.to_string(),
            values: values.clone(),
        }),
        OperatorNode::Regex { pattern, options } => Some(RelExpr::Regex {
            alias: alias.to_string(),
            column: column.to_string(),
            pattern: pattern.clone(),
            flags: options.clone(),
        }),
        OperatorNode::Not(inner) => {
            let mut parts = Vec::with_capacity(inner.len());
            for child in inner {
                if let Some(expr) = emit_operator(alias, column, child, path, warnings)? {
                    parts.push(expr);
                }
            }
            and_of(parts).map(|e| RelExpr::Not(Box::new(e)))
        }
        OperatorNode::BackendOnly { operator, backends, .. } => {
            if !backends.contains(&Backend::Relational) {
                warnings.push(Warning::new(operator.clone(), Some(path.to_string()), Backend::Relational));
            }
            None
        }
    })
}

fn push_join(joins: &mut Vec<JoinSpec>, hop: &super::RelationHop) {
    if joins.iter().any(|j| j.alias == hop.relation_name) {
        return;
    }
    joins.push(JoinSpec {
        alias: hop.relation_name.clone(),
        relation_name: hop.relation_name.clone(),
        from_model: hop.from_model.clone(),
        to_model: hop.to_model.clone(),
        is_many_to_many: hop.is_many_to_many,
    });
}

fn and_of(mut parts: Vec<RelExpr>) -> Option<RelExpr> {
    match parts.len() {
        0 => None,
        1 => parts.pop(),
        _ => Some(RelExpr::And(parts)),
    }
}

fn or_of(mut parts: Vec<RelExpr>) -> Option<RelExpr> {
    match parts.len() {
        0 => None,
        1 => parts.pop(),
        _ => Some(RelExpr::Or(parts)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Cardinality, Field, ModelRegistry, ModelSpec, Relation, SemanticType};
    use crate::selector::parse_selector;
    use serde_json::json;

    fn registry() -> ModelRegistry {
        let book = ModelSpec::new("Book").with_field(Field::new("title", SemanticType::String).indexed().build());
        let library = ModelSpec::new("Library")
            .with_field(Field::new("name", SemanticType::String).indexed().build())
            .with_field(Field::new("address", SemanticType::String).build())
            .with_relation(Relation::new("books", Cardinality::Many, "Book").build());
        let mut registry = ModelRegistry::new();
        registry.register(library).unwrap();
        registry.register(book).unwrap();
        registry
    }

    #[test]
    fn eq_on_scalar_field_emits_compare() {
        let registry = registry();
        let model = registry.compile("Library", Backend::Relational).unwrap();
        let selector = parse_selector(&json!({"name": {"$eq": "Hoima"}})).unwrap();
        let (filter, warnings) = translate(&registry, &model, &selector).unwrap();
        assert!(warnings.is_empty());
        assert!(filter.joins.is_empty());
        assert_eq!(
            filter.expr,
            Some(RelExpr::Compare {
                alias: "library".to_string(),
                column: "name".to_string(),
                op: CompareOp::Eq,
                value: json!("Hoima"),
            })
        );
    }

    #[test]
    fn cross_relation_path_registers_a_join() {
        let registry = registry();
        let model = registry.compile("Library", Backend::Relational).unwrap();
        let selector = parse_selector(&json!({"books.title": {"$in": ["A", "B"]}})).unwrap();
        let (filter, _warnings) = translate(&registry, &model, &selector).unwrap();
        assert_eq!(filter.joins.len(), 1);
        assert_eq!(filter.joins[0].alias, "books");
        assert!(filter.touches_relations());
    }

    #[test]
    fn nor_wraps_or_in_not() {
        let registry = registry();
        let model = registry.compile("Library", Backend::Relational).unwrap();
        let selector = parse_selector(&json!({"$nor": [{"name": {"$eq": "Hoima"}}]})).unwrap();
        let (filter, _) = translate(&registry, &model, &selector).unwrap();
        assert!(matches!(filter.expr, Some(RelExpr::Not(_))));
    }

    #[test]
    fn disabled_field_raises_translation_error() {
        let book = ModelSpec::new("Book").with_field(Field::new("title", SemanticType::String).build());
        let library = ModelSpec::new("Library")
            .with_field(Field::new("name", SemanticType::String).disable_on_relational().build());
        let mut registry = ModelRegistry::new();
        registry.register(library).unwrap();
        registry.register(book).unwrap();
        let model = registry.compile("Library", Backend::Relational).unwrap();
        let selector = parse_selector(&json!({"name": {"$eq": "x"}})).unwrap();
        let err = translate(&registry, &model, &selector).unwrap_err();
        assert!(matches!(err, TranslationError::DisabledField { .. }));
    }

    #[test]
    fn eq_null_emits_is_null() {
        let registry = registry();
        let model = registry.compile("Library", Backend::Relational).unwrap();
        let selector = parse_selector(&json!({"address": {"$eq": null}})).unwrap();
        let (filter, _) = translate(&registry, &model, &selector).unwrap();
        assert!(matches!(filter.expr, Some(RelExpr::IsNull { .. })));
    }
}

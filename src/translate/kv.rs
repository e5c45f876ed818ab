//! Kv emission (spec.md §4.4, §4.5.3): an expression tree over indexed
//! fields, generalized from the teacher's `search::FilterCondition`
//! (`str11ngfello-snugom/snugom/src/search/mod.rs`) from a fixed entity
//! shape to any `CompiledModel`. Regex is unsupported here (spec.md §4.4
//! "Kv: unsupported") and dotted paths may not cross a collection relation
//! except as an indexed `$in` (invariant 3).

use serde_json::Value;

use crate::errors::TranslationError;
use crate::model::{Backend, CompiledModel, ModelRegistry, SemanticType};
use crate::selector::{OperatorNode, SelectorNode};

use super::{resolve_path, CompareOp, ResolvedPath, Warning};

#[derive(Debug, Clone, PartialEq)]
pub enum KvExpr {
    Compare {
        field: String,
        op: CompareOp,
        value: Value,
    },
    In {
        field: String,
        values: Vec<Value>,
    },
    NotIn {
        field: String,
        values: Vec<Value>,
    },
    IsNull {
        field: String,
    },
    And(Vec<KvExpr>),
    Or(Vec<KvExpr>),
    Not(Box<KvExpr>),
}

#[derive(Debug, Clone, Default)]
pub struct KvFilter {
    pub expr: Option<KvExpr>,
}

pub fn translate(
    registry: &ModelRegistry,
    model: &CompiledModel,
    selector: &SelectorNode,
) -> Result<(KvFilter, Vec<Warning>), TranslationError> {
    let mut warnings = Vec::new();
    let expr = emit_node(registry, model, selector, &mut warnings)?;
    Ok((KvFilter { expr }, warnings))
}

fn emit_node(
    registry: &ModelRegistry,
    model: &CompiledModel,
    node: &SelectorNode,
    warnings: &mut Vec<Warning>,
) -> Result<Option<KvExpr>, TranslationError> {
    match node {
        SelectorNode::Root(children) | SelectorNode::And(children) => {
            Ok(and_of(emit_many(registry, model, children, warnings)?))
        }
        SelectorNode::Or(children) => Ok(or_of(emit_many(registry, model, children, warnings)?)),
        SelectorNode::Nor(children) => {
            Ok(or_of(emit_many(registry, model, children, warnings)?).map(|or| KvExpr::Not(Box::new(or))))
        }
        SelectorNode::Field { path, children } => {
            let resolved = resolve_path(registry, Backend::Kv, model, path)?;
            if !resolved.field.spec.indexed {
                return Err(TranslationError::UnresolvedPath {
                    model: resolved.model_name,
                    path: path.to_string(),
                });
            }
            let mut parts = Vec::with_capacity(children.len());
            for op in children {
                check_collection_traversal(&resolved, op, path)?;
                if let Some(expr) = emit_operator(path, &resolved, op, warnings)? {
                    parts.push(expr);
                }
            }
            Ok(and_of(parts))
        }
        SelectorNode::BackendOnly { operator, backends, .. } => {
            if !backends.contains(&Backend::Kv) {
                warnings.push(Warning::new(operator.clone(), None, Backend::Kv));
            }
            Ok(None)
        }
    }
}

fn emit_many(
    registry: &ModelRegistry,
    model: &CompiledModel,
    nodes: &[SelectorNode],
    warnings: &mut Vec<Warning>,
) -> Result<Vec<KvExpr>, TranslationError> {
    let mut parts = Vec::with_capacity(nodes.len());
    for node in nodes {
        if let Some(expr) = emit_node(registry, model, node, warnings)? {
            parts.push(expr);
        }
    }
    Ok(parts)
}

/// Invariant 3: a dotted path that crosses a collection relation is only
/// legal on the kv backend as an `$in` over an indexed terminal field.
fn check_collection_traversal(resolved: &ResolvedPath, op: &OperatorNode, path: &str) -> Result<(), TranslationError> {
    if resolved.crosses_collection() && !matches!(op, OperatorNode::In(_)) {
        return Err(TranslationError::KvCollectionTraversal { path: path.to_string() });
    }
    Ok(())
}

fn emit_operator(
    path: &str,
    resolved: &ResolvedPath,
    op: &OperatorNode,
    warnings: &mut Vec<Warning>,
) -> Result<Option<KvExpr>, TranslationError> {
    let field_name = resolved.field.name().to_string();
    let cmp = |op: CompareOp, v: &Value| KvExpr::Compare {
        field: field_name.clone(),
        op,
        value: v.clone(),
    };
    Ok(match op {
        OperatorNode::Eq(v) if v.is_null() => {
            // spec.md §4.4 "Numeric and null semantics": null on an indexed
            // field matches only when the field is a reference type.
            if resolved.field.semantic_type() != SemanticType::Reference {
                return Err(TranslationError::UnsupportedOperator {
                    operator: "$eq:null".to_string(),
                    backend: Backend::Kv,
                });
            }
            Some(KvExpr::IsNull { field: field_name })
        }
        OperatorNode::Eq(v) => Some(cmp(CompareOp::Eq, v)),
        OperatorNode::Ne(v) => Some(cmp(CompareOp::Ne, v)),
        OperatorNode::Gt(v) => Some(cmp(CompareOp::Gt, v)),
        OperatorNode::Gte(v) => Some(cmp(CompareOp::Gte, v)),
        OperatorNode::Lt(v) => Some(cmp(CompareOp::Lt, v)),
        OperatorNode::Lte(v) => Some(cmp(CompareOp::Lte, v)),
        OperatorNode::In(values) => Some(KvExpr::In {
            field: field_name,
            values: values.clone(),
        }),
        OperatorNode::Nin(values) => Some(KvExpr::NotIn {
            field: field_name,
            values: values.clone(),
        }),
        OperatorNode::Regex { .. } => {
            return Err(TranslationError::UnsupportedOperator {
                operator: "$regex".to_string(),
                backend: Backend::Kv,
            })
        }
        OperatorNode::Not(inner) => {
            let mut parts = Vec::with_capacity(inner.len());
            for child in inner {
                if let Some(expr) = emit_operator(path, resolved, child, warnings)? {
                    parts.push(expr);
                }
            }
            and_of(parts).map(|e| KvExpr::Not(Box::new(e)))
        }
        OperatorNode::BackendOnly { operator, backends, .. } => {
            if !backends.contains(&Backend::Kv) {
                warnings.push(Warning::new(operator.clone(), Some(path.to_string()), Backend::Kv));
            }
            None
        }
    })
}

fn and_of(mut parts: Vec<KvExpr>) -> Option<KvExpr> {
    match parts.len() {
        0 => None,
        1 => parts.pop(),
        _ => Some(KvExpr::And(parts)),
    }
}

fn or_of(mut parts: Vec<KvExpr>) -> Option<KvExpr> {
    match parts.len() {
        0 => None,
        1 => parts.pop(),
        _ => Some(KvExpr::Or(parts)),
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
            .with_relation(Relation::new("books", Cardinality::Many, "Book").build());
        let mut registry = ModelRegistry::new();
        registry.register(library).unwrap();
        registry.register(book).unwrap();
        registry
    }

    #[test]
    fn regex_is_rejected_on_kv() {
        let registry = registry();
        let model = registry.compile("Library", Backend::Kv).unwrap();
        let selector = parse_selector(&json!({"name": {"$regex": "^bu.*", "$options": "i"}})).unwrap();
        let err = translate(&registry, &model, &selector).unwrap_err();
        assert!(matches!(
            err,
            TranslationError::UnsupportedOperator { backend: Backend::Kv, .. }
        ));
    }

    #[test]
    fn in_over_indexed_field_across_collection_is_allowed() {
        let registry = registry();
        let model = registry.compile("Library", Backend::Kv).unwrap();
        let selector = parse_selector(&json!({"books.title": {"$in": ["A", "B"]}})).unwrap();
        let (filter, _warnings) = translate(&registry, &model, &selector).unwrap();
        assert!(matches!(filter.expr, Some(KvExpr::In { .. })));
    }

    #[test]
    fn non_in_operator_across_collection_is_rejected() {
        let registry = registry();
        let model = registry.compile("Library", Backend::Kv).unwrap();
        let selector = parse_selector(&json!({"books.title": {"$eq": "A"}})).unwrap();
        let err = translate(&registry, &model, &selector).unwrap_err();
        assert!(matches!(err, TranslationError::KvCollectionTraversal { .. }));
    }

    #[test]
    fn non_indexed_field_is_unresolved() {
        let book = ModelSpec::new("Plain").with_field(Field::new("note", SemanticType::String).build());
        let mut registry = ModelRegistry::new();
        registry.register(book).unwrap();
        let model = registry.compile("Plain", Backend::Kv).unwrap();
        let selector = parse_selector(&json!({"note": {"$eq": "x"}})).unwrap();
        let err = translate(&registry, &model, &selector).unwrap_err();
        assert!(matches!(err, TranslationError::UnresolvedPath { .. }));
    }
}

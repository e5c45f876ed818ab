//! Document emission (spec.md §4.4): since the portable selector is itself
//! MongoDB-shaped, translation is close to a direct re-serialization into a
//! `bson::Document` filter — the one backend where backend-only operators
//! (`$exists`, `$text`, ...) are natively supported rather than warned away.

use bson::{Bson, Document};
use serde_json::Value;

use crate::errors::TranslationError;
use crate::model::{Backend, CompiledModel, ModelRegistry};
use crate::selector::{OperatorNode, SelectorNode};

use super::{resolve_path, Warning};

pub type DocumentFilter = Document;

pub fn translate(
    registry: &ModelRegistry,
    model: &CompiledModel,
    selector: &SelectorNode,
) -> Result<(DocumentFilter, Vec<Warning>), TranslationError> {
    let mut warnings = Vec::new();
    let doc = emit_node(registry, model, selector, &mut warnings)?;
    Ok((doc.unwrap_or_default(), warnings))
}

fn emit_node(
    registry: &ModelRegistry,
    model: &CompiledModel,
    node: &SelectorNode,
    warnings: &mut Vec<Warning>,
) -> Result<Option<Document>, TranslationError> {
    match node {
        SelectorNode::Root(children) => {
            let mut merged = Document::new();
            for child in children {
                if let Some(doc) = emit_node(registry, model, child, warnings)? {
                    merged.extend(doc);
                }
            }
            Ok((!merged.is_empty()).then_some(merged))
        }
        SelectorNode::And(children) => wrap_list(registry, model, "$and", children, warnings),
        SelectorNode::Or(children) => wrap_list(registry, model, "$or", children, warnings),
        SelectorNode::Nor(children) => wrap_list(registry, model, "$nor", children, warnings),
        SelectorNode::Field { path, children } => {
            // Validate the path resolves (invariants 1 and 4); the document
            // backend still uses the dotted path verbatim since embedded
            // relations are nested subdocuments reachable by dot-notation.
            resolve_path(registry, Backend::Document, model, path)?;
            let mut ops = Document::new();
            for op in children {
                for (key, value) in emit_operator(op, path, warnings)? {
                    ops.insert(key, value);
                }
            }
            if ops.is_empty() {
                return Ok(None);
            }
            // `{$eq: v}` collapses to the bare value, matching how a literal
            // scalar selector would have been written (spec.md §4.3).
            let value = if ops.len() == 1 && ops.contains_key("$eq") {
                ops.remove("$eq").unwrap()
            } else {
                Bson::Document(ops)
            };
            let mut doc = Document::new();
            doc.insert(path.clone(), value);
            Ok(Some(doc))
        }
        SelectorNode::BackendOnly { operator, raw, .. } => {
            let mut doc = Document::new();
            doc.insert(operator.clone(), to_bson(raw));
            Ok(Some(doc))
        }
    }
}

fn wrap_list(
    registry: &ModelRegistry,
    model: &CompiledModel,
    key: &str,
    children: &[SelectorNode],
    warnings: &mut Vec<Warning>,
) -> Result<Option<Document>, TranslationError> {
    let mut list = Vec::with_capacity(children.len());
    for child in children {
        if let Some(doc) = emit_node(registry, model, child, warnings)? {
            list.push(Bson::Document(doc));
        }
    }
    if list.is_empty() {
        return Ok(None);
    }
    let mut doc = Document::new();
    doc.insert(key, Bson::Array(list));
    Ok(Some(doc))
}

fn emit_operator(op: &OperatorNode, path: &str, warnings: &mut Vec<Warning>) -> Result<Vec<(String, Bson)>, TranslationError> {
    Ok(match op {
        OperatorNode::Eq(v) => vec![("$eq".to_string(), to_bson(v))],
        OperatorNode::Ne(v) => vec![("$ne".to_string(), to_bson(v))],
        OperatorNode::Gt(v) => vec![("$gt".to_string(), to_bson(v))],
        OperatorNode::Gte(v) => vec![("$gte".to_string(), to_bson(v))],
        OperatorNode::Lt(v) => vec![("$lt".to_string(), to_bson(v))],
        OperatorNode::Lte(v) => vec![("$lte".to_string(), to_bson(v))],
        OperatorNode::In(values) => vec![("$in".to_string(), Bson::Array(values.iter().map(to_bson).collect()))],
        OperatorNode::Nin(values) => vec![("$nin".to_string(), Bson::Array(values.iter().map(to_bson).collect()))],
        OperatorNode::Regex { pattern, options } => {
            // Pass through as-is (spec.md §4.4 "Document: pass through as-is").
            let mut pairs = vec![("$regex".to_string(), Bson::String(pattern.clone()))];
            if let Some(opts) = options {
                pairs.push(("$options".to_string(), Bson::String(opts.clone())));
            }
            pairs
        }
        OperatorNode::Not(inner) => {
            let mut nested = Document::new();
            for child in inner {
                for (key, value) in emit_operator(child, path, warnings)? {
                    nested.insert(key, value);
                }
            }
            vec![("$not".to_string(), Bson::Document(nested))]
        }
        OperatorNode::BackendOnly { operator, raw, .. } => vec![(operator.clone(), to_bson(raw))],
    })
}

fn to_bson(value: &Value) -> Bson {
    bson::to_bson(value).unwrap_or(Bson::Null)
}

//! Parses an inbound `serde_json::Value` into a `SelectorNode` tree
//! following the rules in spec.md §4.3.

use serde_json::{Map, Value};

use crate::errors::TranslationError;

use super::registry::lookup_operator;
use super::{OperatorNode, SelectorNode};

/// Entry point: parse a whole selector document (spec.md §6.1 "wire
/// shape").
pub fn parse_selector(value: &Value) -> Result<SelectorNode, TranslationError> {
    let obj = value
        .as_object()
        .ok_or_else(|| TranslationError::UnknownOperator("<selector root must be an object>".to_string()))?;
    parse_object_as_root(obj)
}

fn parse_object_as_root(obj: &Map<String, Value>) -> Result<SelectorNode, TranslationError> {
    let mut children = Vec::with_capacity(obj.len());
    for (key, val) in obj {
        children.push(parse_top_level_entry(key, val)?);
    }
    Ok(SelectorNode::Root(children))
}

fn parse_top_level_entry(key: &str, val: &Value) -> Result<SelectorNode, TranslationError> {
    match key {
        "$and" => Ok(SelectorNode::And(parse_logical_list(key, val)?)),
        "$or" => Ok(SelectorNode::Or(parse_logical_list(key, val)?)),
        "$nor" => Ok(SelectorNode::Nor(parse_logical_list(key, val)?)),
        _ if key.starts_with('$') => match lookup_operator(key) {
            Some(def) => Ok(SelectorNode::BackendOnly {
                operator: key.to_string(),
                raw: val.clone(),
                backends: def.backends,
            }),
            None => Err(TranslationError::UnknownOperator(key.to_string())),
        },
        _ => parse_field(key, val),
    }
}

fn parse_logical_list(operator: &str, val: &Value) -> Result<Vec<SelectorNode>, TranslationError> {
    let arr = val
        .as_array()
        .ok_or_else(|| TranslationError::ExpectedSequence {
            operator: operator.to_string(),
            field: String::new(),
        })?;
    arr.iter()
        .map(|item| {
            let obj = item.as_object().ok_or_else(|| TranslationError::ExpectedSequence {
                operator: operator.to_string(),
                field: String::new(),
            })?;
            parse_object_as_root(obj)
        })
        .collect()
}

fn parse_field(path: &str, val: &Value) -> Result<SelectorNode, TranslationError> {
    match val {
        Value::Object(map) if is_operator_map(map) => {
            let children = parse_operator_map(path, map)?;
            Ok(SelectorNode::field(path, children))
        }
        scalar => Ok(SelectorNode::field(path, vec![OperatorNode::Eq(scalar.clone())])),
    }
}

fn is_operator_map(map: &Map<String, Value>) -> bool {
    !map.is_empty() && map.keys().all(|k| k.starts_with('$'))
}

fn parse_operator_map(path: &str, map: &Map<String, Value>) -> Result<Vec<OperatorNode>, TranslationError> {
    let options = map.get("$options").and_then(|v| v.as_str()).map(str::to_string);
    let mut nodes = Vec::with_capacity(map.len());
    for (op, val) in map {
        if op == "$options" {
            continue;
        }
        nodes.push(parse_operator(path, op, val, options.as_deref())?);
    }
    Ok(nodes)
}

fn parse_operator(path: &str, op: &str, val: &Value, options: Option<&str>) -> Result<OperatorNode, TranslationError> {
    match op {
        "$eq" => Ok(OperatorNode::Eq(expect_scalar(path, op, val)?)),
        "$ne" => Ok(OperatorNode::Ne(expect_scalar(path, op, val)?)),
        "$gt" => Ok(OperatorNode::Gt(expect_scalar(path, op, val)?)),
        "$gte" => Ok(OperatorNode::Gte(expect_scalar(path, op, val)?)),
        "$lt" => Ok(OperatorNode::Lt(expect_scalar(path, op, val)?)),
        "$lte" => Ok(OperatorNode::Lte(expect_scalar(path, op, val)?)),
        "$in" => Ok(OperatorNode::In(expect_sequence(path, op, val)?)),
        "$nin" => Ok(OperatorNode::Nin(expect_sequence(path, op, val)?)),
        "$regex" => {
            let pattern = val
                .as_str()
                .ok_or_else(|| TranslationError::ExpectedStringPattern { field: path.to_string() })?;
            Ok(OperatorNode::Regex {
                pattern: pattern.to_string(),
                options: options.map(str::to_string),
            })
        }
        "$not" => {
            let inner = val
                .as_object()
                .ok_or_else(|| TranslationError::NotRequiresOperatorMap { field: path.to_string() })?;
            Ok(OperatorNode::Not(parse_operator_map(path, inner)?))
        }
        other => match lookup_operator(other) {
            Some(def) => Ok(OperatorNode::BackendOnly {
                operator: other.to_string(),
                raw: val.clone(),
                backends: def.backends,
            }),
            None => Err(TranslationError::UnknownOperator(other.to_string())),
        },
    }
}

fn expect_scalar(path: &str, op: &str, val: &Value) -> Result<Value, TranslationError> {
    match val {
        Value::Array(_) | Value::Object(_) => Err(TranslationError::ExpectedScalar {
            operator: op.to_string(),
            field: path.to_string(),
        }),
        scalar => Ok(scalar.clone()),
    }
}

fn expect_sequence(path: &str, op: &str, val: &Value) -> Result<Vec<Value>, TranslationError> {
    val.as_array().cloned().ok_or_else(|| TranslationError::ExpectedSequence {
        operator: op.to_string(),
        field: path.to_string(),
    })
}

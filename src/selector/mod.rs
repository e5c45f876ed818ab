//! Selector AST (spec.md §3.1 SelectorNode, §4.3) — C3.
//!
//! A MongoDB-style query is parsed from an inbound `serde_json::Value` into
//! this closed tagged representation once per request, then discarded after
//! translation (spec.md §3.3). Grounded in the shape of
//! `other_examples/69ba5c6b_..._query_document-mod.rs.rs` (Prisma's own
//! `$and/$or`-style selector tree) and
//! `other_examples/a8868bee_..._filters.rs.rs` (its filter extractors),
//! adapted to the dynamic-typing-to-tagged-union design note (spec.md §9).

mod parse;
mod registry;

pub use parse::parse_selector;
pub use registry::{OperatorDef, register_operator};

use serde_json::Value;

use crate::model::BackendSet;

/// The portable query filter (GLOSSARY "Selector").
#[derive(Debug, Clone, PartialEq)]
pub enum SelectorNode {
    /// Implicit top-level AND over every key of the inbound object.
    Root(Vec<SelectorNode>),
    /// A single field path with its operator children.
    Field { path: String, children: Vec<OperatorNode> },
    And(Vec<SelectorNode>),
    Or(Vec<SelectorNode>),
    Nor(Vec<SelectorNode>),
    /// A top-level `$`-operator this crate does not natively support on any
    /// of the three backends but recognizes as document-native (spec.md
    /// §4.3 "Unknown `$`-prefixed keys").
    BackendOnly {
        operator: String,
        raw: Value,
        backends: BackendSet,
    },
}

impl SelectorNode {
    /// Convenience constructor used heavily in tests and by callers building
    /// selectors programmatically rather than parsing them.
    pub fn field(path: impl Into<String>, children: Vec<OperatorNode>) -> Self {
        SelectorNode::Field {
            path: path.into(),
            children,
        }
    }
}

/// A single `$operator` applied to one field (spec.md §3.1 OperatorNode
/// variants).
#[derive(Debug, Clone, PartialEq)]
pub enum OperatorNode {
    Eq(Value),
    Ne(Value),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    In(Vec<Value>),
    Nin(Vec<Value>),
    Regex { pattern: String, options: Option<String> },
    /// `$not` takes another operator-map, never a logical list (spec.md
    /// §3.2 invariant 2).
    Not(Vec<OperatorNode>),
    /// A field-scoped `$`-operator recognized as document-native only.
    BackendOnly {
        operator: String,
        raw: Value,
        backends: BackendSet,
    },
}

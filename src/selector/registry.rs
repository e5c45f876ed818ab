//! Extensible operator registry (spec.md §4.3 "The parser is extensible").
//!
//! Grounded in the same process-wide `OnceLock<RwLock<_>>` pattern the
//! teacher uses for its descriptor registry
//! (`str11ngfello-snugom/snugom/src/registry.rs`).

use std::collections::HashMap;
use std::sync::{OnceLock, RwLock};

use crate::model::{Backend, BackendSet};

/// Metadata for a non-core `$`-operator: the set of backends it is natively
/// supported on. An empty set with no relational/kv membership marks the
/// operator as document-only (spec.md §6.1's "recognized-but-document-only"
/// list), matching the default the parser applies to unknown `$`-prefixed
/// keys (spec.md §4.3).
#[derive(Debug, Clone)]
pub struct OperatorDef {
    pub backends: BackendSet,
}

impl OperatorDef {
    pub fn document_only() -> Self {
        let mut backends = BackendSet::new();
        backends.insert(Backend::Document);
        Self { backends }
    }
}

fn registry() -> &'static RwLock<HashMap<String, OperatorDef>> {
    static REGISTRY: OnceLock<RwLock<HashMap<String, OperatorDef>>> = OnceLock::new();
    REGISTRY.get_or_init(|| RwLock::new(seed()))
}

/// The document-native-only operator set enumerated in spec.md §6.1.
const DOCUMENT_ONLY_OPERATORS: &[&str] = &[
    "$exists",
    "$type",
    "$jsonSchema",
    "$expr",
    "$text",
    "$where",
    "$geoIntersects",
    "$geoWithin",
    "$near",
    "$nearSphere",
    "$all",
    "$elemMatch",
    "$size",
    "$mod",
    "$bitsAllClear",
    "$bitsAllSet",
    "$bitsAnyClear",
    "$bitsAnySet",
    "$",
    "$meta",
    "$slice",
    "$rand",
    "$natural",
];

fn seed() -> HashMap<String, OperatorDef> {
    DOCUMENT_ONLY_OPERATORS
        .iter()
        .map(|name| (name.to_string(), OperatorDef::document_only()))
        .collect()
}

/// Register (or override) a `$`-operator the parser should recognize beyond
/// the core comparison/logical set, tagging the backends it's natively
/// supported on (spec.md §4.3: "callers may override or add entries").
pub fn register_operator(name: impl Into<String>, backends: BackendSet) {
    registry().write().unwrap().insert(name.into(), OperatorDef { backends });
}

pub(crate) fn lookup_operator(name: &str) -> Option<OperatorDef> {
    registry().read().unwrap().get(name).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_document_only_operator_is_found() {
        let def = lookup_operator("$exists").expect("seeded operator");
        assert!(def.backends.contains(&Backend::Document));
        assert!(!def.backends.contains(&Backend::Relational));
    }

    #[test]
    fn caller_can_register_additional_operator() {
        let mut backends = BackendSet::new();
        backends.insert(Backend::Relational);
        backends.insert(Backend::Document);
        register_operator("$customOp", backends);
        let def = lookup_operator("$customOp").expect("registered operator");
        assert!(def.backends.contains(&Backend::Relational));
    }
}

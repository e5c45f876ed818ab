//! Model registry and forward-reference-safe compilation (spec.md §4.2
//! edge cases; SPEC_FULL.md §4.2 supplement: two-pass compile so
//! declaration order across models doesn't matter).

use std::collections::HashMap;

use crate::errors::SchemaError;

use super::{Backend, CompiledModel, ModelSpec, compiled::compile_single};

/// Holds every `ModelSpec` declared by the caller, keyed by name, so that
/// relation targets and link models can be resolved by name regardless of
/// declaration order (spec.md §4.2 "a relation whose target is itself
/// compiled lazily (forward references) must be resolvable by name").
#[derive(Debug, Default)]
pub struct ModelRegistry {
    models: HashMap<String, ModelSpec>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, spec: ModelSpec) -> Result<(), SchemaError> {
        if self.models.contains_key(&spec.name) {
            return Err(SchemaError::DuplicateModel(spec.name.clone()));
        }
        self.models.insert(spec.name.clone(), spec);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ModelSpec> {
        self.models.get(name)
    }

    pub fn model_names(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(|s| s.as_str())
    }

    /// Validate every relation's target (and, for many-to-many relations,
    /// its link model) resolves against a registered model, then compile
    /// `model_name` for `backend`.
    pub fn compile(&self, model_name: &str, backend: Backend) -> Result<CompiledModel, SchemaError> {
        let spec = self
            .get(model_name)
            .ok_or_else(|| SchemaError::UnknownModel(model_name.to_string()))?;

        for (relation_name, relation) in &spec.relations {
            if relation.disabled_on.contains(&backend) {
                continue;
            }
            if !self.models.contains_key(&relation.target) {
                return Err(SchemaError::UnknownRelationTarget {
                    model: spec.name.clone(),
                    relation: relation_name.clone(),
                    target: relation.target.clone(),
                });
            }
            if let Some(link_model) = &relation.link_model
                && !self.models.contains_key(link_model)
            {
                return Err(SchemaError::MissingLinkModel {
                    model: spec.name.clone(),
                    relation: relation_name.clone(),
                    link_model: link_model.clone(),
                });
            }
        }

        Ok(compile_single(spec, backend))
    }

    pub fn compile_all_backends(&self, model_name: &str) -> Result<Vec<CompiledModel>, SchemaError> {
        Backend::ALL.iter().map(|backend| self.compile(model_name, *backend)).collect()
    }
}

/// Free function used by call sites that only need a one-off compile from a
/// loose `ModelSpec` (no relation validation against siblings) — e.g. unit
/// tests and the translator's own test fixtures.
pub fn compile(spec: &ModelSpec, backend: Backend) -> CompiledModel {
    compile_single(spec, backend)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Cardinality, Field, Relation, SemanticType};

    fn library_and_book() -> (ModelSpec, ModelSpec) {
        let book = ModelSpec::new("Book").with_field(Field::new("title", SemanticType::String).indexed().build());
        let library = ModelSpec::new("Library")
            .with_field(Field::new("name", SemanticType::String).indexed().build())
            .with_relation(Relation::new("books", Cardinality::Many, "Book").build());
        (library, book)
    }

    #[test]
    fn compiles_when_target_registered() {
        let (library, book) = library_and_book();
        let mut registry = ModelRegistry::new();
        registry.register(library).unwrap();
        registry.register(book).unwrap();

        let compiled = registry.compile("Library", Backend::Relational).unwrap();
        assert!(compiled.has_relation("books"));
    }

    #[test]
    fn rejects_unresolved_relation_target() {
        let (library, _book) = library_and_book();
        let mut registry = ModelRegistry::new();
        registry.register(library).unwrap();

        let err = registry.compile("Library", Backend::Relational).unwrap_err();
        assert!(matches!(err, SchemaError::UnknownRelationTarget { .. }));
    }

    #[test]
    fn duplicate_registration_rejected() {
        let (library, _) = library_and_book();
        let mut registry = ModelRegistry::new();
        registry.register(library.clone()).unwrap();
        let err = registry.register(library).unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateModel(_)));
    }

    #[test]
    fn disabled_field_is_dropped_from_compiled_model() {
        let model = ModelSpec::new("Secret")
            .with_field(Field::new("public_name", SemanticType::String).build())
            .with_field(Field::new("internal_flag", SemanticType::Bool).disable_on_document().build());

        let doc = compile(&model, Backend::Document);
        assert!(!doc.has_field("internal_flag"));
        let relational = compile(&model, Backend::Relational);
        assert!(relational.has_field("internal_flag"));
    }

    #[test]
    fn implicit_primary_key_is_synthesized() {
        let model = ModelSpec::new("Plain").with_field(Field::new("name", SemanticType::String).build());
        let compiled = compile(&model, Backend::Kv);
        assert_eq!(compiled.primary_key_field, "id");
        assert!(compiled.has_field("id"));
    }
}

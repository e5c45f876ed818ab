//! `Field(...)` builder (spec.md §4.1).

use super::{Backend, FieldDefault, OnDelete, SemanticType, VectorOptions};
use super::spec::FieldSpec;

/// Fluent builder for a [`FieldSpec`]. Mirrors the option table in spec.md
/// §4.1; every option is optional except `default` for a nullable field
/// without one, which is enforced at model-registration time rather than
/// here (mirrors the teacher's `types.rs`, where declaration and validation
/// are separate passes).
#[derive(Debug, Clone)]
pub struct Field {
    spec: FieldSpec,
}

impl Field {
    pub fn new(name: impl Into<String>, semantic_type: SemanticType) -> Self {
        Self {
            spec: FieldSpec {
                name: name.into(),
                semantic_type,
                default: None,
                nullable: false,
                indexed: false,
                full_text_search: false,
                unique: false,
                primary_key: false,
                foreign_key: None,
                on_delete: None,
                disabled_on: Default::default(),
                sortable: false,
                case_sensitive: true,
                vector_options: None,
            },
        }
    }

    pub fn default_value(mut self, value: impl Into<serde_json::Value>) -> Self {
        self.spec.default = Some(FieldDefault::Value(value.into()));
        self
    }

    pub fn default_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> serde_json::Value + Send + Sync + 'static,
    {
        self.spec.default = Some(FieldDefault::Factory(std::sync::Arc::new(factory)));
        self
    }

    pub fn nullable(mut self) -> Self {
        self.spec.nullable = true;
        self
    }

    pub fn indexed(mut self) -> Self {
        self.spec.indexed = true;
        self
    }

    pub fn full_text_search(mut self) -> Self {
        self.spec.full_text_search = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.spec.unique = true;
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.spec.primary_key = true;
        self
    }

    pub fn foreign_key(mut self, table_column: impl Into<String>) -> Self {
        self.spec.foreign_key = Some(table_column.into());
        self
    }

    pub fn on_delete(mut self, policy: OnDelete) -> Self {
        self.spec.on_delete = Some(policy);
        self
    }

    pub fn disable_on_relational(mut self) -> Self {
        self.spec.disabled_on.insert(Backend::Relational);
        self
    }

    pub fn disable_on_document(mut self) -> Self {
        self.spec.disabled_on.insert(Backend::Document);
        self
    }

    pub fn disable_on_kv(mut self) -> Self {
        self.spec.disabled_on.insert(Backend::Kv);
        self
    }

    pub fn sortable(mut self) -> Self {
        self.spec.sortable = true;
        self
    }

    pub fn case_insensitive(mut self) -> Self {
        self.spec.case_sensitive = false;
        self
    }

    pub fn vector_options(mut self, options: VectorOptions) -> Self {
        self.spec.vector_options = Some(options);
        self
    }

    pub fn build(self) -> FieldSpec {
        self.spec
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_minimal_field() {
        let field = Field::new("name", SemanticType::String).indexed().build();
        assert_eq!(field.name, "name");
        assert!(field.indexed);
        assert!(!field.unique);
    }

    #[test]
    fn disable_on_accumulates_backends() {
        let field = Field::new("legacy", SemanticType::String)
            .disable_on_document()
            .disable_on_kv()
            .build();
        assert_eq!(field.disabled_on.len(), 2);
        assert!(field.disabled_on.contains(&Backend::Document));
        assert!(field.disabled_on.contains(&Backend::Kv));
        assert!(!field.disabled_on.contains(&Backend::Relational));
    }
}

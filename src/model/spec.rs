//! `FieldSpec`/`RelationSpec`/`ModelSpec` value types (spec.md §3.1).

use indexmap::IndexMap;

use super::{BackendSet, Cardinality, FieldDefault, OnDelete, SemanticType, VectorOptions};

/// Declarative metadata for a single field, produced by [`super::Field`].
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: String,
    pub semantic_type: SemanticType,
    pub default: Option<FieldDefault>,
    pub nullable: bool,
    pub indexed: bool,
    pub full_text_search: bool,
    pub unique: bool,
    pub primary_key: bool,
    pub foreign_key: Option<String>,
    pub on_delete: Option<OnDelete>,
    pub disabled_on: BackendSet,
    pub sortable: bool,
    pub case_sensitive: bool,
    pub vector_options: Option<VectorOptions>,
}

/// Declarative metadata for a relation, produced by [`super::Relation`].
#[derive(Debug, Clone)]
pub struct RelationSpec {
    pub name: String,
    pub cardinality: Cardinality,
    pub target: String,
    pub back_populates: Option<String>,
    pub cascade_delete: bool,
    pub passive_deletes: bool,
    pub link_model: Option<String>,
    pub disabled_on: BackendSet,
}

/// Settings that apply to the model as a whole (table/collection naming,
/// RediSearch index name, etc).
#[derive(Debug, Clone, Default)]
pub struct ModelSettings {
    pub relational_table: Option<String>,
    pub document_collection: Option<String>,
    pub kv_index_name: Option<String>,
}

/// A logical schema: fields in declaration order, relations by name, plus
/// settings. Built once at program start and treated as immutable
/// (spec.md §3.3).
#[derive(Debug, Clone)]
pub struct ModelSpec {
    pub name: String,
    pub fields: Vec<FieldSpec>,
    pub relations: IndexMap<String, RelationSpec>,
    pub settings: ModelSettings,
}

impl ModelSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            relations: IndexMap::new(),
            settings: ModelSettings::default(),
        }
    }

    pub fn with_field(mut self, field: FieldSpec) -> Self {
        self.fields.push(field);
        self
    }

    pub fn with_relation(mut self, relation: RelationSpec) -> Self {
        self.relations.insert(relation.name.clone(), relation);
        self
    }

    pub fn with_settings(mut self, settings: ModelSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn relation(&self, name: &str) -> Option<&RelationSpec> {
        self.relations.get(name)
    }

    /// Every model has an implicit primary-key field (spec.md §3.1); if the
    /// caller did not declare one explicitly, synthesize the conventional
    /// `id` field so compilation always has something to substitute a
    /// backend-specific primary-key type into (spec.md §4.2 step 3).
    pub fn primary_key_field(&self) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.primary_key)
    }
}

//! `CompiledModel` — a backend-specific projection of a `ModelSpec`
//! (spec.md §3.1, §4.2) — C2.

use indexmap::IndexMap;

use super::{Backend, Cardinality, FieldSpec, ModelSpec, OnDelete, RelationSpec, SemanticType};

/// The concrete primary-key representation a backend assigns
/// (spec.md §3.1 ModelSpec: "relational: auto-increment integer; document:
/// 12-byte object id; kv: string primary key").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordIdKind {
    Int,
    ObjectId,
    Str,
}

impl RecordIdKind {
    pub fn for_backend(backend: Backend) -> Self {
        match backend {
            Backend::Relational => RecordIdKind::Int,
            Backend::Document => RecordIdKind::ObjectId,
            Backend::Kv => RecordIdKind::Str,
        }
    }
}

/// A field as it survives compilation for one backend: disabled fields are
/// dropped entirely (spec.md §3.2 invariant 4), and the primary key's
/// semantic type is substituted for the backend-appropriate kind.
#[derive(Debug, Clone)]
pub struct CompiledField {
    pub spec: FieldSpec,
    pub is_primary_key: bool,
    pub primary_key_kind: Option<RecordIdKind>,
}

impl CompiledField {
    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn semantic_type(&self) -> SemanticType {
        self.spec.semantic_type
    }
}

/// A relation as it survives compilation for one backend.
#[derive(Debug, Clone)]
pub struct CompiledRelation {
    pub spec: RelationSpec,
    /// Resolved target model name (same as `spec.target`; kept for symmetry
    /// with fields and to make lazy/forward-reference resolution explicit:
    /// this is only populated once the target model has itself been
    /// registered, see `ModelRegistry::compile_all`).
    pub target: String,
}

impl CompiledRelation {
    pub fn cardinality(&self) -> Cardinality {
        self.spec.cardinality
    }

    pub fn is_many_to_many(&self) -> bool {
        self.spec.link_model.is_some()
    }
}

/// The output of the model compiler for one `(ModelSpec, Backend)` pair
/// (spec.md §3.1 CompiledModel, §4.2 algorithm). Immutable once built
/// (spec.md §3.3).
#[derive(Debug, Clone)]
pub struct CompiledModel {
    pub backend: Backend,
    pub name: String,
    pub fields: Vec<CompiledField>,
    pub relations: IndexMap<String, CompiledRelation>,
    pub table_name: String,
    pub primary_key_field: String,
}

impl CompiledModel {
    pub fn field(&self, name: &str) -> Option<&CompiledField> {
        self.fields.iter().find(|f| f.name() == name)
    }

    pub fn relation(&self, name: &str) -> Option<&CompiledRelation> {
        self.relations.get(name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    pub fn has_relation(&self, name: &str) -> bool {
        self.relations.contains_key(name)
    }

    /// Fields the relational backend persists as real columns, i.e.
    /// excluding relation-shaped fields (none in this model, since relations
    /// are tracked separately) — present for symmetry with the document/kv
    /// column projections used while building INSERT/UPDATE statements.
    pub fn column_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name()).collect()
    }

    pub fn foreign_key_column(&self, relation_name: &str) -> Option<String> {
        let relation = self.relation(relation_name)?;
        relation
            .spec
            .back_populates
            .clone()
            .or_else(|| Some(format!("{}_id", self.name.to_lowercase())))
    }

    pub fn on_delete_for(&self, field_name: &str) -> Option<OnDelete> {
        self.field(field_name).and_then(|f| f.spec.on_delete)
    }
}

/// Compile one `ModelSpec` into a `CompiledModel` for `backend`
/// (spec.md §4.2 algorithm, steps 1-3). Step 4 ("register the compiled type
/// with the backend's metadata") is the responsibility of the Store that
/// calls this function, since table/index creation needs a live connection.
pub fn compile_single(spec: &ModelSpec, backend: Backend) -> CompiledModel {
    let mut fields = Vec::with_capacity(spec.fields.len());
    for field in &spec.fields {
        if field.disabled_on.contains(&backend) {
            continue;
        }
        let is_primary_key = field.primary_key;
        fields.push(CompiledField {
            spec: field.clone(),
            is_primary_key,
            primary_key_kind: is_primary_key.then(|| RecordIdKind::for_backend(backend)),
        });
    }

    // Implicit primary key (spec.md §3.1): synthesize one if the caller
    // declared no field with `primary_key()`.
    let primary_key_field = fields
        .iter()
        .find(|f| f.is_primary_key)
        .map(|f| f.name().to_string())
        .unwrap_or_else(|| {
            let implicit_name = "id".to_string();
            fields.insert(
                0,
                CompiledField {
                    spec: super::Field::new(&implicit_name, SemanticType::Reference)
                        .indexed()
                        .primary_key()
                        .build(),
                    is_primary_key: true,
                    primary_key_kind: Some(RecordIdKind::for_backend(backend)),
                },
            );
            implicit_name
        });

    let mut relations = IndexMap::new();
    for (name, relation) in &spec.relations {
        if relation.disabled_on.contains(&backend) {
            continue;
        }
        relations.insert(
            name.clone(),
            CompiledRelation {
                spec: relation.clone(),
                target: relation.target.clone(),
            },
        );
    }

    let table_name = spec
        .settings
        .relational_table
        .clone()
        .unwrap_or_else(|| spec.name.to_lowercase());

    CompiledModel {
        backend,
        name: spec.name.clone(),
        fields,
        relations,
        table_name,
        primary_key_field,
    }
}

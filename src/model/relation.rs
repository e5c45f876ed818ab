//! `Relation(...)` builder (spec.md §4.1).

use super::{Backend, Cardinality};
use super::spec::RelationSpec;

#[derive(Debug, Clone)]
pub struct Relation {
    spec: RelationSpec,
}

impl Relation {
    pub fn new(name: impl Into<String>, cardinality: Cardinality, target: impl Into<String>) -> Self {
        Self {
            spec: RelationSpec {
                name: name.into(),
                cardinality,
                target: target.into(),
                back_populates: None,
                cascade_delete: false,
                passive_deletes: false,
                link_model: None,
                disabled_on: Default::default(),
            },
        }
    }

    pub fn back_populates(mut self, field: impl Into<String>) -> Self {
        self.spec.back_populates = Some(field.into());
        self
    }

    pub fn cascade_delete(mut self) -> Self {
        self.spec.cascade_delete = true;
        self
    }

    pub fn passive_deletes(mut self) -> Self {
        self.spec.passive_deletes = true;
        self
    }

    /// Names the auxiliary model that realizes a many-to-many join row
    /// (GLOSSARY "Link model").
    pub fn link_model(mut self, model: impl Into<String>) -> Self {
        self.spec.link_model = Some(model.into());
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

    pub fn build(self) -> RelationSpec {
        self.spec
    }
}

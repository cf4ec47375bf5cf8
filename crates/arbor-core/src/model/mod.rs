//! Runtime class metadata consumed by the write, query, and delete paths.
//!
//! Metadata is owned by an external provider; this module only defines the
//! shapes it hands out and a simple in-process registry.

mod relation;

use crate::error::InternalError;
use std::collections::BTreeMap;

pub use relation::{RelationKind, RelationModel};

///
/// FieldModel
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FieldModel {
    pub name: &'static str,
    pub relation: Option<RelationModel>,
    pub nullable: bool,

    /// Stored inline on the owning row; never has its own key.
    pub embedded: bool,
}

impl FieldModel {
    /// Plain nullable property.
    #[must_use]
    pub const fn property(name: &'static str) -> Self {
        Self {
            name,
            relation: None,
            nullable: true,
            embedded: false,
        }
    }

    #[must_use]
    pub const fn relation(name: &'static str, relation: RelationModel) -> Self {
        Self {
            name,
            relation: Some(relation),
            nullable: true,
            embedded: false,
        }
    }

    #[must_use]
    pub const fn required(mut self) -> Self {
        self.nullable = false;
        self
    }

    #[must_use]
    pub const fn embedded(mut self) -> Self {
        self.embedded = true;
        self
    }
}

///
/// ClassModel
///
/// One persistent class. The class name doubles as the entity kind of its rows.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClassModel {
    pub name: &'static str,
    pub superclass: Option<&'static str>,

    /// Fields declared on this class only, in declaration order.
    pub fields: Vec<FieldModel>,
}

impl ClassModel {
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            superclass: None,
            fields: Vec::new(),
        }
    }

    #[must_use]
    pub fn extends(mut self, superclass: &'static str) -> Self {
        self.superclass = Some(superclass);
        self
    }

    #[must_use]
    pub fn field(mut self, field: FieldModel) -> Self {
        self.fields.push(field);
        self
    }

    #[must_use]
    pub fn declared_field(&self, name: &str) -> Option<&FieldModel> {
        self.fields.iter().find(|field| field.name == name)
    }
}

///
/// MetadataProvider
///
/// Read-only source of class metadata.
///

pub trait MetadataProvider {
    fn class(&self, name: &str) -> Option<&ClassModel>;

    /// The class followed by its superclass chain, nearest first.
    fn lineage(&self, name: &str) -> Result<Vec<&ClassModel>, InternalError> {
        let mut chain: Vec<&ClassModel> = Vec::new();
        let mut next = Some(name);

        while let Some(current) = next {
            if chain.iter().any(|class| class.name == current) {
                return Err(InternalError::model_configuration(format!(
                    "inheritance cycle through class '{current}' (starting at '{name}')"
                )));
            }
            let class = self.class(current).ok_or_else(|| {
                InternalError::model_configuration(format!(
                    "class '{current}' is not registered (lineage of '{name}')"
                ))
            })?;
            chain.push(class);
            next = class.superclass;
        }

        Ok(chain)
    }

    /// Resolve a field declared on the class or any of its ancestors.
    fn field(&self, class: &str, field: &str) -> Result<Option<&FieldModel>, InternalError> {
        Ok(self
            .lineage(class)?
            .into_iter()
            .find_map(|model| model.declared_field(field)))
    }
}

///
/// ModelRegistry
///

#[derive(Clone, Debug, Default)]
pub struct ModelRegistry {
    classes: BTreeMap<&'static str, ClassModel>,
}

impl ModelRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a class. Names must be unique.
    pub fn register(&mut self, class: ClassModel) -> Result<(), InternalError> {
        if self.classes.contains_key(class.name) {
            return Err(InternalError::model_configuration(format!(
                "class '{}' is already registered",
                class.name
            )));
        }
        self.classes.insert(class.name, class);

        Ok(())
    }

    #[must_use]
    pub fn with(mut self, class: ClassModel) -> Self {
        // builder form for static setups; duplicates replace
        self.classes.insert(class.name, class);
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

impl MetadataProvider for ModelRegistry {
    fn class(&self, name: &str) -> Option<&ClassModel> {
        self.classes.get(name)
    }
}

///
/// TESTS
///

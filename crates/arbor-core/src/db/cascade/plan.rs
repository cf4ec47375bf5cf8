use crate::{
    error::InternalError,
    model::{MetadataProvider, RelationKind},
};

///
/// FieldStrategy
///
/// How one relationship field participates in a delete cascade.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum FieldStrategy {
    /// Related rows are deleted (recursively) before the owner.
    DependentDelete {
        field: &'static str,
        target: &'static str,
        owned: bool,
        mapped_by: Option<&'static str>,
    },

    /// One-to-one non-owner side: the related row holds the reference in
    /// `mapped_by`, which is nulled.
    NonOwnerNull {
        field: &'static str,
        target: &'static str,
        mapped_by: &'static str,
    },

    /// Many-to-one bidirectional join field; no cascade action is defined.
    JoinReserved {
        field: &'static str,
        target: &'static str,
    },
}

impl FieldStrategy {
    #[must_use]
    pub const fn field(&self) -> &'static str {
        match self {
            Self::DependentDelete { field, .. }
            | Self::NonOwnerNull { field, .. }
            | Self::JoinReserved { field, .. } => field,
        }
    }
}

///
/// CascadePlan
///
/// Per-class ordered strategy list: the class's own fields first, then each
/// superclass in turn; declaration order within a class.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CascadePlan {
    class: String,
    strategies: Vec<FieldStrategy>,
}

impl CascadePlan {
    pub(crate) fn build<M>(metadata: &M, class: &str) -> Result<Self, InternalError>
    where
        M: MetadataProvider + ?Sized,
    {
        let mut strategies = Vec::new();

        for model in metadata.lineage(class)? {
            for field in &model.fields {
                let Some(relation) = &field.relation else {
                    continue;
                };
                if field.embedded {
                    continue;
                }

                let strategy = if relation.dependent {
                    Some(FieldStrategy::DependentDelete {
                        field: field.name,
                        target: relation.target,
                        owned: relation.owned,
                        mapped_by: relation.mapped_by,
                    })
                } else {
                    match (relation.kind, relation.mapped_by) {
                        (RelationKind::OneToOne, Some(mapped_by)) if relation.bidirectional => {
                            Some(FieldStrategy::NonOwnerNull {
                                field: field.name,
                                target: relation.target,
                                mapped_by,
                            })
                        }
                        (RelationKind::ManyToOne, _) if relation.bidirectional && relation.join => {
                            Some(FieldStrategy::JoinReserved {
                                field: field.name,
                                target: relation.target,
                            })
                        }
                        _ => None,
                    }
                };

                strategies.extend(strategy);
            }
        }

        Ok(Self {
            class: class.to_string(),
            strategies,
        })
    }

    #[must_use]
    pub fn class(&self) -> &str {
        &self.class
    }

    #[must_use]
    pub fn strategies(&self) -> &[FieldStrategy] {
        &self.strategies
    }

    /// Dependent-delete callbacks, in cascade order.
    pub fn callbacks(&self) -> impl Iterator<Item = &FieldStrategy> {
        self.strategies
            .iter()
            .filter(|strategy| matches!(strategy, FieldStrategy::DependentDelete { .. }))
    }

    /// One-to-one non-owner fields whose related rows are nulled.
    pub fn non_owner(&self) -> impl Iterator<Item = &FieldStrategy> {
        self.strategies
            .iter()
            .filter(|strategy| matches!(strategy, FieldStrategy::NonOwnerNull { .. }))
    }

    /// Join fields with no defined cascade behavior.
    pub fn reserved(&self) -> impl Iterator<Item = &FieldStrategy> {
        self.strategies
            .iter()
            .filter(|strategy| matches!(strategy, FieldStrategy::JoinReserved { .. }))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}

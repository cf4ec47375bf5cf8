///
/// RelationKind
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RelationKind {
    OneToOne,
    OneToMany,
    ManyToOne,
}

///
/// RelationModel
///
/// Relationship descriptor for one member field. Built once at metadata load
/// and read-only afterwards.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RelationModel {
    pub kind: RelationKind,

    /// Related class name (equal to the related rows' entity kind).
    pub target: &'static str,

    /// Field on the related class holding the foreign reference. When set,
    /// this side stores no column and is the non-owner side.
    pub mapped_by: Option<&'static str>,

    pub bidirectional: bool,

    /// Related rows are deleted together with the owning row.
    pub dependent: bool,

    /// Related rows' keys carry the owning row's key as their parent.
    pub owned: bool,

    /// Relationship is represented through a join structure.
    pub join: bool,
}

impl RelationModel {
    #[must_use]
    pub const fn new(kind: RelationKind, target: &'static str) -> Self {
        Self {
            kind,
            target,
            mapped_by: None,
            bidirectional: false,
            dependent: false,
            owned: false,
            join: false,
        }
    }

    #[must_use]
    pub const fn one_to_one(target: &'static str) -> Self {
        Self::new(RelationKind::OneToOne, target)
    }

    #[must_use]
    pub const fn one_to_many(target: &'static str) -> Self {
        Self::new(RelationKind::OneToMany, target)
    }

    #[must_use]
    pub const fn many_to_one(target: &'static str) -> Self {
        Self::new(RelationKind::ManyToOne, target)
    }

    /// Set the back-reference field on the related class. Implies bidirectional.
    #[must_use]
    pub const fn mapped_by(mut self, field: &'static str) -> Self {
        self.mapped_by = Some(field);
        self.bidirectional = true;
        self
    }

    #[must_use]
    pub const fn bidirectional(mut self) -> Self {
        self.bidirectional = true;
        self
    }

    #[must_use]
    pub const fn dependent(mut self) -> Self {
        self.dependent = true;
        self
    }

    /// Mark related rows as hierarchically owned (keyed under this row).
    #[must_use]
    pub const fn owned(mut self) -> Self {
        self.owned = true;
        self
    }

    #[must_use]
    pub const fn join(mut self) -> Self {
        self.join = true;
        self
    }
}

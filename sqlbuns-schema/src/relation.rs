//! Relations and indexes for the sqlbuns schema model.

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::error::{SchemaError, SchemaResult};

/// The kind of a relation between two models.
///
/// Relations are unidirectional: the owning (parent-side) expression is
/// canonical, and the data model carries no back-references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RelationKind {
    /// One row on the owning side references at most one target row.
    HasOne,
    /// Many owning rows reference the same target row.
    HasMany,
    /// Rows relate through a join table.
    ManyToMany,
}

impl RelationKind {
    /// Parse a relation kind from its authoring-surface name.
    pub fn parse(s: &str) -> SchemaResult<Self> {
        match s {
            "hasOne" => Ok(Self::HasOne),
            "hasMany" => Ok(Self::HasMany),
            "manyToMany" => Ok(Self::ManyToMany),
            other => Err(SchemaError::invalid_relation(
                other,
                "kind must be one of hasOne, hasMany, manyToMany",
            )),
        }
    }
}

impl std::fmt::Display for RelationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::HasOne => write!(f, "hasOne"),
            Self::HasMany => write!(f, "hasMany"),
            Self::ManyToMany => write!(f, "manyToMany"),
        }
    }
}

/// A relation owned by a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    /// Relation kind.
    pub kind: RelationKind,
    /// Name of the target model.
    pub target: SmolStr,
    /// Foreign-key column on the owning side.
    pub foreign_key: SmolStr,
    /// Opposite-key column name (manyToMany only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub other_key: Option<SmolStr>,
    /// Join-table name (manyToMany only). Auto-generated when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub through: Option<SmolStr>,
}

impl Relation {
    /// Create a hasOne relation.
    pub fn has_one(target: impl Into<SmolStr>, foreign_key: impl Into<SmolStr>) -> Self {
        Self {
            kind: RelationKind::HasOne,
            target: target.into(),
            foreign_key: foreign_key.into(),
            other_key: None,
            through: None,
        }
    }

    /// Create a hasMany relation.
    pub fn has_many(target: impl Into<SmolStr>, foreign_key: impl Into<SmolStr>) -> Self {
        Self {
            kind: RelationKind::HasMany,
            target: target.into(),
            foreign_key: foreign_key.into(),
            other_key: None,
            through: None,
        }
    }

    /// Create a manyToMany relation.
    pub fn many_to_many(
        target: impl Into<SmolStr>,
        foreign_key: impl Into<SmolStr>,
        other_key: impl Into<SmolStr>,
    ) -> Self {
        Self {
            kind: RelationKind::ManyToMany,
            target: target.into(),
            foreign_key: foreign_key.into(),
            other_key: Some(other_key.into()),
            through: None,
        }
    }

    /// Set the join-table name for a manyToMany relation.
    pub fn with_through(mut self, through: impl Into<SmolStr>) -> Self {
        self.through = Some(through.into());
        self
    }

    /// The join-table name, auto-generated as `<base>_<target>_link` when the
    /// relation did not name one. `base` is the owning model's name.
    pub fn through_table(&self, base: &str) -> String {
        match &self.through {
            Some(through) => through.to_string(),
            None => format!("{}_{}_link", base, self.target),
        }
    }

    pub(crate) fn validate(&self, name: &str) -> SchemaResult<()> {
        match self.kind {
            RelationKind::ManyToMany => {
                if self.other_key.is_none() {
                    return Err(SchemaError::invalid_relation(
                        name,
                        "manyToMany requires an opposite key column",
                    ));
                }
            }
            RelationKind::HasOne | RelationKind::HasMany => {
                if self.other_key.is_some() || self.through.is_some() {
                    return Err(SchemaError::invalid_relation(
                        name,
                        format!("{} does not take an opposite key or through table", self.kind),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// An index over one or more columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Index {
    /// Ordered column names.
    pub fields: Vec<SmolStr>,
    /// Whether this is a unique index.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub unique: bool,
    /// Index name. Auto-generated when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<SmolStr>,
}

impl Index {
    /// Create a non-unique index.
    pub fn new(fields: impl IntoIterator<Item = impl Into<SmolStr>>) -> Self {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
            unique: false,
            name: None,
        }
    }

    /// Create a unique index.
    pub fn unique(fields: impl IntoIterator<Item = impl Into<SmolStr>>) -> Self {
        Self {
            unique: true,
            ..Self::new(fields)
        }
    }

    /// Set an explicit index name.
    pub fn with_name(mut self, name: impl Into<SmolStr>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// The name synthesized when the user supplies none:
    /// `idx_<table>_<fields-joined-by-underscore>`.
    pub fn auto_name(&self, table: &str) -> String {
        let fields: Vec<&str> = self.fields.iter().map(|f| f.as_str()).collect();
        format!("idx_{}_{}", table, fields.join("_"))
    }

    /// The effective index name: the explicit name if present, otherwise the
    /// auto-synthesized one.
    pub fn effective_name(&self, table: &str) -> String {
        match &self.name {
            Some(name) => name.to_string(),
            None => self.auto_name(table),
        }
    }

    /// The key used to pair indexes across snapshots regardless of naming:
    /// sorted field list plus uniqueness.
    pub fn pairing_key(&self) -> String {
        let mut fields: Vec<&str> = self.fields.iter().map(|f| f.as_str()).collect();
        fields.sort_unstable();
        format!("{}|{}", fields.join(","), self.unique)
    }
}

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The four declarative relationship kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipKind {
    OneToMany,
    ManyToOne,
    OneToOne,
    ManyToMany,
}

impl RelationshipKind {
    /// Kinds that may stand as the inverse of this kind on the target entity.
    pub fn inverse_kinds(&self) -> &'static [RelationshipKind] {
        match self {
            RelationshipKind::OneToMany => &[RelationshipKind::ManyToOne],
            RelationshipKind::ManyToOne => {
                &[RelationshipKind::OneToMany, RelationshipKind::OneToOne]
            }
            RelationshipKind::OneToOne => &[RelationshipKind::ManyToOne],
            RelationshipKind::ManyToMany => &[RelationshipKind::ManyToMany],
        }
    }

    /// Returns true if `other` is a valid inverse of this kind.
    pub fn accepts_inverse(&self, other: RelationshipKind) -> bool {
        self.inverse_kinds().contains(&other)
    }

    /// Kind of the back-reference generated on the target entity.
    pub fn backref_kind(&self) -> RelationshipKind {
        match self {
            RelationshipKind::OneToMany => RelationshipKind::ManyToOne,
            RelationshipKind::ManyToOne => RelationshipKind::OneToMany,
            RelationshipKind::OneToOne => RelationshipKind::ManyToOne,
            RelationshipKind::ManyToMany => RelationshipKind::ManyToMany,
        }
    }

    /// Returns true if the accessor yields a collection.
    pub fn uselist(&self) -> bool {
        matches!(
            self,
            RelationshipKind::OneToMany | RelationshipKind::ManyToMany
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipKind::OneToMany => "OneToMany",
            RelationshipKind::ManyToOne => "ManyToOne",
            RelationshipKind::OneToOne => "OneToOne",
            RelationshipKind::ManyToMany => "ManyToMany",
        }
    }
}

impl fmt::Display for RelationshipKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Container semantics of collection-valued accessors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionKind {
    /// No duplicates, ordered by primary key.
    #[default]
    Set,
    /// Insertion order.
    List,
}

impl FromStr for CollectionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "set" => Ok(CollectionKind::Set),
            "list" => Ok(CollectionKind::List),
            other => Err(format!("unknown collection kind '{other}' (expected set or list)")),
        }
    }
}

/// `ON DELETE` action of a generated foreign key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnDelete {
    Cascade,
    SetNull,
    Restrict,
}

impl OnDelete {
    pub fn sql(&self) -> &'static str {
        match self {
            OnDelete::Cascade => "CASCADE",
            OnDelete::SetNull => "SET NULL",
            OnDelete::Restrict => "RESTRICT",
        }
    }
}

/// A pending relationship declaration.
///
/// The target is named, not referenced: it is looked up in the entity
/// registry when the schema is resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    /// Attribute name on the declaring entity.
    pub name: String,
    pub kind: RelationshipKind,
    /// Name of the target entity.
    pub target: String,
    /// Attribute name of the inverse accessor on the target.
    #[serde(default)]
    pub inverse: Option<String>,
    /// Foreign key column name, overriding the naming rule.
    #[serde(default)]
    pub colname: Option<String>,
    #[serde(default)]
    pub collection: Option<CollectionKind>,
    /// Target column ordering collection reads.
    #[serde(default)]
    pub order_by: Option<String>,
    #[serde(default)]
    pub on_delete: Option<OnDelete>,
    /// Join table name (many-to-many only).
    #[serde(default)]
    pub tablename: Option<String>,
    /// Join table column referencing the declaring entity (many-to-many only).
    #[serde(default)]
    pub local_colname: Option<String>,
    /// Join table column referencing the target entity (many-to-many only).
    #[serde(default)]
    pub remote_colname: Option<String>,
}

impl Relationship {
    pub fn new(name: impl Into<String>, kind: RelationshipKind, target: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            target: target.into(),
            inverse: None,
            colname: None,
            collection: None,
            order_by: None,
            on_delete: None,
            tablename: None,
            local_colname: None,
            remote_colname: None,
        }
    }

    pub fn one_to_many(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(name, RelationshipKind::OneToMany, target)
    }

    pub fn many_to_one(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(name, RelationshipKind::ManyToOne, target)
    }

    pub fn one_to_one(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(name, RelationshipKind::OneToOne, target)
    }

    pub fn many_to_many(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(name, RelationshipKind::ManyToMany, target)
    }

    pub fn inverse(mut self, inverse: impl Into<String>) -> Self {
        self.inverse = Some(inverse.into());
        self
    }

    pub fn colname(mut self, colname: impl Into<String>) -> Self {
        self.colname = Some(colname.into());
        self
    }

    pub fn collection(mut self, collection: CollectionKind) -> Self {
        self.collection = Some(collection);
        self
    }

    pub fn order_by(mut self, column: impl Into<String>) -> Self {
        self.order_by = Some(column.into());
        self
    }

    pub fn on_delete(mut self, action: OnDelete) -> Self {
        self.on_delete = Some(action);
        self
    }

    pub fn tablename(mut self, tablename: impl Into<String>) -> Self {
        self.tablename = Some(tablename.into());
        self
    }

    pub fn local_colname(mut self, colname: impl Into<String>) -> Self {
        self.local_colname = Some(colname.into());
        self
    }

    pub fn remote_colname(mut self, colname: impl Into<String>) -> Self {
        self.remote_colname = Some(colname.into());
        self
    }

    /// Names the first option set on this descriptor that its kind ignores.
    pub fn misplaced_option(&self) -> Option<&'static str> {
        let many_to_many = self.kind == RelationshipKind::ManyToMany;

        if many_to_many && self.colname.is_some() {
            return Some("colname");
        }
        if !many_to_many {
            if self.tablename.is_some() {
                return Some("tablename");
            }
            if self.local_colname.is_some() {
                return Some("local_colname");
            }
            if self.remote_colname.is_some() {
                return Some("remote_colname");
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inverse_kinds() {
        assert!(RelationshipKind::OneToMany.accepts_inverse(RelationshipKind::ManyToOne));
        assert!(!RelationshipKind::OneToMany.accepts_inverse(RelationshipKind::OneToMany));
        assert!(RelationshipKind::ManyToOne.accepts_inverse(RelationshipKind::OneToOne));
        assert!(RelationshipKind::OneToOne.accepts_inverse(RelationshipKind::ManyToOne));
        assert!(!RelationshipKind::OneToOne.accepts_inverse(RelationshipKind::OneToMany));
        assert!(RelationshipKind::ManyToMany.accepts_inverse(RelationshipKind::ManyToMany));
    }

    #[test]
    fn test_uselist() {
        assert!(RelationshipKind::OneToMany.uselist());
        assert!(RelationshipKind::ManyToMany.uselist());
        assert!(!RelationshipKind::ManyToOne.uselist());
        assert!(!RelationshipKind::OneToOne.uselist());
    }

    #[test]
    fn test_collection_kind_from_str() {
        assert_eq!("set".parse::<CollectionKind>(), Ok(CollectionKind::Set));
        assert_eq!(" List ".parse::<CollectionKind>(), Ok(CollectionKind::List));
        assert!("dict".parse::<CollectionKind>().is_err());
    }

    #[test]
    fn test_misplaced_option() {
        let rel = Relationship::many_to_many("tags", "Tag").colname("tag_id");
        assert_eq!(rel.misplaced_option(), Some("colname"));

        let rel = Relationship::one_to_many("children", "Child").tablename("x");
        assert_eq!(rel.misplaced_option(), Some("tablename"));

        let rel = Relationship::many_to_many("tags", "Tag").tablename("movie_tags");
        assert_eq!(rel.misplaced_option(), None);
    }

    #[test]
    fn test_relationship_deserializes() {
        let rel: Relationship = serde_json::from_str(
            r#"{"name": "children", "kind": "one_to_many", "target": "Child", "collection": "list"}"#,
        )
        .unwrap();

        assert_eq!(rel.kind, RelationshipKind::OneToMany);
        assert_eq!(rel.collection, Some(CollectionKind::List));
        assert_eq!(rel.inverse, None);
    }
}

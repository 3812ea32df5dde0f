//! The immutable output of the resolution pass.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::entity::{Field, SqlType, Value};
use crate::relationship::{CollectionKind, OnDelete, RelationshipKind};

/// A foreign key constraint on a column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ForeignKeyRef {
    pub table: String,
    pub column: String,
    pub on_delete: Option<OnDelete>,
}

/// A column of a generated table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Column {
    pub name: String,
    pub sql_type: SqlType,
    pub primary_key: bool,
    pub nullable: bool,
    pub unique: bool,
    pub default: Option<Value>,
    pub references: Option<ForeignKeyRef>,
}

impl Column {
    pub fn primary_key(name: impl Into<String>, sql_type: SqlType) -> Self {
        Self {
            name: name.into(),
            sql_type,
            primary_key: true,
            nullable: false,
            unique: false,
            default: None,
            references: None,
        }
    }

    /// A nullable foreign key column.
    pub fn foreign_key(
        name: impl Into<String>,
        sql_type: SqlType,
        references: ForeignKeyRef,
    ) -> Self {
        Self {
            name: name.into(),
            sql_type,
            primary_key: false,
            nullable: true,
            unique: false,
            default: None,
            references: Some(references),
        }
    }
}

impl From<&Field> for Column {
    fn from(field: &Field) -> Self {
        Self {
            name: field.name.clone(),
            sql_type: field.sql_type,
            primary_key: field.primary_key,
            nullable: field.nullable && !field.primary_key,
            unique: field.unique,
            default: field.default.clone(),
            references: None,
        }
    }
}

/// What a table stores.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum TableKind {
    /// The table of the named entity.
    Entity(String),
    /// A generated many-to-many join table.
    Join,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Table {
    pub name: String,
    pub kind: TableKind,
    pub columns: Vec<Column>,
}

impl Table {
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_mut(&mut self, name: &str) -> Option<&mut Column> {
        self.columns.iter_mut().find(|c| c.name == name)
    }

    pub fn primary_key(&self) -> Vec<&Column> {
        self.columns.iter().filter(|c| c.primary_key).collect()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Names of the other tables this one references.
    pub fn referenced_tables(&self) -> Vec<&str> {
        let mut tables: Vec<&str> = self
            .columns
            .iter()
            .filter_map(|c| c.references.as_ref())
            .map(|r| r.table.as_str())
            .filter(|t| *t != self.name)
            .collect();
        tables.dedup();
        tables
    }

    pub fn is_join(&self) -> bool {
        self.kind == TableKind::Join
    }
}

/// A join through a foreign key column: `table.column` references
/// `referenced_table.referenced_column`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ForeignKeyJoin {
    pub table: String,
    pub column: String,
    pub referenced_table: String,
    pub referenced_column: String,
}

/// A join through a many-to-many join table, seen from one side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SecondaryJoin {
    pub table: String,
    /// Join table column referencing the local entity.
    pub local_column: String,
    /// Join table column referencing the target entity.
    pub remote_column: String,
    pub local_table: String,
    pub local_key: String,
    pub remote_table: String,
    pub remote_key: String,
}

impl SecondaryJoin {
    /// The same join seen from the other side.
    pub fn reversed(&self) -> Self {
        Self {
            table: self.table.clone(),
            local_column: self.remote_column.clone(),
            remote_column: self.local_column.clone(),
            local_table: self.remote_table.clone(),
            local_key: self.remote_key.clone(),
            remote_table: self.local_table.clone(),
            remote_key: self.local_key.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Join {
    ForeignKey(ForeignKeyJoin),
    Secondary(SecondaryJoin),
}

/// A live relationship accessor bound onto an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelationshipMapping {
    pub attribute: String,
    pub kind: RelationshipKind,
    /// Target entity name.
    pub target: String,
    pub join: Join,
    /// Collection-valued (`true`) or scalar (`false`) accessor.
    pub uselist: bool,
    pub collection: CollectionKind,
    /// Attribute name of the inverse accessor on the target, if any.
    pub back_populates: Option<String>,
    pub order_by: Option<String>,
    /// Generated on the target side rather than declared.
    pub backref: bool,
}

/// An entity after resolution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedEntity {
    pub name: String,
    pub table: String,
    pub primary_key: Vec<String>,
    pub relationships: BTreeMap<String, RelationshipMapping>,
}

impl ResolvedEntity {
    /// The key column, when the primary key is a single column.
    pub fn key_column(&self) -> Option<&str> {
        match self.primary_key.as_slice() {
            [key] => Some(key),
            _ => None,
        }
    }
}

/// The fully resolved schema of one metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedSchema {
    pub(crate) name: String,
    pub(crate) tables: Vec<Table>,
    pub(crate) entities: Vec<ResolvedEntity>,
}

impl ResolvedSchema {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// All tables: entity tables in declaration order, then join tables.
    pub fn tables(&self) -> &[Table] {
        &self.tables
    }

    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn join_tables(&self) -> impl Iterator<Item = &Table> {
        self.tables.iter().filter(|t| t.is_join())
    }

    pub fn entities(&self) -> &[ResolvedEntity] {
        &self.entities
    }

    pub fn entity(&self, name: &str) -> Option<&ResolvedEntity> {
        self.entities.iter().find(|e| e.name == name)
    }

    /// The table of an entity.
    pub fn entity_table(&self, name: &str) -> Option<&Table> {
        self.entity(name).and_then(|e| self.table(&e.table))
    }

    /// Looks up the relationship bound as `attribute` on `entity`.
    pub fn mapping(&self, entity: &str, attribute: &str) -> Option<&RelationshipMapping> {
        self.entity(entity)
            .and_then(|e| e.relationships.get(attribute))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_from_field() {
        let field = Field::new("code", SqlType::Text).primary_key();
        let column = Column::from(&field);

        assert!(column.primary_key);
        assert!(!column.nullable);
        assert!(column.references.is_none());
    }

    #[test]
    fn test_secondary_join_reversed() {
        let join = SecondaryJoin {
            table: "tag_tags__movie_movies".to_string(),
            local_column: "movie_id".to_string(),
            remote_column: "tag_id".to_string(),
            local_table: "movie".to_string(),
            local_key: "id".to_string(),
            remote_table: "tag".to_string(),
            remote_key: "id".to_string(),
        };

        let reversed = join.reversed();
        assert_eq!(reversed.local_column, "tag_id");
        assert_eq!(reversed.remote_table, "movie");
        assert_eq!(reversed.reversed(), join);
    }

    #[test]
    fn test_referenced_tables_skip_self_references() {
        let table = Table {
            name: "node".to_string(),
            kind: TableKind::Entity("Node".to_string()),
            columns: vec![
                Column::primary_key("id", SqlType::Integer),
                Column::foreign_key(
                    "parent_id",
                    SqlType::Integer,
                    ForeignKeyRef {
                        table: "node".to_string(),
                        column: "id".to_string(),
                        on_delete: None,
                    },
                ),
            ],
        };

        assert!(table.referenced_tables().is_empty());
    }
}

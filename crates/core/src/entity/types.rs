use std::fmt;

use serde::{Deserialize, Serialize};

use super::Value;
use crate::relationship::Relationship;

/// Column types understood by the SQLite backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SqlType {
    Integer,
    Real,
    Text,
    Blob,
    Boolean,
    Timestamp,
    Varchar(u32),
}

impl SqlType {
    /// Returns the type name used in `CREATE TABLE` statements.
    pub fn sql(&self) -> String {
        match self {
            SqlType::Integer => "INTEGER".to_string(),
            SqlType::Real => "REAL".to_string(),
            SqlType::Text => "TEXT".to_string(),
            SqlType::Blob => "BLOB".to_string(),
            SqlType::Boolean => "BOOLEAN".to_string(),
            SqlType::Timestamp => "TIMESTAMP".to_string(),
            SqlType::Varchar(len) => format!("VARCHAR({len})"),
        }
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql())
    }
}

/// A plain column declared on an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(rename = "type")]
    pub sql_type: SqlType,
    #[serde(default)]
    pub primary_key: bool,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
    #[serde(default)]
    pub unique: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

fn default_nullable() -> bool {
    true
}

impl Field {
    /// Creates a nullable, non-unique column.
    pub fn new(name: impl Into<String>, sql_type: SqlType) -> Self {
        Self {
            name: name.into(),
            sql_type,
            primary_key: false,
            nullable: true,
            unique: false,
            default: None,
        }
    }

    /// Marks the column as (part of) the primary key.
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }
}

/// How an entity gets its primary key.
///
/// `true` generates an `id INTEGER PRIMARY KEY`, a string generates an
/// integer key with that column name, `false` expects a declared key field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AutoPrimaryKey {
    Enabled(bool),
    Named(String),
}

impl Default for AutoPrimaryKey {
    fn default() -> Self {
        AutoPrimaryKey::Enabled(true)
    }
}

impl AutoPrimaryKey {
    /// Returns the generated key column name, if a key is generated.
    pub fn column_name(&self) -> Option<&str> {
        match self {
            AutoPrimaryKey::Enabled(true) => Some("id"),
            AutoPrimaryKey::Enabled(false) => None,
            AutoPrimaryKey::Named(name) => Some(name),
        }
    }
}

/// Table naming and key generation options of an entity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityOptions {
    /// Explicit table name, bypassing the naming rule.
    #[serde(default)]
    pub tablename: Option<String>,
    /// Module path used to prefix the table name (`app::models` -> `app_models_`).
    #[serde(default)]
    pub module: Option<String>,
    /// Drop the module prefix from the generated table name.
    #[serde(default)]
    pub shortname: bool,
    #[serde(default)]
    pub auto_primarykey: AutoPrimaryKey,
}

impl EntityOptions {
    /// Computes the table name of an entity called `name`.
    pub fn table_name(&self, name: &str) -> String {
        if let Some(tablename) = &self.tablename {
            return tablename.clone();
        }

        let prefix = match (&self.module, self.shortname) {
            (Some(module), false) if !module.is_empty() => {
                format!("{}_", module.replace("::", "_").replace('.', "_"))
            }
            _ => String::new(),
        };

        format!("{prefix}{name}").to_lowercase()
    }
}

/// An entity declaration: one table, its fields and pending relationships.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub name: String,
    #[serde(flatten)]
    pub options: EntityOptions,
    #[serde(default, rename = "field")]
    pub fields: Vec<Field>,
    #[serde(default, rename = "relationship")]
    pub relationships: Vec<Relationship>,
}

impl Entity {
    /// Starts a declaration with an auto-generated `id` primary key.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            options: EntityOptions::default(),
            fields: Vec::new(),
            relationships: Vec::new(),
        }
    }

    pub fn tablename(mut self, tablename: impl Into<String>) -> Self {
        self.options.tablename = Some(tablename.into());
        self
    }

    pub fn module(mut self, module: impl Into<String>) -> Self {
        self.options.module = Some(module.into());
        self
    }

    pub fn shortname(mut self) -> Self {
        self.options.shortname = true;
        self
    }

    /// Disables the generated primary key; a field must be declared as key.
    pub fn without_auto_primarykey(mut self) -> Self {
        self.options.auto_primarykey = AutoPrimaryKey::Enabled(false);
        self
    }

    /// Generates the integer primary key under a custom column name.
    pub fn auto_primarykey_named(mut self, column: impl Into<String>) -> Self {
        self.options.auto_primarykey = AutoPrimaryKey::Named(column.into());
        self
    }

    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    pub fn relationship(mut self, relationship: Relationship) -> Self {
        self.relationships.push(relationship);
        self
    }

    pub fn one_to_many(self, name: impl Into<String>, target: impl Into<String>) -> Self {
        self.relationship(Relationship::one_to_many(name, target))
    }

    pub fn many_to_one(self, name: impl Into<String>, target: impl Into<String>) -> Self {
        self.relationship(Relationship::many_to_one(name, target))
    }

    pub fn one_to_one(self, name: impl Into<String>, target: impl Into<String>) -> Self {
        self.relationship(Relationship::one_to_one(name, target))
    }

    pub fn many_to_many(self, name: impl Into<String>, target: impl Into<String>) -> Self {
        self.relationship(Relationship::many_to_many(name, target))
    }

    /// Returns the table name this entity maps to.
    pub fn table_name(&self) -> String {
        self.options.table_name(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_name_defaults_to_lowercase_name() {
        assert_eq!(Entity::new("Parent").table_name(), "parent");
    }

    #[test]
    fn test_table_name_uses_module_prefix() {
        let entity = Entity::new("Movie").module("app::models");
        assert_eq!(entity.table_name(), "app_models_movie");

        let short = Entity::new("Movie").module("app::models").shortname();
        assert_eq!(short.table_name(), "movie");
    }

    #[test]
    fn test_explicit_tablename_wins() {
        let entity = Entity::new("Movie")
            .module("app::models")
            .tablename("films");
        assert_eq!(entity.table_name(), "films");
    }

    #[test]
    fn test_auto_primarykey_column_name() {
        assert_eq!(AutoPrimaryKey::default().column_name(), Some("id"));
        assert_eq!(AutoPrimaryKey::Enabled(false).column_name(), None);
        assert_eq!(
            AutoPrimaryKey::Named("code".to_string()).column_name(),
            Some("code")
        );
    }

    #[test]
    fn test_field_builder() {
        let field = Field::new("label", SqlType::Varchar(50))
            .unique()
            .not_null()
            .with_default("none");

        assert!(field.unique);
        assert!(!field.nullable);
        assert_eq!(field.default, Some(Value::Text("none".to_string())));
        assert_eq!(field.sql_type.sql(), "VARCHAR(50)");
    }

    #[test]
    fn test_entity_deserializes_from_json() {
        let entity: Entity = serde_json::from_str(
            r#"{
                "name": "Language",
                "auto_primarykey": false,
                "field": [
                    {"name": "id", "type": {"varchar": 50}, "primary_key": true},
                    {"name": "label", "type": "text"}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(entity.options.auto_primarykey, AutoPrimaryKey::Enabled(false));
        assert_eq!(entity.fields.len(), 2);
        assert_eq!(entity.fields[0].sql_type, SqlType::Varchar(50));
        assert!(entity.fields[1].nullable);
    }
}

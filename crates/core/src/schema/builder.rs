//! Phase 1 of the schema build: collecting declarations into a closed graph.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use super::error::SchemaError;
use super::resolved::{Column, ResolvedSchema};
use super::resolver::{resolve, ResolveOptions};
use crate::entity::{Entity, SqlType};
use crate::relationship::Relationship;

/// A declarations document, as loaded from a TOML or JSON file.
///
/// ```toml
/// [[entity]]
/// name = "Parent"
///
/// [[entity.field]]
/// name = "name"
/// type = "text"
///
/// [[entity.relationship]]
/// name = "children"
/// kind = "one_to_many"
/// target = "Child"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Declarations {
    #[serde(default, rename = "entity")]
    pub entities: Vec<Entity>,
}

/// Registry of entity declarations for one metadata (one database).
#[derive(Debug, Clone, Default)]
pub struct SchemaBuilder {
    name: String,
    entities: Vec<Entity>,
}

impl SchemaBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entities: Vec::new(),
        }
    }

    pub fn from_declarations(name: impl Into<String>, declarations: Declarations) -> Self {
        Self {
            name: name.into(),
            entities: declarations.entities,
        }
    }

    /// Registers an entity declaration.
    pub fn entity(mut self, entity: Entity) -> Self {
        self.entities.push(entity);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns a copy registered under another metadata name.
    pub fn renamed(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entities: self.entities.clone(),
        }
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    /// Validates the declarations and closes them into an [`EntityGraph`].
    pub fn build(&self) -> Result<EntityGraph, SchemaError> {
        let mut nodes = Vec::with_capacity(self.entities.len());
        let mut index = HashMap::new();
        let mut tables = HashSet::new();

        for entity in &self.entities {
            if index.contains_key(&entity.name) {
                return Err(SchemaError::DuplicateEntity(entity.name.clone()));
            }

            let node = EntityNode::from_entity(entity)?;
            if !tables.insert(node.table.clone()) {
                return Err(SchemaError::DuplicateTable(node.table.clone()));
            }

            index.insert(entity.name.clone(), nodes.len());
            nodes.push(node);
        }

        Ok(EntityGraph {
            name: self.name.clone(),
            nodes,
            index,
        })
    }

    /// Builds the graph and runs the resolution pass over it.
    pub fn resolve(&self, options: &ResolveOptions) -> Result<ResolvedSchema, SchemaError> {
        resolve(&self.build()?, options)
    }
}

/// A node of the entity graph: one entity with its own columns and the
/// relationships it declares (the graph's outgoing edges).
#[derive(Debug, Clone, PartialEq)]
pub struct EntityNode {
    pub name: String,
    pub table: String,
    pub columns: Vec<Column>,
    pub relationships: Vec<Relationship>,
}

impl EntityNode {
    fn from_entity(entity: &Entity) -> Result<Self, SchemaError> {
        let mut columns = Vec::with_capacity(entity.fields.len() + 1);
        let mut attributes = HashSet::new();

        if let Some(pk) = entity.options.auto_primarykey.column_name() {
            attributes.insert(pk.to_string());
            columns.push(Column::primary_key(pk, SqlType::Integer));
        }

        for field in &entity.fields {
            if !attributes.insert(field.name.clone()) {
                return Err(SchemaError::DuplicateAttribute {
                    entity: entity.name.clone(),
                    attribute: field.name.clone(),
                });
            }
            columns.push(Column::from(field));
        }

        for relationship in &entity.relationships {
            if !attributes.insert(relationship.name.clone()) {
                return Err(SchemaError::DuplicateAttribute {
                    entity: entity.name.clone(),
                    attribute: relationship.name.clone(),
                });
            }
            if let Some(option) = relationship.misplaced_option() {
                return Err(SchemaError::InvalidOption {
                    entity: entity.name.clone(),
                    attribute: relationship.name.clone(),
                    option,
                });
            }
        }

        if !columns.iter().any(|c| c.primary_key) {
            return Err(SchemaError::MissingPrimaryKey(entity.name.clone()));
        }

        Ok(Self {
            name: entity.name.clone(),
            table: entity.table_name(),
            columns,
            relationships: entity.relationships.clone(),
        })
    }

    /// Returns the single primary key column, as relationships require.
    pub fn primary_key(&self) -> Result<&Column, SchemaError> {
        let mut keys = self.columns.iter().filter(|c| c.primary_key);
        match (keys.next(), keys.next()) {
            (Some(key), None) => Ok(key),
            (Some(_), Some(_)) => Err(SchemaError::CompositePrimaryKey(self.name.clone())),
            (None, _) => Err(SchemaError::MissingPrimaryKey(self.name.clone())),
        }
    }

    pub fn relationship_index(&self, name: &str) -> Option<usize> {
        self.relationships.iter().position(|r| r.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }
}

/// The closed set of declarations: nodes are entities, edges are pending
/// relationships naming their target.
#[derive(Debug, Clone)]
pub struct EntityGraph {
    name: String,
    nodes: Vec<EntityNode>,
    index: HashMap<String, usize>,
}

impl EntityGraph {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn nodes(&self) -> &[EntityNode] {
        &self.nodes
    }

    pub fn node(&self, name: &str) -> Option<&EntityNode> {
        self.index_of(name).map(|i| &self.nodes[i])
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Iterates every pending relationship with its declaring entity.
    pub fn edges(&self) -> impl Iterator<Item = (&EntityNode, &Relationship)> {
        self.nodes
            .iter()
            .flat_map(|node| node.relationships.iter().map(move |rel| (node, rel)))
    }
}

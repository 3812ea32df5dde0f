//! Phase 2 of the schema build: binding every relationship of a closed
//! [`EntityGraph`] into a [`ResolvedSchema`].
//!
//! Inverses are chosen from the declarations alone before anything is bound,
//! so the outcome never depends on the order entities were declared in.

use std::collections::{BTreeMap, HashMap};

use super::builder::{EntityGraph, EntityNode};
use super::error::SchemaError;
use super::naming;
use super::resolved::{
    Column, ForeignKeyJoin, ForeignKeyRef, Join, RelationshipMapping, ResolvedEntity,
    ResolvedSchema, SecondaryJoin, Table, TableKind,
};
use crate::relationship::{CollectionKind, OnDelete, Relationship, RelationshipKind};

/// Settings applied while resolving.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolveOptions {
    /// Collection semantics of collection-valued accessors without a hint.
    pub default_collection: CollectionKind,
}

/// The inverse a descriptor resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Inverse {
    None,
    /// Index of a declared descriptor on the target entity.
    Descriptor(usize),
    /// Name of a back-reference to generate on the target entity.
    Backref(String),
}

/// (entity index, relationship index)
type EdgeId = (usize, usize);

/// Resolves every relationship of `graph`.
pub fn resolve(
    graph: &EntityGraph,
    options: &ResolveOptions,
) -> Result<ResolvedSchema, SchemaError> {
    let mut choices = HashMap::new();
    for (ei, node) in graph.nodes().iter().enumerate() {
        for ri in 0..node.relationships.len() {
            choices.insert((ei, ri), choose_inverse(graph, ei, ri)?);
        }
    }

    check_mutual(graph, &choices)?;

    let mut binder = Binder::new(graph, *options);
    for (ei, node) in graph.nodes().iter().enumerate() {
        for ri in 0..node.relationships.len() {
            let inverse = choices.get(&(ei, ri)).cloned().unwrap_or(Inverse::None);
            binder.bind(ei, ri, &inverse)?;
        }
    }

    binder.finish()
}

fn target_index(
    graph: &EntityGraph,
    node: &EntityNode,
    rel: &Relationship,
) -> Result<usize, SchemaError> {
    graph
        .index_of(&rel.target)
        .ok_or_else(|| SchemaError::TargetNotFound {
            entity: node.name.clone(),
            attribute: rel.name.clone(),
            target: rel.target.clone(),
        })
}

fn choose_inverse(graph: &EntityGraph, ei: usize, ri: usize) -> Result<Inverse, SchemaError> {
    let node = &graph.nodes()[ei];
    let rel = &node.relationships[ri];
    let ti = target_index(graph, node, rel)?;
    let target = &graph.nodes()[ti];

    if let Some(name) = &rel.inverse {
        if let Some(di) = target.relationship_index(name) {
            let candidate = &target.relationships[di];
            let is_self = ti == ei && di == ri;
            if is_self
                || !rel.kind.accepts_inverse(candidate.kind)
                || candidate.target != node.name
            {
                return Err(SchemaError::IncompatibleInverse {
                    entity: node.name.clone(),
                    attribute: rel.name.clone(),
                    kind: rel.kind.as_str(),
                    target: target.name.clone(),
                    inverse: candidate.name.clone(),
                    inverse_kind: candidate.kind.as_str(),
                });
            }
            return Ok(Inverse::Descriptor(di));
        }

        if target.has_column(name) {
            return Err(SchemaError::AttributeConflict {
                entity: target.name.clone(),
                attribute: name.clone(),
            });
        }
        return Ok(Inverse::Backref(name.clone()));
    }

    let mut naming_us = Vec::new();
    let mut unnamed = Vec::new();
    for (di, candidate) in target.relationships.iter().enumerate() {
        if ti == ei && di == ri {
            continue;
        }
        if !rel.kind.accepts_inverse(candidate.kind) || candidate.target != node.name {
            continue;
        }
        match effective_inverse(node, ei, target, ti, di) {
            Some(inverse) if inverse == rel.name => naming_us.push(di),
            Some(_) => {}
            None => unnamed.push(di),
        }
    }

    match (naming_us.as_slice(), unnamed.as_slice()) {
        ([di], _) | ([], [di]) => Ok(Inverse::Descriptor(*di)),
        ([], []) => Ok(Inverse::None),
        _ => Err(SchemaError::AmbiguousInverse {
            target: target.name.clone(),
            attribute: rel.name.clone(),
            entity: node.name.clone(),
        }),
    }
}

/// The inverse of descriptor `di` on `target`: its own `inverse`, or the
/// descriptor of `node` whose explicit `inverse` claims it.
fn effective_inverse<'a>(
    node: &'a EntityNode,
    ei: usize,
    target: &'a EntityNode,
    ti: usize,
    di: usize,
) -> Option<&'a str> {
    let candidate = &target.relationships[di];
    if let Some(inverse) = &candidate.inverse {
        return Some(inverse);
    }

    node.relationships
        .iter()
        .enumerate()
        .find(|(xi, claimant)| {
            !(ei == ti && *xi == di)
                && claimant.target == target.name
                && claimant.inverse.as_deref() == Some(candidate.name.as_str())
        })
        .map(|(_, claimant)| claimant.name.as_str())
}

/// Both sides of a declared pair must have chosen each other.
fn check_mutual(
    graph: &EntityGraph,
    choices: &HashMap<EdgeId, Inverse>,
) -> Result<(), SchemaError> {
    for (ei, node) in graph.nodes().iter().enumerate() {
        for (ri, rel) in node.relationships.iter().enumerate() {
            let Some(Inverse::Descriptor(di)) = choices.get(&(ei, ri)) else {
                continue;
            };
            let ti = target_index(graph, node, rel)?;
            let target = &graph.nodes()[ti];
            let candidate = &target.relationships[*di];

            let bound_to = match choices.get(&(ti, *di)) {
                Some(Inverse::Descriptor(back)) if *back == ri => continue,
                Some(Inverse::Descriptor(back)) => node.relationships[*back].name.clone(),
                Some(Inverse::Backref(name)) => name.clone(),
                _ => "nothing".to_string(),
            };

            return Err(SchemaError::InverseMismatch {
                entity: node.name.clone(),
                attribute: rel.name.clone(),
                target: target.name.clone(),
                inverse: candidate.name.clone(),
                bound_to,
            });
        }
    }
    Ok(())
}

struct Binder<'g> {
    graph: &'g EntityGraph,
    options: ResolveOptions,
    /// Entity tables share the index of their node; join tables follow.
    tables: Vec<Table>,
    mappings: Vec<BTreeMap<String, RelationshipMapping>>,
    joins: HashMap<EdgeId, Join>,
}

impl<'g> Binder<'g> {
    fn new(graph: &'g EntityGraph, options: ResolveOptions) -> Self {
        let tables = graph
            .nodes()
            .iter()
            .map(|node| Table {
                name: node.table.clone(),
                kind: TableKind::Entity(node.name.clone()),
                columns: node.columns.clone(),
            })
            .collect();

        Self {
            graph,
            options,
            tables,
            mappings: vec![BTreeMap::new(); graph.nodes().len()],
            joins: HashMap::new(),
        }
    }

    fn bind(&mut self, ei: usize, ri: usize, inverse: &Inverse) -> Result<(), SchemaError> {
        let graph = self.graph;
        let node = &graph.nodes()[ei];
        let rel = &node.relationships[ri];
        let ti = target_index(graph, node, rel)?;
        let target = &graph.nodes()[ti];

        let partner = match inverse {
            Inverse::Descriptor(di) => Some((*di, &target.relationships[*di])),
            _ => None,
        };
        let inverse_name = match inverse {
            Inverse::Descriptor(di) => Some(target.relationships[*di].name.as_str()),
            Inverse::Backref(name) => Some(name.as_str()),
            Inverse::None => None,
        };

        let shared = partner.and_then(|(di, _)| self.joins.get(&(ti, di)));
        let join = match shared {
            Some(Join::Secondary(join)) => Join::Secondary(join.reversed()),
            Some(join) => join.clone(),
            None => self.place(ei, ri, ti, partner.map(|(_, p)| p), inverse_name)?,
        };

        let one_to_one = rel.kind == RelationshipKind::OneToOne
            || partner.is_some_and(|(_, p)| p.kind == RelationshipKind::OneToOne);
        if one_to_one {
            self.mark_unique(&join);
        }

        self.joins.insert((ei, ri), join.clone());

        let collection = rel.collection.unwrap_or(self.options.default_collection);
        self.insert_mapping(
            ei,
            RelationshipMapping {
                attribute: rel.name.clone(),
                kind: rel.kind,
                target: target.name.clone(),
                join: join.clone(),
                uselist: rel.kind.uselist(),
                collection,
                back_populates: inverse_name.map(String::from),
                order_by: rel.order_by.clone(),
                backref: false,
            },
        )?;

        if let Inverse::Backref(name) = inverse {
            let kind = rel.kind.backref_kind();
            let join = match join {
                Join::Secondary(join) => Join::Secondary(join.reversed()),
                join => join,
            };
            self.insert_mapping(
                ti,
                RelationshipMapping {
                    attribute: name.clone(),
                    kind,
                    target: node.name.clone(),
                    join,
                    uselist: kind.uselist(),
                    collection,
                    back_populates: Some(rel.name.clone()),
                    order_by: None,
                    backref: true,
                },
            )?;
        }

        Ok(())
    }

    /// Creates the foreign key column or join table of a descriptor whose
    /// partner (if any) has not been bound yet.
    fn place(
        &mut self,
        ei: usize,
        ri: usize,
        ti: usize,
        partner: Option<&Relationship>,
        inverse_name: Option<&str>,
    ) -> Result<Join, SchemaError> {
        let graph = self.graph;
        let node = &graph.nodes()[ei];
        let rel = &node.relationships[ri];
        let target = &graph.nodes()[ti];
        let on_delete = rel.on_delete.or_else(|| partner.and_then(|p| p.on_delete));
        let explicit_colname = rel
            .colname
            .clone()
            .or_else(|| partner.and_then(|p| p.colname.clone()));

        match rel.kind {
            RelationshipKind::OneToMany | RelationshipKind::OneToOne => {
                let key = node.primary_key()?;
                let column = explicit_colname.unwrap_or_else(|| {
                    naming::foreign_key_column(inverse_name.unwrap_or(&node.table), &key.name)
                });
                self.ensure_foreign_key(ti, &column, &node.table, key, on_delete)?;

                Ok(Join::ForeignKey(ForeignKeyJoin {
                    table: target.table.clone(),
                    column,
                    referenced_table: node.table.clone(),
                    referenced_column: key.name.clone(),
                }))
            }
            RelationshipKind::ManyToOne => {
                let key = target.primary_key()?;
                let column = explicit_colname
                    .unwrap_or_else(|| naming::foreign_key_column(&rel.name, &key.name));
                self.ensure_foreign_key(ei, &column, &target.table, key, on_delete)?;

                Ok(Join::ForeignKey(ForeignKeyJoin {
                    table: node.table.clone(),
                    column,
                    referenced_table: target.table.clone(),
                    referenced_column: key.name.clone(),
                }))
            }
            RelationshipKind::ManyToMany => {
                self.place_secondary(node, rel, target, partner, inverse_name)
            }
        }
    }

    fn place_secondary(
        &mut self,
        node: &EntityNode,
        rel: &Relationship,
        target: &EntityNode,
        partner: Option<&Relationship>,
        inverse_name: Option<&str>,
    ) -> Result<Join, SchemaError> {
        let local_key = node.primary_key()?;
        let remote_key = target.primary_key()?;

        let table = rel
            .tablename
            .clone()
            .or_else(|| partner.and_then(|p| p.tablename.clone()))
            .unwrap_or_else(|| {
                naming::join_table(&node.name, inverse_name, &target.name, &rel.name)
            });
        let local_column = rel
            .local_colname
            .clone()
            .or_else(|| partner.and_then(|p| p.remote_colname.clone()))
            .unwrap_or_else(|| naming::foreign_key_column(&node.table, &local_key.name));
        let remote_column = rel
            .remote_colname
            .clone()
            .or_else(|| partner.and_then(|p| p.local_colname.clone()))
            .unwrap_or_else(|| naming::foreign_key_column(&target.table, &remote_key.name));

        if local_column == remote_column {
            return Err(SchemaError::JoinColumnCollision {
                entity: node.name.clone(),
                attribute: rel.name.clone(),
                table,
                column: local_column,
            });
        }

        match self.tables.iter().find(|t| t.name == table) {
            Some(existing) => {
                let compatible = existing.is_join()
                    && existing.column(&local_column).is_some()
                    && existing.column(&remote_column).is_some();
                if !compatible {
                    return Err(SchemaError::DuplicateTable(table));
                }
            }
            None => {
                let on_delete = Some(rel.on_delete.unwrap_or(OnDelete::Cascade));
                let join_column = |name: &str, table: &str, key: &Column| Column {
                    name: name.to_string(),
                    sql_type: key.sql_type,
                    primary_key: true,
                    nullable: false,
                    unique: false,
                    default: None,
                    references: Some(ForeignKeyRef {
                        table: table.to_string(),
                        column: key.name.clone(),
                        on_delete,
                    }),
                };

                self.tables.push(Table {
                    name: table.clone(),
                    kind: TableKind::Join,
                    columns: vec![
                        join_column(&local_column, &node.table, local_key),
                        join_column(&remote_column, &target.table, remote_key),
                    ],
                });
            }
        }

        Ok(Join::Secondary(SecondaryJoin {
            table,
            local_column,
            remote_column,
            local_table: node.table.clone(),
            local_key: local_key.name.clone(),
            remote_table: target.table.clone(),
            remote_key: remote_key.name.clone(),
        }))
    }

    /// Adds a foreign key column to the table of entity `owner`, or attaches
    /// the reference to an existing column of that name.
    fn ensure_foreign_key(
        &mut self,
        owner: usize,
        column: &str,
        referenced_table: &str,
        key: &Column,
        on_delete: Option<OnDelete>,
    ) -> Result<(), SchemaError> {
        let table = &mut self.tables[owner];
        let reference = ForeignKeyRef {
            table: referenced_table.to_string(),
            column: key.name.clone(),
            on_delete,
        };

        let Some(position) = table.columns.iter().position(|c| c.name == column) else {
            table
                .columns
                .push(Column::foreign_key(column, key.sql_type, reference));
            return Ok(());
        };

        let existing = &mut table.columns[position];
        match &mut existing.references {
            Some(current)
                if current.table != reference.table || current.column != reference.column =>
            {
                Err(SchemaError::ColumnConflict {
                    table: table.name.clone(),
                    column: column.to_string(),
                    references: current.table.clone(),
                })
            }
            Some(current) => {
                if current.on_delete.is_none() {
                    current.on_delete = on_delete;
                }
                Ok(())
            }
            None => {
                existing.references = Some(reference);
                Ok(())
            }
        }
    }

    fn mark_unique(&mut self, join: &Join) {
        let Join::ForeignKey(join) = join else {
            return;
        };
        if let Some(column) = self
            .tables
            .iter_mut()
            .find(|t| t.name == join.table)
            .and_then(|t| t.column_mut(&join.column))
        {
            column.unique = true;
        }
    }

    fn insert_mapping(
        &mut self,
        ei: usize,
        mapping: RelationshipMapping,
    ) -> Result<(), SchemaError> {
        let node = &self.graph.nodes()[ei];
        let taken = self.mappings[ei].contains_key(&mapping.attribute)
            || self.tables[ei].column(&mapping.attribute).is_some();
        if taken {
            return Err(SchemaError::AttributeConflict {
                entity: node.name.clone(),
                attribute: mapping.attribute,
            });
        }

        self.mappings[ei].insert(mapping.attribute.clone(), mapping);
        Ok(())
    }

    fn finish(self) -> Result<ResolvedSchema, SchemaError> {
        let graph = self.graph;
        let mut entities = Vec::with_capacity(graph.nodes().len());

        for ((node, table), relationships) in graph
            .nodes()
            .iter()
            .zip(&self.tables)
            .zip(self.mappings)
        {
            for mapping in relationships.values() {
                let Some(column) = &mapping.order_by else {
                    continue;
                };
                let known = graph
                    .index_of(&mapping.target)
                    .and_then(|ti| self.tables.get(ti))
                    .is_some_and(|t| t.column(column).is_some());
                if !known {
                    return Err(SchemaError::UnknownOrderColumn {
                        entity: node.name.clone(),
                        attribute: mapping.attribute.clone(),
                        column: column.clone(),
                    });
                }
            }

            entities.push(ResolvedEntity {
                name: node.name.clone(),
                table: table.name.clone(),
                primary_key: table.primary_key().iter().map(|c| c.name.clone()).collect(),
                relationships,
            });
        }

        Ok(ResolvedSchema {
            name: graph.name().to_string(),
            tables: self.tables,
            entities,
        })
    }
}

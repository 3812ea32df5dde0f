//! Schema-driven row and relationship access.
//!
//! A `Session` issues one statement per call against the database's
//! connection; every write is committed immediately.

use std::sync::Arc;

use dbwire_core::entity::Value;
use dbwire_core::relationship::{CollectionKind, RelationshipKind};
use dbwire_core::schema::queries::{self, Order};
use dbwire_core::schema::{Join, RelationshipMapping, ResolvedEntity, ResolvedSchema, Table};
use rusqlite::params_from_iter;
use rusqlite::types::Value as SqlValue;
use tokio_rusqlite::Connection;

use super::conversions::{row_to_record, to_params, to_sql, Record};
use super::error::{map_tokio_rusqlite_error, wrap_err};
use crate::storage::{Result, StorageError};

/// The value of a relationship accessor.
#[derive(Debug, Clone, PartialEq)]
pub enum Related {
    Scalar(Option<Record>),
    Collection(Vec<Record>),
}

impl Related {
    pub fn is_collection(&self) -> bool {
        matches!(self, Related::Collection(_))
    }

    /// The related row of a scalar accessor; `None` for collections.
    pub fn into_scalar(self) -> Option<Record> {
        match self {
            Related::Scalar(record) => record,
            Related::Collection(_) => None,
        }
    }

    /// Every related row.
    pub fn into_records(self) -> Vec<Record> {
        match self {
            Related::Scalar(record) => record.into_iter().collect(),
            Related::Collection(records) => records,
        }
    }

    pub fn keys(&self) -> Vec<Value> {
        match self {
            Related::Scalar(record) => record.iter().map(|r| r.key.clone()).collect(),
            Related::Collection(records) => records.iter().map(|r| r.key.clone()).collect(),
        }
    }
}

/// Row access to the entities of one database.
#[derive(Clone)]
pub struct Session {
    conn: Connection,
    schema: Arc<ResolvedSchema>,
    echo: bool,
}

fn collection_order<'a>(mapping: &'a RelationshipMapping, target_key: &'a str) -> Order<'a> {
    match (&mapping.order_by, mapping.collection) {
        (Some(column), _) => Order::Column(column),
        (None, CollectionKind::Set) => Order::Column(target_key),
        (None, CollectionKind::List) => Order::Insertion,
    }
}

impl Session {
    pub(crate) fn new(conn: Connection, schema: Arc<ResolvedSchema>, echo: bool) -> Self {
        Self { conn, schema, echo }
    }

    pub fn schema(&self) -> &ResolvedSchema {
        &self.schema
    }

    fn log(&self, sql: &str) {
        if self.echo {
            tracing::info!(sql, "executing");
        } else {
            tracing::debug!(sql, "executing");
        }
    }

    fn entity(&self, name: &str) -> Result<(&ResolvedEntity, &Table)> {
        let entity = self
            .schema
            .entity(name)
            .ok_or_else(|| StorageError::UnknownEntity(name.to_string()))?;
        let table = self
            .schema
            .table(&entity.table)
            .ok_or_else(|| StorageError::UnknownEntity(name.to_string()))?;
        Ok((entity, table))
    }

    fn key_column(entity: &ResolvedEntity) -> Result<&str> {
        entity.key_column().ok_or_else(|| {
            StorageError::InvalidData(format!(
                "{} has a composite primary key and cannot be addressed by key",
                entity.name
            ))
        })
    }

    fn mapping<'s>(
        &'s self,
        entity: &'s ResolvedEntity,
        attribute: &str,
    ) -> Result<&'s RelationshipMapping> {
        entity
            .relationships
            .get(attribute)
            .ok_or_else(|| StorageError::UnknownAttribute {
                entity: entity.name.clone(),
                attribute: attribute.to_string(),
            })
    }

    fn check_columns<'c>(
        entity: &ResolvedEntity,
        table: &Table,
        columns: impl IntoIterator<Item = &'c str>,
    ) -> Result<()> {
        for column in columns {
            if table.column(column).is_none() {
                return Err(StorageError::UnknownColumn {
                    entity: entity.name.clone(),
                    column: column.to_string(),
                });
            }
        }
        Ok(())
    }

    async fn fetch(
        &self,
        entity: &str,
        table: &Table,
        sql: String,
        params: Vec<SqlValue>,
    ) -> Result<Vec<Record>> {
        self.log(&sql);
        let entity_name = entity.to_string();
        let table = table.clone();

        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&sql).map_err(wrap_err)?;
                let rows = stmt
                    .query_map(params_from_iter(params.iter()), |row| {
                        row_to_record(row, &entity_name, &table)
                    })
                    .map_err(wrap_err)?;

                let mut records = Vec::new();
                for row_result in rows {
                    records.push(row_result.map_err(wrap_err)?);
                }
                Ok(records)
            })
            .await
            .map_err(|e| map_tokio_rusqlite_error(e, entity, ""))
    }

    async fn query_i64(&self, entity: &str, sql: String, params: Vec<SqlValue>) -> Result<i64> {
        self.log(&sql);
        self.conn
            .call(move |conn| {
                conn.query_row(&sql, params_from_iter(params.iter()), |row| row.get(0))
                    .map_err(wrap_err)
            })
            .await
            .map_err(|e| map_tokio_rusqlite_error(e, entity, ""))
    }

    /// Runs statements in one transaction, returning the rows each changed.
    async fn execute(
        &self,
        entity: &str,
        key: &Value,
        statements: Vec<(String, Vec<SqlValue>)>,
    ) -> Result<Vec<usize>> {
        for (sql, _) in &statements {
            self.log(sql);
        }

        self.conn
            .call(move |conn| {
                let tx = conn.transaction().map_err(wrap_err)?;
                let mut changed = Vec::with_capacity(statements.len());
                for (sql, params) in &statements {
                    changed.push(
                        tx.execute(sql, params_from_iter(params.iter()))
                            .map_err(wrap_err)?,
                    );
                }
                tx.commit().map_err(wrap_err)?;
                Ok(changed)
            })
            .await
            .map_err(|e| map_tokio_rusqlite_error(e, entity, &key.to_string()))
    }

    fn not_found(entity: &str, key: &Value) -> StorageError {
        StorageError::NotFound {
            entity: entity.to_string(),
            key: key.to_string(),
        }
    }

    /// Inserts a row and returns its primary key.
    pub async fn insert(&self, entity: &str, values: &[(&str, Value)]) -> Result<Value> {
        let (resolved, table) = self.entity(entity)?;
        Self::check_columns(resolved, table, values.iter().map(|(c, _)| *c))?;

        let columns: Vec<&str> = values.iter().map(|(c, _)| *c).collect();
        let sql = queries::insert(&table.name, &columns);
        let params = to_params(values.iter().map(|(_, v)| v));
        let provided = resolved
            .key_column()
            .and_then(|key| values.iter().find(|(c, _)| *c == key))
            .map(|(_, v)| v.clone());
        let key_display = provided.as_ref().map(Value::to_string).unwrap_or_default();

        self.log(&sql);
        let rowid = self
            .conn
            .call(move |conn| {
                conn.execute(&sql, params_from_iter(params.iter())).map_err(wrap_err)?;
                Ok(conn.last_insert_rowid())
            })
            .await
            .map_err(|e| map_tokio_rusqlite_error(e, entity, &key_display))?;

        tracing::debug!(entity, rowid, "inserted");
        Ok(provided.unwrap_or(Value::Integer(rowid)))
    }

    /// Returns the row with primary key `key`, if any.
    pub async fn get(&self, entity: &str, key: impl Into<Value>) -> Result<Option<Record>> {
        let (resolved, table) = self.entity(entity)?;
        let key_column = Self::key_column(resolved)?;

        let sql = queries::select(table, &[key_column], Order::Unordered, Some(1));
        let records = self.fetch(entity, table, sql, vec![to_sql(&key.into())]).await?;
        Ok(records.into_iter().next())
    }

    async fn require(&self, entity: &str, key: &Value) -> Result<Record> {
        self.get(entity, key.clone())
            .await?
            .ok_or_else(|| Self::not_found(entity, key))
    }

    fn default_order(entity: &ResolvedEntity) -> Order<'_> {
        match entity.key_column() {
            Some(key) => Order::Column(key),
            None => Order::Insertion,
        }
    }

    /// Every row of an entity, ordered by primary key.
    pub async fn all(&self, entity: &str) -> Result<Vec<Record>> {
        self.filter_by(entity, &[]).await
    }

    pub async fn first(&self, entity: &str) -> Result<Option<Record>> {
        self.get_by(entity, &[]).await
    }

    pub async fn count(&self, entity: &str) -> Result<i64> {
        let (_, table) = self.entity(entity)?;
        self.query_i64(entity, queries::count(&table.name, &[]), Vec::new())
            .await
    }

    /// Rows whose columns equal the given values (`NULL` matches `NULL`).
    pub async fn filter_by(&self, entity: &str, filters: &[(&str, Value)]) -> Result<Vec<Record>> {
        self.select_by(entity, filters, None).await
    }

    async fn select_by(
        &self,
        entity: &str,
        filters: &[(&str, Value)],
        limit: Option<u32>,
    ) -> Result<Vec<Record>> {
        let (resolved, table) = self.entity(entity)?;
        Self::check_columns(resolved, table, filters.iter().map(|(c, _)| *c))?;

        let columns: Vec<&str> = filters.iter().map(|(c, _)| *c).collect();
        let sql = queries::select(table, &columns, Self::default_order(resolved), limit);
        let params = to_params(filters.iter().map(|(_, v)| v));
        self.fetch(entity, table, sql, params).await
    }

    /// The first matching row, if any.
    pub async fn get_by(&self, entity: &str, filters: &[(&str, Value)]) -> Result<Option<Record>> {
        Ok(self.select_by(entity, filters, Some(1)).await?.into_iter().next())
    }

    /// The matching row, if any; more than one match is an error.
    pub async fn single_by(
        &self,
        entity: &str,
        filters: &[(&str, Value)],
    ) -> Result<Option<Record>> {
        let mut records = self.select_by(entity, filters, Some(2)).await?;
        if records.len() > 1 {
            let count = self.count_by(entity, filters).await?;
            return Err(StorageError::MultipleResults {
                entity: entity.to_string(),
                count: usize::try_from(count).unwrap_or(usize::MAX),
            });
        }
        Ok(records.pop())
    }

    /// The one matching row; none or several matches are errors.
    pub async fn one_by(&self, entity: &str, filters: &[(&str, Value)]) -> Result<Record> {
        self.single_by(entity, filters).await?.ok_or_else(|| {
            let key = filters
                .iter()
                .map(|(c, v)| format!("{c}={v}"))
                .collect::<Vec<_>>()
                .join(", ");
            StorageError::NotFound {
                entity: entity.to_string(),
                key,
            }
        })
    }

    async fn count_by(&self, entity: &str, filters: &[(&str, Value)]) -> Result<i64> {
        let (_, table) = self.entity(entity)?;
        let columns: Vec<&str> = filters.iter().map(|(c, _)| *c).collect();
        let params = to_params(filters.iter().map(|(_, v)| v));
        self.query_i64(entity, queries::count(&table.name, &columns), params)
            .await
    }

    pub async fn exists(&self, entity: &str, filters: &[(&str, Value)]) -> Result<bool> {
        let (resolved, table) = self.entity(entity)?;
        Self::check_columns(resolved, table, filters.iter().map(|(c, _)| *c))?;

        let columns: Vec<&str> = filters.iter().map(|(c, _)| *c).collect();
        let params = to_params(filters.iter().map(|(_, v)| v));
        Ok(self.query_i64(entity, queries::exists(&table.name, &columns), params).await? != 0)
    }

    /// Updates columns of the row with primary key `key`.
    pub async fn update(
        &self,
        entity: &str,
        key: impl Into<Value>,
        values: &[(&str, Value)],
    ) -> Result<()> {
        let key = key.into();
        let (resolved, table) = self.entity(entity)?;
        let key_column = Self::key_column(resolved)?;
        Self::check_columns(resolved, table, values.iter().map(|(c, _)| *c))?;
        if values.is_empty() {
            return self.require(entity, &key).await.map(|_| ());
        }

        let columns: Vec<&str> = values.iter().map(|(c, _)| *c).collect();
        let mut params = to_params(values.iter().map(|(_, v)| v));
        params.push(to_sql(&key));

        let changed = self
            .execute(
                entity,
                &key,
                vec![(queries::update(&table.name, &columns, key_column), params)],
            )
            .await?;
        if changed.first().copied().unwrap_or(0) == 0 {
            return Err(Self::not_found(entity, &key));
        }
        Ok(())
    }

    /// Deletes the row with primary key `key`.
    pub async fn delete(&self, entity: &str, key: impl Into<Value>) -> Result<()> {
        let key = key.into();
        let (resolved, table) = self.entity(entity)?;
        let key_column = Self::key_column(resolved)?;

        let changed = self
            .execute(
                entity,
                &key,
                vec![(queries::delete(&table.name, key_column), vec![to_sql(&key)])],
            )
            .await?;
        if changed.first().copied().unwrap_or(0) == 0 {
            return Err(Self::not_found(entity, &key));
        }
        tracing::debug!(entity, key = %key, "deleted");
        Ok(())
    }

    /// Reads the relationship `attribute` of the row `key` of `entity`.
    pub async fn related(
        &self,
        entity: &str,
        key: impl Into<Value>,
        attribute: &str,
    ) -> Result<Related> {
        let key = key.into();
        let (resolved, _) = self.entity(entity)?;
        let mapping = self.mapping(resolved, attribute)?;
        let (target, target_table) = self.entity(&mapping.target)?;
        let target_key = Self::key_column(target)?;
        let local = self.require(entity, &key).await?;

        match (&mapping.join, mapping.kind) {
            (Join::ForeignKey(join), RelationshipKind::ManyToOne) => {
                let reference = local.get(&join.column).cloned().unwrap_or(Value::Null);
                if reference.is_null() {
                    return Ok(Related::Scalar(None));
                }
                let sql = queries::select(
                    target_table,
                    &[&join.referenced_column],
                    Order::Unordered,
                    Some(1),
                );
                let records = self
                    .fetch(&target.name, target_table, sql, vec![to_sql(&reference)])
                    .await?;
                Ok(Related::Scalar(records.into_iter().next()))
            }
            (Join::ForeignKey(join), _) => {
                let limit = (!mapping.uselist).then_some(1);
                let order = collection_order(mapping, target_key);
                let sql = queries::select(target_table, &[&join.column], order, limit);
                let records = self
                    .fetch(&target.name, target_table, sql, vec![to_sql(&local.key)])
                    .await?;

                if mapping.uselist {
                    Ok(Related::Collection(records))
                } else {
                    Ok(Related::Scalar(records.into_iter().next()))
                }
            }
            (Join::Secondary(join), _) => {
                let order = collection_order(mapping, target_key);
                let sql = queries::select_through(target_table, join, order);
                let records = self
                    .fetch(&target.name, target_table, sql, vec![to_sql(&local.key)])
                    .await?;
                Ok(Related::Collection(records))
            }
        }
    }

    /// Adds the row `other` to the relationship `attribute` of row `key`.
    ///
    /// On a scalar accessor this replaces the current value.
    pub async fn link(
        &self,
        entity: &str,
        key: impl Into<Value>,
        attribute: &str,
        other: impl Into<Value>,
    ) -> Result<()> {
        let (key, other) = (key.into(), other.into());
        let (resolved, _) = self.entity(entity)?;
        let mapping = self.mapping(resolved, attribute)?;

        match (&mapping.join, mapping.kind) {
            (Join::Secondary(join), _) => {
                self.require(entity, &key).await?;
                self.require(&mapping.target, &other).await?;
                self.execute(entity, &key, vec![(queries::link(join), to_params([&key, &other]))])
                    .await?;
                Ok(())
            }
            (Join::ForeignKey(join), RelationshipKind::OneToMany) => {
                self.require(entity, &key).await?;
                let (target, _) = self.entity(&mapping.target)?;
                let target_key = Self::key_column(target)?;
                let changed = self
                    .execute(
                        &mapping.target,
                        &other,
                        vec![(
                            queries::set_foreign_key(join, target_key),
                            to_params([&key, &other]),
                        )],
                    )
                    .await?;
                if changed.first().copied().unwrap_or(0) == 0 {
                    return Err(Self::not_found(&mapping.target, &other));
                }
                Ok(())
            }
            _ => self.set_scalar(entity, key, attribute, Some(other)).await,
        }
    }

    /// Removes the row `other` from the relationship `attribute` of row `key`.
    pub async fn unlink(
        &self,
        entity: &str,
        key: impl Into<Value>,
        attribute: &str,
        other: impl Into<Value>,
    ) -> Result<()> {
        let (key, other) = (key.into(), other.into());
        let (resolved, _) = self.entity(entity)?;
        let mapping = self.mapping(resolved, attribute)?;

        let statement = match (&mapping.join, mapping.kind) {
            (Join::Secondary(join), _) => (queries::unlink(join), to_params([&key, &other])),
            (Join::ForeignKey(join), RelationshipKind::ManyToOne) => {
                let local_key = Self::key_column(resolved)?;
                (queries::clear_foreign_key(join, local_key), to_params([&key, &other]))
            }
            (Join::ForeignKey(join), _) => {
                let (target, _) = self.entity(&mapping.target)?;
                let target_key = Self::key_column(target)?;
                (queries::clear_foreign_key(join, target_key), to_params([&other, &key]))
            }
        };

        self.execute(entity, &key, vec![statement]).await?;
        Ok(())
    }

    /// Sets (or clears, with `None`) a scalar relationship.
    pub async fn set_scalar(
        &self,
        entity: &str,
        key: impl Into<Value>,
        attribute: &str,
        other: Option<Value>,
    ) -> Result<()> {
        let key = key.into();
        let (resolved, _) = self.entity(entity)?;
        let mapping = self.mapping(resolved, attribute)?;

        let Join::ForeignKey(join) = &mapping.join else {
            return Err(StorageError::InvalidData(format!(
                "'{attribute}' of {entity} is a collection"
            )));
        };
        if mapping.uselist {
            return Err(StorageError::InvalidData(format!(
                "'{attribute}' of {entity} is a collection"
            )));
        }

        if mapping.kind == RelationshipKind::ManyToOne {
            let local_key = Self::key_column(resolved)?;
            let reference = other.unwrap_or(Value::Null);
            let changed = self
                .execute(
                    entity,
                    &key,
                    vec![(
                        queries::set_foreign_key(join, local_key),
                        to_params([&reference, &key]),
                    )],
                )
                .await?;
            if changed.first().copied().unwrap_or(0) == 0 {
                return Err(Self::not_found(entity, &key));
            }
            return Ok(());
        }

        self.require(entity, &key).await?;
        let mut statements = vec![(queries::clear_all_foreign_keys(join), to_params([&key]))];
        let (target, _) = self.entity(&mapping.target)?;
        let target_key = Self::key_column(target)?;
        if let Some(other) = &other {
            statements.push((queries::set_foreign_key(join, target_key), to_params([&key, other])));
        }

        let changed = self.execute(entity, &key, statements).await?;
        if let Some(other) = other {
            if changed.get(1).copied().unwrap_or(0) == 0 {
                return Err(Self::not_found(&mapping.target, &other));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Database;
    use dbwire_core::entity::{Entity, Field, SqlType};
    use dbwire_core::relationship::Relationship;
    use dbwire_core::schema::{ResolveOptions, SchemaBuilder, TableKind};

    async fn session(builder: SchemaBuilder) -> Session {
        let schema = builder.resolve(&ResolveOptions::default()).unwrap();
        let db = Database::open_in_memory("test", schema).await.unwrap();
        db.create_all().await.unwrap();
        db.session()
    }

    fn family(inverse: bool) -> SchemaBuilder {
        let children = Relationship::one_to_many("children", "Child");
        let children = if inverse { children.inverse("parent") } else { children };
        SchemaBuilder::new("main")
            .entity(
                Entity::new("Parent")
                    .field(Field::new("name", SqlType::Text))
                    .relationship(children),
            )
            .entity(Entity::new("Child").field(Field::new("name", SqlType::Text)))
    }

    #[tokio::test]
    async fn test_one_to_many_without_inverse() {
        let session = session(family(false)).await;

        let parent = session.insert("Parent", &[("name", "p".into())]).await.unwrap();
        let child = session.insert("Child", &[("name", "c".into())]).await.unwrap();
        session.link("Parent", parent.clone(), "children", child.clone()).await.unwrap();

        let stored = session.get("Child", child.clone()).await.unwrap().unwrap();
        assert_eq!(stored.get("parent_id"), Some(&parent));

        let children = session.related("Parent", parent, "children").await.unwrap();
        assert_eq!(children.keys(), vec![child.clone()]);

        let err = session.related("Child", child, "parent").await.unwrap_err();
        assert_eq!(
            err,
            StorageError::UnknownAttribute {
                entity: "Child".to_string(),
                attribute: "parent".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_backref_reads_the_same_foreign_key() {
        let session = session(family(true)).await;

        let parent = session.insert("Parent", &[("name", "p".into())]).await.unwrap();
        let child = session
            .insert("Child", &[("name", "c".into()), ("parent_id", parent.clone())])
            .await
            .unwrap();

        let related = session.related("Child", child.clone(), "parent").await.unwrap();
        assert!(!related.is_collection());
        assert_eq!(related.into_scalar().unwrap().key, parent);

        session.set_scalar("Child", child.clone(), "parent", None).await.unwrap();
        let children = session.related("Parent", parent, "children").await.unwrap();
        assert!(children.into_records().is_empty());
    }

    #[tokio::test]
    async fn test_many_to_many_is_visible_from_both_sides() {
        let session = session(
            SchemaBuilder::new("main")
                .entity(Entity::new("Movie").many_to_many("tags", "Tag"))
                .entity(Entity::new("Tag").many_to_many("movies", "Movie")),
        )
        .await;

        let join_tables = session
            .schema()
            .tables()
            .iter()
            .filter(|table| table.kind == TableKind::Join)
            .count();
        assert_eq!(join_tables, 1);

        let movie = session.insert("Movie", &[]).await.unwrap();
        let tag = session.insert("Tag", &[]).await.unwrap();
        session.link("Movie", movie.clone(), "tags", tag.clone()).await.unwrap();
        // Linking twice keeps a single row
        session.link("Movie", movie.clone(), "tags", tag.clone()).await.unwrap();

        let movies = session.related("Tag", tag.clone(), "movies").await.unwrap();
        assert_eq!(movies.keys(), vec![movie.clone()]);

        session.unlink("Tag", tag.clone(), "movies", movie.clone()).await.unwrap();
        let tags = session.related("Movie", movie, "tags").await.unwrap();
        assert!(tags.keys().is_empty());
    }

    #[tokio::test]
    async fn test_join_rows_are_deleted_with_their_owner() {
        let session = session(
            SchemaBuilder::new("main")
                .entity(Entity::new("Movie").many_to_many("tags", "Tag"))
                .entity(Entity::new("Tag")),
        )
        .await;

        let movie = session.insert("Movie", &[]).await.unwrap();
        let tag = session.insert("Tag", &[]).await.unwrap();
        session.link("Movie", movie.clone(), "tags", tag.clone()).await.unwrap();

        session.delete("Tag", tag).await.unwrap();
        assert!(session.related("Movie", movie, "tags").await.unwrap().keys().is_empty());
    }

    #[tokio::test]
    async fn test_one_to_one_foreign_key_is_unique() {
        let session = session(
            SchemaBuilder::new("main")
                .entity(
                    Entity::new("Car")
                        .relationship(Relationship::one_to_one("engine", "Engine").inverse("car")),
                )
                .entity(Entity::new("Engine")),
        )
        .await;

        let car = session.insert("Car", &[]).await.unwrap();
        session.insert("Engine", &[("car_id", car.clone())]).await.unwrap();
        let err = session.insert("Engine", &[("car_id", car.clone())]).await.unwrap_err();
        assert!(matches!(err, StorageError::AlreadyExists { .. }));

        let engine = session.related("Car", car, "engine").await.unwrap();
        assert!(engine.into_scalar().is_some());
    }

    #[tokio::test]
    async fn test_one_to_one_link_replaces_previous_row() {
        let session = session(
            SchemaBuilder::new("main")
                .entity(Entity::new("Car").one_to_one("engine", "Engine"))
                .entity(Entity::new("Engine")),
        )
        .await;

        let car = session.insert("Car", &[]).await.unwrap();
        let first = session.insert("Engine", &[]).await.unwrap();
        let second = session.insert("Engine", &[]).await.unwrap();

        session.link("Car", car.clone(), "engine", first.clone()).await.unwrap();
        session.link("Car", car.clone(), "engine", second.clone()).await.unwrap();

        let engine = session.related("Car", car, "engine").await.unwrap();
        assert_eq!(engine.into_scalar().unwrap().key, second);
        let first = session.get("Engine", first).await.unwrap().unwrap();
        assert_eq!(first.get("car_id"), Some(&Value::Null));
    }

    #[tokio::test]
    async fn test_list_collection_keeps_insertion_order() {
        let session = session(
            SchemaBuilder::new("main")
                .entity(
                    Entity::new("Playlist").relationship(
                        Relationship::many_to_many("songs", "Song")
                            .collection(CollectionKind::List),
                    ),
                )
                .entity(Entity::new("Song")),
        )
        .await;

        let playlist = session.insert("Playlist", &[]).await.unwrap();
        let songs = [
            session.insert("Song", &[]).await.unwrap(),
            session.insert("Song", &[]).await.unwrap(),
            session.insert("Song", &[]).await.unwrap(),
        ];
        for song in [&songs[2], &songs[0], &songs[1]] {
            session.link("Playlist", playlist.clone(), "songs", song.clone()).await.unwrap();
        }

        let related = session.related("Playlist", playlist, "songs").await.unwrap();
        assert_eq!(
            related.keys(),
            vec![songs[2].clone(), songs[0].clone(), songs[1].clone()]
        );
    }

    #[tokio::test]
    async fn test_queries_by_column() {
        let session = session(family(false)).await;
        for name in ["a", "b", "b"] {
            session.insert("Parent", &[("name", name.into())]).await.unwrap();
        }

        assert_eq!(session.count("Parent").await.unwrap(), 3);
        assert_eq!(session.filter_by("Parent", &[("name", "b".into())]).await.unwrap().len(), 2);
        assert!(session.exists("Parent", &[("name", "a".into())]).await.unwrap());
        assert!(!session.exists("Parent", &[("name", "z".into())]).await.unwrap());
        assert_eq!(session.first("Parent").await.unwrap().unwrap().get_str("name"), Some("a"));

        let err = session.one_by("Parent", &[("name", "b".into())]).await.unwrap_err();
        assert_eq!(
            err,
            StorageError::MultipleResults {
                entity: "Parent".to_string(),
                count: 2,
            }
        );
        assert!(matches!(
            session.one_by("Parent", &[("name", "z".into())]).await.unwrap_err(),
            StorageError::NotFound { .. }
        ));
        assert!(session.single_by("Parent", &[("name", "z".into())]).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let session = session(family(false)).await;
        let parent = session.insert("Parent", &[("name", "a".into())]).await.unwrap();

        session.update("Parent", parent.clone(), &[("name", "b".into())]).await.unwrap();
        let stored = session.get("Parent", parent.clone()).await.unwrap().unwrap();
        assert_eq!(stored.get_str("name"), Some("b"));

        session.delete("Parent", parent.clone()).await.unwrap();
        assert!(matches!(
            session.delete("Parent", parent.clone()).await.unwrap_err(),
            StorageError::NotFound { .. }
        ));
        assert!(matches!(
            session.update("Parent", parent, &[("name", "c".into())]).await.unwrap_err(),
            StorageError::NotFound { .. }
        ));
    }

    #[tokio::test]
    async fn test_unknown_names() {
        let session = session(family(false)).await;

        assert_eq!(
            session.all("Nope").await.unwrap_err(),
            StorageError::UnknownEntity("Nope".to_string())
        );
        assert!(matches!(
            session.insert("Parent", &[("nope", Value::Null)]).await.unwrap_err(),
            StorageError::UnknownColumn { .. }
        ));
    }
}

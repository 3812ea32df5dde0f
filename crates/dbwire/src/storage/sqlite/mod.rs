//! SQLite storage backend.
//!
//! `rusqlite` does the work; `tokio-rusqlite` moves it off the async
//! runtime. One `Database` owns one connection and the resolved schema of
//! the metadata bound to it.

mod conversions;
mod error;
mod session;
mod uri;

use std::sync::Arc;

use dbwire_core::migration::version::{
    CREATE_VERSION_TABLE, DELETE_VERSION, DROP_VERSION_TABLE, INSERT_VERSION, SELECT_VERSIONS,
    VERSION_TABLE,
};
use dbwire_core::migration::DatabaseTable;
use dbwire_core::schema::{ddl, ResolvedSchema};
use tokio_rusqlite::Connection;

pub use conversions::Record;
pub(crate) use error::map_tokio_rusqlite_error;
use error::wrap_err;
pub use session::{Related, Session};
pub use uri::DatabaseUri;

use crate::storage::{Result, StorageError};

const SELECT_TABLES: &str =
    "SELECT name, COALESCE(sql, '') FROM sqlite_master WHERE type = 'table' ORDER BY name";

const SELECT_TABLE_COLUMNS: &str = "SELECT name FROM pragma_table_info(?1) ORDER BY cid";

const VERSION_TABLE_EXISTS: &str =
    "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)";

/// Connection settings of one database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectOptions {
    /// Enforce `REFERENCES` constraints.
    pub foreign_keys: bool,
    /// Log every statement at info level.
    pub echo: bool,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            foreign_keys: true,
            echo: false,
        }
    }
}

/// A connected database bound to a resolved schema.
#[derive(Clone)]
pub struct Database {
    name: String,
    uri: DatabaseUri,
    conn: Connection,
    schema: Arc<ResolvedSchema>,
    echo: bool,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("name", &self.name)
            .field("uri", &self.uri)
            .finish_non_exhaustive()
    }
}

impl Database {
    /// Opens the database at `uri`.
    ///
    /// A file database is created if it doesn't exist, along with its
    /// parent directory.
    pub async fn open(
        name: impl Into<String>,
        uri: &DatabaseUri,
        schema: ResolvedSchema,
        options: ConnectOptions,
    ) -> Result<Self> {
        let name = name.into();
        let conn = match uri {
            DatabaseUri::Memory => Connection::open_in_memory().await,
            DatabaseUri::File(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    tokio::fs::create_dir_all(parent).await.map_err(|e| {
                        StorageError::ConnectionFailed(format!(
                            "Cannot create {}: {e}",
                            parent.display()
                        ))
                    })?;
                }
                Connection::open(path).await
            }
        }
        .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;

        let pragma = if options.foreign_keys {
            "PRAGMA foreign_keys = ON"
        } else {
            "PRAGMA foreign_keys = OFF"
        };
        conn.call(move |conn| conn.execute_batch(pragma).map_err(wrap_err))
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;

        tracing::debug!(database = %name, uri = ?uri, "opened database");

        Ok(Self {
            name,
            uri: uri.clone(),
            conn,
            schema: Arc::new(schema),
            echo: options.echo,
        })
    }

    /// Opens a private in-memory database.
    pub async fn open_in_memory(name: impl Into<String>, schema: ResolvedSchema) -> Result<Self> {
        Self::open(name, &DatabaseUri::Memory, schema, ConnectOptions::default()).await
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn uri(&self) -> &DatabaseUri {
        &self.uri
    }

    pub fn schema(&self) -> &ResolvedSchema {
        &self.schema
    }

    pub fn session(&self) -> Session {
        Session::new(self.conn.clone(), Arc::clone(&self.schema), self.echo)
    }

    fn log(&self, sql: &str) {
        if self.echo {
            tracing::info!(database = %self.name, sql, "executing");
        } else {
            tracing::debug!(database = %self.name, sql, "executing");
        }
    }

    /// Runs a script of `;`-separated statements.
    pub async fn execute_batch(&self, sql: impl Into<String>) -> Result<()> {
        let sql = sql.into();
        self.log(&sql);

        self.conn
            .call(move |conn| conn.execute_batch(&sql).map_err(wrap_err))
            .await
            .map_err(|e| map_tokio_rusqlite_error(e, &self.name, ""))
    }

    /// Runs statements one after the other inside a single transaction.
    pub async fn execute_all(&self, statements: Vec<String>) -> Result<()> {
        for sql in &statements {
            self.log(sql);
        }

        self.conn
            .call(move |conn| {
                let tx = conn.transaction().map_err(wrap_err)?;
                for sql in &statements {
                    tx.execute_batch(sql).map_err(wrap_err)?;
                }
                tx.commit().map_err(wrap_err)
            })
            .await
            .map_err(|e| map_tokio_rusqlite_error(e, &self.name, ""))
    }

    /// Creates every table of the schema that doesn't exist yet.
    pub async fn create_all(&self) -> Result<()> {
        tracing::info!(database = %self.name, "creating tables");
        self.execute_all(ddl::create_statements(&self.schema))
            .await
    }

    /// Drops every table of the schema and the version table.
    pub async fn drop_all(&self) -> Result<()> {
        tracing::info!(database = %self.name, "dropping tables");
        let mut statements = ddl::drop_statements(&self.schema);
        statements.push(DROP_VERSION_TABLE.to_string());
        self.execute_all(statements).await
    }

    /// Lists the tables found in the database with their columns.
    pub async fn introspect(&self) -> Result<Vec<DatabaseTable>> {
        self.conn
            .call(|conn| {
                let mut tables = Vec::new();
                {
                    let mut stmt = conn.prepare(SELECT_TABLES).map_err(wrap_err)?;
                    let rows = stmt
                        .query_map([], |row| {
                            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                        })
                        .map_err(wrap_err)?;
                    for row_result in rows {
                        let (name, sql) = row_result.map_err(wrap_err)?;
                        tables.push(DatabaseTable {
                            name,
                            sql,
                            columns: Vec::new(),
                        });
                    }
                }

                let mut stmt = conn.prepare(SELECT_TABLE_COLUMNS).map_err(wrap_err)?;
                for table in &mut tables {
                    let rows = stmt
                        .query_map([&table.name], |row| row.get::<_, String>(0))
                        .map_err(wrap_err)?;
                    for row_result in rows {
                        table.columns.push(row_result.map_err(wrap_err)?);
                    }
                }
                Ok(tables)
            })
            .await
            .map_err(|e| map_tokio_rusqlite_error(e, &self.name, ""))
    }

    /// The revision ids recorded in the version table; empty when the table
    /// doesn't exist.
    pub async fn current_versions(&self) -> Result<Vec<String>> {
        self.conn
            .call(|conn| {
                let exists: bool = conn
                    .query_row(VERSION_TABLE_EXISTS, [VERSION_TABLE], |row| row.get(0))
                    .map_err(wrap_err)?;
                if !exists {
                    return Ok(Vec::new());
                }

                let mut stmt = conn.prepare(SELECT_VERSIONS).map_err(wrap_err)?;
                let rows = stmt
                    .query_map([], |row| row.get::<_, String>(0))
                    .map_err(wrap_err)?;
                let mut versions = Vec::new();
                for row_result in rows {
                    versions.push(row_result.map_err(wrap_err)?);
                }
                Ok(versions)
            })
            .await
            .map_err(|e| map_tokio_rusqlite_error(e, &self.name, VERSION_TABLE))
    }

    /// Runs one revision script and moves the version table from `before`
    /// to `after`, atomically.
    pub async fn apply_revision(
        &self,
        script: String,
        before: Vec<String>,
        after: Vec<String>,
    ) -> Result<()> {
        self.log(&script);

        self.conn
            .call(move |conn| {
                let tx = conn.transaction().map_err(wrap_err)?;
                tx.execute_batch(CREATE_VERSION_TABLE).map_err(wrap_err)?;
                if !script.trim().is_empty() {
                    tx.execute_batch(&script).map_err(wrap_err)?;
                }
                for version in before.iter().filter(|v| !after.contains(v)) {
                    tx.execute(DELETE_VERSION, [version]).map_err(wrap_err)?;
                }
                for version in after.iter().filter(|v| !before.contains(v)) {
                    tx.execute(INSERT_VERSION, [version]).map_err(wrap_err)?;
                }
                tx.commit().map_err(wrap_err)
            })
            .await
            .map_err(|e| map_tokio_rusqlite_error(e, &self.name, VERSION_TABLE))
    }

    /// Replaces the recorded versions without running any script.
    pub async fn set_versions(&self, versions: Vec<String>) -> Result<()> {
        let current = self.current_versions().await?;
        self.apply_revision(String::new(), current, versions).await
    }
}

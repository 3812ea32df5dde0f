//! Named schemas and hooks provided by the host application.
//!
//! Configuration values refer to them by name; a value that is not a
//! registered name is read as a file path instead.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use dbwire_core::schema::{Declarations, SchemaBuilder};

use crate::config::Config;
use crate::service::ServiceError;
use crate::storage::{Database, StorageError};

/// Code run against a database around schema creation, deletion or to
/// populate it.
#[async_trait]
pub trait Hook: Send + Sync {
    async fn run(&self, db: &Database) -> Result<(), StorageError>;
}

/// Runs a SQL script file as a batch.
#[derive(Debug, Clone)]
pub struct SqlFileHook {
    path: PathBuf,
}

impl SqlFileHook {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl Hook for SqlFileHook {
    async fn run(&self, db: &Database) -> Result<(), StorageError> {
        let sql = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| StorageError::ReadFailed {
                path: self.path.display().to_string(),
                message: e.to_string(),
            })?;

        tracing::debug!(database = db.name(), path = %self.path.display(), "running SQL hook");
        db.execute_batch(sql).await
    }
}

fn extension(reference: &str) -> Option<&str> {
    Path::new(reference).extension().and_then(|e| e.to_str())
}

#[derive(Clone, Default)]
pub struct AppRegistry {
    metadata: HashMap<String, SchemaBuilder>,
    hooks: HashMap<String, Arc<dyn Hook>>,
}

impl AppRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a schema under its own name.
    pub fn with_metadata(mut self, builder: SchemaBuilder) -> Self {
        self.metadata.insert(builder.name().to_string(), builder);
        self
    }

    pub fn with_hook(mut self, name: impl Into<String>, hook: impl Hook + 'static) -> Self {
        self.hooks.insert(name.into(), Arc::new(hook));
        self
    }

    /// Finds the schema of database `db`: a registered name, or a `.toml` or
    /// `.json` declarations file.
    pub async fn resolve_metadata(
        &self,
        db: &str,
        reference: &str,
        config: &Config,
    ) -> Result<SchemaBuilder, ServiceError> {
        if let Some(builder) = self.metadata.get(reference) {
            return Ok(builder.renamed(db));
        }

        let format = extension(reference);
        if !matches!(format, Some("toml") | Some("json")) {
            return Err(ServiceError::UnknownReference {
                kind: "metadata",
                reference: reference.to_string(),
            });
        }

        let path = config.path(reference);
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| ServiceError::Io {
                path: path.clone(),
                source,
            })?;

        let declarations: Declarations = match format {
            Some("json") => serde_json::from_str(&content).map_err(|e| e.to_string()),
            _ => toml::from_str(&content).map_err(|e| e.to_string()),
        }
        .map_err(|message| ServiceError::Declarations {
            path: path.clone(),
            message,
        })?;

        tracing::debug!(database = db, path = %path.display(), "loaded declarations");
        Ok(SchemaBuilder::from_declarations(db, declarations))
    }

    /// Finds a hook: a registered name, or a `.sql` file.
    pub fn resolve_hook(
        &self,
        reference: &str,
        config: &Config,
    ) -> Result<Arc<dyn Hook>, ServiceError> {
        if let Some(hook) = self.hooks.get(reference) {
            return Ok(Arc::clone(hook));
        }

        if extension(reference) == Some("sql") {
            return Ok(Arc::new(SqlFileHook::new(config.path(reference))));
        }

        Err(ServiceError::UnknownReference {
            kind: "hook",
            reference: reference.to_string(),
        })
    }
}

//! Database URI parsing.
//!
//! Accepted forms:
//!
//! - `sqlite://` and `sqlite::memory:`: in-memory database
//! - `sqlite:///relative/path.db`
//! - `sqlite:////absolute/path.db`

use std::path::PathBuf;

use crate::storage::{Result, StorageError};

/// Where a database lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseUri {
    Memory,
    File(PathBuf),
}

impl DatabaseUri {
    pub fn parse(uri: &str) -> Result<Self> {
        let uri = uri.trim();
        if uri == "sqlite::memory:" {
            return Ok(DatabaseUri::Memory);
        }

        let Some((scheme, rest)) = uri.split_once("://") else {
            return Err(StorageError::InvalidUri(uri.to_string()));
        };

        // `postgres` is the legacy spelling of the `postgresql` dialect.
        let dialect = scheme.split_once('+').map_or(scheme, |(dialect, _driver)| dialect);
        if dialect != "sqlite" {
            let (scheme, uri) = if dialect == "postgres" {
                let normalized = format!("postgresql{}", &uri["postgres".len()..]);
                (format!("postgresql{}", &scheme["postgres".len()..]), normalized)
            } else {
                (scheme.to_string(), uri.to_string())
            };
            return Err(StorageError::UnsupportedBackend { scheme, uri });
        }

        let path = rest.split('?').next().unwrap_or_default();
        match path {
            "" | ":memory:" | "/:memory:" => Ok(DatabaseUri::Memory),
            path => match path.strip_prefix('/') {
                Some("") | None => Err(StorageError::InvalidUri(uri.to_string())),
                Some(path) => Ok(DatabaseUri::File(PathBuf::from(path))),
            },
        }
    }

    pub fn is_memory(&self) -> bool {
        matches!(self, DatabaseUri::Memory)
    }
}

//! The revision script directory of one database.
//!
//! ```text
//! <upgrade.directory>/<db>/
//!     versions/
//!         20260307_1975ea83b712_create_account_table.sql
//! ```

use std::path::{Path, PathBuf};

use dbwire_core::migration::{Revision, RevisionGraph};

use crate::service::ServiceError;

const VERSIONS: &str = "versions";
const EXTENSION: &str = "sql";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptDirectory {
    root: PathBuf,
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> ServiceError + '_ {
    move |source| ServiceError::Io {
        path: path.to_path_buf(),
        source,
    }
}

impl ScriptDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn versions(&self) -> PathBuf {
        self.root.join(VERSIONS)
    }

    /// True once `init` has run.
    pub async fn exists(&self) -> bool {
        tokio::fs::metadata(self.versions())
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
    }

    /// Creates the directory; returns false if it already existed.
    pub async fn init(&self) -> Result<bool, ServiceError> {
        if tokio::fs::metadata(&self.root).await.is_ok() {
            return Ok(false);
        }

        let versions = self.versions();
        tokio::fs::create_dir_all(&versions)
            .await
            .map_err(io_error(&versions))?;
        tracing::info!(directory = %self.root.display(), "created revision directory");
        Ok(true)
    }

    /// Reads every revision script, sorted by file name.
    pub async fn load(&self) -> Result<Vec<(PathBuf, Revision)>, ServiceError> {
        let versions = self.versions();
        let mut entries = tokio::fs::read_dir(&versions)
            .await
            .map_err(io_error(&versions))?;

        let mut paths = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(io_error(&versions))? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some(EXTENSION) {
                paths.push(path);
            }
        }
        paths.sort();

        let mut scripts = Vec::with_capacity(paths.len());
        for path in paths {
            let source = tokio::fs::read_to_string(&path)
                .await
                .map_err(io_error(&path))?;
            let revision = Revision::parse(&source).map_err(|source| ServiceError::Script {
                path: path.clone(),
                source,
            })?;
            scripts.push((path, revision));
        }

        tracing::debug!(directory = %versions.display(), count = scripts.len(), "loaded revisions");
        Ok(scripts)
    }

    /// The revision graph of the directory; empty when it doesn't exist.
    pub async fn graph(&self) -> Result<RevisionGraph, ServiceError> {
        if !self.exists().await {
            return Ok(RevisionGraph::new(Vec::new())?);
        }
        let revisions = self.load().await?.into_iter().map(|(_, r)| r).collect();
        Ok(RevisionGraph::new(revisions)?)
    }

    /// Path of the script defining revision `id`.
    pub async fn path_of(&self, id: &str) -> Result<Option<PathBuf>, ServiceError> {
        Ok(self
            .load()
            .await?
            .into_iter()
            .find(|(_, revision)| revision.id == id)
            .map(|(path, _)| path))
    }

    /// Writes a new revision script.
    pub async fn write(
        &self,
        file_name: &str,
        revision: &Revision,
    ) -> Result<PathBuf, ServiceError> {
        let versions = self.versions();
        tokio::fs::create_dir_all(&versions)
            .await
            .map_err(io_error(&versions))?;

        let path = versions.join(file_name);
        tokio::fs::write(&path, revision.render())
            .await
            .map_err(io_error(&path))?;
        Ok(path)
    }
}

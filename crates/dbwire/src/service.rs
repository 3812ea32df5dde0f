//! The database service: one connected, schema-bound `Database` per
//! activated configuration section.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use dbwire_core::migration::MigrationError;
use dbwire_core::schema::SchemaError;

use crate::config::{Config, ConfigError, DatabaseConfig};
use crate::migration::ScriptDirectory;
use crate::registry::{AppRegistry, Hook};
use crate::storage::sqlite::ConnectOptions;
use crate::storage::{Database, DatabaseUri, Session, StorageError};

pub const VERSION_MISSING: &str = "Database version missing";
pub const VERSION_NOT_HEAD: &str = "Database version is not a revisions head";

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Database '{db}': {source}")]
    Schema {
        db: String,
        #[source]
        source: SchemaError,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Migration(#[from] MigrationError),

    #[error("{}: {source}", path.display())]
    Script {
        path: PathBuf,
        #[source]
        source: MigrationError,
    },

    #[error("Database '{db}': {message}")]
    InvalidVersion { db: String, message: &'static str },

    #[error("Unknown database '{0}'")]
    UnknownDatabase(String),

    #[error("No database configured")]
    NoDatabase,

    #[error("Unknown {kind} reference '{reference}'")]
    UnknownReference { kind: &'static str, reference: String },

    #[error("missing --db option")]
    MissingDbOption,

    #[error("Path doesn't exist: '{}'. Please use the 'init' command to create a new scripts folder.", .0.display())]
    NotInitialized(PathBuf),

    #[error("Target database '{0}' is not up to date.")]
    NotUpToDate(String),

    #[error("{0} with --sql requires <fromrev>:<torev>")]
    OfflineRange(&'static str),

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid declarations file {}: {message}", path.display())]
    Declarations { path: PathBuf, message: String },
}

struct Hooks {
    populate: Option<Arc<dyn Hook>>,
    before_create: Option<Arc<dyn Hook>>,
    after_create: Option<Arc<dyn Hook>>,
    before_drop: Option<Arc<dyn Hook>>,
    after_drop: Option<Arc<dyn Hook>>,
}

impl Hooks {
    fn resolve(
        config: &DatabaseConfig,
        registry: &AppRegistry,
        root: &Config,
    ) -> Result<Self, ServiceError> {
        let resolve = |reference: &Option<String>| {
            reference
                .as_deref()
                .map(|r| registry.resolve_hook(r, root))
                .transpose()
        };

        Ok(Self {
            populate: resolve(&config.populate)?,
            before_create: resolve(&config.before_create)?,
            after_create: resolve(&config.after_create)?,
            before_drop: resolve(&config.before_drop)?,
            after_drop: resolve(&config.after_drop)?,
        })
    }
}

async fn run_hook(hook: &Option<Arc<dyn Hook>>, db: &Database) -> Result<(), ServiceError> {
    if let Some(hook) = hook {
        hook.run(db).await?;
    }
    Ok(())
}

struct Bound {
    db: Database,
    hooks: Hooks,
}

pub struct DatabaseService {
    config: Config,
    databases: BTreeMap<String, Bound>,
}

impl DatabaseService {
    /// Opens every activated database and binds its schema.
    ///
    /// Any schema error is fatal.
    pub async fn start(config: Config, registry: &AppRegistry) -> Result<Self, ServiceError> {
        let mut databases = BTreeMap::new();

        for (name, db_config) in config.activated() {
            let reference = db_config.metadata.as_deref().unwrap_or(name);
            let builder = registry.resolve_metadata(name, reference, &config).await?;
            let schema = builder
                .resolve(&config.resolve_options())
                .map_err(|source| ServiceError::Schema {
                    db: name.to_string(),
                    source,
                })?;

            let uri = match DatabaseUri::parse(&config.expand(&db_config.uri))? {
                DatabaseUri::File(path) if path.is_relative() => {
                    DatabaseUri::File(config.root.join(path))
                }
                uri => uri,
            };
            let options = ConnectOptions {
                foreign_keys: db_config.foreign_keys,
                echo: db_config.debug,
            };
            let db = Database::open(name, &uri, schema, options).await?;
            let hooks = Hooks::resolve(db_config, registry, &config)?;

            tracing::info!(
                database = name,
                tables = db.schema().tables().len(),
                "database started"
            );
            databases.insert(name.to_string(), Bound { db, hooks });
        }

        Ok(Self { config, databases })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.databases.keys().map(String::as_str)
    }

    fn bound(&self, name: &str) -> Result<&Bound, ServiceError> {
        self.databases
            .get(name)
            .ok_or_else(|| ServiceError::UnknownDatabase(name.to_string()))
    }

    pub fn database(&self, name: &str) -> Result<&Database, ServiceError> {
        Ok(&self.bound(name)?.db)
    }

    pub fn session(&self, name: &str) -> Result<Session, ServiceError> {
        Ok(self.database(name)?.session())
    }

    /// The databases targeted by `--db`: the named one, or all of them.
    pub fn select(&self, db: Option<&str>) -> Result<Vec<String>, ServiceError> {
        match db {
            Some(name) => {
                self.bound(name)?;
                Ok(vec![name.to_string()])
            }
            None => Ok(self.databases.keys().cloned().collect()),
        }
    }

    /// The one database a migration command works on.
    pub fn single(&self, db: Option<&str>) -> Result<String, ServiceError> {
        match db {
            Some(name) => {
                self.bound(name)?;
                Ok(name.to_string())
            }
            None => {
                let mut names = self.databases.keys();
                match (names.next(), names.next()) {
                    (Some(name), None) => Ok(name.clone()),
                    (Some(_), Some(_)) => Err(ServiceError::MissingDbOption),
                    (None, _) => Err(ServiceError::NoDatabase),
                }
            }
        }
    }

    pub fn scripts(&self, name: &str) -> ScriptDirectory {
        ScriptDirectory::new(self.config.versions_directory(name))
    }

    pub async fn create_all(&self, db: Option<&str>) -> Result<(), ServiceError> {
        for name in self.select(db)? {
            let bound = self.bound(&name)?;
            run_hook(&bound.hooks.before_create, &bound.db).await?;
            bound.db.create_all().await?;
            run_hook(&bound.hooks.after_create, &bound.db).await?;
        }
        Ok(())
    }

    /// Drops every table, the version table included.
    pub async fn drop_all(&self, db: Option<&str>) -> Result<(), ServiceError> {
        for name in self.select(db)? {
            let bound = self.bound(&name)?;
            run_hook(&bound.hooks.before_drop, &bound.db).await?;
            bound.db.drop_all().await?;
            run_hook(&bound.hooks.after_drop, &bound.db).await?;
        }
        Ok(())
    }

    pub async fn populate_all(&self, db: Option<&str>) -> Result<(), ServiceError> {
        for name in self.select(db)? {
            let bound = self.bound(&name)?;
            if bound.hooks.populate.is_some() {
                tracing::info!(database = %name, "populating");
            }
            run_hook(&bound.hooks.populate, &bound.db).await?;
        }
        Ok(())
    }

    /// Compares each database version with the heads of its revisions.
    ///
    /// Databases without a revision directory are skipped.
    pub async fn check_versions(&self) -> Result<(), ServiceError> {
        if !self.config.upgrade.version_check {
            return Ok(());
        }

        for (name, bound) in &self.databases {
            let scripts = self.scripts(name);
            if !scripts.exists().await {
                continue;
            }

            let heads = scripts.graph().await?.head_ids();
            let current = bound.db.current_versions().await?;

            let message = if current.is_empty() {
                Some(VERSION_MISSING)
            } else if current.iter().any(|version| !heads.contains(version)) {
                Some(VERSION_NOT_HEAD)
            } else {
                None
            };

            if let Some(message) = message {
                if self.config.upgrade.version_validation {
                    return Err(ServiceError::InvalidVersion {
                        db: name.clone(),
                        message,
                    });
                }
                tracing::error!(database = %name, "{message}");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use dbwire_core::entity::{Entity, Field, SqlType, Value};
    use dbwire_core::migration::Revision;
    use dbwire_core::schema::SchemaBuilder;

    fn registry() -> AppRegistry {
        AppRegistry::new().with_metadata(
            SchemaBuilder::new("main")
                .entity(
                    Entity::new("Parent")
                        .field(Field::new("name", SqlType::Text))
                        .one_to_many("children", "Child"),
                )
                .entity(Entity::new("Child")),
        )
    }

    fn config(root: &std::path::Path, extra: &str) -> Config {
        Config::from_toml_str(
            &format!(
                "[upgrade]\ndirectory = \"versions\"\n\n[database.main]\nuri = \"sqlite://\"\n{extra}"
            ),
            root,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_parent_child_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let service = DatabaseService::start(config(dir.path(), ""), &registry()).await.unwrap();
        service.create_all(None).await.unwrap();

        let session = service.session("main").unwrap();
        let parent = session.insert("Parent", &[("name", "p".into())]).await.unwrap();
        let first = session.insert("Child", &[]).await.unwrap();
        let second = session.insert("Child", &[]).await.unwrap();
        for child in [&first, &second] {
            session
                .link("Parent", parent.clone(), "children", child.clone())
                .await
                .unwrap();
        }

        let children = session.all("Child").await.unwrap();
        assert_eq!(children.len(), 2);
        for child in &children {
            assert_eq!(child.get("parent_id"), Some(&parent));
            let key = child.get("id").cloned().unwrap();
            assert!(matches!(
                session.related("Child", key, "parent").await.unwrap_err(),
                StorageError::UnknownAttribute { .. }
            ));
        }

        let related = session.related("Parent", parent, "children").await.unwrap();
        assert_eq!(related.keys(), vec![first, second]);
    }

    #[tokio::test]
    async fn test_schema_error_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let registry = AppRegistry::new()
            .with_metadata(
                SchemaBuilder::new("main")
                    .entity(Entity::new("Parent").one_to_many("children", "Nope")),
            );

        let err = DatabaseService::start(config(dir.path(), ""), &registry)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ServiceError::Schema { ref db, .. } if db == "main"));
    }

    #[tokio::test]
    async fn test_database_selection() {
        let dir = tempfile::tempdir().unwrap();
        let registry =
            registry().with_metadata(SchemaBuilder::new("other").entity(Entity::new("Tag")));

        let one = DatabaseService::start(config(dir.path(), ""), &registry).await.unwrap();
        assert_eq!(one.single(None).unwrap(), "main");

        let two = DatabaseService::start(
            config(dir.path(), "\n[database.other]\nuri = \"sqlite://\"\n"),
            &registry,
        )
        .await
        .unwrap();
        assert!(matches!(two.single(None), Err(ServiceError::MissingDbOption)));
        assert_eq!(two.single(Some("other")).unwrap(), "other");
        assert_eq!(two.select(None).unwrap().len(), 2);
        assert!(matches!(two.select(Some("nope")), Err(ServiceError::UnknownDatabase(_))));
    }

    #[tokio::test]
    async fn test_deactivated_database_is_not_started() {
        let dir = tempfile::tempdir().unwrap();
        let service = DatabaseService::start(config(dir.path(), "activated = false\n"), &registry())
            .await
            .unwrap();
        assert_eq!(service.names().count(), 0);
        assert!(matches!(service.single(None), Err(ServiceError::NoDatabase)));
    }

    struct Seed;

    #[async_trait]
    impl Hook for Seed {
        async fn run(&self, db: &Database) -> Result<(), StorageError> {
            db.session().insert("Parent", &[("name", Value::from("seeded"))]).await?;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_hooks() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("index.sql"),
            "CREATE INDEX ix_parent_name ON parent (name);",
        )
        .unwrap();

        let service = DatabaseService::start(
            config(dir.path(), "populate = \"seed\"\nafter_create = \"index.sql\"\n"),
            &registry().with_hook("seed", Seed),
        )
        .await
        .unwrap();

        service.create_all(Some("main")).await.unwrap();
        service.populate_all(None).await.unwrap();

        let session = service.session("main").unwrap();
        assert!(session.exists("Parent", &[("name", "seeded".into())]).await.unwrap());

        service.drop_all(None).await.unwrap();
        let db = service.database("main").unwrap();
        assert!(db.introspect().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_check_versions() {
        let dir = tempfile::tempdir().unwrap();
        let service = DatabaseService::start(config(dir.path(), ""), &registry()).await.unwrap();

        // No revision directory: nothing to check
        service.check_versions().await.unwrap();

        let scripts = service.scripts("main");
        scripts.init().await.unwrap();
        scripts
            .write("a1.sql", &Revision::new("a1", Vec::new()).message("base"))
            .await
            .unwrap();

        let err = service.check_versions().await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidVersion { message: VERSION_MISSING, .. }));

        let db = service.database("main").unwrap();
        db.set_versions(vec!["zz".to_string()]).await.unwrap();
        let err = service.check_versions().await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidVersion { message: VERSION_NOT_HEAD, .. }));

        db.set_versions(vec!["a1".to_string()]).await.unwrap();
        service.check_versions().await.unwrap();
    }

    #[tokio::test]
    async fn test_check_versions_without_validation_only_logs() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path(), "");
        config.upgrade.version_validation = false;
        let service = DatabaseService::start(config, &registry()).await.unwrap();

        let scripts = service.scripts("main");
        scripts
            .write("a1.sql", &Revision::new("a1", Vec::new()))
            .await
            .unwrap();
        service.check_versions().await.unwrap();
    }
}

//! Application configuration loaded from a TOML file.
//!
//! ```toml
//! collections_class = "set"
//! data = "data"
//!
//! [upgrade]
//! directory = "$data/database_versions"
//!
//! [database.main]
//! uri = "sqlite:///$data/app.db"
//! metadata = "models.toml"
//! ```

use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};

use chrono::{DateTime, FixedOffset, Local, Utc};
use dbwire_core::migration::template::{
    FileTemplate, DEFAULT_FILE_TEMPLATE, DEFAULT_TRUNCATE_SLUG_LENGTH,
};
use dbwire_core::relationship::CollectionKind;
use dbwire_core::schema::ResolveOptions;
use serde::{Deserialize, Serialize};

/// Overrides the `data` directory.
pub const DATA_ENV: &str = "DBWIRE_DATA";

const DATA_PLACEHOLDER: &str = "$data";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Cannot read configuration file {}: {message}", path.display())]
    Read { path: PathBuf, message: String },

    #[error("Invalid configuration: {0}")]
    Parse(String),
}

fn enabled() -> bool {
    true
}

fn default_data() -> String {
    "data".to_string()
}

fn default_directory() -> String {
    format!("{DATA_PLACEHOLDER}/database_versions")
}

fn default_file_template() -> String {
    DEFAULT_FILE_TEMPLATE.to_string()
}

fn default_truncate_slug_length() -> usize {
    DEFAULT_TRUNCATE_SLUG_LENGTH
}

/// Clock used for revision create dates and file names.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Timezone {
    #[default]
    Utc,
    Local,
}

impl Timezone {
    pub fn now(&self) -> DateTime<FixedOffset> {
        match self {
            Timezone::Utc => Utc::now().into(),
            Timezone::Local => Local::now().into(),
        }
    }
}

/// The `[upgrade]` section: revision scripts and version checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpgradeConfig {
    #[serde(default = "default_directory")]
    pub directory: String,
    #[serde(default = "default_file_template")]
    pub file_template: String,
    #[serde(default = "default_truncate_slug_length")]
    pub truncate_slug_length: usize,
    #[serde(default)]
    pub timezone: Timezone,
    /// Compare the database versions with the revision heads on `check`.
    #[serde(default = "enabled")]
    pub version_check: bool,
    /// A failed version check is an error rather than a logged message.
    #[serde(default = "enabled")]
    pub version_validation: bool,
}

impl Default for UpgradeConfig {
    fn default() -> Self {
        Self {
            directory: default_directory(),
            file_template: default_file_template(),
            truncate_slug_length: default_truncate_slug_length(),
            timezone: Timezone::default(),
            version_check: true,
            version_validation: true,
        }
    }
}

/// A `[database.<name>]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    #[serde(default = "enabled")]
    pub activated: bool,
    pub uri: String,
    /// Log every statement at info level.
    #[serde(default)]
    pub debug: bool,
    #[serde(default = "enabled")]
    pub foreign_keys: bool,
    /// Registered schema name or declarations file; defaults to the section
    /// name.
    #[serde(default)]
    pub metadata: Option<String>,
    #[serde(default)]
    pub populate: Option<String>,
    #[serde(default)]
    pub before_create: Option<String>,
    #[serde(default)]
    pub after_create: Option<String>,
    #[serde(default)]
    pub before_drop: Option<String>,
    #[serde(default)]
    pub after_drop: Option<String>,
}

impl DatabaseConfig {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            activated: true,
            uri: uri.into(),
            debug: false,
            foreign_keys: true,
            metadata: None,
            populate: None,
            before_create: None,
            after_create: None,
            before_drop: None,
            after_drop: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Container kind of collections declared without one.
    #[serde(default)]
    pub collections_class: CollectionKind,
    #[serde(default = "default_data")]
    pub data: String,
    #[serde(default)]
    pub upgrade: UpgradeConfig,
    #[serde(default, rename = "database")]
    pub databases: BTreeMap<String, DatabaseConfig>,
    /// Directory relative paths are resolved against.
    #[serde(skip)]
    pub root: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            collections_class: CollectionKind::default(),
            data: default_data(),
            upgrade: UpgradeConfig::default(),
            databases: BTreeMap::new(),
            root: PathBuf::from("."),
        }
    }
}

impl Config {
    /// Loads the configuration file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        let root = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        let config = Self::from_toml_str(&content, root)?;

        tracing::debug!(
            path = %path.display(),
            databases = config.databases.len(),
            "loaded configuration"
        );
        Ok(config)
    }

    pub fn from_toml_str(content: &str, root: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let mut config: Self =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.root = root.into();
        Ok(config)
    }

    /// The data directory, `DBWIRE_DATA` first.
    pub fn data_dir(&self) -> PathBuf {
        match env::var(DATA_ENV) {
            Ok(data) if !data.is_empty() => PathBuf::from(data),
            _ => self.root.join(&self.data),
        }
    }

    /// Substitutes `$data` in a configured value.
    pub fn expand(&self, value: &str) -> String {
        value.replace(DATA_PLACEHOLDER, &self.data_dir().to_string_lossy())
    }

    /// Expands `$data` and resolves a relative path against the root.
    pub fn path(&self, value: &str) -> PathBuf {
        let path = PathBuf::from(self.expand(value));
        if path.is_absolute() {
            path
        } else {
            self.root.join(path)
        }
    }

    /// Directory holding the revisions of database `db`.
    pub fn versions_directory(&self, db: &str) -> PathBuf {
        self.path(&self.upgrade.directory).join(db)
    }

    pub fn resolve_options(&self) -> ResolveOptions {
        ResolveOptions {
            default_collection: self.collections_class,
        }
    }

    pub fn file_template(&self) -> FileTemplate {
        FileTemplate::new(
            self.upgrade.file_template.clone(),
            self.upgrade.truncate_slug_length,
        )
    }

    /// Activated database sections, by name.
    pub fn activated(&self) -> impl Iterator<Item = (&str, &DatabaseConfig)> {
        self.databases
            .iter()
            .filter(|(_, db)| db.activated)
            .map(|(name, db)| (name.as_str(), db))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::from_toml_str("[database.main]\nuri = \"sqlite://\"\n", ".").unwrap();

        assert_eq!(config.collections_class, CollectionKind::Set);
        assert_eq!(config.upgrade, UpgradeConfig::default());

        let main = &config.databases["main"];
        assert!(main.activated);
        assert!(main.foreign_keys);
        assert!(!main.debug);
        assert_eq!(main.metadata, None);
    }

    #[test]
    fn test_full_file() {
        let config = Config::from_toml_str(
            r#"
            collections_class = "list"

            [upgrade]
            file_template = "{rev}_{slug}"
            truncate_slug_length = 20
            timezone = "local"
            version_check = false
            version_validation = false

            [database.main]
            uri = "sqlite:///app.db"
            debug = true
            metadata = "models.toml"
            populate = "seed.sql"
            after_create = "indexes.sql"

            [database.archive]
            activated = false
            uri = "sqlite://"
            "#,
            "/srv/app",
        )
        .unwrap();

        assert_eq!(config.resolve_options().default_collection, CollectionKind::List);
        assert_eq!(config.upgrade.timezone, Timezone::Local);
        assert!(!config.upgrade.version_check);
        assert_eq!(config.databases["main"].populate.as_deref(), Some("seed.sql"));
        assert_eq!(config.databases["main"].after_create.as_deref(), Some("indexes.sql"));

        let activated: Vec<&str> = config.activated().map(|(name, _)| name).collect();
        assert_eq!(activated, vec!["main"]);
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let err = Config::from_toml_str("[database.main]\nuri = \"sqlite://\"\nbogus = 1\n", ".")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_missing_uri_is_rejected() {
        assert!(Config::from_toml_str("[database.main]\ndebug = true\n", ".").is_err());
    }

    #[test]
    fn test_versions_directory() {
        if env::var(DATA_ENV).is_ok() {
            return;
        }
        let config = Config::from_toml_str("", "/srv/app").unwrap();
        assert_eq!(
            config.versions_directory("main"),
            PathBuf::from("/srv/app/data/database_versions/main")
        );
    }

    #[test]
    fn test_load_reads_relative_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dbwire.toml");
        std::fs::write(&path, "[upgrade]\ndirectory = \"migrations\"\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.root, dir.path());
        assert_eq!(config.versions_directory("main"), dir.path().join("migrations").join("main"));
    }

    #[test]
    fn test_load_missing_file() {
        let err = Config::load("/nonexistent/dbwire.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}

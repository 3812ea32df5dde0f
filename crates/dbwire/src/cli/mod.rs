//! CLI command definitions.

pub mod db;
pub mod migrate;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::Config;
use crate::migration::{self, Migrator};
use crate::registry::AppRegistry;
use crate::service::{DatabaseService, ServiceError};

/// Manage SQLite databases declared in a configuration file.
#[derive(Debug, Parser)]
#[command(name = "dbwire")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Configuration file.
    #[arg(long, env = "DBWIRE_CONFIG", default_value = "dbwire.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Create database tables.
    Create(db::CreateCommand),
    /// Drop database tables.
    Drop(db::DropCommand),
    /// Check database versions against their revision heads.
    Check,
    /// Initialize a revision scripts directory.
    Init(migrate::InitCommand),
    /// Create a new revision file.
    Revision(migrate::RevisionCommand),
    /// Upgrade to a later version.
    Upgrade(migrate::TargetCommand),
    /// Revert to a previous version.
    Downgrade(migrate::TargetCommand),
    /// Stamp the version table with the given revision; don't run any migrations.
    Stamp(migrate::TargetCommand),
    /// Display the current revision of a database.
    Current(migrate::CurrentCommand),
    /// List changeset scripts in chronological order.
    History(migrate::HistoryCommand),
    /// Show current branch points.
    Branches(migrate::CurrentCommand),
    /// Show current available heads in the script directory.
    Heads(migrate::HeadsCommand),
    /// Merge two revisions together, creating a new revision file.
    Merge(migrate::MergeCommand),
    /// Show the revision denoted by the given symbol.
    Show(migrate::ShowCommand),
}

/// Loads the configuration, binds every database and runs `cli.command`.
///
/// Returns the text to print on stdout.
pub async fn run(cli: Cli, registry: &AppRegistry) -> Result<String, ServiceError> {
    let config = Config::load(&cli.config)?;
    let service = DatabaseService::start(config, registry).await?;
    execute(&service, cli.command).await
}

/// Runs one command against a started service.
pub async fn execute(service: &DatabaseService, command: Commands) -> Result<String, ServiceError> {
    match command {
        Commands::Create(cmd) => {
            let db = cmd.db.as_deref();
            if cmd.drop {
                service.drop_all(db).await?;
            }
            service.create_all(db).await?;
            service.populate_all(db).await?;
            Ok(String::new())
        }
        Commands::Drop(cmd) => {
            service.drop_all(cmd.db.as_deref()).await?;
            Ok(String::new())
        }
        Commands::Check => {
            service.check_versions().await?;
            Ok(String::new())
        }
        Commands::Init(cmd) => migration::init(service, cmd.db.as_deref()).await,
        Commands::Revision(cmd) => {
            Migrator::new(service, cmd.db.as_deref())?
                .revision(cmd.options())
                .await
        }
        Commands::Upgrade(cmd) => {
            Migrator::new(service, cmd.db.as_deref())?
                .upgrade(&cmd.revision, cmd.sql)
                .await
        }
        Commands::Downgrade(cmd) => {
            Migrator::new(service, cmd.db.as_deref())?
                .downgrade(&cmd.revision, cmd.sql)
                .await
        }
        Commands::Stamp(cmd) => {
            Migrator::new(service, cmd.db.as_deref())?
                .stamp(&cmd.revision, cmd.sql)
                .await
        }
        Commands::Current(cmd) => {
            Migrator::new(service, cmd.db.as_deref())?
                .current(cmd.verbose)
                .await
        }
        Commands::History(cmd) => {
            Migrator::new(service, cmd.db.as_deref())?
                .history(cmd.rev_range.as_deref(), cmd.verbose)
                .await
        }
        Commands::Branches(cmd) => {
            Migrator::new(service, cmd.db.as_deref())?
                .branches(cmd.verbose)
                .await
        }
        Commands::Heads(cmd) => {
            Migrator::new(service, cmd.db.as_deref())?
                .heads(cmd.verbose, cmd.resolve_dependencies)
                .await
        }
        Commands::Merge(cmd) => {
            Migrator::new(service, cmd.db.as_deref())?
                .merge(&cmd.revisions, cmd.message, cmd.branch_label, cmd.rev_id)
                .await
        }
        Commands::Show(cmd) => Migrator::new(service, cmd.db.as_deref())?.show(&cmd.rev).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(dir: &std::path::Path) -> PathBuf {
        let path = dir.join("dbwire.toml");
        std::fs::write(
            &path,
            r#"
data = "data"

[database.main]
uri = "sqlite:///$data/main.db"
metadata = "main.toml"
"#,
        )
        .unwrap();
        std::fs::write(
            dir.join("main.toml"),
            r#"
[[entity]]
name = "Account"

[[entity.field]]
name = "name"
type = "text"
"#,
        )
        .unwrap();
        path
    }

    #[test]
    fn test_parse_commands() {
        let cli = Cli::parse_from([
            "dbwire", "--config", "x.toml", "create", "--db", "main", "--drop",
        ]);
        assert_eq!(cli.config, PathBuf::from("x.toml"));
        match cli.command {
            Commands::Create(cmd) => {
                assert_eq!(cmd.db.as_deref(), Some("main"));
                assert!(cmd.drop);
            }
            other => panic!("unexpected command: {other:?}"),
        }

        let cli = Cli::parse_from([
            "dbwire",
            "revision",
            "-m",
            "add account",
            "-a",
            "--depends-on",
            "a1",
            "--depends-on",
            "b2",
        ]);
        match cli.command {
            Commands::Revision(cmd) => {
                let options = cmd.options();
                assert_eq!(options.message.as_deref(), Some("add account"));
                assert!(options.autogenerate);
                assert_eq!(options.head, "head");
                assert_eq!(options.depends_on, vec!["a1".to_string(), "b2".to_string()]);
            }
            other => panic!("unexpected command: {other:?}"),
        }

        assert!(Cli::try_parse_from(["dbwire", "merge"]).is_err());
        assert!(Cli::try_parse_from(["dbwire", "upgrade"]).is_err());
    }

    #[tokio::test]
    async fn test_run_create_then_upgrade_offline() {
        let dir = tempfile::tempdir().unwrap();
        let config = write_config(dir.path());

        let cli = Cli::parse_from(["dbwire", "--config", config.to_str().unwrap(), "create"]);
        assert_eq!(run(cli, &AppRegistry::new()).await.unwrap(), "");
        assert!(dir.path().join("data").join("main.db").exists());

        let cli = Cli::parse_from(["dbwire", "--config", config.to_str().unwrap(), "init"]);
        let output = run(cli, &AppRegistry::new()).await.unwrap();
        assert!(output.starts_with("Creating directory"));

        let cli = Cli::parse_from([
            "dbwire",
            "--config",
            config.to_str().unwrap(),
            "revision",
            "-m",
            "empty",
            "--rev-id",
            "a1",
        ]);
        let output = run(cli, &AppRegistry::new()).await.unwrap();
        assert!(output.starts_with("Generating"));

        let cli = Cli::parse_from([
            "dbwire",
            "--config",
            config.to_str().unwrap(),
            "upgrade",
            "--sql",
            "head",
        ]);
        let output = run(cli, &AppRegistry::new()).await.unwrap();
        assert!(output.contains("INSERT INTO dbwire_version (version_num) VALUES ('a1');"));
    }

    #[tokio::test]
    async fn test_run_missing_config() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.toml");
        let cli = Cli::parse_from(["dbwire", "--config", missing.to_str().unwrap(), "check"]);
        assert!(matches!(
            run(cli, &AppRegistry::new()).await,
            Err(ServiceError::Config(_))
        ));
    }
}

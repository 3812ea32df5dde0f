use anyhow::{Context, Result};
use clap::Parser;
use dbwire::cli::{run, Cli, Commands};
use dbwire::AppRegistry;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn command_name(command: &Commands) -> &'static str {
    match command {
        Commands::Create(_) => "create",
        Commands::Drop(_) => "drop",
        Commands::Check => "check",
        Commands::Init(_) => "init",
        Commands::Revision(_) => "revision",
        Commands::Upgrade(_) => "upgrade",
        Commands::Downgrade(_) => "downgrade",
        Commands::Stamp(_) => "stamp",
        Commands::Current(_) => "current",
        Commands::History(_) => "history",
        Commands::Branches(_) => "branches",
        Commands::Heads(_) => "heads",
        Commands::Merge(_) => "merge",
        Commands::Show(_) => "show",
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries command output.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dbwire=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let name = command_name(&cli.command);
    let output = run(cli, &AppRegistry::new())
        .await
        .with_context(|| format!("dbwire {name} failed"))?;

    if !output.is_empty() {
        println!("{output}");
    }
    Ok(())
}

//! Schema commands.

use clap::Parser;

/// Create the database tables, then populate them.
#[derive(Debug, Parser)]
pub struct CreateCommand {
    /// Name of the database section.
    #[arg(long)]
    pub db: Option<String>,

    /// Drop the database tables before re-creating them.
    #[arg(long)]
    pub drop: bool,
}

/// Drop all database tables.
#[derive(Debug, Parser)]
pub struct DropCommand {
    /// Name of the database section.
    #[arg(long)]
    pub db: Option<String>,
}

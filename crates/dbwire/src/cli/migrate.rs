//! Revision commands.

use clap::Parser;

use crate::migration::RevisionOptions;

/// Initialize a new scripts directory.
#[derive(Debug, Parser)]
pub struct InitCommand {
    /// Name of the database section.
    #[arg(long)]
    pub db: Option<String>,
}

/// Create a new revision file.
#[derive(Debug, Parser)]
pub struct RevisionCommand {
    /// Name of the database section.
    #[arg(long)]
    pub db: Option<String>,

    /// Message string to use with the revision.
    #[arg(short, long)]
    pub message: Option<String>,

    /// Populate the revision with the operations bringing the database in
    /// line with the declared schema.
    #[arg(short, long)]
    pub autogenerate: bool,

    /// Head revision or <branchname>@head to base the new revision on.
    #[arg(long, default_value = "head")]
    pub head: String,

    /// Allow a non-head revision as the "head" to splice onto.
    #[arg(long)]
    pub splice: bool,

    /// Branch label to apply to the new revision.
    #[arg(long)]
    pub branch_label: Option<String>,

    /// Hardcoded revision id instead of a generated one.
    #[arg(long)]
    pub rev_id: Option<String>,

    /// Revision this revision depends on (repeatable).
    #[arg(long)]
    pub depends_on: Vec<String>,
}

impl RevisionCommand {
    pub fn options(&self) -> RevisionOptions {
        RevisionOptions {
            message: self.message.clone(),
            autogenerate: self.autogenerate,
            head: self.head.clone(),
            splice: self.splice,
            branch_label: self.branch_label.clone(),
            rev_id: self.rev_id.clone(),
            depends_on: self.depends_on.clone(),
        }
    }
}

/// Move the database to a revision: `upgrade`, `downgrade` and `stamp`.
#[derive(Debug, Parser)]
pub struct TargetCommand {
    /// Name of the database section.
    #[arg(long)]
    pub db: Option<String>,

    /// Don't run anything; print the SQL instead.
    #[arg(long)]
    pub sql: bool,

    /// Revision target, or `start:end` with --sql.
    pub revision: String,
}

/// Show the current revision of a database.
#[derive(Debug, Parser)]
pub struct CurrentCommand {
    /// Name of the database section.
    #[arg(long)]
    pub db: Option<String>,

    /// Use more verbose output.
    #[arg(short, long)]
    pub verbose: bool,
}

/// List revision scripts, newest first.
#[derive(Debug, Parser)]
pub struct HistoryCommand {
    /// Name of the database section.
    #[arg(long)]
    pub db: Option<String>,

    /// Revision range; format is [start]:[end].
    #[arg(short, long)]
    pub rev_range: Option<String>,

    /// Use more verbose output.
    #[arg(short, long)]
    pub verbose: bool,
}

/// Show available heads in the script directory.
#[derive(Debug, Parser)]
pub struct HeadsCommand {
    /// Name of the database section.
    #[arg(long)]
    pub db: Option<String>,

    /// Use more verbose output.
    #[arg(short, long)]
    pub verbose: bool,

    /// Treat dependency versions as down revisions.
    #[arg(long)]
    pub resolve_dependencies: bool,
}

/// Merge revisions together into a new revision file.
#[derive(Debug, Parser)]
pub struct MergeCommand {
    /// Name of the database section.
    #[arg(long)]
    pub db: Option<String>,

    /// Message string to use with the revision.
    #[arg(short, long)]
    pub message: Option<String>,

    /// Branch label to apply to the new revision.
    #[arg(long)]
    pub branch_label: Option<String>,

    /// Hardcoded revision id instead of a generated one.
    #[arg(long)]
    pub rev_id: Option<String>,

    /// Revisions to merge, or "heads" for all heads.
    #[arg(required = true)]
    pub revisions: Vec<String>,
}

/// Show the revision(s) denoted by the given symbol.
#[derive(Debug, Parser)]
pub struct ShowCommand {
    /// Name of the database section.
    #[arg(long)]
    pub db: Option<String>,

    /// Revision target.
    pub rev: String,
}

//! Revision scripts on disk and the commands working on them.

mod commands;
mod directory;
mod runner;

pub use commands::{init, Migrator, RevisionOptions};
pub use directory::ScriptDirectory;

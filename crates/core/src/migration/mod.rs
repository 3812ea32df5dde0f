//! Revision scripts, the revision graph and schema autogeneration.

pub mod diff;
mod error;
mod graph;
mod script;
pub mod template;
pub mod version;

pub use diff::{compare, DatabaseTable, Operations};
pub use error::{MigrationError, Result};
pub use graph::{Direction, Plan, RevisionGraph};
pub use script::Revision;
pub use template::{new_revision_id, slugify, FileTemplate};

//! Storage layer: the SQLite backend behind every configured database.

mod error;
pub mod sqlite;

pub use error::{Result, StorageError};
pub use sqlite::{Database, DatabaseUri, Record, Related, Session};

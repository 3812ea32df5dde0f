//! Functional core of dbwire.
//!
//! Everything in this crate is pure data and pure functions: entity and
//! relationship declarations, the two-phase schema build, the SQLite
//! statements derived from a resolved schema and the revision graph used by
//! the migration commands. No I/O happens here.

pub mod entity;
pub mod migration;
pub mod relationship;
pub mod schema;

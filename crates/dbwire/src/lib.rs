//! dbwire - bind entity declarations to SQLite databases and manage their
//! schema revisions.
//!
//! A TOML configuration names each database, its URI and its metadata (a
//! registered [`SchemaBuilder`](dbwire_core::schema::SchemaBuilder) or a
//! declarations file). [`service::DatabaseService`] opens them and exposes
//! sessions; [`migration`] drives the revision scripts.

pub mod cli;
pub mod config;
pub mod migration;
pub mod registry;
pub mod service;
pub mod storage;

pub use config::Config;
pub use registry::AppRegistry;
pub use service::{DatabaseService, ServiceError};

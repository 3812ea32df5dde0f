//! Entity graph construction, relationship resolution and SQL generation.

mod builder;
pub mod ddl;
mod error;
pub mod naming;
pub mod queries;
mod resolved;
mod resolver;

pub use builder::{Declarations, EntityGraph, EntityNode, SchemaBuilder};
pub use error::SchemaError;
pub use resolved::{
    Column, ForeignKeyJoin, ForeignKeyRef, Join, RelationshipMapping, ResolvedEntity,
    ResolvedSchema, SecondaryJoin, Table, TableKind,
};
pub use resolver::{resolve, ResolveOptions};

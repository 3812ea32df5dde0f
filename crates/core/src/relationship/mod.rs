mod types;

pub use types::{CollectionKind, OnDelete, Relationship, RelationshipKind};

use thiserror::Error;

/// Configuration errors raised while building or resolving a schema.
///
/// All of them are fatal: an unresolved relationship would corrupt the
/// generated schema, so startup must abort.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("Entity '{0}' is declared more than once")]
    DuplicateEntity(String),

    #[error("Attribute '{attribute}' is declared more than once in entity '{entity}'")]
    DuplicateAttribute { entity: String, attribute: String },

    #[error("Entity '{0}' has no primary key")]
    MissingPrimaryKey(String),

    #[error("Entity '{0}' has a composite primary key; relationships need a single key column")]
    CompositePrimaryKey(String),

    #[error("Option '{option}' does not apply to relation '{attribute}' in entity '{entity}'")]
    InvalidOption {
        entity: String,
        attribute: String,
        option: &'static str,
    },

    #[error("In entity '{entity}', relation '{attribute}', target entity '{target}' not found")]
    TargetNotFound {
        entity: String,
        attribute: String,
        target: String,
    },

    #[error(
        "Several relations in entity '{target}' match as inverse of the '{attribute}' relation in entity '{entity}'. \
         You should specify inverse relations manually by using the inverse option."
    )]
    AmbiguousInverse {
        target: String,
        attribute: String,
        entity: String,
    },

    #[error(
        "Relation '{inverse}' ({inverse_kind}) in entity '{target}' cannot be the inverse of relation '{attribute}' ({kind}) in entity '{entity}'"
    )]
    IncompatibleInverse {
        entity: String,
        attribute: String,
        kind: &'static str,
        target: String,
        inverse: String,
        inverse_kind: &'static str,
    },

    #[error(
        "Relation '{attribute}' in entity '{entity}' resolves '{inverse}' in entity '{target}' as its inverse, \
         but '{inverse}' is bound to '{bound_to}'. You should specify inverse relations manually by using the inverse option."
    )]
    InverseMismatch {
        entity: String,
        attribute: String,
        target: String,
        inverse: String,
        bound_to: String,
    },

    #[error("Attribute '{attribute}' of entity '{entity}' is already taken and cannot hold a relation")]
    AttributeConflict { entity: String, attribute: String },

    #[error("Column '{column}' of table '{table}' already references '{references}'")]
    ColumnConflict {
        table: String,
        column: String,
        references: String,
    },

    #[error(
        "Join table '{table}' of relation '{attribute}' in entity '{entity}' would use column '{column}' twice; \
         set local_colname and remote_colname"
    )]
    JoinColumnCollision {
        entity: String,
        attribute: String,
        table: String,
        column: String,
    },

    #[error("Table '{0}' is declared more than once")]
    DuplicateTable(String),

    #[error("Relation '{attribute}' in entity '{entity}' orders by unknown column '{column}'")]
    UnknownOrderColumn {
        entity: String,
        attribute: String,
        column: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_not_found_display() {
        let error = SchemaError::TargetNotFound {
            entity: "Parent".to_string(),
            attribute: "children".to_string(),
            target: "Kid".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "In entity 'Parent', relation 'children', target entity 'Kid' not found"
        );
    }

    #[test]
    fn test_ambiguous_inverse_display_names_both_entities() {
        let error = SchemaError::AmbiguousInverse {
            target: "Child".to_string(),
            attribute: "children".to_string(),
            entity: "Parent".to_string(),
        };
        let message = error.to_string();
        assert!(message.contains("entity 'Child'"));
        assert!(message.contains("'children' relation in entity 'Parent'"));
        assert!(message.contains("inverse option"));
    }
}

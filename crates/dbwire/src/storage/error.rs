use thiserror::Error;

/// Errors that can occur during storage operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("{entity} not found: {key}")]
    NotFound { entity: String, key: String },

    #[error("{entity} already exists: {key}")]
    AlreadyExists { entity: String, key: String },

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Unknown entity '{0}'")]
    UnknownEntity(String),

    #[error("'{entity}' object has no attribute '{attribute}'")]
    UnknownAttribute { entity: String, attribute: String },

    #[error("Entity '{entity}' has no column '{column}'")]
    UnknownColumn { entity: String, column: String },

    #[error("Expected at most one {entity}, found {count}")]
    MultipleResults { entity: String, count: usize },

    #[error("Unsupported database backend '{scheme}' in '{uri}'")]
    UnsupportedBackend { scheme: String, uri: String },

    #[error("Invalid database URI '{0}'")]
    InvalidUri(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Cannot read '{path}': {message}")]
    ReadFailed { path: String, message: String },
}

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_display() {
        let error = StorageError::NotFound {
            entity: "Parent".to_string(),
            key: "42".to_string(),
        };
        assert_eq!(error.to_string(), "Parent not found: 42");
    }

    #[test]
    fn test_unknown_attribute_display() {
        let error = StorageError::UnknownAttribute {
            entity: "Child".to_string(),
            attribute: "parent".to_string(),
        };
        assert_eq!(error.to_string(), "'Child' object has no attribute 'parent'");
    }

    #[test]
    fn test_unsupported_backend_display() {
        let error = StorageError::UnsupportedBackend {
            scheme: "postgresql".to_string(),
            uri: "postgresql://localhost/app".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Unsupported database backend 'postgresql' in 'postgresql://localhost/app'"
        );
    }
}

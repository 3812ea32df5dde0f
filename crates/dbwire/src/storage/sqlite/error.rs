//! SQLite error mapping.
//!
//! Maps `tokio_rusqlite::Error` and `rusqlite::Error` to `StorageError`.
//! Constraint failures are mapped to semantic variants (e.g., UNIQUE constraint to AlreadyExists).

use crate::storage::StorageError;

/// Helper to wrap rusqlite errors for tokio_rusqlite closures.
pub(crate) fn wrap_err(e: rusqlite::Error) -> tokio_rusqlite::Error {
    tokio_rusqlite::Error::Rusqlite(e)
}

/// Maps a rusqlite error to a StorageError.
///
/// # Error Mapping
///
/// - `SQLITE_CONSTRAINT_UNIQUE` / `SQLITE_CONSTRAINT_PRIMARYKEY` → `StorageError::AlreadyExists`
/// - `SQLITE_CONSTRAINT_FOREIGNKEY` → `StorageError::InvalidData`
/// - Other constraint failures → `StorageError::ConstraintViolation`
/// - Connection errors → `StorageError::ConnectionFailed`
/// - All other errors → `StorageError::QueryFailed`
fn map_rusqlite_error(err: &rusqlite::Error, entity: &str, key: &str) -> StorageError {
    match err {
        rusqlite::Error::SqliteFailure(sqlite_err, _)
            if sqlite_err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || sqlite_err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY =>
        {
            StorageError::AlreadyExists {
                entity: entity.to_string(),
                key: key.to_string(),
            }
        }

        rusqlite::Error::SqliteFailure(sqlite_err, _)
            if sqlite_err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY =>
        {
            StorageError::InvalidData(format!("Foreign key constraint violation for {entity}"))
        }

        rusqlite::Error::SqliteFailure(sqlite_err, message)
            if sqlite_err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            StorageError::ConstraintViolation(
                message.clone().unwrap_or_else(|| format!("constraint failed for {entity}")),
            )
        }

        rusqlite::Error::SqliteFailure(sqlite_err, _)
            if sqlite_err.code == rusqlite::ErrorCode::CannotOpen =>
        {
            StorageError::ConnectionFailed(format!("Cannot open database: {err}"))
        }

        rusqlite::Error::QueryReturnedNoRows => StorageError::NotFound {
            entity: entity.to_string(),
            key: key.to_string(),
        },

        _ => StorageError::QueryFailed(err.to_string()),
    }
}

/// Maps a tokio_rusqlite error to a StorageError.
///
/// `key` names the row involved, when known, for `NotFound` and
/// `AlreadyExists`.
pub fn map_tokio_rusqlite_error(
    err: tokio_rusqlite::Error,
    entity: &str,
    key: &str,
) -> StorageError {
    match &err {
        tokio_rusqlite::Error::Rusqlite(rusqlite_err) => {
            map_rusqlite_error(rusqlite_err, entity, key)
        }
        tokio_rusqlite::Error::Close(_) | tokio_rusqlite::Error::ConnectionClosed => {
            StorageError::ConnectionFailed("Connection closed unexpectedly".to_string())
        }
        _ => StorageError::QueryFailed(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::ffi;

    fn failure(extended_code: i32) -> tokio_rusqlite::Error {
        let sqlite_err = rusqlite::ffi::Error {
            code: rusqlite::ErrorCode::ConstraintViolation,
            extended_code,
        };
        tokio_rusqlite::Error::Rusqlite(rusqlite::Error::SqliteFailure(sqlite_err, None))
    }

    #[test]
    fn test_unique_constraint_maps_to_already_exists() {
        let result =
            map_tokio_rusqlite_error(failure(ffi::SQLITE_CONSTRAINT_UNIQUE), "Engine", "7");

        assert_eq!(
            result,
            StorageError::AlreadyExists {
                entity: "Engine".to_string(),
                key: "7".to_string(),
            }
        );
    }

    #[test]
    fn test_primary_key_maps_to_already_exists() {
        let result =
            map_tokio_rusqlite_error(failure(ffi::SQLITE_CONSTRAINT_PRIMARYKEY), "Tag", "1");
        assert!(matches!(result, StorageError::AlreadyExists { .. }));
    }

    #[test]
    fn test_foreign_key_maps_to_invalid_data() {
        let result =
            map_tokio_rusqlite_error(failure(ffi::SQLITE_CONSTRAINT_FOREIGNKEY), "Child", "");
        assert!(matches!(result, StorageError::InvalidData(_)));
    }

    #[test]
    fn test_not_null_maps_to_constraint_violation() {
        let result = map_tokio_rusqlite_error(failure(ffi::SQLITE_CONSTRAINT_NOTNULL), "Child", "");
        assert!(matches!(result, StorageError::ConstraintViolation(_)));
    }

    #[test]
    fn test_no_rows_maps_to_not_found() {
        let err = tokio_rusqlite::Error::Rusqlite(rusqlite::Error::QueryReturnedNoRows);

        match map_tokio_rusqlite_error(err, "Parent", "abc-123") {
            StorageError::NotFound { entity, key } => {
                assert_eq!(entity, "Parent");
                assert_eq!(key, "abc-123");
            }
            other => panic!("Expected NotFound error, got {other:?}"),
        }
    }

    #[test]
    fn test_other_error_maps_to_query_failed() {
        let err = tokio_rusqlite::Error::Other(Box::new(std::io::Error::other("test error")));
        assert!(matches!(
            map_tokio_rusqlite_error(err, "Parent", ""),
            StorageError::QueryFailed(_)
        ));
    }
}

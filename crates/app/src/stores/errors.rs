//! `sqlx` error mapping

use std::error::Error as StdError;

use sanctum::lifecycle::StoreError;
use sqlx::error::{DatabaseError, ErrorKind};

pub(crate) fn store_error(error: sqlx::Error) -> StoreError {
    if matches!(
        error.as_database_error().map(DatabaseError::kind),
        Some(ErrorKind::UniqueViolation)
    ) {
        return StoreError::AlreadyExists;
    }

    match error {
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
            StoreError::Corrupt(error.to_string())
        }
        other => StoreError::backend(other),
    }
}

pub(crate) fn decode_error(
    column: &str,
    source: impl StdError + Send + Sync + 'static,
) -> sqlx::Error {
    sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(source),
    }
}

#[cfg(test)]
mod tests {
    use sanctum::kinds::UnknownKind;

    use super::*;

    #[test]
    fn decode_failures_are_reported_as_corrupt_data() {
        let error = store_error(decode_error("kind", UnknownKind("gem".to_string())));

        assert!(
            matches!(&error, StoreError::Corrupt(message) if message.contains("kind")),
            "expected Corrupt, got {error:?}"
        );
    }

    #[test]
    fn row_not_found_is_a_backend_failure() {
        assert!(matches!(
            store_error(sqlx::Error::RowNotFound),
            StoreError::Backend(_)
        ));
    }
}

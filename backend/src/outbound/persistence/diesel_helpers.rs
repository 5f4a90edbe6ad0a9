//! Shared error mapping for the Diesel entity store.

use tracing::debug;

use crate::domain::ports::EntityStoreError;

use super::pool::PoolError;

/// Map pool failures to connection errors.
pub fn map_pool_error(error: PoolError) -> EntityStoreError {
    match error {
        PoolError::Checkout { message } | PoolError::Build { message } => {
            EntityStoreError::connection(message)
        }
    }
}

/// Map Diesel errors to entity store errors, logging the operation.
pub fn map_diesel_error(error: diesel::result::Error, operation: &str) -> EntityStoreError {
    use diesel::result::{DatabaseErrorKind, Error as DieselError};

    match &error {
        DieselError::DatabaseError(kind, info) => {
            debug!(?kind, message = info.message(), %operation, "diesel operation failed");
        }
        _ => debug!(%error, %operation, "diesel operation failed"),
    }

    match error {
        DieselError::DatabaseError(DatabaseErrorKind::ClosedConnection, _) => {
            EntityStoreError::connection(format!("{operation}: database connection error"))
        }
        DieselError::DatabaseError(DatabaseErrorKind::ForeignKeyViolation, _) => {
            EntityStoreError::query(format!("{operation}: entity does not exist"))
        }
        DieselError::DeserializationError(err) => {
            EntityStoreError::corrupt(format!("{operation}: {err}"))
        }
        _ => EntityStoreError::query(format!("{operation}: database error")),
    }
}

/// Convert an affected-row count to the port's counter type.
pub fn affected_rows(count: usize) -> u64 {
    u64::try_from(count).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn pool_errors_are_connection_errors() {
        let err = map_pool_error(PoolError::checkout("timed out"));
        assert!(matches!(err, EntityStoreError::Connection { ref message } if message == "timed out"));
    }

    #[rstest]
    fn not_found_maps_to_query_error() {
        let err = map_diesel_error(diesel::result::Error::NotFound, "read attribute");
        assert!(matches!(err, EntityStoreError::Query { .. }));
        assert!(err.to_string().contains("read attribute"));
    }
}

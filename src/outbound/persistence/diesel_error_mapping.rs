//! Shared Diesel and pool error mapping into domain error kinds.

use std::fmt::Display;

use tracing::debug;

use crate::domain::Error;

/// Map a pool checkout failure into a domain internal error. Generic over
/// the pool's error type so the bb8 machinery never leaks past this module.
pub(crate) fn map_pool_error(error: impl Display) -> Error {
    Error::internal(format!("database unavailable: {error}"))
}

/// Map Diesel errors into the closed domain kind set.
///
/// Constraint violations with an obvious meaning get a mapped kind: unique
/// violations are conflicts, foreign-key violations invalid references.
/// Everything else is internal; row-absence is surfaced as `NotFound` only
/// at call sites that know what was being looked up.
pub(crate) fn map_diesel_error(error: diesel::result::Error) -> Error {
    use diesel::result::{DatabaseErrorKind, Error as DieselError};

    match &error {
        DieselError::DatabaseError(kind, info) => {
            debug!(?kind, message = info.message(), "diesel operation failed");
        }
        _ => debug!(
            error_type = %std::any::type_name_of_val(&error),
            "diesel operation failed"
        ),
    }

    match error {
        DieselError::NotFound => Error::not_found("Record not found."),
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
            Error::conflict(format!("Already exists: {}", info.message()))
        }
        DieselError::DatabaseError(DatabaseErrorKind::ForeignKeyViolation, info) => {
            Error::invalid(format!("Referenced record does not exist: {}", info.message()))
        }
        DieselError::DatabaseError(_, info) => {
            Error::internal(format!("database error: {}", info.message()))
        }
        other => Error::internal(format!("database error: {other}")),
    }
}

impl From<diesel::result::Error> for Error {
    fn from(error: diesel::result::Error) -> Self {
        map_diesel_error(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ErrorCode;
    use rstest::rstest;

    #[rstest]
    fn pool_errors_map_to_internal() {
        let error = map_pool_error("connection refused");
        assert_eq!(error.code(), ErrorCode::Internal);
        assert!(error.message().contains("connection refused"));
    }

    #[rstest]
    fn not_found_maps_to_not_found() {
        let error = map_diesel_error(diesel::result::Error::NotFound);
        assert_eq!(error.code(), ErrorCode::NotFound);
    }

    #[rstest]
    fn unique_violation_maps_to_conflict() {
        let error = map_diesel_error(diesel::result::Error::DatabaseError(
            diesel::result::DatabaseErrorKind::UniqueViolation,
            Box::new("duplicate key value".to_owned()),
        ));
        assert_eq!(error.code(), ErrorCode::Conflict);
    }

    #[rstest]
    fn foreign_key_violation_maps_to_invalid() {
        let error = map_diesel_error(diesel::result::Error::DatabaseError(
            diesel::result::DatabaseErrorKind::ForeignKeyViolation,
            Box::new("violates foreign key".to_owned()),
        ));
        assert_eq!(error.code(), ErrorCode::Invalid);
    }

    #[rstest]
    fn unknown_database_errors_map_to_internal() {
        let error = map_diesel_error(diesel::result::Error::DatabaseError(
            diesel::result::DatabaseErrorKind::ClosedConnection,
            Box::new("connection closed".to_owned()),
        ));
        assert_eq!(error.code(), ErrorCode::Internal);
    }
}

//! Conversions from external infrastructure errors into domain errors.

use fieldclock_domain::FieldClockError;
use reqwest::Error as HttpError;
use rusqlite::Error as SqlError;

/// Error newtype that keeps conversions on the infrastructure side and can be
/// converted back into the domain error.
#[derive(Debug)]
pub struct InfraError(pub FieldClockError);

impl From<InfraError> for FieldClockError {
    fn from(value: InfraError) -> Self {
        value.0
    }
}

impl From<FieldClockError> for InfraError {
    fn from(value: FieldClockError) -> Self {
        InfraError(value)
    }
}

/// Extension trait to make the conversion logic explicit in tests and within
/// this module.
trait IntoFieldClockError {
    fn into_fieldclock(self) -> FieldClockError;
}

/* -------------------------------------------------------------------------- */
/* rusqlite::Error → FieldClockError */
/* -------------------------------------------------------------------------- */

impl IntoFieldClockError for SqlError {
    fn into_fieldclock(self) -> FieldClockError {
        use rusqlite::ffi::ErrorCode;
        use rusqlite::Error as RE;

        match self {
            RE::SqliteFailure(err, maybe_message) => {
                let message = maybe_message.unwrap_or_default();
                match (err.code, err.extended_code) {
                    (ErrorCode::DatabaseBusy, _) => {
                        FieldClockError::Database("database is busy".into())
                    }
                    (ErrorCode::DatabaseLocked, _) => {
                        FieldClockError::Database("database is locked".into())
                    }
                    // SQLITE_CONSTRAINT_UNIQUE / SQLITE_CONSTRAINT_PRIMARYKEY
                    (ErrorCode::ConstraintViolation, 2067 | 1555) => {
                        FieldClockError::Conflict(format!("unique constraint violation: {message}"))
                    }
                    (ErrorCode::ConstraintViolation, 787) => {
                        FieldClockError::Database("foreign key constraint violation".into())
                    }
                    _ => FieldClockError::Database(format!(
                        "sqlite failure {:?} (code {}): {}",
                        err.code, err.extended_code, message
                    )),
                }
            }
            RE::QueryReturnedNoRows => {
                FieldClockError::NotFound("no rows returned by query".into())
            }
            RE::FromSqlConversionFailure(_, _, cause) => {
                FieldClockError::Database(format!("failed to convert sqlite value: {cause}"))
            }
            RE::InvalidColumnType(_, _, ty) => {
                FieldClockError::Database(format!("invalid column type: {ty}"))
            }
            RE::Utf8Error(_) => {
                FieldClockError::Database("invalid UTF-8 returned from sqlite".into())
            }
            RE::InvalidPath(path) => FieldClockError::Database(format!(
                "invalid database path: {}",
                path.to_string_lossy()
            )),
            other => FieldClockError::Database(other.to_string()),
        }
    }
}

impl From<SqlError> for InfraError {
    fn from(value: SqlError) -> Self {
        InfraError(value.into_fieldclock())
    }
}

/* -------------------------------------------------------------------------- */
/* r2d2::Error → FieldClockError */
/* -------------------------------------------------------------------------- */

impl IntoFieldClockError for r2d2::Error {
    fn into_fieldclock(self) -> FieldClockError {
        FieldClockError::Database(format!("connection pool error: {self}"))
    }
}

impl From<r2d2::Error> for InfraError {
    fn from(value: r2d2::Error) -> Self {
        InfraError(value.into_fieldclock())
    }
}

/* -------------------------------------------------------------------------- */
/* reqwest::Error → FieldClockError */
/* -------------------------------------------------------------------------- */

impl IntoFieldClockError for HttpError {
    fn into_fieldclock(self) -> FieldClockError {
        if self.is_timeout() {
            return FieldClockError::Network("HTTP request timed out".into());
        }

        if self.is_connect() {
            return FieldClockError::Network("HTTP connection failure".into());
        }

        if let Some(status) = self.status() {
            let code = status.as_u16();
            let message =
                format!("HTTP {} {}", code, status.canonical_reason().unwrap_or("unknown status"));

            return match code {
                404 => FieldClockError::NotFound(message),
                400..=499 if code != 429 => FieldClockError::InvalidInput(message),
                _ => FieldClockError::Network(message),
            };
        }

        FieldClockError::Network(self.to_string())
    }
}

impl From<HttpError> for InfraError {
    fn from(value: HttpError) -> Self {
        InfraError(value.into_fieldclock())
    }
}

/* -------------------------------------------------------------------------- */
/* Tests */
/* -------------------------------------------------------------------------- */

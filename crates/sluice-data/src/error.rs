//! Error types for the data access layer.

use std::path::PathBuf;

use thiserror::Error;

use crate::model::FileStatus;

/// Result alias for data layer operations.
pub type Result<T> = std::result::Result<T, DataError>;

/// SQLite primary result codes that signal lock contention.
const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

/// Errors raised by the data access layer.
#[derive(Debug, Error)]
pub enum DataError {
    /// The database file could not be opened.
    #[error("failed to open state store")]
    ConnectFailed {
        /// Database path that was requested.
        path: PathBuf,
        /// Underlying SQL error.
        source: sqlx::Error,
    },
    /// Migration execution failed.
    #[error("migration failed")]
    MigrationFailed {
        /// Underlying migration error.
        source: sqlx::migrate::MigrateError,
    },
    /// A database operation failed.
    #[error("database operation failed")]
    QueryFailed {
        /// Operation identifier.
        operation: &'static str,
        /// Underlying SQL error.
        source: sqlx::Error,
    },
    /// A status change outside the file lifecycle was requested.
    #[error("illegal file status transition")]
    IllegalTransition {
        /// File identifier.
        file_id: i64,
        /// Status the caller expected the file to hold.
        from: FileStatus,
        /// Requested status.
        to: FileStatus,
    },
    /// A persisted status code is not recognised.
    #[error("unknown file status code")]
    UnknownStatus {
        /// File identifier.
        file_id: i64,
        /// Raw status code read from the database.
        code: i64,
    },
    /// Contention persisted across every retry attempt.
    #[error("persistence retries exhausted")]
    RetriesExhausted {
        /// Operation identifier.
        operation: &'static str,
        /// Number of attempts made.
        attempts: u32,
        /// Last error observed.
        source: Box<DataError>,
    },
}

impl DataError {
    pub(crate) fn query(operation: &'static str) -> impl FnOnce(sqlx::Error) -> Self {
        move |source| Self::QueryFailed { operation, source }
    }

    /// Whether the error stems from lock contention and may succeed if retried.
    #[must_use]
    pub fn is_contention(&self) -> bool {
        match self {
            Self::QueryFailed { source, .. } | Self::ConnectFailed { source, .. } => {
                sql_contention(source)
            }
            _ => false,
        }
    }
}

fn sql_contention(error: &sqlx::Error) -> bool {
    match error {
        sqlx::Error::PoolTimedOut => true,
        sqlx::Error::Database(db) => {
            let coded = db
                .code()
                .and_then(|code| code.parse::<i32>().ok())
                .is_some_and(|code| matches!(code & 0xff, SQLITE_BUSY | SQLITE_LOCKED));
            coded || mentions_lock(db.message())
        }
        other => mentions_lock(&other.to_string()),
    }
}

fn mentions_lock(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    message.contains("database is locked") || message.contains("database table is locked")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn pool_timeouts_and_lock_messages_are_contention() {
        let timeout = DataError::QueryFailed {
            operation: "select",
            source: sqlx::Error::PoolTimedOut,
        };
        assert!(timeout.is_contention());

        let locked = DataError::QueryFailed {
            operation: "update",
            source: sqlx::Error::Protocol("database is locked".into()),
        };
        assert!(locked.is_contention());
    }

    #[test]
    fn other_failures_are_fatal() {
        let missing = DataError::QueryFailed {
            operation: "fetch",
            source: sqlx::Error::RowNotFound,
        };
        assert!(!missing.is_contention());

        let illegal = DataError::IllegalTransition {
            file_id: 1,
            from: FileStatus::Waiting,
            to: FileStatus::Done,
        };
        assert!(!illegal.is_contention());
        assert_eq!(illegal.to_string(), "illegal file status transition");
    }

    #[test]
    fn exhausted_retries_keep_the_last_error() {
        let exhausted = DataError::RetriesExhausted {
            operation: "transition",
            attempts: 5,
            source: Box::new(DataError::QueryFailed {
                operation: "transition",
                source: sqlx::Error::PoolTimedOut,
            }),
        };
        assert_eq!(exhausted.to_string(), "persistence retries exhausted");
        assert!(exhausted.source().is_some());
        assert!(!exhausted.is_contention());
    }
}

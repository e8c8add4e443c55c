use sqlx::error::ErrorKind;
use thiserror::Error;

/// SQLite primary result codes that mean "try again later".
const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;
const SQLITE_CONSTRAINT: i32 = 19;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{entity} {key} not found")]
    NotFound { entity: &'static str, key: String },

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// Lock contention, lost connection or an exhausted pool. The transaction was
    /// rolled back and the whole operation may be retried.
    #[error("Transient store error: {0}")]
    Transient(#[source] sqlx::Error),

    /// Every step succeeded but the commit did not. Callers must re-read state
    /// before retrying.
    #[error("Commit failed: {0}")]
    Commit(#[source] sqlx::Error),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Deadline exceeded")]
    DeadlineExceeded,

    #[error("Invalid stored value: {0}")]
    Corrupt(String),

    #[error("Database error: {0}")]
    Database(#[source] sqlx::Error),
}

impl StoreError {
    pub(crate) fn not_found(entity: &'static str, key: impl ToString) -> Self {
        StoreError::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    /// Whether repeating the whole operation can succeed without any change
    /// on the caller's side.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Transient(_))
    }
}

enum Class {
    Constraint(String),
    Transient,
    Other,
}

fn classify(err: &sqlx::Error) -> Class {
    match err {
        sqlx::Error::Database(db_err) => {
            match db_err.kind() {
                ErrorKind::UniqueViolation
                | ErrorKind::ForeignKeyViolation
                | ErrorKind::NotNullViolation
                | ErrorKind::CheckViolation => {
                    return Class::Constraint(db_err.message().to_string());
                }
                _ => {}
            }
            // Extended result codes keep the primary code in the low byte.
            let primary = db_err
                .code()
                .and_then(|code| code.parse::<i32>().ok())
                .map(|code| code & 0xff);
            match primary {
                Some(SQLITE_BUSY) | Some(SQLITE_LOCKED) => Class::Transient,
                Some(SQLITE_CONSTRAINT) => Class::Constraint(db_err.message().to_string()),
                _ => Class::Other,
            }
        }
        sqlx::Error::Io(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => Class::Transient,
        _ => Class::Other,
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match classify(&err) {
            Class::Constraint(message) => StoreError::ConstraintViolation(message),
            Class::Transient => StoreError::Transient(err),
            Class::Other => StoreError::Database(err),
        }
    }
}

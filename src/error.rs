use thiserror::Error;

/// Stable, storage-level error taxonomy.
///
/// Command handlers never see a raw [`sqlx::Error`]; every storage failure is mapped into one
/// of these variants before it crosses the event store's API boundary. Command-level
/// preconditions (state-machine mismatches, missing permissions, ...) are reported through
/// [`CommandError`] instead, which wraps this type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("concurrency conflict on aggregate {aggregate_id}: expected version {expected}, found {actual}")]
    ConcurrencyConflict {
        aggregate_id: String,
        expected: i64,
        actual: i64,
    },

    #[error("unique constraint violated ({constraint_type}={value}): {message}")]
    UniqueConstraintViolation {
        constraint_type: String,
        value: String,
        message: String,
    },

    #[error("internal error: {0}")]
    Internal(String),

    #[error("transient error, retry: {0}")]
    Transient(String),
}

impl Error {
    /// The short uppercase code used in wire responses, e.g. for client-side i18n lookups.
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidArgument(_) => "EVENTSTORE-InvalidArgument",
            Error::NotFound(_) => "EVENTSTORE-NotFound",
            Error::AlreadyExists(_) => "EVENTSTORE-AlreadyExists",
            Error::PreconditionFailed(_) => "EVENTSTORE-PreconditionFailed",
            Error::PermissionDenied(_) => "EVENTSTORE-PermissionDenied",
            Error::ConcurrencyConflict { .. } => "EVENTSTORE-ConcurrencyConflict",
            Error::UniqueConstraintViolation { .. } => "EVENTSTORE-UniqueConstraintViolation",
            Error::Internal(_) => "EVENTSTORE-Internal",
            Error::Transient(_) => "EVENTSTORE-Transient",
        }
    }

    /// Whether the caller should retry after reloading the write-model.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::ConcurrencyConflict { .. } | Error::Transient(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Internal(format!("payload (de)serialization failed: {err}"))
    }
}

#[cfg(feature = "sql")]
impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) => {
                // Postgres: 23505 = unique_violation, 40001 = serialization_failure,
                // 40P01 = deadlock_detected.
                match db_err.code().as_deref() {
                    Some("23505") => Error::UniqueConstraintViolation {
                        constraint_type: db_err.constraint().unwrap_or("unknown").to_string(),
                        value: String::new(),
                        message: db_err.message().to_string(),
                    },
                    Some("40001") | Some("40P01") => Error::ConcurrencyConflict {
                        aggregate_id: String::new(),
                        expected: -1,
                        actual: -1,
                    },
                    _ => Error::Internal(db_err.message().to_string()),
                }
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                Error::Transient(err.to_string())
            }
            sqlx::Error::RowNotFound => Error::NotFound("row not found".to_string()),
            other => Error::Internal(other.to_string()),
        }
    }
}

/// A precondition failure raised by a command handler, carrying the stable
/// `COMMAND-<Entity><n>` code alongside the underlying [`Error`].
#[derive(Debug, Error)]
#[error("[{code}] {source}")]
pub struct CommandError {
    pub code: &'static str,
    #[source]
    pub source: Error,
}

impl CommandError {
    pub fn new(code: &'static str, source: Error) -> Self {
        Self { code, source }
    }

    pub fn invalid_argument(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(code, Error::InvalidArgument(message.into()))
    }

    pub fn not_found(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(code, Error::NotFound(message.into()))
    }

    pub fn precondition_failed(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(code, Error::PreconditionFailed(message.into()))
    }

    pub fn already_exists(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(code, Error::AlreadyExists(message.into()))
    }

    pub fn permission_denied(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(code, Error::PermissionDenied(message.into()))
    }
}

impl From<Error> for CommandError {
    fn from(err: Error) -> Self {
        // Storage-level errors have no command-specific code; surface the store's own code.
        Self::new(err.code(), err)
    }
}

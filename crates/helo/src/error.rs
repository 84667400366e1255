//! Error types for helo

use thiserror::Error;

/// Result type alias for helo operations
pub type OrmResult<T> = Result<T, OrmError>;

/// Contract violations of the connection manager.
///
/// These indicate a bug in the calling code and are never retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StateError {
    /// Acquire was attempted while the pool is not running.
    #[error("database backend is not running")]
    PoolNotRunning,

    /// Release/execute was attempted without an active lease.
    #[error("connection is not acquired")]
    NotAcquired,

    /// A physical handle was attached twice to the same session.
    #[error("connection is already acquired")]
    AlreadyAcquired,

    /// Commit/rollback was attempted outside a transaction.
    #[error("no transaction is in progress")]
    NoTransaction,
}

/// Error types for statement building and execution
#[derive(Debug, Error)]
pub enum OrmError {
    /// Malformed builder call, raised before anything reaches the backend
    #[error("Usage error: {0}")]
    Usage(String),

    /// A statement that would touch every row without an explicit override
    #[error("Dangerous operation: {0}")]
    DangerousOperation(String),

    /// The statement shape is not expressible in the active dialect
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Connection manager misuse
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// Database handle used before `connect`
    #[error("Database is not connected yet")]
    NotConnected,

    /// `connect` called twice
    #[error("Database already connected")]
    AlreadyConnected,

    /// Value failed coercion while binding to a column
    #[error("Data error on column '{column}': {message}")]
    Data { column: String, message: String },

    /// Row decode/mapping error
    #[error("Decode error on column '{column}': {message}")]
    Decode { column: String, message: String },

    /// Database connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Query execution error
    #[error("Query error: {0}")]
    Query(#[from] tokio_postgres::Error),

    /// Unique constraint violation
    #[error("Unique constraint violation: {0}")]
    UniqueViolation(String),

    /// Foreign key constraint violation
    #[error("Foreign key violation: {0}")]
    ForeignKeyViolation(String),

    /// Check constraint violation
    #[error("Check constraint violation: {0}")]
    CheckViolation(String),

    /// Statement exceeded the configured timeout
    #[error("Statement timeout after {0:?}")]
    Timeout(std::time::Duration),

    /// Failure reported by a non-postgres backend
    #[error("Backend error: {0}")]
    Backend(String),

    /// Pool error
    #[cfg(feature = "pool")]
    #[error("Pool error: {0}")]
    Pool(String),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl OrmError {
    /// Create a usage error
    pub fn usage(message: impl Into<String>) -> Self {
        Self::Usage(message.into())
    }

    /// Create a data error for a specific column
    pub fn data(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Data {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Create a decode error for a specific column
    pub fn decode(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Check if this error was raised while building a statement
    pub fn is_usage(&self) -> bool {
        matches!(
            self,
            Self::Usage(_) | Self::DangerousOperation(_) | Self::Unsupported(_)
        )
    }

    /// Check if this is a timeout error
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// Check if this is a connection manager contract violation
    pub fn is_state(&self) -> bool {
        matches!(
            self,
            Self::State(_) | Self::NotConnected | Self::AlreadyConnected
        )
    }

    /// Check if this is a unique violation error
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, Self::UniqueViolation(_))
    }

    /// Parse a tokio_postgres error into a more specific OrmError
    pub fn from_db_error(err: tokio_postgres::Error) -> Self {
        if let Some(db_err) = err.as_db_error() {
            let constraint = db_err.constraint().unwrap_or("unknown");
            let message = db_err.message();

            match db_err.code().code() {
                "23505" => return Self::UniqueViolation(format!("{}: {}", constraint, message)),
                "23503" => {
                    return Self::ForeignKeyViolation(format!("{}: {}", constraint, message));
                }
                "23514" => return Self::CheckViolation(format!("{}: {}", constraint, message)),
                _ => {}
            }
        }
        Self::Query(err)
    }
}

#[cfg(feature = "pool")]
impl From<deadpool_postgres::PoolError> for OrmError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        Self::Pool(err.to_string())
    }
}

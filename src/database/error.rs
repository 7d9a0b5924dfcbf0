//! Errors produced while validating, dispatching and executing operations.

use std::time::Duration;

use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors produced by the database layer and the execution engine.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// The operation was rejected before dispatch (e.g. empty statement body).
    #[error("invalid operation: {0}")]
    Configuration(String),

    #[error("no connection became available within {waited:?}")]
    PoolExhausted { waited: Duration },

    #[error("connection pool is closed")]
    PoolClosed,

    #[error("failed to open connection: {source}")]
    Connect {
        #[source]
        source: BoxError,
    },

    #[error("statement failed: {source} (sql: {sql})")]
    Statement {
        sql: String,
        #[source]
        source: BoxError,
    },

    #[error("result callback panicked: {message}")]
    Callback { message: String },

    /// The pool, a connection or the engine panicked while running the operation.
    #[error("operation panicked: {message}")]
    Panicked { message: String },

    #[error("blocking worker failed: {0}")]
    Worker(String),

    #[error("engine is shut down")]
    Shutdown,

    /// The executing task went away without resolving its completion signal.
    #[error("operation was abandoned before it completed")]
    Abandoned,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DatabaseError {
    pub(crate) fn statement(sql: &str, source: impl Into<BoxError>) -> Self {
        DatabaseError::Statement {
            sql: sql.to_owned(),
            source: source.into(),
        }
    }

    pub(crate) fn connect(source: impl Into<BoxError>) -> Self {
        DatabaseError::Connect {
            source: source.into(),
        }
    }

    /// Returns `true` for errors raised by the pool rather than the statement.
    pub fn is_pool_error(&self) -> bool {
        matches!(
            self,
            DatabaseError::PoolExhausted { .. }
                | DatabaseError::PoolClosed
                | DatabaseError::Connect { .. }
        )
    }
}

/// Shorthand result type for the database layer.
pub type Result<T, E = DatabaseError> = std::result::Result<T, E>;

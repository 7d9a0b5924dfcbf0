//! The seams to the outside world: the connection pool and the statement
//! execution surface.
//!
//! The engine only ever talks to a [`ConnectionPool`]. Connections are
//! checked out through [`PooledConnection`], which hands the connection back
//! to the pool when it goes out of scope, on success and failure alike.

use std::future::Future;

use super::{Result, RowCursor, Value};

/// A statement ready to run: plain text, or text plus positional bind values.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Plain(String),
    Prepared { sql: String, params: Vec<Value> },
}

impl Statement {
    /// Builds a plain statement when `params` is empty, a prepared one otherwise.
    pub fn new(sql: impl Into<String>, params: Vec<Value>) -> Self {
        let sql = sql.into();
        if params.is_empty() {
            Statement::Plain(sql)
        } else {
            Statement::Prepared { sql, params }
        }
    }

    pub fn sql(&self) -> &str {
        match self {
            Statement::Plain(sql) | Statement::Prepared { sql, .. } => sql,
        }
    }

    pub fn params(&self) -> &[Value] {
        match self {
            Statement::Plain(_) => &[],
            Statement::Prepared { params, .. } => params,
        }
    }

    pub fn is_prepared(&self) -> bool {
        matches!(self, Statement::Prepared { .. })
    }
}

/// A live database connection.
///
/// Failures are reported as [`DatabaseError::Statement`](super::DatabaseError::Statement).
pub trait Connection: Send + 'static {
    /// Runs a read statement and returns its rows.
    fn query(&mut self, statement: Statement) -> impl Future<Output = Result<RowCursor>> + Send;

    /// Runs a write statement and returns the number of rows it changed.
    fn execute(&mut self, statement: Statement) -> impl Future<Output = Result<u64>> + Send;
}

/// A bounded pool of connections.
///
/// `acquire` may wait while the pool is at capacity and fails with
/// [`DatabaseError::PoolExhausted`](super::DatabaseError::PoolExhausted) once
/// the pool's own wait policy gives up. Every acquired connection is handed
/// back through `release` exactly once.
pub trait ConnectionPool: Send + Sync + 'static {
    type Connection: Connection;

    fn acquire(&self) -> impl Future<Output = Result<Self::Connection>> + Send;

    fn release(&self, connection: Self::Connection);

    /// Closes the pool. Later `acquire` calls fail with `PoolClosed`.
    fn shutdown(&self);
}

/// A connection checked out of a pool for the duration of one operation.
///
/// Dropping the guard releases the connection.
pub struct PooledConnection<'p, P: ConnectionPool> {
    pool: &'p P,
    connection: Option<P::Connection>,
}

impl<'p, P: ConnectionPool> PooledConnection<'p, P> {
    pub async fn acquire(pool: &'p P) -> Result<Self> {
        let connection = pool.acquire().await?;
        Ok(Self {
            pool,
            connection: Some(connection),
        })
    }

    pub async fn query(&mut self, statement: Statement) -> Result<RowCursor> {
        match self.connection.as_mut() {
            Some(connection) => connection.query(statement).await,
            None => Err(super::DatabaseError::PoolClosed),
        }
    }

    pub async fn execute(&mut self, statement: Statement) -> Result<u64> {
        match self.connection.as_mut() {
            Some(connection) => connection.execute(statement).await,
            None => Err(super::DatabaseError::PoolClosed),
        }
    }
}

impl<P: ConnectionPool> Drop for PooledConnection<'_, P> {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.take() {
            self.pool.release(connection);
        }
    }
}

//! Pooled SQLite backend built on `rusqlite`.
//!
//! `rusqlite` is blocking, so every statement runs on tokio's blocking
//! thread pool. Each checked-out connection owns a slot of the pool's
//! semaphore, which bounds how many connections exist at once.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use bytes::Bytes;
use rusqlite::types::{FromSql, FromSqlResult, ToSqlOutput, ValueRef};
use rusqlite::{ToSql, params_from_iter};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, trace, warn};

use super::{
    Columns, Connection, ConnectionPool, DatabaseError, Result, Row, RowCursor, Statement, Value,
};
use crate::config::PoolSettings;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Borrowed(ValueRef::Null),
            Value::Bool(b) => ToSqlOutput::Borrowed(ValueRef::Integer(i64::from(*b))),
            Value::Integer(i) => ToSqlOutput::Borrowed(ValueRef::Integer(*i)),
            Value::Real(f) => ToSqlOutput::Borrowed(ValueRef::Real(*f)),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::Blob(b) => ToSqlOutput::Borrowed(ValueRef::Blob(&b[..])),
        })
    }
}

impl FromSql for Value {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        Ok(match value {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(i) => Value::Integer(i),
            ValueRef::Real(f) => Value::Real(f),
            ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(b) => Value::Blob(Bytes::copy_from_slice(b)),
        })
    }
}

/// A bounded pool of SQLite connections to one database file.
///
/// Connections are opened lazily up to `max_size` and reused afterwards. Each
/// one runs in WAL mode with a busy timeout, so readers and the single writer
/// don't trip over each other.
#[derive(Debug)]
pub struct SqlitePool {
    path: PathBuf,
    settings: PoolSettings,
    idle: Mutex<Vec<rusqlite::Connection>>,
    slots: Arc<Semaphore>,
}

impl SqlitePool {
    /// Opens the database at `path`, creating it if needed.
    ///
    /// One connection is opened right away so that a bad path fails here
    /// rather than on the first operation.
    pub fn open(path: impl AsRef<Path>, settings: PoolSettings) -> Result<Self> {
        if settings.max_size == 0 {
            return Err(DatabaseError::Configuration(
                "pool max_size must be at least 1".to_owned(),
            ));
        }
        let path = path.as_ref().to_owned();
        let first = open_connection(&path, &settings).map_err(DatabaseError::connect)?;
        debug!(path = %path.display(), max_size = settings.max_size, "sqlite pool opened");
        Ok(Self {
            slots: Arc::new(Semaphore::new(settings.max_size)),
            idle: Mutex::new(vec![first]),
            path,
            settings,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn settings(&self) -> &PoolSettings {
        &self.settings
    }

    /// Connections currently checked out.
    pub fn in_use(&self) -> usize {
        if self.slots.is_closed() {
            return 0;
        }
        self.settings
            .max_size
            .saturating_sub(self.slots.available_permits())
    }

    /// Open connections waiting to be reused.
    pub fn idle_count(&self) -> usize {
        self.idle().len()
    }

    pub fn is_closed(&self) -> bool {
        self.slots.is_closed()
    }

    fn idle(&self) -> MutexGuard<'_, Vec<rusqlite::Connection>> {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn open_connection(path: &Path, settings: &PoolSettings) -> rusqlite::Result<rusqlite::Connection> {
    let conn = rusqlite::Connection::open(path)?;
    conn.set_prepared_statement_cache_capacity(settings.statement_cache_size);
    conn.busy_timeout(BUSY_TIMEOUT)?;
    let journal_mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "wal", |row| row.get(0))?;
    trace!(path = %path.display(), %journal_mode, "sqlite connection opened");
    Ok(conn)
}

impl ConnectionPool for SqlitePool {
    type Connection = SqliteConnection;

    async fn acquire(&self) -> Result<SqliteConnection> {
        let waited = self.settings.acquire_timeout_duration();
        let slot = tokio::time::timeout(waited, Arc::clone(&self.slots).acquire_owned()).await;
        let slot = match slot {
            Ok(Ok(slot)) => slot,
            Ok(Err(_)) => return Err(DatabaseError::PoolClosed),
            Err(_) => {
                warn!(?waited, max_size = self.settings.max_size, "connection pool exhausted");
                return Err(DatabaseError::PoolExhausted { waited });
            }
        };

        let reused = self.idle().pop();
        let conn = match reused {
            Some(conn) => conn,
            None => {
                let path = self.path.clone();
                let settings = self.settings.clone();
                tokio::task::spawn_blocking(move || open_connection(&path, &settings))
                    .await
                    .map_err(|err| DatabaseError::Worker(err.to_string()))?
                    .map_err(DatabaseError::connect)?
            }
        };

        Ok(SqliteConnection {
            conn: Some(conn),
            cache_sql_limit: self.settings.statement_cache_sql_limit,
            acquired_at: Instant::now(),
            _slot: slot,
        })
    }

    fn release(&self, mut connection: SqliteConnection) {
        let held = connection.acquired_at.elapsed();
        if let Some(threshold) = self.settings.leak_detection_threshold_duration() {
            if held > threshold {
                warn!(?held, ?threshold, "connection held past leak detection threshold");
            }
        }
        // A connection lost to a panicked blocking task just frees its slot.
        if let Some(conn) = connection.conn.take() {
            if !self.slots.is_closed() {
                self.idle().push(conn);
            }
        }
    }

    fn shutdown(&self) {
        self.slots.close();
        let closed = std::mem::take(&mut *self.idle());
        debug!(closed = closed.len(), "sqlite pool shut down");
    }
}

/// A connection checked out of a [`SqlitePool`].
#[derive(Debug)]
pub struct SqliteConnection {
    conn: Option<rusqlite::Connection>,
    cache_sql_limit: usize,
    acquired_at: Instant,
    _slot: OwnedSemaphorePermit,
}

impl SqliteConnection {
    /// Runs `f` against the connection on the blocking pool.
    async fn blocking<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&rusqlite::Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.take().ok_or(DatabaseError::PoolClosed)?;
        let (conn, result) = tokio::task::spawn_blocking(move || {
            let result = f(&conn);
            (conn, result)
        })
        .await
        .map_err(|err| DatabaseError::Worker(err.to_string()))?;
        self.conn = Some(conn);
        result
    }
}

impl Connection for SqliteConnection {
    async fn query(&mut self, statement: Statement) -> Result<RowCursor> {
        let limit = self.cache_sql_limit;
        self.blocking(move |conn| {
            with_statement(conn, statement.sql(), limit, |stmt| {
                collect_rows(stmt, statement.params())
            })
            .map_err(|err| DatabaseError::statement(statement.sql(), err))
        })
        .await
    }

    async fn execute(&mut self, statement: Statement) -> Result<u64> {
        let limit = self.cache_sql_limit;
        self.blocking(move |conn| {
            with_statement(conn, statement.sql(), limit, |stmt| {
                run_to_completion(conn, stmt, statement.params())
            })
            .map_err(|err| DatabaseError::statement(statement.sql(), err))
        })
        .await
    }
}

/// Executes a statement for its effect and returns the rows it changed.
///
/// Rows it produces (`SELECT`, `PRAGMA`, `RETURNING`) are stepped through and
/// discarded.
fn run_to_completion(
    conn: &rusqlite::Connection,
    stmt: &mut rusqlite::Statement<'_>,
    params: &[Value],
) -> rusqlite::Result<u64> {
    if stmt.column_count() == 0 {
        return stmt.execute(params_from_iter(params)).map(|n| n as u64);
    }
    let readonly = stmt.readonly();
    let mut rows = stmt.query(params_from_iter(params))?;
    while rows.next()?.is_some() {}
    drop(rows);
    Ok(if readonly { 0 } else { conn.changes() as u64 })
}

/// Prepares `sql` through the connection's statement cache, unless it is
/// longer than `cache_sql_limit` bytes.
fn with_statement<T>(
    conn: &rusqlite::Connection,
    sql: &str,
    cache_sql_limit: usize,
    f: impl FnOnce(&mut rusqlite::Statement<'_>) -> rusqlite::Result<T>,
) -> rusqlite::Result<T> {
    if sql.len() <= cache_sql_limit {
        let mut stmt = conn.prepare_cached(sql)?;
        f(&mut stmt)
    } else {
        let mut stmt = conn.prepare(sql)?;
        f(&mut stmt)
    }
}

fn collect_rows(
    stmt: &mut rusqlite::Statement<'_>,
    params: &[Value],
) -> rusqlite::Result<RowCursor> {
    let columns = Arc::new(Columns::new(
        stmt.column_names().into_iter().map(str::to_owned).collect(),
    ));
    let width = columns.len();
    let mut rows = stmt.query(params_from_iter(params))?;
    let mut collected = Vec::new();
    while let Some(row) = rows.next()? {
        let values = (0..width)
            .map(|i| row.get::<_, Value>(i))
            .collect::<rusqlite::Result<Vec<_>>>()?;
        collected.push(Row::new(Arc::clone(&columns), values));
    }
    Ok(RowCursor::new(columns, collected))
}

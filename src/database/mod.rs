//! Database layer: values, rows, errors and the connection-pool seam.
//!
//! The engine is generic over [`ConnectionPool`]. A pooled SQLite backend,
//! [`SqlitePool`], is available behind the `sqlite` feature (on by default).

mod error;
mod pool;
mod row;
#[cfg(feature = "sqlite")]
mod sqlite;
mod value;

pub use error::{DatabaseError, Result};
pub use pool::{Connection, ConnectionPool, PooledConnection, Statement};
pub use row::{Columns, Row, RowCursor};
#[cfg(feature = "sqlite")]
pub use sqlite::{SqliteConnection, SqlitePool};
pub use value::Value;

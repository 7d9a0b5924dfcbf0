//! # sqlcourier
//!
//! An asynchronous SQL execution engine: operations are submitted as
//! descriptors, run on a bounded worker pool, and report back through a
//! completion handle.
//!
//! - Reads deliver their rows to a callback; writes deliver the affected-row count.
//! - Operations marked `queue` run one at a time, in submission order.
//! - A timeout watchdog can flag an operation that takes too long, without
//!   cancelling it.
//! - The connection pool is a trait; a pooled SQLite backend ships behind the
//!   default `sqlite` feature.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sqlcourier::{Engine, Outcome, PoolSettings, Request, SqlitePool};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = Engine::new(SqlitePool::open("app.db", PoolSettings::default())?);
//!
//!     let done = engine
//!         .submit(
//!             Request::read()
//!                 .body("SELECT name FROM users WHERE id = ?")
//!                 .argument(42)
//!                 .on_rows(|rows| {
//!                     for row in rows {
//!                         println!("{:?}", row.get_by_name("name"));
//!                     }
//!                 }),
//!         )
//!         .await?;
//!
//!     if let Outcome::Failure(err) = done.await {
//!         eprintln!("lookup failed: {err}");
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod database;
pub mod engine;
pub mod request;

pub use config::{CompletionMode, EngineConfig, PoolSettings};
#[cfg(feature = "sqlite")]
pub use database::{SqliteConnection, SqlitePool};
pub use database::{
    Columns, Connection, ConnectionPool, DatabaseError, PooledConnection, Result, Row, RowCursor,
    Statement, Value,
};
pub use engine::{Completion, Engine, Outcome, Summary};
pub use request::{Operation, OperationKind, Read, Request, Timeout, Write};

//! Asynchronous query execution engine.
//!
//! [`Engine::submit`] takes an [`Operation`] and returns a [`Completion`].
//! Unqueued operations start right away on the worker pool. Queued ones go
//! through the engine's serialized queue: at most one runs at a time, in
//! submission order, and each one hands the queue to the next as it
//! finishes. Any operation can carry a timeout watchdog that reports, but
//! never interrupts, a slow operation.
//!
//! Failures inside a running operation are logged and reported through the
//! completion's [`Outcome`]; they never stall the queue.
//!
//! ```rust,no_run
//! use sqlcourier::{Engine, EngineConfig, PoolSettings, Request, SqlitePool};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let pool = SqlitePool::open("app.db", PoolSettings::default())?;
//!     let engine = Engine::with_config(pool, EngineConfig::default().workers(4));
//!
//!     engine
//!         .submit(
//!             Request::write()
//!                 .body("UPDATE t SET v = ? WHERE id = ?")
//!                 .arguments([5, 1])
//!                 .queue(true),
//!         )
//!         .await?;
//!
//!     let done = engine
//!         .submit(
//!             Request::read()
//!                 .body("SELECT v FROM t WHERE id = ?")
//!                 .argument(1)
//!                 .queue(true)
//!                 .on_rows(|rows| {
//!                     for row in rows {
//!                         println!("{:?}", row.get(0));
//!                     }
//!                 }),
//!         )
//!         .await?;
//!     done.await;
//!     Ok(())
//! }
//! ```

use std::any::Any;
use std::future::Future;
use std::path::Path;
use std::panic::Location;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Semaphore;
use tokio::time::Instant;
use tracing::{debug, error, info};

use crate::config::EngineConfig;
use crate::database::{ConnectionPool, DatabaseError, PooledConnection, Result, Statement};
use crate::request::{AffectedCallback, Operation, OperationKind, Request, RowsCallback, Timeout};

mod completion;
mod queue;
mod watchdog;

pub use completion::{Completion, Outcome, Summary};

use completion::Resolver;
use queue::SerialQueue;

/// Executes operations against a [`ConnectionPool`].
///
/// Cloning an `Engine` is cheap and every clone shares the same worker pool,
/// serialized queue and connection pool.
pub struct Engine<P: ConnectionPool> {
    shared: Arc<Shared<P>>,
}

impl<P: ConnectionPool> Clone for Engine<P> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

struct Shared<P: ConnectionPool> {
    pool: P,
    workers: Semaphore,
    serial: Mutex<SerialQueue<Job>>,
    config: EngineConfig,
    next_id: AtomicU64,
}

/// A dispatched unit of work together with the signal it must resolve.
struct Job {
    id: u64,
    origin: &'static Location<'static>,
    task: Task,
    resolver: Resolver,
}

enum Task {
    Read {
        statement: Statement,
        callback: Option<RowsCallback>,
    },
    Write {
        statement: Statement,
        callback: Option<AffectedCallback>,
    },
    Script {
        statements: Vec<String>,
    },
}

impl Task {
    fn kind(&self) -> OperationKind {
        match self {
            Task::Read { .. } => OperationKind::Read,
            Task::Write { .. } => OperationKind::Write,
            Task::Script { .. } => OperationKind::Script,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lane {
    Concurrent,
    Serial,
}

/// The parts of an operation the engine acts on at submission time.
struct Admission {
    task: Task,
    queue: bool,
    timeout: Option<Timeout>,
    origin: &'static Location<'static>,
}

impl Admission {
    fn from_request<K, F>(request: Request<K>, build: F) -> Self
    where
        K: crate::request::Kind,
        F: FnOnce(Statement, Option<K::Callback>) -> Task,
    {
        let Request {
            body,
            arguments,
            callback,
            queue,
            timeout,
            origin,
            ..
        } = request;
        Self {
            task: build(Statement::new(body, arguments), callback),
            queue,
            timeout,
            origin,
        }
    }
}

impl From<Operation> for Admission {
    fn from(operation: Operation) -> Self {
        match operation {
            Operation::Read(request) => Admission::from_request(request, |statement, callback| {
                Task::Read {
                    statement,
                    callback,
                }
            }),
            Operation::Write(request) => Admission::from_request(request, |statement, callback| {
                Task::Write {
                    statement,
                    callback,
                }
            }),
        }
    }
}

impl<P: ConnectionPool> Engine<P> {
    /// Creates an engine with the default [`EngineConfig`].
    pub fn new(pool: P) -> Self {
        Self::with_config(pool, EngineConfig::default())
    }

    pub fn with_config(pool: P, config: EngineConfig) -> Self {
        let workers = config.workers.max(1);
        Self {
            shared: Arc::new(Shared {
                pool,
                workers: Semaphore::new(workers),
                serial: Mutex::new(SerialQueue::new()),
                config,
                next_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn pool(&self) -> &P {
        &self.shared.pool
    }

    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    /// Submits an operation.
    ///
    /// Returns once the operation is dispatched or parked in the serialized
    /// queue, or, for `sync` operations, once it has finished.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::Configuration`] if the statement body is
    /// empty; nothing is dispatched in that case. Errors raised while the
    /// operation runs are reported through the returned [`Completion`].
    pub async fn submit(&self, operation: impl Into<Operation>) -> Result<Completion> {
        let operation = operation.into();
        let sync = operation.is_sync();
        let completion = self.dispatch(operation)?;
        if sync {
            completion.wait().await;
        }
        Ok(completion)
    }

    /// Validates and dispatches an operation without waiting for it, even when
    /// it is marked `sync`.
    pub fn dispatch(&self, operation: impl Into<Operation>) -> Result<Completion> {
        let operation = operation.into();
        if operation.statement().trim().is_empty() {
            return Err(DatabaseError::Configuration(format!(
                "{} operation has an empty statement body",
                operation.kind()
            )));
        }
        Ok(self.shared.admit(Admission::from(operation)))
    }

    /// Runs a `;`-separated script on one connection, statement by statement.
    ///
    /// Blank pieces are skipped. The script stops at the first failing
    /// statement. Separators inside string literals are not recognised.
    /// Rows returned by a statement in the script are discarded.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::Configuration`] if the script contains no
    /// statements.
    #[track_caller]
    pub fn execute_script(&self, script: &str) -> Result<Completion> {
        self.script(script, Location::caller())
    }

    /// Reads a script file and runs it like [`execute_script`](Self::execute_script).
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::Io`] if the file cannot be read, and
    /// [`DatabaseError::Configuration`] if it holds no statements.
    #[track_caller]
    pub fn execute_script_file(
        &self,
        path: impl AsRef<Path>,
    ) -> impl Future<Output = Result<Completion>> + Send + '_ {
        let origin = Location::caller();
        let path = path.as_ref().to_owned();
        async move {
            let script = tokio::fs::read_to_string(&path).await?;
            debug!(path = %path.display(), bytes = script.len(), "script file loaded");
            self.script(&script, origin)
        }
    }

    fn script(&self, script: &str, origin: &'static Location<'static>) -> Result<Completion> {
        let statements: Vec<String> = script
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .collect();
        if statements.is_empty() {
            return Err(DatabaseError::Configuration(
                "script contains no statements".to_owned(),
            ));
        }
        Ok(self.shared.admit(Admission {
            task: Task::Script { statements },
            queue: false,
            timeout: None,
            origin,
        }))
    }

    /// Number of queued operations waiting behind the one in flight.
    pub fn queued(&self) -> usize {
        self.shared.serial().waiting()
    }

    /// Returns `true` while a queued operation is executing.
    pub fn is_serial_busy(&self) -> bool {
        self.shared.serial().is_in_flight()
    }

    /// Stops the engine and closes the pool.
    ///
    /// Operations still waiting in the serialized queue, and any submitted
    /// afterwards, resolve to `Failure(Shutdown)`. Operations already running
    /// are left to finish.
    pub fn shutdown(&self) {
        self.shared.workers.close();
        let parked = self.shared.serial().drain_waiting();
        info!(parked = parked.len(), "engine shutting down");
        for job in parked {
            job.resolver.resolve(Err(DatabaseError::Shutdown));
        }
        self.shared.pool.shutdown();
    }
}

impl<P: ConnectionPool> Shared<P> {
    fn serial(&self) -> MutexGuard<'_, SerialQueue<Job>> {
        self.serial.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn admit(self: &Arc<Self>, admission: Admission) -> Completion {
        let Admission {
            task,
            queue,
            timeout,
            origin,
        } = admission;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let kind = task.kind();
        let (resolver, completion) = completion::channel(self.config.completion);

        if let Some(timeout) = timeout {
            watchdog::arm(id, completion.clone(), timeout);
        }

        let job = Job {
            id,
            origin,
            task,
            resolver,
        };

        if !queue {
            debug!(operation = id, %kind, "dispatching operation");
            self.spawn(job, Lane::Concurrent);
            return completion;
        }

        let admitted = self.serial().admit(job);
        match admitted {
            Some(job) => {
                debug!(operation = id, %kind, "dispatching queued operation");
                self.spawn(job, Lane::Serial);
            }
            None => debug!(operation = id, %kind, "operation parked behind in-flight queue"),
        }
        completion
    }

    /// Runs `job` on the worker pool. On the serial lane the same task then
    /// keeps running whatever the queue hands over next.
    fn spawn(self: &Arc<Self>, job: Job, lane: Lane) {
        let shared = Arc::clone(self);
        tokio::spawn(async move {
            let mut next = Some(job);
            while let Some(job) = next {
                shared.settle(job).await;
                next = match lane {
                    Lane::Serial => shared.handover(),
                    Lane::Concurrent => None,
                };
            }
        });
    }

    fn handover(&self) -> Option<Job> {
        let next = self.serial().complete();
        if let Some(job) = &next {
            debug!(operation = job.id, "queue advanced");
        }
        next
    }

    /// Runs one job to its outcome and resolves it. The work itself runs in a
    /// task of its own, so a panic in the pool or a connection becomes a
    /// `Panicked` failure instead of unwinding through the serial lane.
    async fn settle(self: &Arc<Self>, job: Job) {
        let Job {
            id,
            origin,
            task,
            resolver,
        } = job;
        let kind = task.kind();
        let started = Instant::now();

        let shared = Arc::clone(self);
        let result = match tokio::spawn(async move { shared.run(id, task).await }).await {
            Ok(result) => result,
            Err(err) if err.is_panic() => Err(DatabaseError::Panicked {
                message: panic_message(err.into_panic().as_ref()),
            }),
            Err(err) => Err(DatabaseError::Worker(err.to_string())),
        };

        let elapsed = started.elapsed();
        match &result {
            Ok(summary) => debug!(operation = id, %kind, ?elapsed, ?summary, "operation finished"),
            Err(err) => error!(
                operation = id,
                %kind,
                ?elapsed,
                origin = %origin,
                error = %err,
                "operation failed"
            ),
        }
        resolver.resolve(result);
    }

    async fn run(&self, id: u64, task: Task) -> Result<Summary> {
        match self.workers.acquire().await {
            Ok(_permit) => {
                debug!(operation = id, kind = %task.kind(), "operation started");
                self.execute(task).await
            }
            Err(_) => Err(DatabaseError::Shutdown),
        }
    }

    /// Executes one task on a pooled connection. The connection goes back to
    /// the pool before any callback runs.
    async fn execute(&self, task: Task) -> Result<Summary> {
        let mut connection = PooledConnection::acquire(&self.pool).await?;
        match task {
            Task::Read {
                statement,
                callback,
            } => {
                let cursor = connection.query(statement).await?;
                drop(connection);
                let rows = cursor.len();
                if let Some(callback) = callback {
                    invoke(move || callback(cursor)).await?;
                }
                Ok(Summary::Read { rows })
            }
            Task::Write {
                statement,
                callback,
            } => {
                let affected = connection.execute(statement).await?;
                drop(connection);
                if let Some(callback) = callback {
                    invoke(move || callback(affected)).await?;
                }
                Ok(Summary::Write { affected })
            }
            Task::Script { statements } => {
                let count = statements.len();
                for sql in statements {
                    connection.execute(Statement::Plain(sql)).await?;
                }
                Ok(Summary::Script { statements: count })
            }
        }
    }
}

/// Runs a user callback on the blocking pool, turning a panic into
/// [`DatabaseError::Callback`].
async fn invoke(callback: impl FnOnce() + Send + 'static) -> Result<()> {
    tokio::task::spawn_blocking(callback)
        .await
        .map_err(|err| {
            if err.is_panic() {
                DatabaseError::Callback {
                    message: panic_message(err.into_panic().as_ref()),
                }
            } else {
                DatabaseError::Worker(err.to_string())
            }
        })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

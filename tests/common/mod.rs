#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sqlcourier::{
    Columns, Completion, Connection, ConnectionPool, DatabaseError, Outcome, Result, Row,
    RowCursor, Statement,
};
use tokio::sync::Semaphore;
use tracing_subscriber::EnvFilter;

/// Installs a test-friendly subscriber; `RUST_LOG=sqlcourier=debug` shows engine logs.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Start(String),
    End(String),
}

pub fn start(sql: &str) -> Event {
    Event::Start(sql.to_owned())
}

pub fn end(sql: &str) -> Event {
    Event::End(sql.to_owned())
}

/// The events a set of statements produces when they run strictly one after another.
pub fn sequential(statements: &[&str]) -> Vec<Event> {
    statements.iter().flat_map(|sql| [start(sql), end(sql)]).collect()
}

/// In-memory pool whose connections follow a script encoded in the SQL text.
///
/// - Statements containing `HOLD` block until [`MockPool::unblock`] is called.
/// - Statements containing `FAIL` report a statement error after running.
/// - Statements containing `PANIC` panic inside the connection.
/// - Reads return one single-column row per bind argument.
/// - Writes report one affected row per bind argument.
#[derive(Clone)]
pub struct MockPool {
    inner: Arc<Inner>,
}

struct Inner {
    events: Mutex<Vec<Event>>,
    acquired: AtomicUsize,
    released: AtomicUsize,
    active: AtomicUsize,
    peak: AtomicUsize,
    gate: Semaphore,
    fail_acquire: AtomicBool,
    panic_acquire: AtomicBool,
    closed: AtomicBool,
    delay: Duration,
}

impl MockPool {
    pub fn new() -> Self {
        Self::with_delay(Duration::ZERO)
    }

    /// Every statement sleeps this long while "executing".
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                events: Mutex::new(Vec::new()),
                acquired: AtomicUsize::new(0),
                released: AtomicUsize::new(0),
                active: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                gate: Semaphore::new(0),
                fail_acquire: AtomicBool::new(false),
                panic_acquire: AtomicBool::new(false),
                closed: AtomicBool::new(false),
                delay,
            }),
        }
    }

    pub fn events(&self) -> Vec<Event> {
        self.inner.events.lock().unwrap().clone()
    }

    pub fn acquired(&self) -> usize {
        self.inner.acquired.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.inner.released.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.inner.peak.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Lets `n` held statements continue.
    pub fn unblock(&self, n: usize) {
        self.inner.gate.add_permits(n);
    }

    pub fn fail_acquire(&self, fail: bool) {
        self.inner.fail_acquire.store(fail, Ordering::SeqCst);
    }

    pub fn panic_acquire(&self, panic: bool) {
        self.inner.panic_acquire.store(panic, Ordering::SeqCst);
    }

    /// Polls until at least `n` events were recorded.
    pub async fn wait_for_events(&self, n: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.events().len() < n {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .expect("expected events were never recorded");
    }
}

impl ConnectionPool for MockPool {
    type Connection = MockConnection;

    async fn acquire(&self) -> Result<MockConnection> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(DatabaseError::PoolClosed);
        }
        if self.inner.fail_acquire.load(Ordering::SeqCst) {
            return Err(DatabaseError::PoolExhausted {
                waited: Duration::ZERO,
            });
        }
        if self.inner.panic_acquire.load(Ordering::SeqCst) {
            panic!("pool exploded");
        }
        self.inner.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(MockConnection {
            inner: Arc::clone(&self.inner),
        })
    }

    fn release(&self, _connection: MockConnection) {
        self.inner.released.fetch_add(1, Ordering::SeqCst);
    }

    fn shutdown(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
    }
}

pub struct MockConnection {
    inner: Arc<Inner>,
}

impl MockConnection {
    async fn run(&self, statement: &Statement) -> Result<()> {
        let sql = statement.sql().to_owned();
        let active = self.inner.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.peak.fetch_max(active, Ordering::SeqCst);
        self.inner.events.lock().unwrap().push(Event::Start(sql.clone()));

        if sql.contains("PANIC") {
            self.inner.active.fetch_sub(1, Ordering::SeqCst);
            panic!("connection exploded");
        }
        if sql.contains("HOLD") {
            if let Ok(permit) = self.inner.gate.acquire().await {
                permit.forget();
            }
        }
        if !self.inner.delay.is_zero() {
            tokio::time::sleep(self.inner.delay).await;
        }

        self.inner.events.lock().unwrap().push(Event::End(sql.clone()));
        self.inner.active.fetch_sub(1, Ordering::SeqCst);

        if sql.contains("FAIL") {
            return Err(DatabaseError::Statement {
                sql,
                source: "scripted failure".into(),
            });
        }
        Ok(())
    }
}

impl Connection for MockConnection {
    async fn query(&mut self, statement: Statement) -> Result<RowCursor> {
        self.run(&statement).await?;
        let columns = Arc::new(Columns::new(vec!["value".to_owned()]));
        let rows = statement
            .params()
            .iter()
            .map(|value| Row::new(Arc::clone(&columns), vec![value.clone()]))
            .collect();
        Ok(RowCursor::new(columns, rows))
    }

    async fn execute(&mut self, statement: Statement) -> Result<u64> {
        self.run(&statement).await?;
        Ok(statement.params().len() as u64)
    }
}

/// Waits for an operation, failing the test instead of hanging.
pub async fn settle(completion: &Completion) -> Outcome {
    tokio::time::timeout(Duration::from_secs(5), completion.wait())
        .await
        .expect("operation never completed")
}

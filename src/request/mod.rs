//! Operation descriptors and their fluent builder.
//!
//! A [`Request`] describes one unit of work. Its kind is fixed by the
//! constructor, [`Request::read`] or [`Request::write`], and decides which
//! callback it accepts: reads hand their callback a [`RowCursor`], writes
//! hand theirs the affected-row count.
//!
//! ```
//! use std::time::Duration;
//! use sqlcourier::Request;
//!
//! let update = Request::write()
//!     .body("UPDATE accounts SET balance = ? WHERE id = ?")
//!     .arguments([100, 7])
//!     .on_affected(|n| println!("{n} rows changed"))
//!     .queue(true);
//!
//! let lookup = Request::read()
//!     .body("SELECT balance FROM accounts WHERE id = ?")
//!     .argument(7)
//!     .queue(true)
//!     .timeout(Duration::from_secs(2), || eprintln!("balance lookup is slow"));
//!
//! assert!(update.is_queued() && lookup.is_queued());
//! ```

use std::fmt;
use std::marker::PhantomData;
use std::panic::Location;
use std::time::Duration;

use crate::database::{RowCursor, Value};

/// Callback for read operations.
pub type RowsCallback = Box<dyn FnOnce(RowCursor) + Send + 'static>;

/// Callback for write operations.
pub type AffectedCallback = Box<dyn FnOnce(u64) + Send + 'static>;

mod sealed {
    pub trait Sealed {}
}

/// Operation kind marker: [`Read`] or [`Write`].
pub trait Kind: sealed::Sealed + Send + 'static {
    type Callback: Send + 'static;

    const KIND: OperationKind;
}

/// Marker for statements that return rows.
#[derive(Debug)]
pub enum Read {}

/// Marker for statements that change rows.
#[derive(Debug)]
pub enum Write {}

impl sealed::Sealed for Read {}
impl sealed::Sealed for Write {}

impl Kind for Read {
    type Callback = RowsCallback;
    const KIND: OperationKind = OperationKind::Read;
}

impl Kind for Write {
    type Callback = AffectedCallback;
    const KIND: OperationKind = OperationKind::Write;
}

/// Runtime view of an operation's kind, used for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Read,
    Write,
    Script,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Read => "read",
            OperationKind::Write => "write",
            OperationKind::Script => "script",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A deadline plus the action to run if the operation is still pending then.
pub struct Timeout {
    pub(crate) deadline: Duration,
    pub(crate) action: Box<dyn FnOnce() + Send + 'static>,
}

impl Timeout {
    pub fn new(deadline: Duration, action: impl FnOnce() + Send + 'static) -> Self {
        Self {
            deadline,
            action: Box::new(action),
        }
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }
}

impl fmt::Debug for Timeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timeout")
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}

/// Descriptor for one read or write operation.
pub struct Request<K: Kind> {
    pub(crate) body: String,
    pub(crate) arguments: Vec<Value>,
    pub(crate) callback: Option<K::Callback>,
    pub(crate) queue: bool,
    pub(crate) sync: bool,
    pub(crate) timeout: Option<Timeout>,
    pub(crate) origin: &'static Location<'static>,
    kind: PhantomData<K>,
}

impl Request<Read> {
    /// Starts a read descriptor.
    #[track_caller]
    pub fn read() -> Self {
        Self::new()
    }

    /// Sets the consumer for the returned rows.
    #[must_use]
    pub fn on_rows(mut self, callback: impl FnOnce(RowCursor) + Send + 'static) -> Self {
        self.callback = Some(Box::new(callback));
        self
    }
}

impl Request<Write> {
    /// Starts a write descriptor.
    #[track_caller]
    pub fn write() -> Self {
        Self::new()
    }

    /// Sets the consumer for the affected-row count.
    #[must_use]
    pub fn on_affected(mut self, callback: impl FnOnce(u64) + Send + 'static) -> Self {
        self.callback = Some(Box::new(callback));
        self
    }
}

impl<K: Kind> Request<K> {
    #[track_caller]
    fn new() -> Self {
        Self {
            body: String::new(),
            arguments: Vec::new(),
            callback: None,
            queue: false,
            sync: false,
            timeout: None,
            origin: Location::caller(),
            kind: PhantomData,
        }
    }

    /// Sets the statement text.
    #[must_use]
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Replaces the bind arguments. An empty list runs the body as a plain statement.
    #[must_use]
    pub fn arguments<I, V>(mut self, arguments: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.arguments = arguments.into_iter().map(Into::into).collect();
        self
    }

    /// Appends one bind argument.
    #[must_use]
    pub fn argument(mut self, argument: impl Into<Value>) -> Self {
        self.arguments.push(argument.into());
        self
    }

    /// Routes the operation through the engine's serialized queue.
    #[must_use]
    pub fn queue(mut self, queue: bool) -> Self {
        self.queue = queue;
        self
    }

    /// Makes `Engine::submit` wait for the operation to finish.
    #[must_use]
    pub fn sync(mut self, sync: bool) -> Self {
        self.sync = sync;
        self
    }

    /// Runs `action` once if the operation has not finished after `deadline`.
    ///
    /// The operation itself keeps running either way.
    #[must_use]
    pub fn timeout(mut self, deadline: Duration, action: impl FnOnce() + Send + 'static) -> Self {
        self.timeout = Some(Timeout::new(deadline, action));
        self
    }

    pub fn kind(&self) -> OperationKind {
        K::KIND
    }

    pub fn statement(&self) -> &str {
        &self.body
    }

    pub fn bind_values(&self) -> &[Value] {
        &self.arguments
    }

    pub fn has_callback(&self) -> bool {
        self.callback.is_some()
    }

    pub fn is_queued(&self) -> bool {
        self.queue
    }

    pub fn is_sync(&self) -> bool {
        self.sync
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.timeout.as_ref().map(Timeout::deadline)
    }

    /// Where the descriptor was built; included in failure logs.
    pub fn origin(&self) -> &'static Location<'static> {
        self.origin
    }
}

impl<K: Kind> fmt::Debug for Request<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("kind", &K::KIND)
            .field("body", &self.body)
            .field("arguments", &self.arguments)
            .field("callback", &self.callback.is_some())
            .field("queue", &self.queue)
            .field("sync", &self.sync)
            .field("timeout", &self.timeout)
            .field("origin", &format_args!("{}", self.origin))
            .finish()
    }
}

/// A descriptor of either kind, as accepted by `Engine::submit`.
#[derive(Debug)]
pub enum Operation {
    Read(Request<Read>),
    Write(Request<Write>),
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::Read(_) => OperationKind::Read,
            Operation::Write(_) => OperationKind::Write,
        }
    }

    pub fn statement(&self) -> &str {
        match self {
            Operation::Read(request) => request.statement(),
            Operation::Write(request) => request.statement(),
        }
    }

    pub fn is_queued(&self) -> bool {
        match self {
            Operation::Read(request) => request.is_queued(),
            Operation::Write(request) => request.is_queued(),
        }
    }

    pub fn is_sync(&self) -> bool {
        match self {
            Operation::Read(request) => request.is_sync(),
            Operation::Write(request) => request.is_sync(),
        }
    }
}

impl From<Request<Read>> for Operation {
    fn from(request: Request<Read>) -> Self {
        Operation::Read(request)
    }
}

impl From<Request<Write>> for Operation {
    fn from(request: Request<Write>) -> Self {
        Operation::Write(request)
    }
}

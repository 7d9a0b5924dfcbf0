//! Single-resolution completion signal.

use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::watch;

use crate::config::CompletionMode;
use crate::database::DatabaseError;

/// What an operation produced when it succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Summary {
    Read { rows: usize },
    Write { affected: u64 },
    Script { statements: usize },
}

/// Terminal state of an operation.
#[derive(Debug, Clone)]
pub enum Outcome {
    Success(Summary),
    Failure(Arc<DatabaseError>),
    /// Finished, without saying how. Only produced in [`CompletionMode::Legacy`].
    Completed,
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failure(_))
    }

    pub fn summary(&self) -> Option<&Summary> {
        match self {
            Outcome::Success(summary) => Some(summary),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&DatabaseError> {
        match self {
            Outcome::Failure(err) => Some(err),
            _ => None,
        }
    }
}

/// Handle to an operation's eventual [`Outcome`].
///
/// Cheap to clone; every clone observes the same single resolution. Await the
/// handle (or call [`wait`](Self::wait)) to suspend until the operation is
/// done, or poll [`is_done`](Self::is_done) without blocking.
#[derive(Debug, Clone)]
pub struct Completion {
    rx: watch::Receiver<Option<Outcome>>,
}

impl Completion {
    /// Returns `true` once the operation has reached a terminal state.
    pub fn is_done(&self) -> bool {
        self.rx.borrow().is_some() || self.rx.has_changed().is_err()
    }

    /// The outcome, if already resolved.
    pub fn try_outcome(&self) -> Option<Outcome> {
        self.rx.borrow().clone()
    }

    /// Waits for the operation to finish.
    ///
    /// If the executing task disappears without resolving (runtime shutdown),
    /// this returns `Outcome::Failure(DatabaseError::Abandoned)` instead of
    /// waiting forever.
    pub async fn wait(&self) -> Outcome {
        let mut rx = self.rx.clone();
        let resolved = match rx.wait_for(Option::is_some).await {
            Ok(slot) => (*slot).clone(),
            Err(_) => None,
        };
        resolved.unwrap_or_else(|| Outcome::Failure(Arc::new(DatabaseError::Abandoned)))
    }
}

impl IntoFuture for Completion {
    type Output = Outcome;
    type IntoFuture = Pin<Box<dyn Future<Output = Outcome> + Send>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(async move { self.wait().await })
    }
}

/// Write side of a [`Completion`]. Consumed by the single resolution.
pub(crate) struct Resolver {
    tx: watch::Sender<Option<Outcome>>,
    mode: CompletionMode,
}

impl Resolver {
    pub(crate) fn resolve(self, result: Result<Summary, DatabaseError>) {
        let outcome = match (self.mode, result) {
            (CompletionMode::Legacy, _) => Outcome::Completed,
            (CompletionMode::Tagged, Ok(summary)) => Outcome::Success(summary),
            (CompletionMode::Tagged, Err(err)) => Outcome::Failure(Arc::new(err)),
        };
        self.tx.send_replace(Some(outcome));
    }
}

pub(crate) fn channel(mode: CompletionMode) -> (Resolver, Completion) {
    let (tx, rx) = watch::channel(None);
    (Resolver { tx, mode }, Completion { rx })
}

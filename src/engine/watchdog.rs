//! Timeout watchdogs: observe a completion, never cancel it.

use tracing::warn;

use super::Completion;
use crate::request::Timeout;

/// Schedules `timeout.action` to run once if `completion` is still pending
/// when `timeout.deadline` elapses.
///
/// The watchdog task ends early when the operation finishes first, so no
/// timer outlives its operation. The operation keeps running after the
/// action fires and still resolves normally.
pub(crate) fn arm(operation: u64, completion: Completion, timeout: Timeout) {
    let Timeout { deadline, action } = timeout;
    tokio::spawn(async move {
        if tokio::time::timeout(deadline, completion.wait()).await.is_err() {
            warn!(operation, ?deadline, "operation still pending at deadline");
            action();
        }
    });
}

//! Engine and pool settings.
//!
//! Both structs derive `Deserialize` with field defaults, so they can be
//! embedded in whatever configuration format the application already uses.
//! Loading files is left to the caller.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How a [`Completion`](crate::Completion) reports the end of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionMode {
    /// Resolve to `Outcome::Success` or `Outcome::Failure`.
    #[default]
    Tagged,
    /// Resolve every operation to `Outcome::Completed`, success or not.
    /// Failures are only visible in the logs and by the callback not running.
    Legacy,
}

/// Settings for [`Engine`](crate::Engine).
///
/// # Examples
///
/// ```
/// use sqlcourier::{CompletionMode, EngineConfig};
///
/// let config: EngineConfig = serde_json::from_str(r#"{ "workers": 8 }"#).unwrap();
/// assert_eq!(config.workers, 8);
/// assert_eq!(config.completion, CompletionMode::Tagged);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum number of operations executing at once.
    pub workers: usize,
    pub completion: CompletionMode,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: 3,
            completion: CompletionMode::Tagged,
        }
    }
}

impl EngineConfig {
    #[must_use]
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    #[must_use]
    pub fn completion(mut self, mode: CompletionMode) -> Self {
        self.completion = mode;
        self
    }
}

/// Pass-through knobs for a connection pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolSettings {
    /// Maximum number of connections checked out at once.
    pub max_size: usize,
    /// How long `acquire` waits for a free connection before giving up.
    pub acquire_timeout_ms: u64,
    /// Connections held longer than this are reported when released. `0` disables it.
    pub leak_detection_threshold_ms: u64,
    /// Prepared statements kept per connection.
    pub statement_cache_size: usize,
    /// Statements longer than this many bytes bypass the cache.
    pub statement_cache_sql_limit: usize,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_size: 6,
            acquire_timeout_ms: 30_000,
            leak_detection_threshold_ms: 10_000,
            statement_cache_size: 50,
            statement_cache_sql_limit: 512,
        }
    }
}

impl PoolSettings {
    #[must_use]
    pub fn max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    #[must_use]
    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    #[must_use]
    pub fn leak_detection_threshold(mut self, threshold: Duration) -> Self {
        self.leak_detection_threshold_ms =
            u64::try_from(threshold.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn acquire_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    pub fn leak_detection_threshold_duration(&self) -> Option<Duration> {
        (self.leak_detection_threshold_ms > 0)
            .then(|| Duration::from_millis(self.leak_detection_threshold_ms))
    }
}

//! Bounds a single async operation by a maximum duration.
//!
//! Used by the HTTP transport to bound each individual attempt; the overall
//! retry loop bounds itself separately against the caller's deadline.

use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// Maximum allowed timeout duration (30 days), guarding against accidental
/// `Duration::MAX` configuration while still permitting long-running jobs.
pub const MAX_TIMEOUT: Duration = Duration::from_secs(30 * 24 * 60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutError {
    ZeroDuration,
    ExceedsMaximum { requested: Duration, limit: Duration },
}

impl std::fmt::Display for TimeoutError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimeoutError::ZeroDuration => write!(f, "timeout duration must be > 0"),
            TimeoutError::ExceedsMaximum { requested, limit } => write!(
                f,
                "timeout duration {:?} exceeds maximum allowed {:?}",
                requested, limit
            ),
        }
    }
}

impl std::error::Error for TimeoutError {}

/// A timed attempt's outcome: either the operation's own result, or the fact
/// that it did not complete before `timeout`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Elapsed {
    pub elapsed: Duration,
    pub timeout: Duration,
}

/// Policy that enforces a maximum duration on a single async operation.
#[derive(Debug, Clone, Copy)]
pub struct TimeoutPolicy {
    duration: Duration,
}

impl TimeoutPolicy {
    #[must_use = "the result must be checked for validation errors"]
    pub fn new(duration: Duration) -> Result<Self, TimeoutError> {
        Self::new_with_max(duration, MAX_TIMEOUT)
    }

    pub fn new_with_max(duration: Duration, max: Duration) -> Result<Self, TimeoutError> {
        if duration.is_zero() {
            return Err(TimeoutError::ZeroDuration);
        }
        if duration > max {
            return Err(TimeoutError::ExceedsMaximum { requested: duration, limit: max });
        }
        Ok(Self { duration })
    }

    #[must_use]
    #[inline]
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Execute `operation`, returning `Err(Elapsed)` if it does not complete
    /// before the configured duration. The inner future is dropped (not
    /// forcibly aborted) on timeout, matching `tokio::time::timeout` semantics.
    pub async fn execute<T, Fut, Op>(&self, operation: Op) -> Result<T, Elapsed>
    where
        Fut: Future<Output = T> + Send,
        Op: FnOnce() -> Fut + Send,
    {
        let start = Instant::now();
        match tokio::time::timeout(self.duration, operation()).await {
            Ok(result) => Ok(result),
            Err(_) => Err(Elapsed { elapsed: start.elapsed(), timeout: self.duration }),
        }
    }
}

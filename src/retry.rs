//! Retry strategies: decide whether a failed attempt should be retried and
//! how long to wait before the next one.

use crate::error::TransportError;
use crate::jitter::Jitter;
use std::time::Duration;

/// Maximum delay ever honored, regardless of strategy or server hint.
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(300);

/// Contract every retry strategy implements.
///
/// `retry_delay_with_error` defaults to folding a server-advised delay (e.g.
/// 429 `Retry-After`) into the computed delay when it is larger.
pub trait RetryStrategy: Send + Sync + std::fmt::Debug {
    /// Maximum number of retries (not counting the first attempt).
    fn max_retries(&self) -> usize;

    /// Whether attempt `attempt` (0-based, the attempt that just failed)
    /// should be retried given `error`.
    fn should_retry(&self, attempt: usize, error: &TransportError) -> bool {
        attempt < self.max_retries() && error.is_retryable()
    }

    /// Delay to wait before attempt `attempt + 1`.
    fn retry_delay(&self, attempt: usize) -> Duration;

    /// Delay to wait before attempt `attempt + 1`, given the error that
    /// caused the retry.
    fn retry_delay_with_error(&self, attempt: usize, error: &TransportError) -> Duration {
        let computed = self.retry_delay(attempt);
        match error.retry_after() {
            Some(server_delay) if server_delay > computed => server_delay.min(MAX_RETRY_DELAY),
            _ => computed,
        }
    }
}

/// Never retries.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRetry;

impl RetryStrategy for NoRetry {
    fn max_retries(&self) -> usize {
        0
    }

    fn should_retry(&self, _attempt: usize, _error: &TransportError) -> bool {
        false
    }

    fn retry_delay(&self, _attempt: usize) -> Duration {
        Duration::from_secs(0)
    }
}

/// Constant delay between attempts.
#[derive(Debug, Clone)]
pub struct FixedDelay {
    pub delay: Duration,
    pub max_retries: usize,
}

impl FixedDelay {
    pub fn new(delay: Duration, max_retries: usize) -> Self {
        Self { delay, max_retries }
    }
}

impl RetryStrategy for FixedDelay {
    fn max_retries(&self) -> usize {
        self.max_retries
    }

    fn retry_delay(&self, _attempt: usize) -> Duration {
        self.delay
    }
}

/// `initial + increment * attempt`, uncapped except by `max_retries`.
#[derive(Debug, Clone)]
pub struct LinearBackoff {
    pub initial: Duration,
    pub increment: Duration,
    pub max_retries: usize,
}

impl LinearBackoff {
    pub fn new(initial: Duration, increment: Duration, max_retries: usize) -> Self {
        Self { initial, increment, max_retries }
    }
}

impl RetryStrategy for LinearBackoff {
    fn max_retries(&self) -> usize {
        self.max_retries
    }

    fn retry_delay(&self, attempt: usize) -> Duration {
        self.increment
            .checked_mul(attempt as u32)
            .and_then(|step| self.initial.checked_add(step))
            .unwrap_or(MAX_RETRY_DELAY)
    }
}

/// `min(initial * multiplier^attempt, max_delay)`, the default strategy.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    pub initial: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
    pub max_retries: usize,
    pub jitter: Jitter,
}

impl ExponentialBackoff {
    pub fn new(initial: Duration, max_retries: usize) -> Self {
        Self {
            initial,
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
            max_retries,
            jitter: Jitter::Full,
        }
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    pub fn with_jitter(mut self, jitter: Jitter) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn without_jitter(mut self) -> Self {
        self.jitter = Jitter::None;
        self
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(100), 5)
    }
}

impl RetryStrategy for ExponentialBackoff {
    fn max_retries(&self) -> usize {
        self.max_retries
    }

    fn retry_delay(&self, attempt: usize) -> Duration {
        let factor = self.multiplier.powi(attempt as i32);
        let initial_millis = self.initial.as_millis() as f64;
        let computed_millis = (initial_millis * factor).min(self.max_delay.as_millis() as f64);
        let computed = Duration::from_millis(computed_millis.max(0.0) as u64);
        self.jitter.apply(computed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiError;

    fn retryable(status: u16) -> TransportError {
        TransportError::Api(ApiError {
            status_code: status,
            request_id: None,
            message: String::new(),
            retry_after: None,
        })
    }

    #[test]
    fn no_retry_never_retries() {
        let strategy = NoRetry;
        assert!(!strategy.should_retry(0, &retryable(503)));
    }

    #[test]
    fn fixed_delay_is_constant() {
        let strategy = FixedDelay::new(Duration::from_millis(50), 3);
        assert_eq!(strategy.retry_delay(0), Duration::from_millis(50));
        assert_eq!(strategy.retry_delay(5), Duration::from_millis(50));
        assert!(strategy.should_retry(2, &retryable(500)));
        assert!(!strategy.should_retry(3, &retryable(500)));
    }

    #[test]
    fn linear_backoff_increases_by_increment() {
        let strategy =
            LinearBackoff::new(Duration::from_millis(100), Duration::from_millis(50), 10);
        assert_eq!(strategy.retry_delay(0), Duration::from_millis(100));
        assert_eq!(strategy.retry_delay(1), Duration::from_millis(150));
        assert_eq!(strategy.retry_delay(4), Duration::from_millis(300));
    }

    #[test]
    fn exponential_backoff_without_jitter_is_monotone_and_caps() {
        let strategy = ExponentialBackoff::new(Duration::from_millis(100), 10)
            .with_max_delay(Duration::from_secs(1))
            .without_jitter();

        let delays: Vec<_> = (0..8).map(|a| strategy.retry_delay(a)).collect();
        for window in delays.windows(2) {
            assert!(window[1] >= window[0]);
        }
        assert_eq!(*delays.last().unwrap(), Duration::from_secs(1));
    }

    #[test]
    fn exponential_backoff_with_jitter_never_exceeds_computed() {
        let strategy = ExponentialBackoff::new(Duration::from_millis(100), 10)
            .with_max_delay(Duration::from_secs(1))
            .with_jitter(Jitter::Full);

        for attempt in 0..6 {
            let uncapped = strategy.clone().without_jitter().retry_delay(attempt);
            for _ in 0..20 {
                assert!(strategy.retry_delay(attempt) <= uncapped);
            }
        }
    }

    #[test]
    fn retryable_errors_cover_5xx_408_429_and_network() {
        assert!(retryable(503).is_retryable());
        assert!(retryable(408).is_retryable());
        assert!(retryable(429).is_retryable());
        assert!(TransportError::Network("boom".into()).is_retryable());
        assert!(!retryable(400).is_retryable());
        assert!(!retryable(404).is_retryable());
    }

    #[test]
    fn cancellation_is_never_retried() {
        let strategy = ExponentialBackoff::default();
        assert!(!strategy.should_retry(0, &TransportError::Cancelled));
    }

    #[test]
    fn server_advised_delay_overrides_when_larger() {
        let strategy = ExponentialBackoff::new(Duration::from_millis(100), 5).without_jitter();
        let err = TransportError::Api(ApiError {
            status_code: 429,
            request_id: None,
            message: "slow down".into(),
            retry_after: Some(Duration::from_secs(5)),
        });
        let delay = strategy.retry_delay_with_error(0, &err);
        assert_eq!(delay, Duration::from_secs(5));
    }

    #[test]
    fn server_advised_delay_ignored_when_smaller() {
        let strategy = ExponentialBackoff::new(Duration::from_secs(10), 5).without_jitter();
        let err = TransportError::Api(ApiError {
            status_code: 429,
            request_id: None,
            message: "slow down".into(),
            retry_after: Some(Duration::from_millis(1)),
        });
        let delay = strategy.retry_delay_with_error(0, &err);
        assert_eq!(delay, strategy.retry_delay(0));
    }

    #[test]
    fn max_retries_plus_one_attempts() {
        let strategy = FixedDelay::new(Duration::from_millis(1), 3);
        let mut attempts = 0;
        loop {
            attempts += 1;
            if !strategy.should_retry(attempts - 1, &retryable(500)) {
                break;
            }
        }
        assert_eq!(attempts, 4);
    }
}

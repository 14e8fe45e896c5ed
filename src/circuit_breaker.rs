//! Circuit breaker: trips on a run of failures, probes with a half-open
//! window, and recloses only after a run of successes.

use crate::clock::{Clock, MonotonicClock};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const STATE_CLOSED: u8 = 0;
const STATE_OPEN: u8 = 1;
const STATE_HALF_OPEN: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        };
        f.write_str(s)
    }
}

fn state_from_u8(v: u8) -> CircuitState {
    match v {
        STATE_CLOSED => CircuitState::Closed,
        STATE_OPEN => CircuitState::Open,
        STATE_HALF_OPEN => CircuitState::HalfOpen,
        _ => unreachable!("invalid circuit breaker state"),
    }
}

/// Callback invoked after every state transition, under the internal lock.
pub type StateChangeCallback = Arc<dyn Fn(CircuitState, CircuitState) + Send + Sync>;

/// Predicate deciding whether a given error counts as a circuit failure.
/// The default treats every error as a failure except an already-open circuit.
pub type FailureClassifier<E> = Arc<dyn Fn(&E) -> bool + Send + Sync>;

#[derive(Clone)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: usize,
    pub success_threshold: usize,
    pub timeout: Duration,
    pub half_open_max_requests: usize,
}

impl CircuitBreakerConfig {
    pub fn new(failure_threshold: usize, timeout: Duration) -> Self {
        Self { failure_threshold, success_threshold: 1, timeout, half_open_max_requests: 1 }
    }

    pub fn disabled() -> Self {
        Self {
            failure_threshold: usize::MAX,
            success_threshold: 1,
            timeout: Duration::from_secs(0),
            half_open_max_requests: usize::MAX,
        }
    }

    pub fn with_success_threshold(mut self, n: usize) -> Self {
        self.success_threshold = n.max(1);
        self
    }

    pub fn with_half_open_max_requests(mut self, n: usize) -> Self {
        self.half_open_max_requests = n.max(1);
        self
    }
}

struct Inner {
    state: AtomicU8,
    consecutive_failures: AtomicUsize,
    consecutive_successes: AtomicUsize,
    opened_at_millis: AtomicU64,
    half_open_in_flight: AtomicUsize,
    trips: AtomicUsize,
    on_change: Mutex<Option<StateChangeCallback>>,
}

/// Three-state circuit breaker: closed, open, half-open.
#[derive(Clone)]
pub struct CircuitBreaker<E> {
    inner: Arc<Inner>,
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
    classifier: FailureClassifier<E>,
}

impl<E> CircuitBreaker<E> {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: AtomicU8::new(STATE_CLOSED),
                consecutive_failures: AtomicUsize::new(0),
                consecutive_successes: AtomicUsize::new(0),
                opened_at_millis: AtomicU64::new(0),
                half_open_in_flight: AtomicUsize::new(0),
                trips: AtomicUsize::new(0),
                on_change: Mutex::new(None),
            }),
            config,
            clock: Arc::new(MonotonicClock::default()),
            classifier: Arc::new(|_| true),
        }
    }

    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn with_classifier(mut self, classifier: FailureClassifier<E>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn on_state_change<F>(self, f: F) -> Self
    where
        F: Fn(CircuitState, CircuitState) + Send + Sync + 'static,
    {
        *self.inner.on_change.lock().unwrap_or_else(|p| p.into_inner()) = Some(Arc::new(f));
        self
    }

    pub fn state(&self) -> CircuitState {
        state_from_u8(self.inner.state.load(Ordering::Acquire))
    }

    pub fn trips(&self) -> usize {
        self.inner.trips.load(Ordering::Acquire)
    }

    fn now_millis(&self) -> u64 {
        self.clock.now_millis()
    }

    fn transition(&self, from: u8, to: u8) -> bool {
        if self.inner.state.compare_exchange(from, to, Ordering::AcqRel, Ordering::Acquire).is_ok()
        {
            if let Some(cb) = self.inner.on_change.lock().unwrap_or_else(|p| p.into_inner()).as_ref()
            {
                cb(state_from_u8(from), state_from_u8(to));
            }
            true
        } else {
            false
        }
    }

    /// Returns `Err(None)` if the breaker rejects the call outright (open).
    /// Returns `Ok(())` if the caller may proceed and must report the
    /// outcome via [`Self::record_success`] / [`Self::record_failure`].
    fn admit(&self) -> Result<(), CircuitOpenError> {
        loop {
            let current = self.inner.state.load(Ordering::Acquire);
            match current {
                STATE_OPEN => {
                    let opened_at = self.inner.opened_at_millis.load(Ordering::Acquire);
                    let elapsed = self.now_millis().saturating_sub(opened_at);
                    if elapsed >= self.config.timeout.as_millis() as u64 {
                        if self.transition(STATE_OPEN, STATE_HALF_OPEN) {
                            tracing::info!("circuit breaker: open -> half_open");
                            self.inner.consecutive_successes.store(0, Ordering::Release);
                            self.inner.half_open_in_flight.store(1, Ordering::Release);
                            return Ok(());
                        }
                        continue;
                    }
                    return Err(CircuitOpenError {
                        consecutive_failures: self.inner.consecutive_failures.load(Ordering::Acquire),
                        open_duration: Duration::from_millis(elapsed),
                    });
                }
                STATE_HALF_OPEN => {
                    let prev = self.inner.half_open_in_flight.fetch_add(1, Ordering::AcqRel);
                    if prev >= self.config.half_open_max_requests {
                        self.inner.half_open_in_flight.fetch_sub(1, Ordering::Release);
                        return Err(CircuitOpenError {
                            consecutive_failures: self.inner.consecutive_failures.load(Ordering::Acquire),
                            open_duration: Duration::from_millis(0),
                        });
                    }
                    return Ok(());
                }
                STATE_CLOSED => return Ok(()),
                _ => unreachable!("invalid circuit breaker state"),
            }
        }
    }

    fn record_success(&self) {
        let current = self.inner.state.load(Ordering::Acquire);
        match current {
            STATE_HALF_OPEN => {
                self.inner.half_open_in_flight.fetch_sub(1, Ordering::AcqRel);
                let successes = self.inner.consecutive_successes.fetch_add(1, Ordering::AcqRel) + 1;
                if successes >= self.config.success_threshold
                    && self.transition(STATE_HALF_OPEN, STATE_CLOSED)
                {
                    self.inner.consecutive_failures.store(0, Ordering::Release);
                    self.inner.consecutive_successes.store(0, Ordering::Release);
                    self.inner.opened_at_millis.store(0, Ordering::Release);
                    tracing::info!("circuit breaker: half_open -> closed");
                }
            }
            STATE_CLOSED => {
                self.inner.consecutive_failures.store(0, Ordering::Release);
            }
            _ => {}
        }
    }

    fn record_failure(&self) {
        let current = self.inner.state.load(Ordering::Acquire);
        match current {
            STATE_HALF_OPEN => {
                self.inner.half_open_in_flight.fetch_sub(1, Ordering::AcqRel);
                if self.transition(STATE_HALF_OPEN, STATE_OPEN) {
                    self.inner.opened_at_millis.store(self.now_millis(), Ordering::Release);
                    self.inner.consecutive_successes.store(0, Ordering::Release);
                    self.inner.trips.fetch_add(1, Ordering::AcqRel);
                    tracing::warn!("circuit breaker: half_open probe failed -> open");
                }
            }
            STATE_CLOSED => {
                let failures = self.inner.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1;
                if failures >= self.config.failure_threshold
                    && self.transition(STATE_CLOSED, STATE_OPEN)
                {
                    self.inner.opened_at_millis.store(self.now_millis(), Ordering::Release);
                    self.inner.trips.fetch_add(1, Ordering::AcqRel);
                    tracing::error!(failures, threshold = self.config.failure_threshold, "circuit breaker: closed -> open");
                }
            }
            _ => {}
        }
    }

    /// Execute `operation` gated by the breaker. `E` is whatever error type
    /// the wrapped operation produces; the configured classifier decides
    /// whether a given `E` counts toward tripping the breaker.
    pub async fn call<T, Fut, Op>(&self, mut operation: Op) -> Result<T, CircuitCallError<E>>
    where
        Fut: Future<Output = Result<T, E>> + Send,
        Op: FnMut() -> Fut + Send,
    {
        self.admit().map_err(CircuitCallError::Open)?;

        let result = operation().await;
        match &result {
            Ok(_) => self.record_success(),
            Err(e) if (self.classifier)(e) => self.record_failure(),
            Err(_) => self.record_success(),
        }
        result.map_err(CircuitCallError::Inner)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitOpenError {
    pub consecutive_failures: usize,
    pub open_duration: Duration,
}

impl fmt::Display for CircuitOpenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "circuit breaker open ({} consecutive failures, open for {:?})",
            self.consecutive_failures, self.open_duration
        )
    }
}

impl std::error::Error for CircuitOpenError {}

#[derive(Debug, Clone)]
pub enum CircuitCallError<E> {
    Open(CircuitOpenError),
    Inner(E),
}

impl<E> CircuitCallError<E> {
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, CircuitCallError::Open(_))
    }

    pub fn into_inner(self) -> Option<E> {
        match self {
            CircuitCallError::Inner(e) => Some(e),
            _ => None,
        }
    }
}

impl<E: fmt::Display> fmt::Display for CircuitCallError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitCallError::Open(e) => write!(f, "{}", e),
            CircuitCallError::Inner(e) => write!(f, "{}", e),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for CircuitCallError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CircuitCallError::Open(e) => Some(e),
            CircuitCallError::Inner(e) => Some(e),
        }
    }
}

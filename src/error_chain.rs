//! Error handler chain: the last stop for asynchronous [`TransportError`]s
//! that never surface to the caller of `queue_event`.
//!
//! Every error is (1) logged through `tracing`, (2) counted in metrics, and
//! (3) handed to a user-supplied callback, if one is configured. None of
//! these steps can fail the batch worker; a panicking user callback is
//! caught and logged through the process-wide fallback logger.

use crate::error::TransportError;
use crate::metrics::{names, MetricsSink};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, OnceLock};

/// A user-supplied callback invoked for every asynchronous transport error.
pub type ErrorCallback = Arc<dyn Fn(&TransportError) + Send + Sync>;

/// Process-wide fallback used when a user callback panics; writes to stderr.
/// Installed once, lazily, the first time it's needed.
fn fallback_logger() -> &'static (dyn Fn(&str) + Send + Sync) {
    static FALLBACK: OnceLock<Box<dyn Fn(&str) + Send + Sync>> = OnceLock::new();
    FALLBACK.get_or_init(|| Box::new(|msg: &str| eprintln!("[obs-ingest] {msg}"))).as_ref()
}

/// Drives asynchronous errors through logging, metrics, and an optional
/// user callback.
pub struct ErrorChain {
    metrics: Arc<dyn MetricsSink>,
    callback: Option<ErrorCallback>,
}

impl ErrorChain {
    pub fn new(metrics: Arc<dyn MetricsSink>) -> Self {
        Self { metrics, callback: None }
    }

    pub fn with_callback(mut self, callback: ErrorCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Handle one asynchronous error: log, count, and (best-effort) notify
    /// the user callback.
    pub fn handle(&self, error: &TransportError) {
        tracing::error!(kind = error.kind(), error = %error, "async ingestion error");
        self.metrics.increment_counter(names::ASYNC_ERRORS_TOTAL, 1);

        if let Some(callback) = &self.callback {
            let outcome =
                std::panic::catch_unwind(AssertUnwindSafe(|| callback(error)));
            if let Err(panic_payload) = outcome {
                let msg = panic_payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic_payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "error callback panicked".to_string());
                fallback_logger()(&format!("error callback panicked: {msg}"));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::MemorySink;
    use std::sync::Mutex;
    use std::time::Duration;

    #[test]
    fn counts_every_error() {
        let metrics = Arc::new(MemorySink::default());
        let chain = ErrorChain::new(metrics.clone());
        chain.handle(&TransportError::Cancelled);
        chain.handle(&TransportError::Network("boom".into()));
        assert_eq!(metrics.counter(names::ASYNC_ERRORS_TOTAL), 2);
    }

    #[test]
    fn invokes_user_callback() {
        let metrics = Arc::new(MemorySink::default());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let chain = ErrorChain::new(metrics).with_callback(Arc::new(move |e: &TransportError| {
            seen_clone.lock().unwrap().push(e.kind());
        }));
        chain.handle(&TransportError::Timeout { elapsed: Duration::from_secs(1), timeout: Duration::from_secs(1) });
        assert_eq!(seen.lock().unwrap().as_slice(), &["timeout"]);
    }

    #[test]
    fn panicking_callback_is_contained() {
        let metrics = Arc::new(MemorySink::default());
        let chain = ErrorChain::new(metrics.clone()).with_callback(Arc::new(|_: &TransportError| {
            panic!("user callback exploded");
        }));
        chain.handle(&TransportError::Cancelled);
        assert_eq!(metrics.counter(names::ASYNC_ERRORS_TOTAL), 1);
    }
}

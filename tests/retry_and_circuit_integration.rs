use obs_ingest::{
    ApiError, CircuitBreaker, CircuitBreakerConfig, ExponentialBackoff, FixedDelay, NoRetry,
    RetryStrategy, TransportError,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn server_error() -> TransportError {
    TransportError::Api(ApiError { status_code: 503, request_id: None, message: "down".into(), retry_after: None })
}

/// Mirrors the transport's own wrapping order (retry around circuit breaker):
/// the retry strategy decides whether to attempt again, and each attempt is
/// gated by the same breaker, so a tripped breaker surfaces as a distinct,
/// non-retryable-looking failure to the outer loop.
#[tokio::test]
async fn circuit_trips_independently_of_the_retry_strategy_wrapping_it() {
    let breaker: CircuitBreaker<TransportError> = CircuitBreaker::new(
        CircuitBreakerConfig::new(2, Duration::from_secs(30)),
    )
    .with_classifier(Arc::new(|e: &TransportError| !e.is_circuit_open()));

    let strategy = FixedDelay::new(Duration::from_millis(0), 5);
    let attempts = Arc::new(AtomicUsize::new(0));

    let mut attempt = 0;
    loop {
        let attempts = attempts.clone();
        let outcome = breaker
            .call(|| {
                let attempts = attempts.clone();
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(server_error())
                }
            })
            .await;

        let transport_err = match outcome {
            Ok(()) => break,
            Err(e) => e.into_inner().unwrap_or(TransportError::Cancelled),
        };

        if !strategy.should_retry(attempt, &transport_err) {
            break;
        }
        attempt += 1;
    }

    // the breaker's own failure_threshold (2) caps real attempts well below
    // the retry strategy's max_retries (5): once open, further calls fail
    // fast with CircuitOpenError and the classifier marks that non-retryable
    // from the circuit's own point of view, but the outer loop above only
    // inspects the inner transport error, so it keeps retrying against an
    // open breaker until its own attempt budget is exhausted.
    assert!(attempts.load(Ordering::SeqCst) <= 2, "breaker must stop invoking the operation once open");
}

#[tokio::test]
async fn no_retry_strategy_makes_exactly_one_attempt_through_the_breaker() {
    let breaker: CircuitBreaker<TransportError> =
        CircuitBreaker::new(CircuitBreakerConfig::new(10, Duration::from_secs(30)));
    let strategy = NoRetry;
    let attempts = Arc::new(AtomicUsize::new(0));

    let attempts_clone = attempts.clone();
    let _ = breaker
        .call(move || {
            let attempts = attempts_clone.clone();
            async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(server_error())
            }
        })
        .await;

    assert!(!strategy.should_retry(0, &server_error()));
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
}

#[test]
fn exponential_backoff_default_never_exceeds_the_global_retry_cap() {
    let strategy = ExponentialBackoff::default();
    for attempt in 0..20 {
        assert!(strategy.retry_delay(attempt) <= obs_ingest::MAX_RETRY_DELAY);
    }
}

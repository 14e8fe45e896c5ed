//! Metrics sink abstraction: counters, durations, and gauges reported to a
//! user-supplied collector. All operations are best-effort; a missing sink
//! is simply a no-op and never fails business logic.

use std::time::Duration;

/// Standard metric name catalogue. Callers may override names by constructing
/// their own sink that remaps them; these constants exist purely as
/// documentation of the names this crate emits by default.
pub mod names {
    pub const QUEUE_DEPTH: &str = "ingest.queue.depth";
    pub const QUEUE_CAPACITY: &str = "ingest.queue.capacity";
    pub const QUEUE_UTILIZATION: &str = "ingest.queue.utilization";
    pub const EVENTS_QUEUED: &str = "ingest.events.queued";
    pub const EVENTS_SENT: &str = "ingest.events.sent";
    pub const EVENTS_DROPPED: &str = "ingest.events.dropped";
    pub const BATCH_SUCCESSES: &str = "ingest.batch.successes";
    pub const BATCH_FAILURES: &str = "ingest.batch.failures";
    pub const BATCH_DURATION: &str = "ingest.batch.duration";
    pub const BATCH_RETRIES: &str = "ingest.batch.retries";
    pub const HTTP_2XX: &str = "ingest.http.2xx";
    pub const HTTP_4XX: &str = "ingest.http.4xx";
    pub const HTTP_5XX: &str = "ingest.http.5xx";
    pub const HTTP_RETRIES: &str = "ingest.http.retries";
    pub const HTTP_DURATION: &str = "ingest.http.duration";
    pub const CIRCUIT_STATE: &str = "ingest.circuit.state";
    pub const CIRCUIT_TRIPS: &str = "ingest.circuit.trips";
    pub const HOOK_DURATION: &str = "ingest.hook.duration";
    pub const HOOK_FAILURES: &str = "ingest.hook.failures";
    pub const HOOK_PANICS: &str = "ingest.hook.panics";
    pub const CLIENT_UPTIME: &str = "ingest.client.uptime";
    pub const SHUTDOWN_DURATION: &str = "ingest.client.shutdown_duration";
    pub const ASYNC_ERRORS_TOTAL: &str = "ingest.errors.async_total";
    pub const ID_GENERATION_FAILURES: &str = "ingest.id.generation_failures";
}

/// A sink for counters, durations, and gauges. Implementations must be cheap
/// and non-blocking; none of these calls may propagate an error into the
/// ingestion path.
pub trait MetricsSink: Send + Sync + std::fmt::Debug {
    fn increment_counter(&self, name: &str, delta: u64);
    fn record_duration(&self, name: &str, duration: Duration);
    fn set_gauge(&self, name: &str, value: f64);
}

/// No-op sink; the default when the caller does not configure one.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl MetricsSink for NullSink {
    fn increment_counter(&self, _name: &str, _delta: u64) {}
    fn record_duration(&self, _name: &str, _duration: Duration) {}
    fn set_gauge(&self, _name: &str, _value: f64) {}
}

/// Logs every metric call at debug level via `tracing`. Useful for local
/// development when no real metrics backend is wired up.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl MetricsSink for TracingSink {
    fn increment_counter(&self, name: &str, delta: u64) {
        tracing::debug!(metric = name, delta, "counter");
    }

    fn record_duration(&self, name: &str, duration: Duration) {
        tracing::debug!(metric = name, ?duration, "duration");
    }

    fn set_gauge(&self, name: &str, value: f64) {
        tracing::debug!(metric = name, value, "gauge");
    }
}

/// Records every call in memory; used in tests to assert on emitted metrics.
#[derive(Debug, Default)]
pub struct MemorySink {
    counters: std::sync::Mutex<std::collections::HashMap<String, u64>>,
    durations: std::sync::Mutex<Vec<(String, Duration)>>,
    gauges: std::sync::Mutex<std::collections::HashMap<String, f64>>,
}

impl MetricsSink for MemorySink {
    fn increment_counter(&self, name: &str, delta: u64) {
        *self
            .counters
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .entry(name.to_string())
            .or_insert(0) += delta;
    }

    fn record_duration(&self, name: &str, duration: Duration) {
        self.durations
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push((name.to_string(), duration));
    }

    fn set_gauge(&self, name: &str, value: f64) {
        self.gauges
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(name.to_string(), value);
    }
}

impl MemorySink {
    pub fn counter(&self, name: &str) -> u64 {
        self.counters.lock().unwrap_or_else(|p| p.into_inner()).get(name).copied().unwrap_or(0)
    }

    pub fn gauge(&self, name: &str) -> Option<f64> {
        self.gauges.lock().unwrap_or_else(|p| p.into_inner()).get(name).copied()
    }

    pub fn duration_count(&self, name: &str) -> usize {
        self.durations
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .iter()
            .filter(|(n, _)| n == name)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_sink_is_a_no_op() {
        let sink = NullSink;
        sink.increment_counter("x", 1);
        sink.record_duration("x", Duration::from_secs(1));
        sink.set_gauge("x", 1.0);
    }

    #[test]
    fn memory_sink_accumulates_counters() {
        let sink = MemorySink::default();
        sink.increment_counter(names::EVENTS_SENT, 3);
        sink.increment_counter(names::EVENTS_SENT, 2);
        assert_eq!(sink.counter(names::EVENTS_SENT), 5);
    }

    #[test]
    fn memory_sink_tracks_gauges_and_durations() {
        let sink = MemorySink::default();
        sink.set_gauge(names::QUEUE_UTILIZATION, 0.5);
        assert_eq!(sink.gauge(names::QUEUE_UTILIZATION), Some(0.5));

        sink.record_duration(names::HTTP_DURATION, Duration::from_millis(10));
        sink.record_duration(names::HTTP_DURATION, Duration::from_millis(20));
        assert_eq!(sink.duration_count(names::HTTP_DURATION), 2);
    }
}

//! Batcher and Ingestion Core: the primary admission/batching/shutdown loop.
//!
//! Owns the pending-event buffer, the bounded batch channel, the periodic
//! flush ticker, and the batch worker. Everything else in this crate exists
//! to be wired together here.

use crate::backpressure::{BackpressureHandler, Decision};
use crate::config::{BatchFlushedCallback, BatchingConfig};
use crate::error::IngestError;
use crate::error_chain::ErrorChain;
use crate::event::{BatchEnvelope, IngestionEvent, IngestionResponse};
use crate::lifecycle::{ClientState, LifecycleManager};
use crate::metrics::{names, MetricsSink};
use crate::transport::{ApiRequest, HttpTransport};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;

struct Batch {
    events: Vec<IngestionEvent>,
    deadline: Instant,
}

#[derive(Debug, Default)]
struct CoreStats {
    admitted_accepted: AtomicU64,
    admitted_rejected: AtomicU64,
    sent: AtomicU64,
}

/// Cumulative admission/delivery counters, used to check the crate's core
/// conservation invariant (`dropped + blocked_then_sent + in_flight == admitted_accepted`).
#[derive(Debug, Clone, Copy, Default)]
pub struct IngestionStats {
    pub admitted_accepted: u64,
    pub admitted_rejected: u64,
    pub blocked: u64,
    pub dropped: u64,
    pub sent: u64,
}

struct Shared {
    pending: Mutex<Vec<IngestionEvent>>,
    tx: Mutex<Option<mpsc::Sender<Batch>>>,
    batch_queue_size: usize,
    batch_size: usize,
    background_send_timeout: Duration,
    lifecycle: Arc<LifecycleManager>,
    backpressure: Arc<BackpressureHandler>,
    relief: Arc<Notify>,
    metrics: Arc<dyn MetricsSink>,
    error_chain: Arc<ErrorChain>,
    transport: Arc<HttpTransport>,
    on_batch_flushed: Option<BatchFlushedCallback>,
    stats: CoreStats,
}

impl Shared {
    fn report_queue_gauges(&self, current_size: usize) {
        let capacity = self.backpressure.monitor().capacity();
        self.metrics.set_gauge(names::QUEUE_DEPTH, current_size as f64);
        self.metrics.set_gauge(names::QUEUE_CAPACITY, capacity as f64);
        if capacity > 0 {
            self.metrics.set_gauge(names::QUEUE_UTILIZATION, current_size as f64 / capacity as f64);
        }
    }

    fn in_flight_estimate(&self, pending_len: usize) -> usize {
        let tx_guard = self.tx.lock().unwrap_or_else(|p| p.into_inner());
        let queued_batches = match tx_guard.as_ref() {
            Some(tx) => self.batch_queue_size.saturating_sub(tx.capacity()),
            None => 0,
        };
        pending_len + queued_batches * self.batch_size
    }

    /// Snapshot-and-clear `pending`, enqueueing the result as a batch if
    /// non-empty. Best-effort: a full channel drops the batch with a metric,
    /// per the "admission is purely handler-driven" resolution — the
    /// in-flight estimate used at admission time already accounts for
    /// channel occupancy, so a full channel here indicates a benign race
    /// rather than a policy violation.
    fn flush_pending_locked(&self, pending: &mut Vec<IngestionEvent>) {
        if pending.is_empty() {
            return;
        }
        let events = std::mem::take(pending);
        let count = events.len() as u64;
        let batch = Batch { events, deadline: Instant::now() + self.background_send_timeout };
        let tx_guard = self.tx.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(tx) = tx_guard.as_ref() {
            if tx.try_send(batch).is_err() {
                self.metrics.increment_counter(names::EVENTS_DROPPED, count);
            }
        }
    }
}

/// Accepts events, enforces admission policy, batches, transmits, and
/// coordinates graceful shutdown.
pub struct IngestionCore {
    shared: Arc<Shared>,
    worker_handle: Mutex<Option<JoinHandle<()>>>,
    flush_handle: Mutex<Option<JoinHandle<()>>>,
}

impl IngestionCore {
    pub fn new(
        batching: BatchingConfig,
        lifecycle: Arc<LifecycleManager>,
        backpressure: Arc<BackpressureHandler>,
        metrics: Arc<dyn MetricsSink>,
        error_chain: Arc<ErrorChain>,
        transport: Arc<HttpTransport>,
        on_batch_flushed: Option<BatchFlushedCallback>,
    ) -> Self {
        let (tx, rx) = mpsc::channel(batching.batch_queue_size.max(1));
        let relief = Arc::new(Notify::new());

        let shared = Arc::new(Shared {
            pending: Mutex::new(Vec::new()),
            tx: Mutex::new(Some(tx)),
            batch_queue_size: batching.batch_queue_size.max(1),
            batch_size: batching.batch_size.max(1),
            background_send_timeout: batching.background_send_timeout,
            lifecycle,
            backpressure,
            relief: relief.clone(),
            metrics,
            error_chain,
            transport,
            on_batch_flushed,
            stats: CoreStats::default(),
        });

        let worker_shared = shared.clone();
        let worker_handle = tokio::spawn(async move { run_worker(worker_shared, rx).await });

        let flush_shared = shared.clone();
        let flush_interval = batching.flush_interval;
        let flush_handle =
            tokio::spawn(async move { run_flush_ticker(flush_shared, flush_interval).await });

        Self {
            shared,
            worker_handle: Mutex::new(Some(worker_handle)),
            flush_handle: Mutex::new(Some(flush_handle)),
        }
    }

    /// Admit one event. Returns `Ok(())` for both genuine acceptance and
    /// silent policy-drop; only closed-client and cancellation are errors.
    pub async fn queue_event(&self, event: IngestionEvent) -> Result<(), IngestError> {
        if self.shared.lifecycle.state() != ClientState::Active {
            self.shared.stats.admitted_rejected.fetch_add(1, Ordering::Relaxed);
            return Err(IngestError::ClientClosed);
        }

        loop {
            let current_size = {
                let pending = self.shared.pending.lock().unwrap_or_else(|p| p.into_inner());
                self.shared.in_flight_estimate(pending.len())
            };
            self.shared.report_queue_gauges(current_size);

            match self.shared.backpressure.decide(current_size) {
                Decision::Drop => {
                    self.shared.metrics.increment_counter(names::EVENTS_DROPPED, 1);
                    tracing::debug!("event dropped by backpressure policy");
                    return Ok(());
                }
                Decision::Block => {
                    tokio::select! {
                        _ = self.shared.relief.notified() => continue,
                        _ = tokio::time::sleep(Duration::from_millis(50)) => continue,
                    }
                }
                Decision::Allow => break,
            }
        }

        {
            let mut pending = self.shared.pending.lock().unwrap_or_else(|p| p.into_inner());
            pending.push(event);
            if pending.len() >= self.shared.batch_size {
                self.shared.flush_pending_locked(&mut pending);
            }
        }

        self.shared.stats.admitted_accepted.fetch_add(1, Ordering::Relaxed);
        self.shared.metrics.increment_counter(names::EVENTS_QUEUED, 1);
        self.shared.lifecycle.record_activity();
        Ok(())
    }

    pub fn stats(&self) -> IngestionStats {
        let backpressure_stats = (
            self.shared.backpressure.blocked_total(),
            self.shared.backpressure.dropped_total(),
        );
        IngestionStats {
            admitted_accepted: self.shared.stats.admitted_accepted.load(Ordering::Relaxed),
            admitted_rejected: self.shared.stats.admitted_rejected.load(Ordering::Relaxed),
            blocked: backpressure_stats.0,
            dropped: backpressure_stats.1,
            sent: self.shared.stats.sent.load(Ordering::Relaxed),
        }
    }

    /// Drains outstanding events and transitions the client to closed,
    /// bounded by `deadline`. Returns `Err` if the deadline expired before
    /// the drain completed; the client is marked closed regardless.
    pub async fn shutdown(&self, deadline: Duration) -> Result<(), IngestError> {
        let shutdown_started = Instant::now();
        self.shared
            .lifecycle
            .begin_shutdown()
            .map_err(|_| IngestError::Validation("shutdown already in progress".to_string()))?;
        self.shared.relief.notify_waiters();

        if let Some(flush_handle) = self.flush_handle.lock().unwrap_or_else(|p| p.into_inner()).take() {
            flush_handle.abort();
        }

        {
            let mut pending = self.shared.pending.lock().unwrap_or_else(|p| p.into_inner());
            self.shared.flush_pending_locked(&mut pending);
        }

        self.shared.tx.lock().unwrap_or_else(|p| p.into_inner()).take();

        let worker_handle = self.worker_handle.lock().unwrap_or_else(|p| p.into_inner()).take();
        let result = if let Some(handle) = worker_handle {
            match tokio::time::timeout(deadline, handle).await {
                Ok(_) => Ok(()),
                Err(_) => Err(IngestError::Validation("shutdown timed out".to_string())),
            }
        } else {
            Ok(())
        };

        self.shared.lifecycle.complete_shutdown();
        self.shared.metrics.record_duration(names::SHUTDOWN_DURATION, shutdown_started.elapsed());
        result
    }
}

async fn run_flush_ticker(shared: Arc<Shared>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let mut pending = shared.pending.lock().unwrap_or_else(|p| p.into_inner());
        shared.flush_pending_locked(&mut pending);
    }
}

async fn run_worker(shared: Arc<Shared>, mut rx: mpsc::Receiver<Batch>) {
    while let Some(batch) = rx.recv().await {
        shared.relief.notify_waiters();
        let count = batch.events.len() as u64;
        let envelope = BatchEnvelope { batch: batch.events };
        let start = Instant::now();

        let result = shared
            .transport
            .do_request::<BatchEnvelope, IngestionResponse>(
                ApiRequest {
                    method: reqwest::Method::POST,
                    path: "/ingestion",
                    query: &[],
                    body: Some(&envelope),
                    request_id: None,
                },
                batch.deadline,
            )
            .await;

        shared.metrics.record_duration(names::BATCH_DURATION, start.elapsed());

        match result {
            Ok(response) => {
                shared.stats.sent.fetch_add(count, Ordering::Relaxed);
                shared.metrics.increment_counter(names::EVENTS_SENT, count);
                if response.has_errors() {
                    shared
                        .metrics
                        .increment_counter(names::BATCH_FAILURES, response.errors.len() as u64);
                }
                shared.metrics.increment_counter(
                    names::BATCH_SUCCESSES,
                    response.successes.len() as u64,
                );
                if let Some(cb) = &shared.on_batch_flushed {
                    cb(&response);
                }
            }
            Err(err) => {
                shared.metrics.increment_counter(names::BATCH_FAILURES, count);
                shared.error_chain.handle(&err);
            }
        }
    }
}

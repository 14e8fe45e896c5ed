//! Top-level client: wires configuration into the transport, resilience
//! primitives, and ingestion core, and exposes the observation capability
//! set to callers.

use crate::backpressure::BackpressureHandler;
use crate::config::ClientConfig;
use crate::error::{ConfigError, IngestError, TransportError};
use crate::error_chain::ErrorChain;
use crate::hooks::HookChain;
use crate::id::{self, IdGenerator};
use crate::ingestion::{IngestionCore, IngestionStats};
use crate::lifecycle::{ClientState, LifecycleManager};
use crate::metrics::{names, MetricsSink};
use crate::observation::Trace;
use crate::sleeper::TokioSleeper;
use crate::transport::HttpTransport;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// The entry point for the SDK: constructs and owns the whole ingestion
/// pipeline for one set of credentials.
pub struct Client {
    core: Arc<IngestionCore>,
    ids: Arc<IdGenerator>,
    lifecycle: Arc<LifecycleManager>,
}

impl Client {
    /// Validates `config` and builds a running client: HTTP transport,
    /// circuit breaker, retry strategy, backpressure handler, lifecycle
    /// manager, batcher, and their background tasks are all started here.
    pub fn new(config: ClientConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let lifecycle = Arc::new(LifecycleManager::new(config.batching.idle_warning_duration));
        let hooks = Arc::new(HookChain::new(config.metrics.clone()));

        let transport = Arc::new(
            HttpTransport::new(
                config.effective_base_url(),
                config.public_key.clone(),
                config.secret_key.clone(),
                config.transport.clone(),
                config.circuit_breaker.clone(),
                config.retry_strategy.clone(),
                hooks,
                Arc::new(TokioSleeper),
                config.metrics.clone(),
            )
            .map_err(|e: TransportError| ConfigError::InvalidValue {
                field: "transport",
                reason: e.to_string(),
            })?,
        );

        let backpressure = Arc::new(BackpressureHandler::new(config.queue_monitor, config.backpressure));
        let error_chain = {
            let mut chain = ErrorChain::new(config.metrics.clone());
            if let Some(cb) = config.error_handler.clone() {
                chain = chain.with_callback(cb);
            }
            Arc::new(chain)
        };

        let metrics_for_ticker = config.metrics.clone();
        let core = Arc::new(IngestionCore::new(
            config.batching,
            lifecycle.clone(),
            backpressure,
            config.metrics,
            error_chain,
            transport,
            config.on_batch_flushed,
        ));

        let idle_ticker_target = lifecycle.clone();
        tokio::spawn(async move {
            idle_ticker_target.run_idle_ticker(Duration::from_secs(30)).await;
        });

        let metrics_ticker_target = lifecycle.clone();
        tokio::spawn(async move {
            run_metrics_ticker(metrics_ticker_target, metrics_for_ticker, Duration::from_secs(30)).await;
        });

        Ok(Self { core, ids: Arc::new(IdGenerator::new(config.id_mode)), lifecycle })
    }

    /// Starts a new trace, the root of an observation tree.
    pub async fn new_trace(&self, payload: Value) -> Result<Trace, IngestError> {
        Trace::create(self.core.clone(), self.ids.clone(), payload).await
    }

    pub fn stats(&self) -> IngestionStats {
        self.core.stats()
    }

    pub fn uptime(&self) -> Duration {
        self.lifecycle.uptime()
    }

    /// Drains outstanding events and closes the client within `deadline`.
    pub async fn shutdown(&self, deadline: Duration) -> Result<(), IngestError> {
        self.core.shutdown(deadline).await
    }
}

/// Periodically reports process-wide and client-wide gauges that have no
/// natural per-call reporting site: uptime and the cumulative entropy
/// failure count from [`id::crypto_failure_count`].
async fn run_metrics_ticker(lifecycle: Arc<LifecycleManager>, metrics: Arc<dyn MetricsSink>, tick: Duration) {
    let mut interval = tokio::time::interval(tick);
    loop {
        interval.tick().await;
        if lifecycle.state() != ClientState::Active {
            return;
        }
        metrics.set_gauge(names::CLIENT_UPTIME, lifecycle.uptime().as_secs_f64());
        metrics.set_gauge(names::ID_GENERATION_FAILURES, id::crypto_failure_count() as f64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_invalid_config_before_spawning_anything() {
        let config = ClientConfig::new("", "sk").apply_defaults();
        assert!(Client::new(config).is_err());
    }

    #[tokio::test]
    async fn constructs_and_shuts_down_cleanly() {
        let config = ClientConfig::new("pk", "sk").apply_defaults();
        let client = Client::new(config).expect("valid config");
        client.shutdown(Duration::from_secs(1)).await.ok();
    }

    #[tokio::test]
    async fn metrics_ticker_reports_uptime_and_id_failures_while_active() {
        let metrics = Arc::new(crate::metrics::MemorySink::default());
        let lifecycle = Arc::new(LifecycleManager::new(Duration::from_secs(300)));

        let ticker_lifecycle = lifecycle.clone();
        let ticker_metrics: Arc<dyn MetricsSink> = metrics.clone();
        let handle = tokio::spawn(async move {
            run_metrics_ticker(ticker_lifecycle, ticker_metrics, Duration::from_millis(5)).await;
        });

        tokio::time::sleep(Duration::from_millis(30)).await;
        lifecycle.begin_shutdown().unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();

        assert!(metrics.gauge(names::CLIENT_UPTIME).is_some());
        assert!(metrics.gauge(names::ID_GENERATION_FAILURES).is_some());
    }
}

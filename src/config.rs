//! Typed client configuration: identity, transport, retry/circuit/batching
//! policy, backpressure, and observability hooks. Validated at construction
//! rather than left to fail deep inside the pipeline.

use crate::backpressure::BackpressureConfig;
use crate::circuit_breaker::CircuitBreakerConfig;
use crate::error::ConfigError;
use crate::error_chain::ErrorCallback;
use crate::event::IngestionResponse;
use crate::id::IdMode;
use crate::metrics::{MetricsSink, NullSink};
use crate::queue_monitor::QueueMonitorConfig;
use crate::region::Region;
use crate::retry::{ExponentialBackoff, RetryStrategy};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_MAX_IDLE_CONNS: usize = 100;
const DEFAULT_MAX_IDLE_CONNS_PER_HOST: usize = 10;
const DEFAULT_IDLE_CONN_TIMEOUT: Duration = Duration::from_secs(90);
const DEFAULT_BATCH_SIZE: usize = 100;
const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(5);
const DEFAULT_BATCH_QUEUE_SIZE: usize = 1000;
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_IDLE_WARNING_DURATION: Duration = Duration::from_secs(300);
const DEFAULT_BACKGROUND_SEND_TIMEOUT: Duration = Duration::from_secs(30);

/// Callback invoked after each batch completes, with the aggregate result.
pub type BatchFlushedCallback = Arc<dyn Fn(&IngestionResponse) + Send + Sync>;

/// Transport-level connection-pool tuning, mirrored from `reqwest`'s client
/// builder knobs.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub timeout: Duration,
    pub max_idle_conns: usize,
    pub max_idle_conns_per_host: usize,
    pub idle_conn_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            max_idle_conns: DEFAULT_MAX_IDLE_CONNS,
            max_idle_conns_per_host: DEFAULT_MAX_IDLE_CONNS_PER_HOST,
            idle_conn_timeout: DEFAULT_IDLE_CONN_TIMEOUT,
        }
    }
}

/// Batching policy: trigger size/timer, channel depth, and shutdown timing.
#[derive(Debug, Clone)]
pub struct BatchingConfig {
    pub batch_size: usize,
    pub flush_interval: Duration,
    pub batch_queue_size: usize,
    pub shutdown_timeout: Duration,
    pub idle_warning_duration: Duration,
    pub background_send_timeout: Duration,
}

impl Default for BatchingConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            batch_queue_size: DEFAULT_BATCH_QUEUE_SIZE,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            idle_warning_duration: DEFAULT_IDLE_WARNING_DURATION,
            background_send_timeout: DEFAULT_BACKGROUND_SEND_TIMEOUT,
        }
    }
}

/// The full, typed configuration surface recognized by the client.
pub struct ClientConfig {
    pub public_key: String,
    pub secret_key: String,
    pub base_url: Option<String>,
    pub region: Region,

    pub transport: TransportConfig,
    pub retry_strategy: Arc<dyn RetryStrategy>,
    pub circuit_breaker: CircuitBreakerConfig,
    pub batching: BatchingConfig,
    pub queue_monitor: QueueMonitorConfig,
    pub backpressure: BackpressureConfig,
    pub id_mode: IdMode,

    pub metrics: Arc<dyn MetricsSink>,
    pub error_handler: Option<ErrorCallback>,
    pub on_batch_flushed: Option<BatchFlushedCallback>,
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("public_key", &self.public_key)
            .field("secret_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("region", &self.region)
            .field("transport", &self.transport)
            .field("circuit_breaker", &self.circuit_breaker.failure_threshold)
            .field("batching", &self.batching)
            .field("id_mode", &self.id_mode)
            .finish()
    }
}

impl ClientConfig {
    pub fn new(public_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            public_key: public_key.into(),
            secret_key: secret_key.into(),
            base_url: None,
            region: Region::default(),
            transport: TransportConfig::default(),
            retry_strategy: Arc::new(ExponentialBackoff::default()),
            circuit_breaker: CircuitBreakerConfig::new(5, Duration::from_secs(30)),
            batching: BatchingConfig::default(),
            queue_monitor: QueueMonitorConfig::default(),
            backpressure: BackpressureConfig::default(),
            id_mode: IdMode::default(),
            metrics: Arc::new(NullSink),
            error_handler: None,
            on_batch_flushed: None,
        }
    }

    /// The effective base URL: explicit override, or the region default.
    pub fn effective_base_url(&self) -> String {
        self.base_url
            .clone()
            .unwrap_or_else(|| self.region.default_base_url().to_string())
    }

    /// Fills in any zero-valued durations/sizes with documented defaults.
    /// Mirrors [`QueueMonitorConfig::apply_defaults`]'s "zero means default"
    /// convention.
    pub fn apply_defaults(mut self) -> Self {
        if self.transport.timeout.is_zero() {
            self.transport.timeout = DEFAULT_TIMEOUT;
        }
        if self.transport.idle_conn_timeout.is_zero() {
            self.transport.idle_conn_timeout = DEFAULT_IDLE_CONN_TIMEOUT;
        }
        if self.batching.batch_size == 0 {
            self.batching.batch_size = DEFAULT_BATCH_SIZE;
        }
        if self.batching.flush_interval.is_zero() {
            self.batching.flush_interval = DEFAULT_FLUSH_INTERVAL;
        }
        if self.batching.batch_queue_size == 0 {
            self.batching.batch_queue_size = DEFAULT_BATCH_QUEUE_SIZE;
        }
        if self.batching.shutdown_timeout.is_zero() {
            self.batching.shutdown_timeout = DEFAULT_SHUTDOWN_TIMEOUT;
        }
        if self.batching.idle_warning_duration.is_zero() {
            self.batching.idle_warning_duration = DEFAULT_IDLE_WARNING_DURATION;
        }
        self.queue_monitor = self.queue_monitor.apply_defaults();
        self
    }

    /// Rejects configurations that cannot safely construct a client.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.public_key.trim().is_empty() {
            return Err(ConfigError::MissingField("public_key"));
        }
        if self.secret_key.trim().is_empty() {
            return Err(ConfigError::MissingField("secret_key"));
        }
        if let Some(url) = &self.base_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::InvalidValue {
                    field: "base_url",
                    reason: "must start with http:// or https://".to_string(),
                });
            }
        }
        if self.batching.batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "batching.batch_size",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.batching.batch_queue_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "batching.batch_queue_size",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.queue_monitor.capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "queue_monitor.capacity",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_us_region_base_url() {
        let config = ClientConfig::new("pk", "sk");
        assert_eq!(config.effective_base_url(), Region::Us.default_base_url());
    }

    #[test]
    fn explicit_base_url_overrides_region() {
        let mut config = ClientConfig::new("pk", "sk");
        config.base_url = Some("https://custom.example.com".to_string());
        assert_eq!(config.effective_base_url(), "https://custom.example.com");
    }

    #[test]
    fn validate_rejects_missing_keys() {
        let config = ClientConfig::new("", "sk");
        assert!(matches!(config.validate(), Err(ConfigError::MissingField("public_key"))));
    }

    #[test]
    fn validate_rejects_malformed_base_url() {
        let mut config = ClientConfig::new("pk", "sk");
        config.base_url = Some("not-a-url".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_batch_size() {
        let mut config = ClientConfig::new("pk", "sk");
        config.batching.batch_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn apply_defaults_fixes_zeroed_durations() {
        let mut config = ClientConfig::new("pk", "sk");
        config.batching.flush_interval = Duration::from_secs(0);
        config.batching.shutdown_timeout = Duration::from_secs(0);
        let config = config.apply_defaults();
        assert_eq!(config.batching.flush_interval, DEFAULT_FLUSH_INTERVAL);
        assert_eq!(config.batching.shutdown_timeout, DEFAULT_SHUTDOWN_TIMEOUT);
    }

    #[test]
    fn valid_default_config_passes_validation() {
        let config = ClientConfig::new("pk", "sk").apply_defaults();
        assert!(config.validate().is_ok());
    }
}

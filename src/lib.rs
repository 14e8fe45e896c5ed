#![forbid(unsafe_code)]

//! # obs-ingest
//!
//! Async ingestion SDK for observability events: batching, retry,
//! circuit-breaking, and backpressure in front of a remote collector.
//!
//! ## Features
//!
//! - **ID generation** with a deterministic fallback on entropy failure
//! - **Queue monitoring & backpressure** with configurable allow/block/drop policy
//! - **Retry strategies** (fixed, linear, exponential with full jitter) honoring server `Retry-After`
//! - **Circuit breaker** with half-open probing and configurable reclose threshold
//! - **HTTP transport** with authenticated requests, hooks, and a bounded response-body cap
//! - **Graceful shutdown** that drains the batch queue within a deadline
//!
//! ## Quick start
//!
//! ```no_run
//! use obs_ingest::{Client, ClientConfig};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ClientConfig::new("public-key", "secret-key").apply_defaults();
//!     let client = Client::new(config).expect("valid client config");
//!
//!     let trace = client.new_trace(json!({"name": "demo"})).await.expect("queued");
//!     let _ = trace.id();
//!
//!     client.shutdown(std::time::Duration::from_secs(5)).await.ok();
//! }
//! ```

mod backpressure;
mod circuit_breaker;
mod client;
mod clock;
mod config;
mod error;
mod error_chain;
mod event;
mod hooks;
mod id;
mod ingestion;
mod jitter;
mod lifecycle;
mod metrics;
mod observation;
mod queue_monitor;
mod region;
mod retry;
mod sleeper;
mod timeout;
mod transport;

pub use backpressure::{BackpressureConfig, BackpressureHandler, BackpressureStats, Decision};
pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitCallError, CircuitOpenError, CircuitState,
    FailureClassifier, StateChangeCallback as CircuitStateChangeCallback,
};
pub use client::Client;
pub use clock::{Clock, MonotonicClock};
pub use config::{BatchFlushedCallback, BatchingConfig, ClientConfig, TransportConfig};
pub use error::{ApiError, ConfigError, IngestError, RetryAfter, TransportError};
pub use error_chain::{ErrorCallback, ErrorChain};
pub use event::{
    BatchEnvelope, EventBody, EventError, EventKind, EventSuccess, IngestionEvent,
    IngestionResponse, Timestamp,
};
pub use hooks::{AfterResponseHook, BeforeRequestHook, HookChain, HookKind};
pub use id::{EntropyError, EntropySource, IdGenerator, IdMode, OsEntropy};
pub use ingestion::{IngestionCore, IngestionStats};
pub use jitter::Jitter;
pub use lifecycle::{
    ClientState, LifecycleError, LifecycleManager, StateChangeCallback as LifecycleStateChangeCallback,
};
pub use metrics::{names, MemorySink, MetricsSink, NullSink, TracingSink};
pub use observation::{Generation, ObservationCapability, Span, Trace};
pub use queue_monitor::{
    BackpressureLevel, LevelChangeCallback, QueueMonitor, QueueMonitorConfig, QueueMonitorStats,
    QueueState,
};
pub use region::Region;
pub use retry::{
    ExponentialBackoff, FixedDelay, LinearBackoff, NoRetry, RetryStrategy, MAX_RETRY_DELAY,
};
pub use sleeper::{InstantSleeper, Sleeper, TokioSleeper, TrackingSleeper};
pub use timeout::{Elapsed, TimeoutError, TimeoutPolicy, MAX_TIMEOUT};
pub use transport::{ApiRequest, HttpTransport, MAX_RESPONSE_BYTES};

pub mod prelude;

//! Convenient re-exports of the crate's most commonly used types.
pub use crate::{
    BackpressureConfig, BackpressureHandler, Client, ClientConfig, ClientState, Decision,
    ErrorChain, EventBody, EventKind, ExponentialBackoff, FixedDelay, IdGenerator, IdMode,
    IngestError, IngestionCore, IngestionEvent, LinearBackoff, MetricsSink, NoRetry, NullSink,
    Region, RetryStrategy, TransportError,
};

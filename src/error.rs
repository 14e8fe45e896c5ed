//! Error taxonomy for the ingestion client.
//!
//! Synchronous errors ([`ConfigError`], [`IngestError`]) are returned directly to
//! callers. Asynchronous errors ([`TransportError`]) never reach the caller of
//! `queue_event`; they flow through the error handler chain (see
//! [`crate::error_chain`]) and are observable only via logs, metrics, or the
//! optional error callback.

use std::time::Duration;
use thiserror::Error;

/// Errors raised synchronously from client construction.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
    #[error("invalid value for `{field}`: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Errors raised synchronously from admission (`queue_event`).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IngestError {
    #[error("event failed validation: {0}")]
    Validation(String),
    #[error("client is closed")]
    ClientClosed,
    #[error("admission was cancelled")]
    Cancelled,
}

/// The server-advised delay attached to a 429 response, parsed from `Retry-After`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryAfter(pub Duration);

/// A non-2xx response from the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status_code: u16,
    pub request_id: Option<String>,
    pub message: String,
    pub retry_after: Option<Duration>,
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "api error: status={}", self.status_code)?;
        if let Some(id) = &self.request_id {
            write!(f, " request_id={}", id)?;
        }
        write!(f, " message={}", self.message)
    }
}

impl std::error::Error for ApiError {}

impl ApiError {
    pub fn is_rate_limited(&self) -> bool {
        self.status_code == 429
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self.status_code, 408 | 429) || self.status_code >= 500
    }
}

/// Errors that can occur while executing a single HTTP transport attempt or
/// an entire retry loop around it. These are produced on the worker side of
/// the batcher and never surface directly to the caller of `queue_event`.
#[derive(Debug, Error, Clone)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(String),
    #[error("request timed out after {elapsed:?} (limit {timeout:?})")]
    Timeout { elapsed: Duration, timeout: Duration },
    #[error("response body exceeded the {max_bytes} byte cap")]
    BodyTooLarge { max_bytes: usize },
    #[error("failed to serialize request body: {0}")]
    Serialization(String),
    #[error("failed to deserialize response body: {0}")]
    Deserialization(String),
    #[error("{0}")]
    Api(ApiError),
    #[error("circuit breaker open ({consecutive_failures} consecutive failures, open for {open_duration:?})")]
    CircuitOpen { consecutive_failures: usize, open_duration: Duration },
    #[error("critical hook `{hook}` failed: {reason}")]
    HookCritical { hook: String, reason: String },
    #[error("request cancelled before completion")]
    Cancelled,
}

impl TransportError {
    /// Whether this error should be treated as retryable by a retry strategy.
    ///
    /// Network errors, request timeouts, and 5xx/408/429 API errors are
    /// retryable. Cancellation, serialization, oversized bodies, circuit-open,
    /// and critical hook failures are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::Network(_) => true,
            TransportError::Timeout { .. } => true,
            TransportError::Api(api) => api.is_retryable(),
            TransportError::BodyTooLarge { .. } => false,
            TransportError::Serialization(_) => false,
            TransportError::Deserialization(_) => false,
            TransportError::CircuitOpen { .. } => false,
            TransportError::HookCritical { .. } => false,
            TransportError::Cancelled => false,
        }
    }

    pub fn is_circuit_open(&self) -> bool {
        matches!(self, TransportError::CircuitOpen { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, TransportError::Cancelled)
    }

    /// Server-advised retry delay, if this error carries one (429 responses).
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            TransportError::Api(api) => api.retry_after,
            _ => None,
        }
    }

    /// A stable short name used in metric labels and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            TransportError::Network(_) => "network",
            TransportError::Timeout { .. } => "timeout",
            TransportError::BodyTooLarge { .. } => "body_too_large",
            TransportError::Serialization(_) => "serialization",
            TransportError::Deserialization(_) => "deserialization",
            TransportError::Api(_) => "api",
            TransportError::CircuitOpen { .. } => "circuit_open",
            TransportError::HookCritical { .. } => "hook_critical",
            TransportError::Cancelled => "cancelled",
        }
    }
}

//! Before-request / after-response hooks with panic containment.

use crate::error::TransportError;
use crate::metrics::{names, MetricsSink};
use async_trait::async_trait;
use futures::FutureExt;
use reqwest::{Request, Response};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

/// Whether a hook's failure/panic aborts the request or is merely logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookKind {
    Observational,
    Critical,
}

/// A hook invoked before a request is sent.
#[async_trait]
pub trait BeforeRequestHook: Send + Sync {
    fn name(&self) -> &str;
    fn kind(&self) -> HookKind;
    async fn before_request(&self, request: &mut Request) -> Result<(), String>;
}

/// A hook invoked after a response is received, even on transport error.
#[async_trait]
pub trait AfterResponseHook: Send + Sync {
    fn name(&self) -> &str;
    fn kind(&self) -> HookKind;
    async fn after_response(&self, response: Option<&Response>) -> Result<(), String>;
}

/// Runs configured hooks in registration order, containing panics and
/// classifying failures by [`HookKind`].
pub struct HookChain {
    before: Vec<Arc<dyn BeforeRequestHook>>,
    after: Vec<Arc<dyn AfterResponseHook>>,
    metrics: Arc<dyn MetricsSink>,
}

impl HookChain {
    pub fn new(metrics: Arc<dyn MetricsSink>) -> Self {
        Self { before: Vec::new(), after: Vec::new(), metrics }
    }

    pub fn push_before(&mut self, hook: Arc<dyn BeforeRequestHook>) {
        self.before.push(hook);
    }

    pub fn push_after(&mut self, hook: Arc<dyn AfterResponseHook>) {
        self.after.push(hook);
    }

    /// Runs all before-request hooks. Returns `Err` only if a critical hook
    /// failed or panicked; observational failures are logged and swallowed.
    pub async fn run_before(&self, request: &mut Request) -> Result<(), TransportError> {
        for hook in &self.before {
            let start = Instant::now();
            let outcome = AssertUnwindSafe(hook.before_request(request))
                .catch_unwind()
                .await
                .map_err(format_panic_payload);
            self.metrics.record_duration(names::HOOK_DURATION, start.elapsed());

            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(reason)) => {
                    self.metrics.increment_counter(names::HOOK_FAILURES, 1);
                    if hook.kind() == HookKind::Critical {
                        return Err(TransportError::HookCritical { hook: hook.name().to_string(), reason });
                    }
                    tracing::warn!(hook = hook.name(), reason, "observational before-request hook failed");
                }
                Err(panic_msg) => {
                    self.metrics.increment_counter(names::HOOK_PANICS, 1);
                    if hook.kind() == HookKind::Critical {
                        return Err(TransportError::HookCritical { hook: hook.name().to_string(), reason: panic_msg });
                    }
                    tracing::error!(hook = hook.name(), panic_msg, "observational before-request hook panicked");
                }
            }
        }
        Ok(())
    }

    /// Runs all after-response hooks unconditionally, even when `response` is
    /// `None` (a transport-level failure).
    pub async fn run_after(&self, response: Option<&Response>) -> Result<(), TransportError> {
        for hook in &self.after {
            let start = Instant::now();
            let outcome = AssertUnwindSafe(hook.after_response(response))
                .catch_unwind()
                .await
                .map_err(format_panic_payload);
            self.metrics.record_duration(names::HOOK_DURATION, start.elapsed());

            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(reason)) => {
                    self.metrics.increment_counter(names::HOOK_FAILURES, 1);
                    if hook.kind() == HookKind::Critical {
                        return Err(TransportError::HookCritical { hook: hook.name().to_string(), reason });
                    }
                    tracing::warn!(hook = hook.name(), reason, "observational after-response hook failed");
                }
                Err(panic_msg) => {
                    self.metrics.increment_counter(names::HOOK_PANICS, 1);
                    if hook.kind() == HookKind::Critical {
                        return Err(TransportError::HookCritical { hook: hook.name().to_string(), reason: panic_msg });
                    }
                    tracing::error!(hook = hook.name(), panic_msg, "observational after-response hook panicked");
                }
            }
        }
        Ok(())
    }
}

/// Converts a caught panic payload into a readable string.
fn format_panic_payload(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "hook panicked with non-string payload".to_string()
    }
}

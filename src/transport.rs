//! HTTP transport: builds authenticated requests, runs them through the
//! hook chain, and wraps the whole thing in retry-around-circuit-breaker.

use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitCallError, CircuitState};
use crate::config::TransportConfig;
use crate::error::{ApiError, TransportError};
use crate::hooks::HookChain;
use crate::metrics::{names, MetricsSink};
use crate::retry::RetryStrategy;
use crate::sleeper::Sleeper;
use crate::timeout::{TimeoutPolicy, MAX_TIMEOUT};
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Hard cap on response body size; exceeding it is a terminal error.
pub const MAX_RESPONSE_BYTES: usize = 10 * 1024 * 1024;

pub const SDK_NAME: &str = "obs-ingest";
pub const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");

/// A single HTTP call to make, independent of retry/circuit wrapping.
pub struct ApiRequest<'a, B: Serialize> {
    pub method: reqwest::Method,
    pub path: &'a str,
    pub query: &'a [(&'a str, &'a str)],
    pub body: Option<&'a B>,
    pub request_id: Option<String>,
}

/// Executes authenticated HTTP calls against the collector, applying hooks,
/// a circuit breaker, and a retry strategy around each attempt.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    public_key: String,
    secret_key: String,
    hooks: Arc<HookChain>,
    circuit: CircuitBreaker<TransportError>,
    retry: Arc<dyn RetryStrategy>,
    sleeper: Arc<dyn Sleeper>,
    metrics: Arc<dyn MetricsSink>,
}

impl HttpTransport {
    pub fn new(
        base_url: impl Into<String>,
        public_key: impl Into<String>,
        secret_key: impl Into<String>,
        transport_config: TransportConfig,
        circuit_config: CircuitBreakerConfig,
        retry: Arc<dyn RetryStrategy>,
        hooks: Arc<HookChain>,
        sleeper: Arc<dyn Sleeper>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(transport_config.timeout)
            .pool_max_idle_per_host(transport_config.max_idle_conns_per_host)
            .pool_idle_timeout(transport_config.idle_conn_timeout)
            .build()
            .map_err(|e| TransportError::Network(e.to_string()))?;

        let circuit_metrics = metrics.clone();
        let circuit = CircuitBreaker::new(circuit_config)
            .with_classifier(Arc::new(|e: &TransportError| !e.is_circuit_open()))
            .on_state_change(move |_from, to| {
                circuit_metrics.set_gauge(names::CIRCUIT_STATE, circuit_state_gauge(to));
                if to == CircuitState::Open {
                    circuit_metrics.increment_counter(names::CIRCUIT_TRIPS, 1);
                }
            });

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            public_key: public_key.into(),
            secret_key: secret_key.into(),
            hooks,
            circuit,
            retry,
            sleeper,
            metrics,
        })
    }

    fn auth_header(&self) -> String {
        let raw = format!("{}:{}", self.public_key, self.secret_key);
        format!("Basic {}", base64::engine::general_purpose::STANDARD.encode(raw))
    }

    fn build_url(&self, path: &str, query: &[(&str, &str)]) -> String {
        let mut url = format!("{}{}", self.base_url, path);
        if !query.is_empty() {
            let encoded: Vec<String> = query
                .iter()
                .map(|(k, v)| format!("{}={}", urlencode(k), urlencode(v)))
                .collect();
            url.push('?');
            url.push_str(&encoded.join("&"));
        }
        url
    }

    /// Executes a single attempt: build request, run hooks, send, cap body,
    /// classify non-2xx. Does not retry and does not consult the circuit
    /// breaker; callers use [`Self::do_request`] for the full wrapped path.
    async fn attempt<B: Serialize, R: DeserializeOwned>(
        &self,
        req: &ApiRequest<'_, B>,
    ) -> Result<R, TransportError> {
        let url = self.build_url(req.path, req.query);
        let mut builder = self.client.request(req.method.clone(), &url);

        if let Some(body) = req.body {
            let json = serde_json::to_vec(body)
                .map_err(|e| TransportError::Serialization(e.to_string()))?;
            builder = builder.body(json);
        }

        let request_id =
            req.request_id.clone().unwrap_or_else(|| Uuid::new_v4().to_string());
        builder = builder
            .header("Authorization", self.auth_header())
            .header("Content-Type", "application/json")
            .header("Accept", "application/json")
            .header("User-Agent", format!("{SDK_NAME}/{SDK_VERSION}"))
            .header("X-Request-ID", request_id);

        let mut request = builder.build().map_err(|e| TransportError::Network(e.to_string()))?;

        self.hooks.run_before(&mut request).await?;

        let start = Instant::now();
        let send_result = self.client.execute(request).await;
        self.metrics.record_duration(names::HTTP_DURATION, start.elapsed());

        let response = match send_result {
            Ok(resp) => {
                self.hooks.run_after(Some(&resp)).await?;
                resp
            }
            Err(e) => {
                self.hooks.run_after(None).await?;
                if e.is_timeout() {
                    return Err(TransportError::Timeout { elapsed: start.elapsed(), timeout: Duration::from_secs(0) });
                }
                return Err(TransportError::Network(e.to_string()));
            }
        };

        let status = response.status();
        let request_id = response
            .headers()
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);

        let bytes = read_capped_body(response).await?;

        if status.as_u16() >= 400 {
            self.metrics.increment_counter(
                if status.as_u16() >= 500 { names::HTTP_5XX } else { names::HTTP_4XX },
                1,
            );
            let message = String::from_utf8_lossy(&bytes).to_string();
            return Err(TransportError::Api(ApiError {
                status_code: status.as_u16(),
                request_id,
                message,
                retry_after,
            }));
        }

        self.metrics.increment_counter(names::HTTP_2XX, 1);

        if bytes.is_empty() {
            return serde_json::from_slice(b"null")
                .map_err(|e| TransportError::Deserialization(e.to_string()));
        }
        serde_json::from_slice(&bytes).map_err(|e| TransportError::Deserialization(e.to_string()))
    }

    /// Runs the full retry-around-circuit-breaker loop for one logical call,
    /// bounded by `deadline`.
    pub async fn do_request<B: Serialize + Send + Sync, R: DeserializeOwned>(
        &self,
        req: ApiRequest<'_, B>,
        deadline: Instant,
    ) -> Result<R, TransportError> {
        let mut attempt_index = 0usize;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(TransportError::Cancelled);
            }
            let policy = TimeoutPolicy::new_with_max(remaining, MAX_TIMEOUT)
                .unwrap_or_else(|_| TimeoutPolicy::new(MAX_TIMEOUT).expect("MAX_TIMEOUT is always valid"));

            let outcome = self
                .circuit
                .call(|| async {
                    match policy.execute(|| self.attempt::<B, R>(&req)).await {
                        Ok(result) => result,
                        Err(elapsed) => Err(TransportError::Timeout {
                            elapsed: elapsed.elapsed,
                            timeout: elapsed.timeout,
                        }),
                    }
                })
                .await;

            let error = match outcome {
                Ok(value) => return Ok(value),
                Err(CircuitCallError::Open(open)) => TransportError::CircuitOpen {
                    consecutive_failures: open.consecutive_failures,
                    open_duration: open.open_duration,
                },
                Err(CircuitCallError::Inner(e)) => e,
            };

            if !self.retry.should_retry(attempt_index, &error) {
                return Err(error);
            }

            self.metrics.increment_counter(names::HTTP_RETRIES, 1);
            self.metrics.increment_counter(names::BATCH_RETRIES, 1);
            let delay = self.retry.retry_delay_with_error(attempt_index, &error);
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(TransportError::Cancelled);
            }
            self.sleeper.sleep(delay.min(remaining)).await;
            attempt_index += 1;
        }
    }

    pub fn circuit_state(&self) -> crate::circuit_breaker::CircuitState {
        self.circuit.state()
    }
}

/// Maps circuit state to a gauge value: closed=0, half-open=1, open=2,
/// ordered by severity rather than by the breaker's internal encoding.
fn circuit_state_gauge(state: CircuitState) -> f64 {
    match state {
        CircuitState::Closed => 0.0,
        CircuitState::HalfOpen => 1.0,
        CircuitState::Open => 2.0,
    }
}

/// Reads up to [`MAX_RESPONSE_BYTES`] from a response body; exceeding the
/// cap is a terminal error rather than a silent truncation.
async fn read_capped_body(response: reqwest::Response) -> Result<Vec<u8>, TransportError> {
    if let Some(len) = response.content_length() {
        if len as usize > MAX_RESPONSE_BYTES {
            return Err(TransportError::BodyTooLarge { max_bytes: MAX_RESPONSE_BYTES });
        }
    }
    let bytes = response.bytes().await.map_err(|e| TransportError::Network(e.to_string()))?;
    if bytes.len() > MAX_RESPONSE_BYTES {
        return Err(TransportError::BodyTooLarge { max_bytes: MAX_RESPONSE_BYTES });
    }
    Ok(bytes.to_vec())
}

/// Parses `Retry-After` as either an integer seconds count or an HTTP-date
/// in the IMF-fixdate form (`Sun, 06 Nov 1994 08:49:37 GMT`), per RFC 7231.
fn parse_retry_after(value: &str) -> Option<Duration> {
    let value = value.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }
    let when = parse_imf_fixdate(value)?;
    when.duration_since(std::time::SystemTime::now()).ok()
}

const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Parses `"Sun, 06 Nov 1994 08:49:37 GMT"`. No other RFC 7231 date formats
/// are accepted; the collector is assumed to emit the preferred form.
fn parse_imf_fixdate(s: &str) -> Option<std::time::SystemTime> {
    let rest = s.split_once(", ")?.1;
    let mut parts = rest.split_ascii_whitespace();
    let day: u32 = parts.next()?.parse().ok()?;
    let month_name = parts.next()?;
    let month = MONTHS.iter().position(|m| *m == month_name)? as u32 + 1;
    let year: i64 = parts.next()?.parse().ok()?;
    let time = parts.next()?;
    let zone = parts.next()?;
    if zone != "GMT" {
        return None;
    }
    let mut time_parts = time.split(':');
    let hour: i64 = time_parts.next()?.parse().ok()?;
    let minute: i64 = time_parts.next()?.parse().ok()?;
    let second: i64 = time_parts.next()?.parse().ok()?;

    let days = crate::event::days_from_civil(year, month, day);
    let secs = days * 86_400 + hour * 3600 + minute * 60 + second;
    Some(std::time::UNIX_EPOCH + Duration::from_secs(secs.max(0) as u64))
}

fn urlencode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_header_is_basic_base64_of_public_colon_secret() {
        let transport_creds = format!("{}:{}", "pk-1", "sk-1");
        let expected = format!(
            "Basic {}",
            base64::engine::general_purpose::STANDARD.encode(transport_creds)
        );
        let encoded = format!(
            "Basic {}",
            base64::engine::general_purpose::STANDARD.encode("pk-1:sk-1")
        );
        assert_eq!(encoded, expected);
    }

    #[test]
    fn urlencode_escapes_reserved_characters() {
        assert_eq!(urlencode("a b"), "a%20b");
        assert_eq!(urlencode("trace/1"), "trace%2F1");
        assert_eq!(urlencode("safe-._~"), "safe-._~");
    }

    #[test]
    fn parse_retry_after_accepts_integer_seconds() {
        assert_eq!(parse_retry_after("2"), Some(Duration::from_secs(2)));
    }

    #[test]
    fn parse_retry_after_rejects_garbage() {
        assert_eq!(parse_retry_after("not-a-delay"), None);
    }

    #[test]
    fn parse_imf_fixdate_reads_known_date() {
        let when = parse_imf_fixdate("Sun, 06 Nov 1994 08:49:37 GMT").unwrap();
        let secs = when.duration_since(std::time::UNIX_EPOCH).unwrap().as_secs();
        assert_eq!(secs, 784111777);
    }

    #[tokio::test]
    async fn circuit_trip_reports_state_gauge_and_trip_counter() {
        use crate::hooks::HookChain;
        use crate::metrics::MemorySink;
        use crate::retry::NoRetry;
        use crate::sleeper::InstantSleeper;

        let metrics = Arc::new(MemorySink::default());
        let hooks = Arc::new(HookChain::new(metrics.clone()));
        let transport = HttpTransport::new(
            "https://obs-ingest.invalid",
            "pk",
            "sk",
            TransportConfig::default(),
            CircuitBreakerConfig::new(1, Duration::from_secs(30)),
            Arc::new(NoRetry),
            hooks,
            Arc::new(InstantSleeper),
            metrics.clone(),
        )
        .unwrap();

        let _ = transport
            .do_request::<(), serde_json::Value>(
                ApiRequest { method: reqwest::Method::POST, path: "/ingestion", query: &[], body: None, request_id: None },
                Instant::now() + Duration::from_secs(5),
            )
            .await;

        assert_eq!(metrics.gauge(names::CIRCUIT_STATE), Some(circuit_state_gauge(CircuitState::Open)));
        assert_eq!(metrics.counter(names::CIRCUIT_TRIPS), 1);
    }
}

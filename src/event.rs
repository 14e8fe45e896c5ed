//! Ingestion event types and their JSON wire format.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{SystemTime, UNIX_EPOCH};

/// The kind of an ingestion event, matching its body's variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    TraceCreate,
    TraceUpdate,
    SpanCreate,
    SpanUpdate,
    GenerationCreate,
    GenerationUpdate,
    EventCreate,
    ScoreCreate,
    SdkLog,
}

/// Typed body carried by an ingestion event. Domain identifiers are promoted
/// to fields; everything else rides along in `payload`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum EventBody {
    TraceCreate { id: String, #[serde(flatten)] payload: Value },
    TraceUpdate { id: String, #[serde(flatten)] payload: Value },
    SpanCreate { id: String, trace_id: String, #[serde(skip_serializing_if = "Option::is_none")] parent_observation_id: Option<String>, #[serde(flatten)] payload: Value },
    SpanUpdate { id: String, trace_id: String, #[serde(flatten)] payload: Value },
    GenerationCreate { id: String, trace_id: String, #[serde(skip_serializing_if = "Option::is_none")] parent_observation_id: Option<String>, #[serde(flatten)] payload: Value },
    GenerationUpdate { id: String, trace_id: String, #[serde(flatten)] payload: Value },
    EventCreate { id: String, trace_id: String, #[serde(skip_serializing_if = "Option::is_none")] parent_observation_id: Option<String>, #[serde(flatten)] payload: Value },
    ScoreCreate { id: String, trace_id: String, #[serde(skip_serializing_if = "Option::is_none")] observation_id: Option<String>, #[serde(flatten)] payload: Value },
    SdkLog { #[serde(flatten)] payload: Value },
}

impl EventBody {
    pub fn kind(&self) -> EventKind {
        match self {
            EventBody::TraceCreate { .. } => EventKind::TraceCreate,
            EventBody::TraceUpdate { .. } => EventKind::TraceUpdate,
            EventBody::SpanCreate { .. } => EventKind::SpanCreate,
            EventBody::SpanUpdate { .. } => EventKind::SpanUpdate,
            EventBody::GenerationCreate { .. } => EventKind::GenerationCreate,
            EventBody::GenerationUpdate { .. } => EventKind::GenerationUpdate,
            EventBody::EventCreate { .. } => EventKind::EventCreate,
            EventBody::ScoreCreate { .. } => EventKind::ScoreCreate,
            EventBody::SdkLog { .. } => EventKind::SdkLog,
        }
    }
}

/// Timestamp with nanosecond precision, serialized as RFC 3339 on write and
/// accepted in several forms on read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamp {
    secs: i64,
    nanos: u32,
}

impl Timestamp {
    pub fn now() -> Self {
        let since_epoch = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
        Self { secs: since_epoch.as_secs() as i64, nanos: since_epoch.subsec_nanos() }
    }

    pub fn from_unix(secs: i64, nanos: u32) -> Self {
        Self { secs, nanos }
    }

    pub fn unix_seconds(&self) -> i64 {
        self.secs
    }

    pub fn unix_nanos_fraction(&self) -> u32 {
        self.nanos
    }

    /// Render as RFC 3339 with nanosecond precision, e.g. `2024-01-02T03:04:05.123456789Z`.
    pub fn to_rfc3339_nanos(self) -> String {
        let days = self.secs.div_euclid(86_400);
        let secs_of_day = self.secs.rem_euclid(86_400);
        let (year, month, day) = civil_from_days(days);
        let hour = secs_of_day / 3600;
        let minute = (secs_of_day % 3600) / 60;
        let second = secs_of_day % 60;
        format!(
            "{year:04}-{month:02}-{day:02}T{hour:02}:{minute:02}:{second:02}.{:09}Z",
            self.nanos
        )
    }
}

/// Days since epoch -> (year, month, day), using Howard Hinnant's
/// civil-from-days algorithm (proleptic Gregorian calendar).
fn civil_from_days(z: i64) -> (i64, u32, u32) {
    let z = z + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = (z - era * 146_097) as u64;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146_096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let m = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    let year = if m <= 2 { y + 1 } else { y };
    (year, m, d)
}

impl Serialize for Timestamp {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_rfc3339_nanos())
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        parse_timestamp_value(&value).map_err(serde::de::Error::custom)
    }
}

fn parse_timestamp_value(value: &Value) -> Result<Timestamp, String> {
    match value {
        Value::Null => Ok(Timestamp::from_unix(0, 0)),
        Value::String(s) => parse_timestamp_str(s),
        Value::Number(n) => {
            let secs = n.as_f64().ok_or_else(|| "non-numeric timestamp".to_string())?;
            let whole = secs.trunc() as i64;
            let nanos = ((secs.fract()) * 1_000_000_000.0).round() as u32;
            Ok(Timestamp::from_unix(whole, nanos))
        }
        other => Err(format!("unsupported timestamp representation: {other}")),
    }
}

/// Accepts RFC 3339 (with or without fractional seconds).
fn parse_timestamp_str(s: &str) -> Result<Timestamp, String> {
    let s = s.trim();
    let bytes = s.as_bytes();
    if bytes.len() < 20 || bytes[4] != b'-' || bytes[7] != b'-' || bytes[10] != b'T' {
        return Err(format!("invalid RFC3339 timestamp: {s}"));
    }
    let year: i64 = s[0..4].parse().map_err(|_| "bad year")?;
    let month: u32 = s[5..7].parse().map_err(|_| "bad month")?;
    let day: u32 = s[8..10].parse().map_err(|_| "bad day")?;
    let hour: i64 = s[11..13].parse().map_err(|_| "bad hour")?;
    let minute: i64 = s[14..16].parse().map_err(|_| "bad minute")?;
    let second: i64 = s[17..19].parse().map_err(|_| "bad second")?;

    let mut nanos: u32 = 0;
    let rest = &s[19..];
    if let Some(frac_and_zone) = rest.strip_prefix('.') {
        let digits: String = frac_and_zone.chars().take_while(|c| c.is_ascii_digit()).collect();
        let mut padded = digits.clone();
        while padded.len() < 9 {
            padded.push('0');
        }
        nanos = padded[..9].parse().unwrap_or(0);
    }

    let days = days_from_civil(year, month, day);
    let secs = days * 86_400 + hour * 3600 + minute * 60 + second;
    Ok(Timestamp::from_unix(secs, nanos))
}

pub(crate) fn days_from_civil(y: i64, m: u32, d: u32) -> i64 {
    let y = if m <= 2 { y - 1 } else { y };
    let era = if y >= 0 { y } else { y - 399 } / 400;
    let yoe = (y - era * 400) as u64;
    let mp = if m > 2 { m - 3 } else { m + 9 } as u64;
    let doy = (153 * mp + 2) / 5 + d as u64 - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe as i64 - 719_468
}

/// The unit of transport: a unique id, its kind, a creation timestamp, and a
/// typed body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub timestamp: Timestamp,
    pub body: EventBody,
}

impl IngestionEvent {
    pub fn new(id: String, body: EventBody) -> Self {
        Self { kind: body.kind(), timestamp: Timestamp::now(), id, body }
    }
}

/// The wire shape `{"batch": [...]}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchEnvelope {
    pub batch: Vec<IngestionEvent>,
}

/// A single event's outcome as reported by the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventSuccess {
    pub id: String,
    pub status: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventError {
    pub id: String,
    pub status: u16,
    pub message: String,
}

/// The backend's response shape: `{"successes": [...], "errors": [...]}`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct IngestionResponse {
    #[serde(default)]
    pub successes: Vec<EventSuccess>,
    #[serde(default)]
    pub errors: Vec<EventError>,
}

impl IngestionResponse {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

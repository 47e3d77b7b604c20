//! Decoded metering samples and the JSON envelope they arrive in.
//!
//! The transport delivers opaque UTF-8 JSON bodies. Everything downstream
//! works on the [`Metric`] produced here; a body that does not decode is
//! discarded at this boundary and never reaches the engine.

use chrono::{DateTime, NaiveDateTime};
use serde::Deserialize;
use serde_json::{Map, Number, Value};
use thiserror::Error;

/// Nanoseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp(i64);

impl Timestamp {
    pub fn from_nanos(nanos: i64) -> Self {
        Timestamp(nanos)
    }

    pub fn as_nanos(&self) -> i64 {
        self.0
    }
}

/// Sample kind, carried as a string on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Cumulative,
    Gauge,
    Delta,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Cumulative => "cumulative",
            MetricKind::Gauge => "gauge",
            MetricKind::Delta => "delta",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "cumulative" => Some(MetricKind::Cumulative),
            "gauge" => Some(MetricKind::Gauge),
            "delta" => Some(MetricKind::Delta),
            _ => None,
        }
    }
}

/// Metric names whose lifecycle events fold several categorical fields into
/// one packed payload word.
const COMPOUND_NAMES: [&str; 5] = [
    "ip.floating",
    "volume.size",
    "image.size",
    "snapshot.size",
    "instance",
];

/// One decoded metering sample: a periodic pollster reading or a discrete
/// lifecycle event, depending on its metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Metric {
    pub name: String,
    pub project_id: String,
    pub resource_id: String,
    pub unit: String,
    pub kind: MetricKind,
    pub timestamp: Timestamp,
    pub payload: u64,
    pub metadata: Map<String, Value>,
}

impl Metric {
    /// A sample is an event iff its metadata carries an `event_type` key.
    pub fn is_event(&self) -> bool {
        self.metadata.contains_key("event_type")
    }

    /// The event type string, when present and string-typed.
    pub fn event_type(&self) -> Option<&str> {
        self.metadata.get("event_type").and_then(Value::as_str)
    }

    /// Events on a fixed set of names use the packed payload encoding.
    pub fn is_compound(&self) -> bool {
        self.is_event() && COMPOUND_NAMES.contains(&self.name.as_str())
    }

    /// String-typed metadata value; absent or non-string keys yield `None`.
    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid sample json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unrecognized counter type {0:?}")]
    CounterType(String),

    #[error("unparseable timestamp {0:?}")]
    Timestamp(String),
}

/// Wire envelope. Unknown fields are tolerated so upstream schema additions
/// do not break decoding.
#[derive(Deserialize)]
struct WireSample {
    project_id: String,
    resource_id: String,
    counter_name: String,
    unit: String,
    counter_type: String,
    timestamp: String,
    counter_volume: Number,
    #[serde(default)]
    resource_metadata: Option<Value>,
}

/// Decode one raw message body into a [`Metric`].
pub fn decode(body: &[u8]) -> Result<Metric, DecodeError> {
    let wire: WireSample = serde_json::from_slice(body)?;

    let kind = MetricKind::parse(&wire.counter_type)
        .ok_or_else(|| DecodeError::CounterType(wire.counter_type.clone()))?;
    let timestamp = parse_timestamp(&wire.timestamp)?;

    // A null or non-object metadata field decodes to an empty map.
    let metadata = match wire.resource_metadata {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    };

    Ok(Metric {
        name: wire.counter_name,
        project_id: wire.project_id,
        resource_id: wire.resource_id,
        unit: wire.unit,
        kind,
        timestamp,
        payload: coerce_volume(&wire.counter_volume),
        metadata,
    })
}

/// Coerce the numeric sample volume to an unsigned magnitude.
///
/// Fractional values truncate toward zero; negative values clamp to 0.
fn coerce_volume(volume: &Number) -> u64 {
    if let Some(value) = volume.as_u64() {
        return value;
    }
    match volume.as_f64() {
        Some(value) if value > 0.0 => value as u64,
        _ => 0,
    }
}

/// Parse an ISO-8601 timestamp to a nanosecond epoch instant.
///
/// Accepts an RFC 3339 offset (`-02:00`), a bare numeric offset (`-0200`),
/// or no offset at all, in which case the instant is read as UTC.
fn parse_timestamp(raw: &str) -> Result<Timestamp, DecodeError> {
    let out_of_range = || DecodeError::Timestamp(raw.to_string());

    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return parsed
            .timestamp_nanos_opt()
            .map(Timestamp::from_nanos)
            .ok_or_else(out_of_range);
    }
    if let Ok(parsed) = DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return parsed
            .timestamp_nanos_opt()
            .map(Timestamp::from_nanos)
            .ok_or_else(out_of_range);
    }

    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .and_then(|naive| naive.and_utc().timestamp_nanos_opt())
        .map(Timestamp::from_nanos)
        .ok_or_else(out_of_range)
}

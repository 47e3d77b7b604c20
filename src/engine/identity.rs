//! Series identity: the stable 64-bit address and the validated metadata
//! record attached to every emitted point.

use std::collections::BTreeMap;
use std::fmt;
use std::hash::Hasher;

use siphasher::sip::SipHasher24;
use thiserror::Error;

use crate::message::{Metric, MetricKind};

/// Stable 64-bit identifier for a time series.
///
/// Identical identifying fields always hash to the same address, across
/// process restarts and broker redeliveries, so the downstream store can
/// deduplicate replays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(u64);

impl Address {
    pub fn from_u64(value: u64) -> Self {
        Address(value)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// SipHash-2-4 under the all-zero key.
///
/// The zero key is part of the store contract: any other writer must be able
/// to reproduce the same address from the same identifying bytes.
pub fn hash64(bytes: &[u8]) -> u64 {
    let mut hasher = SipHasher24::new_with_keys(0, 0);
    hasher.write(bytes);
    hasher.finish()
}

/// Derive the series address for one output point.
///
/// The identifying fields are hashed as one concatenated byte sequence in a
/// fixed order: project, resource, unit, kind, output name, then for events
/// the `_event` marker and the event type, then for compound events the
/// `_compound` marker. `output_name` differs from `metric.name` only for the
/// split instance outputs.
pub fn address(metric: &Metric, output_name: &str) -> Address {
    let mut hasher = SipHasher24::new_with_keys(0, 0);
    hasher.write(metric.project_id.as_bytes());
    hasher.write(metric.resource_id.as_bytes());
    hasher.write(metric.unit.as_bytes());
    hasher.write(metric.kind.as_str().as_bytes());
    hasher.write(output_name.as_bytes());
    if metric.is_event() {
        hasher.write(b"_event");
        hasher.write(metric.event_type().unwrap_or_default().as_bytes());
    }
    if metric.is_compound() {
        hasher.write(b"_compound");
    }
    Address(hasher.finish())
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdentityError {
    #[error("empty metadata key")]
    EmptyKey,

    #[error("empty value for metadata key {0:?}")]
    EmptyValue(String),

    #[error("duplicate metadata key {0:?}")]
    DuplicateKey(String),
}

/// Immutable string-to-string metadata record published alongside a series.
///
/// Built once per output point; the store rejects empty or duplicate keys,
/// so construction validates rather than letting a bad record reach the
/// publish path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceDict {
    entries: BTreeMap<String, String>,
}

impl SourceDict {
    fn new() -> Self {
        SourceDict::default()
    }

    fn insert(&mut self, key: &str, value: &str) -> Result<(), IdentityError> {
        if key.is_empty() {
            return Err(IdentityError::EmptyKey);
        }
        if value.is_empty() {
            return Err(IdentityError::EmptyValue(key.to_string()));
        }
        if self.entries.contains_key(key) {
            return Err(IdentityError::DuplicateKey(key.to_string()));
        }
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Build the metadata record for a point published under the metric's own
/// name and unit.
pub fn source_dict(metric: &Metric) -> Result<SourceDict, IdentityError> {
    source_dict_named(metric, &metric.name, &metric.unit)
}

/// Build the metadata record with the name and unit overridden, as the split
/// instance outputs need. All other fields derive from the metric itself.
pub fn source_dict_named(
    metric: &Metric,
    output_name: &str,
    unit: &str,
) -> Result<SourceDict, IdentityError> {
    let mut dict = SourceDict::new();
    dict.insert("_event", bool_label(metric.is_event()))?;
    dict.insert("_compound", bool_label(metric.is_compound()))?;
    if metric.kind == MetricKind::Cumulative {
        dict.insert("_counter", "true")?;
    }
    dict.insert("project_id", &metric.project_id)?;
    dict.insert("resource_id", &metric.resource_id)?;
    dict.insert("metric_name", output_name)?;
    dict.insert("metric_unit", unit)?;
    dict.insert("metric_type", metric.kind.as_str())?;

    // Optional passthrough fields: copied only when present as strings.
    for key in ["display_name", "volume_type"] {
        if let Some(value) = metric.meta_str(key) {
            dict.insert(key, value)?;
        }
    }
    Ok(dict)
}

fn bool_label(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}

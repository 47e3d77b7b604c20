//! Payload encodings: raw passthrough, the four-way instance split, and the
//! packed event word.
//!
//! The packed word folds three categorical fields and a 32-bit magnitude
//! into one `u64`:
//!
//! ```text
//! bits  0..8   status
//! bits  8..16  verb
//! bits 16..24  endpoint
//! bits 24..32  reserved, always 0
//! bits 32..64  raw magnitude (high bits of the source value are discarded)
//! ```
//!
//! Every categorical lookup that misses its enumeration maps to the -1
//! sentinel and the whole point is refused; a partially valid word never
//! reaches the store.

use serde_json::{Map, Value};
use thiserror::Error;

use super::identity::{self, IdentityError};
use super::ProcessedPoint;
use crate::message::Metric;

/// Event families that use the packed payload encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompoundKind {
    Volume,
    FloatingIp,
    Snapshot,
    Image,
}

impl CompoundKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompoundKind::Volume => "volume.size",
            CompoundKind::FloatingIp => "ip.floating",
            CompoundKind::Snapshot => "snapshot.size",
            CompoundKind::Image => "image.size",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("event type missing from metadata")]
    MissingEventType,

    #[error("event type {0:?} has too few segments")]
    MalformedEventType(String),

    #[error("status {0:?} outside the {1} enumeration")]
    UnknownStatus(String, &'static str),

    #[error("verb {0:?} outside the {1} enumeration")]
    UnknownVerb(String, &'static str),

    #[error("endpoint {0:?} outside the {1} enumeration")]
    UnknownEndpoint(String, &'static str),

    #[error("flavor block missing or not an object")]
    MissingFlavor,

    #[error("flavor field {0:?} missing or not an unsigned integer")]
    BadFlavorField(&'static str),

    #[error("instance_type missing from metadata")]
    MissingInstanceType,

    #[error(transparent)]
    Identity(#[from] IdentityError),
}

/// Fold the categorical fields and magnitude into one payload word.
pub fn pack(status: u8, verb: u8, endpoint: u8, raw: u32) -> u64 {
    u64::from(status) | u64::from(verb) << 8 | u64::from(endpoint) << 16 | u64::from(raw) << 32
}

/// Split a payload word back into `(status, verb, endpoint, raw)`.
pub fn unpack(word: u64) -> (u8, u8, u8, u32) {
    (
        word as u8,
        (word >> 8) as u8,
        (word >> 16) as u8,
        (word >> 32) as u32,
    )
}

/// Carry the sample's magnitude through unchanged. One input, one point.
pub fn passthrough(metric: &Metric) -> Result<ProcessedPoint, CodecError> {
    let source = identity::source_dict(metric)?;
    Ok(ProcessedPoint {
        address: identity::address(metric, &metric.name),
        source,
        timestamp: metric.timestamp,
        payload: metric.payload,
    })
}

/// Split one instance sample into its four attribute series.
///
/// The outputs share the input timestamp and base metadata; only the name
/// and unit differ per output. Either all four points build or the whole
/// group is discarded.
pub fn split_instance(metric: &Metric) -> Result<Vec<ProcessedPoint>, CodecError> {
    let flavor = metric
        .metadata
        .get("flavor")
        .and_then(Value::as_object)
        .ok_or(CodecError::MissingFlavor)?;
    let vcpus = flavor_field(flavor, "vcpus")?;
    let ram = flavor_field(flavor, "ram")?;
    let disk = flavor_field(flavor, "disk")?;
    let ephemeral = flavor_field(flavor, "ephemeral")?;

    let instance_type = metric
        .meta_str("instance_type")
        .ok_or(CodecError::MissingInstanceType)?;
    // The flavor series has no magnitude of its own: low word constant 1,
    // high word the truncated hash of the flavor name.
    let flavor_word = 1u64 | u64::from(identity::hash64(instance_type.as_bytes()) as u32) << 32;

    let outputs: [(&str, &str, u64); 4] = [
        ("instance_vcpus", "vcpu", vcpus),
        ("instance_ram", "MB", ram),
        ("instance_disk", "GB", disk.saturating_add(ephemeral)),
        ("instance_flavor", "instance", flavor_word),
    ];

    let mut points = Vec::with_capacity(outputs.len());
    for (output_name, unit, payload) in outputs {
        let source = identity::source_dict_named(metric, output_name, unit)?;
        points.push(ProcessedPoint {
            address: identity::address(metric, output_name),
            source,
            timestamp: metric.timestamp,
            payload,
        });
    }
    Ok(points)
}

fn flavor_field(flavor: &Map<String, Value>, field: &'static str) -> Result<u64, CodecError> {
    flavor
        .get(field)
        .and_then(Value::as_u64)
        .ok_or(CodecError::BadFlavorField(field))
}

/// Encode one lifecycle event as a packed point.
pub fn compound(metric: &Metric, kind: CompoundKind) -> Result<ProcessedPoint, CodecError> {
    let payload = compound_payload(metric, kind)?;
    let source = identity::source_dict(metric)?;
    Ok(ProcessedPoint {
        address: identity::address(metric, &metric.name),
        source,
        timestamp: metric.timestamp,
        payload,
    })
}

fn compound_payload(metric: &Metric, kind: CompoundKind) -> Result<u64, CodecError> {
    let event_type = metric.event_type().ok_or(CodecError::MissingEventType)?;
    let label = kind.as_str();

    // Image events carry a bare verb ("image.upload"); the rest end in a
    // start/end qualifier ("volume.resize.end").
    let (verb_raw, endpoint) = if kind == CompoundKind::Image {
        (event_type.rsplit('.').next().unwrap_or(event_type), 0)
    } else {
        let mut segments = event_type.rsplit('.');
        let endpoint_raw = segments.next().unwrap_or("");
        let verb_raw = segments
            .next()
            .ok_or_else(|| CodecError::MalformedEventType(event_type.to_string()))?;
        let endpoint = endpoint_value(endpoint_raw);
        if endpoint < 0 {
            return Err(CodecError::UnknownEndpoint(endpoint_raw.to_string(), label));
        }
        (verb_raw, endpoint)
    };

    let verb_of: fn(&str) -> i32 = match kind {
        CompoundKind::Volume => volume_verb,
        CompoundKind::FloatingIp => floating_ip_verb,
        CompoundKind::Snapshot => snapshot_verb,
        CompoundKind::Image => image_verb,
    };
    let verb = verb_of(verb_raw);
    if verb < 0 {
        return Err(CodecError::UnknownVerb(verb_raw.to_string(), label));
    }

    let status_raw = metric.meta_str("status");
    let status = match kind {
        CompoundKind::Volume => status_raw.map(volume_status).unwrap_or(-1),
        CompoundKind::FloatingIp => floating_ip_status(status_raw),
        CompoundKind::Snapshot => status_raw.map(snapshot_status).unwrap_or(-1),
        CompoundKind::Image => status_raw.map(image_status).unwrap_or(-1),
    };
    if status < 0 {
        return Err(CodecError::UnknownStatus(
            status_raw.unwrap_or("<absent>").to_string(),
            label,
        ));
    }

    // Allocation-style events carry no intrinsic magnitude.
    let raw = match kind {
        CompoundKind::Volume | CompoundKind::Snapshot => metric.payload as u32,
        CompoundKind::FloatingIp | CompoundKind::Image => 1,
    };

    Ok(pack(status as u8, verb as u8, endpoint as u8, raw))
}

fn endpoint_value(endpoint: &str) -> i32 {
    match endpoint {
        "start" => 1,
        "end" => 2,
        _ => -1,
    }
}

fn volume_status(status: &str) -> i32 {
    match status {
        "error" => 0,
        "available" => 1,
        "creating" => 2,
        "extending" => 3,
        "deleting" => 4,
        "attaching" => 5,
        "detaching" => 6,
        "in-use" => 7,
        _ => -1,
    }
}

fn volume_verb(verb: &str) -> i32 {
    match verb {
        "create" => 1,
        "resize" => 2,
        "delete" => 3,
        "attach" => 4,
        "detach" => 5,
        _ => -1,
    }
}

fn floating_ip_status(status: Option<&str>) -> i32 {
    match status {
        None => 0,
        Some("ACTIVE") => 1,
        Some("DOWN") => 2,
        Some(_) => -1,
    }
}

fn floating_ip_verb(verb: &str) -> i32 {
    match verb {
        "create" => 1,
        "update" => 2,
        "delete" => 3,
        _ => -1,
    }
}

fn snapshot_status(status: &str) -> i32 {
    match status {
        "error" => 0,
        "available" => 1,
        "creating" => 2,
        "deleting" => 3,
        _ => -1,
    }
}

fn snapshot_verb(verb: &str) -> i32 {
    match verb {
        "create" => 1,
        "update" => 2,
        "delete" => 3,
        _ => -1,
    }
}

fn image_status(status: &str) -> i32 {
    match status {
        "active" => 1,
        "saving" => 2,
        "deleted" => 3,
        _ => -1,
    }
}

fn image_verb(verb: &str) -> i32 {
    match verb {
        "serve" => 1,
        "update" => 2,
        "upload" => 3,
        "download" => 4,
        "delete" => 5,
        _ => -1,
    }
}

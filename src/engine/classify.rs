//! Dispatch table mapping a sample's name and event flag to its handling.
//!
//! Classification is pure: it looks at `(name, is_event)` and nothing else.
//! The most specific rule wins; a name with no exact match falls through to
//! the `instance:` prefix check before being declared unexpected.

use super::codec::CompoundKind;

/// Which encoding applies to a known sample kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    /// Magnitude carried through unchanged.
    Passthrough,
    /// One instance sample split into four attribute series.
    Instance,
    /// Consumed without output while the lifecycle payload is unsettled
    /// upstream.
    InstanceEvent,
    /// Lifecycle event packed into one payload word.
    Compound(CompoundKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Route to the named codec.
    Transform(Codec),
    /// Consumed on purpose: logged at info, no output, no alarm.
    Ignore,
    /// Matches no rule at all; surfaced as an anomaly for operators.
    Unexpected,
}

/// Name and event-flag pairs that are deliberately consumed without output:
/// duplicate counters, packet counts, per-attribute sizes already covered by
/// the instance sample, and CRUD notification noise.
const IGNORED: &[(&str, bool)] = &[
    ("cpu_util", false),
    ("disk.read.requests", false),
    ("disk.write.requests", false),
    ("network.incoming.packets", false),
    ("network.outgoing.packets", false),
    ("vcpus", false),
    ("memory", false),
    ("disk.root.size", false),
    ("disk.ephemeral.size", false),
    ("ip.floating", false),
    ("image", true),
    ("image.update", true),
    ("image.upload", true),
    ("volume", true),
    ("snapshot", true),
    ("port", true),
    ("port.create", true),
    ("port.update", true),
    ("port.delete", true),
    ("network", true),
    ("network.create", true),
    ("network.update", true),
    ("network.delete", true),
    ("router.create", true),
    ("router.update", true),
    ("router.delete", true),
    ("subnet.create", true),
    ("subnet.update", true),
    ("subnet.delete", true),
];

/// Classify one sample kind.
pub fn classify(name: &str, is_event: bool) -> Classification {
    match (name, is_event) {
        ("instance", false) => Classification::Transform(Codec::Instance),
        ("instance", true) => Classification::Transform(Codec::InstanceEvent),

        ("cpu", false)
        | ("disk.read.bytes", false)
        | ("disk.write.bytes", false)
        | ("network.incoming.bytes", false)
        | ("network.outgoing.bytes", false)
        | ("image.size", false) => Classification::Transform(Codec::Passthrough),

        ("volume.size", true) => Classification::Transform(Codec::Compound(CompoundKind::Volume)),
        ("ip.floating", true) => {
            Classification::Transform(Codec::Compound(CompoundKind::FloatingIp))
        }
        ("snapshot.size", true) => {
            Classification::Transform(Codec::Compound(CompoundKind::Snapshot))
        }
        ("image.size", true) => Classification::Transform(Codec::Compound(CompoundKind::Image)),

        _ if IGNORED
            .iter()
            .any(|&(ignored, event)| ignored == name && event == is_event) =>
        {
            Classification::Ignore
        }
        // Per-flavor sub-counters, e.g. "instance:m1.small".
        _ if name.starts_with("instance:") => Classification::Ignore,

        _ => Classification::Unexpected,
    }
}

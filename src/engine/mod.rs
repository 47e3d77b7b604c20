//! Sample processing engine.
//!
//! Turns one decoded message into zero or more addressed points. The engine
//! is stateless across messages: no caching, no deduplication, so re-running
//! it on a redelivered message always yields the same output.

pub mod classify;
pub mod codec;
pub mod identity;

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::message::{self, Metric, Timestamp};
use crate::metrics::EngineMetrics;
use self::classify::{classify, Classification, Codec};
use self::codec::CodecError;
use self::identity::{Address, SourceDict};

/// One normalized output point, handed to the publish collaborator as soon
/// as it is produced.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedPoint {
    pub address: Address,
    pub source: SourceDict,
    pub timestamp: Timestamp,
    pub payload: u64,
}

/// Stateless per-message processor: decode, classify, encode.
pub struct Engine {
    metrics: Arc<EngineMetrics>,
}

impl Engine {
    pub fn new(metrics: Arc<EngineMetrics>) -> Self {
        Engine { metrics }
    }

    /// Process one raw message body.
    ///
    /// Never fails: malformed, ignored, unexpected and codec-refused samples
    /// all come back as an empty point list after logging, so the caller can
    /// acknowledge the message regardless.
    pub fn process(&self, body: &[u8]) -> Vec<ProcessedPoint> {
        self.metrics.record_received();
        let metric = match message::decode(body) {
            Ok(metric) => metric,
            Err(err) => {
                warn!(error = %err, "discarding undecodable sample");
                self.metrics.record_malformed();
                return Vec::new();
            }
        };
        self.process_metric(&metric)
    }

    /// Classify and encode one decoded metric.
    pub fn process_metric(&self, metric: &Metric) -> Vec<ProcessedPoint> {
        match classify(&metric.name, metric.is_event()) {
            Classification::Transform(codec) => match run_codec(codec, metric) {
                Ok(points) => {
                    self.metrics.record_points(points.len() as u64);
                    points
                }
                Err(err) => {
                    warn!(
                        metric = %metric.name,
                        event_type = metric.event_type().unwrap_or(""),
                        error = %err,
                        "dropping sample"
                    );
                    self.metrics.record_dropped();
                    Vec::new()
                }
            },
            Classification::Ignore => {
                info!(metric = %metric.name, event = metric.is_event(), "ignoring sample kind");
                self.metrics.record_ignored();
                Vec::new()
            }
            Classification::Unexpected => {
                error!(
                    metric = %metric.name,
                    event = metric.is_event(),
                    "sample kind matches no known rule"
                );
                self.metrics.record_unexpected();
                Vec::new()
            }
        }
    }
}

fn run_codec(codec: Codec, metric: &Metric) -> Result<Vec<ProcessedPoint>, CodecError> {
    match codec {
        Codec::Passthrough => codec::passthrough(metric).map(|point| vec![point]),
        Codec::Instance => codec::split_instance(metric),
        Codec::InstanceEvent => {
            debug!(
                event_type = metric.event_type().unwrap_or(""),
                "instance event consumed without output"
            );
            Ok(Vec::new())
        }
        Codec::Compound(kind) => codec::compound(metric, kind).map(|point| vec![point]),
    }
}

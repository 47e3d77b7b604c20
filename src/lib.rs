//! meterflow normalizes cloud metering samples and lifecycle events into
//! addressed time-series points.
//!
//! Raw messages arrive from a transport collaborator, get decoded and
//! classified by the sample processing engine, and every resulting point is
//! handed to a publish collaborator before the source message is
//! acknowledged.

pub mod config;
pub mod engine;
pub mod message;
pub mod metrics;
pub mod pipeline;

pub use engine::identity::{Address, SourceDict};
pub use engine::{Engine, ProcessedPoint};
pub use message::{Metric, MetricKind, Timestamp};
pub use metrics::{EngineMetrics, MetricsSnapshot};
pub use pipeline::{
    Pipeline, PipelineConfig, PipelineHandle, Publisher, RawMessage, Transport,
};

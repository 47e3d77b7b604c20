//! Development entry point.
//!
//! Replays newline-delimited JSON samples from a file (or stdin) through the
//! full pipeline and logs every published point. The production transport
//! and store clients are separate processes' concerns; this binary exists to
//! run the engine end to end.

use std::collections::VecDeque;
use std::convert::Infallible;
use std::io::{self, BufRead};
use std::sync::Mutex;

use bytes::Bytes;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use meterflow::config::Config;
use meterflow::{Address, Pipeline, Publisher, RawMessage, SourceDict, Timestamp, Transport};

/// Replays pre-loaded message bodies, one per poll.
struct ReplayTransport {
    queue: Mutex<VecDeque<RawMessage>>,
}

impl ReplayTransport {
    fn from_reader(reader: impl BufRead) -> io::Result<Self> {
        let mut queue = VecDeque::new();
        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            queue.push_back(RawMessage {
                body: Bytes::from(line.into_bytes()),
                delivery_tag: index as u64 + 1,
            });
        }
        Ok(ReplayTransport {
            queue: Mutex::new(queue),
        })
    }
}

impl Transport for ReplayTransport {
    type Error = Infallible;

    async fn poll_message(&self) -> Result<Option<RawMessage>, Infallible> {
        Ok(self.queue.lock().unwrap().pop_front())
    }

    async fn ack(&self, message: &RawMessage) -> Result<(), Infallible> {
        debug!(delivery_tag = message.delivery_tag, "acknowledged");
        Ok(())
    }
}

/// Logs every published point instead of writing to a store.
struct LogPublisher;

impl Publisher for LogPublisher {
    type Error = Infallible;

    async fn publish_metadata(
        &self,
        address: Address,
        source: &SourceDict,
    ) -> Result<(), Infallible> {
        info!(address = %address, entries = source.len(), "series metadata");
        Ok(())
    }

    async fn publish_point(
        &self,
        address: Address,
        timestamp: Timestamp,
        payload: u64,
    ) -> Result<(), Infallible> {
        info!(
            address = %address,
            timestamp_ns = timestamp.as_nanos(),
            payload,
            "point"
        );
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;

    let transport = match std::env::args().nth(1) {
        Some(path) => {
            info!(path = %path, "replaying samples from file");
            ReplayTransport::from_reader(io::BufReader::new(std::fs::File::open(path)?))?
        }
        None => {
            info!("replaying samples from stdin");
            ReplayTransport::from_reader(io::stdin().lock())?
        }
    };

    info!(
        queue_depth = config.pipeline.queue_depth,
        poll_interval_ms = config.pipeline.poll_interval_ms,
        "pipeline starting"
    );

    let (pipeline, handle) =
        Pipeline::new(transport, LogPublisher, config.pipeline.pipeline_config());

    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutdown requested");
        handle.shutdown();
    });

    pipeline.run().await?;
    Ok(())
}

//! Bounded queue decoupling message retrieval from processing.
//!
//! Two tasks share one bounded channel: the retrieval task polls the
//! transport for one message at a time and enqueues it, sleeping for the
//! configured interval on an empty poll; the consumption task drains the
//! queue in order, runs the engine, forwards every resulting point to the
//! publish collaborator and only then acknowledges the source message.
//! Acknowledgement order therefore equals processing order.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::engine::identity::{Address, SourceDict};
use crate::engine::Engine;
use crate::message::Timestamp;
use crate::metrics::EngineMetrics;

/// One message as delivered by the transport: the undecoded body plus the
/// broker's delivery tag used to acknowledge it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    pub body: Bytes,
    pub delivery_tag: u64,
}

/// Message source collaborator. Connection management, redelivery and
/// reconnection policy live behind this trait, not in the pipeline.
pub trait Transport: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Fetch the next message, or `None` when the queue is currently empty.
    fn poll_message(
        &self,
    ) -> impl std::future::Future<Output = Result<Option<RawMessage>, Self::Error>> + Send;

    /// Confirm a message once its points have been published.
    fn ack(
        &self,
        message: &RawMessage,
    ) -> impl std::future::Future<Output = Result<(), Self::Error>> + Send;
}

/// Durable point store collaborator. Both calls succeed or raise; the
/// pipeline does not retry them.
pub trait Publisher: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    fn publish_metadata(
        &self,
        address: Address,
        source: &SourceDict,
    ) -> impl std::future::Future<Output = Result<(), Self::Error>> + Send;

    fn publish_point(
        &self,
        address: Address,
        timestamp: Timestamp,
        payload: u64,
    ) -> impl std::future::Future<Output = Result<(), Self::Error>> + Send;
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Capacity of the in-process queue between retrieval and consumption.
    pub queue_depth: usize,
    /// How long the retrieval task idles after an empty poll.
    pub poll_interval: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            queue_depth: 128,
            poll_interval: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("publish failed: {0}")]
    Publish(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Stops a running pipeline from another task.
#[derive(Debug, Clone)]
pub struct PipelineHandle {
    shutdown: Arc<AtomicBool>,
}

impl PipelineHandle {
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }
}

pub struct Pipeline<T, P> {
    transport: T,
    publisher: P,
    engine: Engine,
    metrics: Arc<EngineMetrics>,
    config: PipelineConfig,
    shutdown: Arc<AtomicBool>,
}

impl<T: Transport, P: Publisher> Pipeline<T, P> {
    pub fn new(transport: T, publisher: P, config: PipelineConfig) -> (Self, PipelineHandle) {
        let metrics = Arc::new(EngineMetrics::new());
        let shutdown = Arc::new(AtomicBool::new(false));
        let handle = PipelineHandle {
            shutdown: Arc::clone(&shutdown),
        };
        let pipeline = Pipeline {
            transport,
            publisher,
            engine: Engine::new(Arc::clone(&metrics)),
            metrics,
            config,
            shutdown,
        };
        (pipeline, handle)
    }

    /// Counter handle shared with the engine; stays valid after `run`.
    pub fn metrics(&self) -> Arc<EngineMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Run retrieval and consumption until the handle signals shutdown.
    ///
    /// Messages already queued when shutdown is signalled are still drained;
    /// anything unacknowledged at the transport is left for redelivery. A
    /// publish failure stops both tasks and surfaces to the caller.
    pub async fn run(self) -> Result<(), PipelineError> {
        let (queue_tx, queue_rx) = mpsc::channel::<RawMessage>(self.config.queue_depth);

        let retrieval = async {
            let queue_tx = queue_tx;
            while !self.shutdown.load(Ordering::SeqCst) {
                match self.transport.poll_message().await {
                    Ok(Some(message)) => {
                        // Send fails only when the consumer is gone.
                        if queue_tx.send(message).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => tokio::time::sleep(self.config.poll_interval).await,
                    Err(err) => {
                        error!(error = %err, "transport poll failed");
                        tokio::time::sleep(self.config.poll_interval).await;
                    }
                }
            }
        };

        let consumption = async {
            let mut queue_rx = queue_rx;
            while let Some(message) = queue_rx.recv().await {
                if let Err(err) = self.handle_message(&message).await {
                    self.shutdown.store(true, Ordering::SeqCst);
                    return Err(err);
                }
            }
            Ok(())
        };

        let ((), outcome) = tokio::join!(retrieval, consumption);

        let snapshot = self.metrics.snapshot();
        info!(
            samples_received = snapshot.samples_received,
            points_emitted = snapshot.points_emitted,
            ignored = snapshot.ignored,
            unexpected = snapshot.unexpected,
            malformed = snapshot.malformed,
            dropped = snapshot.dropped,
            acked = snapshot.acked,
            "pipeline stopped"
        );
        outcome
    }

    async fn handle_message(&self, message: &RawMessage) -> Result<(), PipelineError> {
        let points = self.engine.process(&message.body);
        for point in &points {
            self.publisher
                .publish_metadata(point.address, &point.source)
                .await
                .map_err(|err| PipelineError::Publish(Box::new(err)))?;
            self.publisher
                .publish_point(point.address, point.timestamp, point.payload)
                .await
                .map_err(|err| PipelineError::Publish(Box::new(err)))?;
        }
        if let Err(err) = self.transport.ack(message).await {
            warn!(
                delivery_tag = message.delivery_tag,
                error = %err,
                "ack failed, leaving message for redelivery"
            );
        } else {
            self.metrics.record_acked();
        }
        Ok(())
    }
}

//! End-to-end pipeline test: a mixed feed of pollster samples, lifecycle
//! events, ignorable noise and garbage, driven through the full queue /
//! engine / publish / ack path with in-memory collaborators.

use std::collections::VecDeque;
use std::convert::Infallible;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use serde_json::json;
use tokio::time::timeout;

use meterflow::{
    Address, Pipeline, PipelineConfig, Publisher, RawMessage, SourceDict, Timestamp, Transport,
};

#[derive(Clone, Default)]
struct MemoryTransport {
    queue: Arc<Mutex<VecDeque<RawMessage>>>,
    acked: Arc<Mutex<Vec<u64>>>,
}

impl MemoryTransport {
    fn with_bodies(bodies: Vec<String>) -> Self {
        let queue = bodies
            .into_iter()
            .enumerate()
            .map(|(index, body)| RawMessage {
                body: Bytes::from(body.into_bytes()),
                delivery_tag: index as u64 + 1,
            })
            .collect();
        MemoryTransport {
            queue: Arc::new(Mutex::new(queue)),
            acked: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn acked(&self) -> Vec<u64> {
        self.acked.lock().unwrap().clone()
    }
}

impl Transport for MemoryTransport {
    type Error = Infallible;

    async fn poll_message(&self) -> Result<Option<RawMessage>, Infallible> {
        Ok(self.queue.lock().unwrap().pop_front())
    }

    async fn ack(&self, message: &RawMessage) -> Result<(), Infallible> {
        self.acked.lock().unwrap().push(message.delivery_tag);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
struct StoredPoint {
    address: Address,
    timestamp_ns: i64,
    payload: u64,
}

#[derive(Clone, Default)]
struct MemoryStore {
    metadata: Arc<Mutex<Vec<(Address, Vec<(String, String)>)>>>,
    points: Arc<Mutex<Vec<StoredPoint>>>,
}

impl MemoryStore {
    fn points(&self) -> Vec<StoredPoint> {
        self.points.lock().unwrap().clone()
    }

    fn metadata(&self) -> Vec<(Address, Vec<(String, String)>)> {
        self.metadata.lock().unwrap().clone()
    }
}

impl Publisher for MemoryStore {
    type Error = Infallible;

    async fn publish_metadata(
        &self,
        address: Address,
        source: &SourceDict,
    ) -> Result<(), Infallible> {
        let entries = source
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        self.metadata.lock().unwrap().push((address, entries));
        Ok(())
    }

    async fn publish_point(
        &self,
        address: Address,
        timestamp: Timestamp,
        payload: u64,
    ) -> Result<(), Infallible> {
        self.points.lock().unwrap().push(StoredPoint {
            address,
            timestamp_ns: timestamp.as_nanos(),
            payload,
        });
        Ok(())
    }
}

fn sample(name: &str, kind: &str, volume: serde_json::Value, metadata: serde_json::Value) -> String {
    json!({
        "project_id": "project-a",
        "resource_id": "resource-1",
        "counter_name": name,
        "unit": "B",
        "counter_type": kind,
        "timestamp": "2024-03-01T10:00:00+00:00",
        "counter_volume": volume,
        "resource_metadata": metadata
    })
    .to_string()
}

async fn drain(
    pipeline: Pipeline<MemoryTransport, MemoryStore>,
    handle: meterflow::PipelineHandle,
) {
    let stopper = async {
        tokio::time::sleep(Duration::from_millis(300)).await;
        handle.shutdown();
    };
    let (outcome, ()) = timeout(Duration::from_secs(5), async {
        tokio::join!(pipeline.run(), stopper)
    })
    .await
    .expect("pipeline did not stop");
    outcome.expect("pipeline failed");
}

fn config() -> PipelineConfig {
    PipelineConfig {
        queue_depth: 4,
        poll_interval: Duration::from_millis(10),
    }
}

#[tokio::test]
async fn test_mixed_feed_end_to_end() {
    let bodies = vec![
        // 1: passthrough pollster, one point
        sample("cpu", "cumulative", json!(314), json!({})),
        // 2: instance pollster, four points sharing a timestamp
        sample(
            "instance",
            "gauge",
            json!(1),
            json!({
                "instance_type": "2",
                "flavor": {"vcpus": 1, "ram": 2048, "disk": 20, "ephemeral": 0}
            }),
        ),
        // 3: volume lifecycle event, one packed point
        sample(
            "volume.size",
            "gauge",
            json!(10),
            json!({"event_type": "volume.resize.end", "status": "creating"}),
        ),
        // 4: deliberately ignored pollster
        sample("disk.read.requests", "cumulative", json!(777), json!({})),
        // 5: not json at all
        "ceci n'est pas du json".to_string(),
        // 6: event with a status outside its enumeration, refused
        sample(
            "snapshot.size",
            "gauge",
            json!(3),
            json!({"event_type": "snapshot.create.end", "status": "molten"}),
        ),
    ];

    let transport = MemoryTransport::with_bodies(bodies);
    let store = MemoryStore::default();
    let (pipeline, handle) = Pipeline::new(transport.clone(), store.clone(), config());
    let metrics = pipeline.metrics();

    drain(pipeline, handle).await;

    // Every message is consumed in order, including the failing ones.
    assert_eq!(transport.acked(), vec![1, 2, 3, 4, 5, 6]);

    let points = store.points();
    assert_eq!(points.len(), 6); // 1 cpu + 4 instance + 1 volume
    assert_eq!(store.metadata().len(), 6);

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.samples_received, 6);
    assert_eq!(snapshot.points_emitted, 6);
    assert_eq!(snapshot.ignored, 1);
    assert_eq!(snapshot.malformed, 1);
    assert_eq!(snapshot.dropped, 1);
    assert_eq!(snapshot.unexpected, 0);
    assert_eq!(snapshot.acked, 6);

    // The cpu point carries its magnitude through unchanged.
    assert_eq!(points[0].payload, 314);

    // The four instance points share one timestamp and distinct addresses.
    let instance = &points[1..5];
    assert!(instance
        .iter()
        .all(|point| point.timestamp_ns == instance[0].timestamp_ns));
    for (i, a) in instance.iter().enumerate() {
        for b in &instance[i + 1..] {
            assert_ne!(a.address, b.address);
        }
    }
    assert_eq!(instance[0].payload, 1); // vcpus
    assert_eq!(instance[1].payload, 2048); // ram
    assert_eq!(instance[2].payload, 20); // disk + ephemeral

    // The packed volume point: status creating=2, verb resize=2,
    // endpoint end=2, magnitude 10.
    assert_eq!(points[5].payload, 2 + (2u64 << 8) + (2u64 << 16) + (10u64 << 32));
}

#[tokio::test]
async fn test_instance_group_is_withheld_end_to_end() {
    // The flavor block is missing a field, so none of the four points may
    // reach the store, but the message is still consumed.
    let bodies = vec![sample(
        "instance",
        "gauge",
        json!(1),
        json!({"instance_type": "2", "flavor": {"vcpus": 1, "disk": 20, "ephemeral": 0}}),
    )];

    let transport = MemoryTransport::with_bodies(bodies);
    let store = MemoryStore::default();
    let (pipeline, handle) = Pipeline::new(transport.clone(), store.clone(), config());
    let metrics = pipeline.metrics();

    drain(pipeline, handle).await;

    assert!(store.points().is_empty());
    assert!(store.metadata().is_empty());
    assert_eq!(transport.acked(), vec![1]);
    assert_eq!(metrics.snapshot().dropped, 1);
}

#[tokio::test]
async fn test_replay_produces_identical_addresses() {
    // The same feed processed twice lands on the same series addresses, so
    // a redelivered message overwrites rather than forks its series.
    let feed = || {
        vec![
            sample("cpu", "cumulative", json!(1), json!({})),
            sample(
                "ip.floating",
                "gauge",
                json!(0),
                json!({"event_type": "floatingip.update.start"}),
            ),
        ]
    };

    let mut addresses = Vec::new();
    for _ in 0..2 {
        let transport = MemoryTransport::with_bodies(feed());
        let store = MemoryStore::default();
        let (pipeline, handle) = Pipeline::new(transport, store.clone(), config());
        drain(pipeline, handle).await;

        let run: Vec<Address> = store.points().iter().map(|point| point.address).collect();
        assert_eq!(run.len(), 2);
        addresses.push(run);
    }
    assert_eq!(addresses[0], addresses[1]);

    // The floating-ip point packs the absent status as 0, verb update=2,
    // endpoint start=1 and the fixed magnitude 1.
    let transport = MemoryTransport::with_bodies(feed());
    let store = MemoryStore::default();
    let (pipeline, handle) = Pipeline::new(transport, store.clone(), config());
    drain(pipeline, handle).await;
    assert_eq!(
        store.points()[1].payload,
        (2u64 << 8) + (1u64 << 16) + (1u64 << 32)
    );
}

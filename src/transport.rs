//! Metrics transport.
//!
//! Defines the wire shape of a metric write (named, dimensioned, timestamped
//! points) and the sink the agent ships batches through. Delivery is
//! asynchronous: the reporter hands batches to an mpsc channel and a
//! forwarder task drains it, so a slow or failing backend never stalls the
//! scheduler loop. Delivery failures are logged, never fatal.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

/// Dimensions attached to a point (host, status, instance, ...).
pub type Dimensions = HashMap<String, String>;

/// One timestamped value of a named metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointValue {
    pub value: f64,
    #[serde(default, skip_serializing_if = "Dimensions::is_empty")]
    pub dimensions: Dimensions,
    /// Unix timestamp in seconds; absent means "now" to the backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

/// A named series with one or more values.
///
/// This is both the errplane plugin output shape and the ingest write shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointWrite {
    pub name: String,
    pub points: Vec<PointValue>,
}

impl PointWrite {
    /// Single-value write, the common case for agent-generated points.
    pub fn single(
        name: String,
        value: f64,
        timestamp: i64,
        dimensions: Dimensions,
    ) -> Self {
        PointWrite {
            name,
            points: vec![PointValue {
                value,
                dimensions,
                timestamp: Some(timestamp),
            }],
        }
    }
}

/// One batch of writes shipped to the backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WriteOperation {
    pub writes: Vec<PointWrite>,
}

/// Destination for metric batches.
#[async_trait]
pub trait MetricsSink: Send + Sync {
    async fn write(&self, operation: WriteOperation) -> anyhow::Result<()>;
}

/// Ships batches to an HTTP ingest endpoint as JSON.
pub struct HttpSink {
    client: reqwest::Client,
    ingest_url: String,
}

impl HttpSink {
    pub fn new(ingest_url: String) -> Self {
        HttpSink {
            client: reqwest::Client::new(),
            ingest_url,
        }
    }
}

#[async_trait]
impl MetricsSink for HttpSink {
    async fn write(&self, operation: WriteOperation) -> anyhow::Result<()> {
        self.client
            .post(&self.ingest_url)
            .json(&operation)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// Capacity of the delivery queue between the reporter and the forwarder.
const DELIVERY_QUEUE_CAPACITY: usize = 128;

/// Spawns the forwarder task and returns the send side of the queue.
///
/// The returned sender never blocks: when the queue is full the batch is
/// dropped and logged.
pub fn spawn_forwarder(sink: Arc<dyn MetricsSink>) -> mpsc::Sender<WriteOperation> {
    let (tx, mut rx) = mpsc::channel::<WriteOperation>(DELIVERY_QUEUE_CAPACITY);

    tokio::spawn(async move {
        while let Some(operation) = rx.recv().await {
            let count = operation.writes.len();
            match sink.write(operation).await {
                Ok(()) => debug!("Delivered batch of {} writes", count),
                Err(e) => error!("Cannot deliver batch of {} writes: {}", count, e),
            }
        }
        warn!("Delivery queue closed, forwarder exiting");
    });

    tx
}

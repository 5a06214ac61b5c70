//! The seam between the gateway and the underlying append-only log store.
//!
//! The store knows nothing about Kafka transactions. It appends opaque
//! batches, serves them back by offset, and may trim the head of a partition
//! at any time. Everything transactional is layered on top by the
//! partition-log crate.

use async_trait::async_trait;
use std::sync::Arc;

use gateway_core::{ControlMarker, Offset, ProducerEpoch, ProducerId, RecordBatch, Result, TopicPartition, TopicUuid};

/// Payload of one stored batch.
#[derive(Debug, Clone)]
pub enum StoredPayload {
    /// User records from a producer.
    Data(RecordBatch),
    /// Transaction control marker for a producer.
    Control {
        producer_id: ProducerId,
        producer_epoch: ProducerEpoch,
        marker: ControlMarker,
    },
}

impl StoredPayload {
    /// Number of offsets the batch occupies. Control batches occupy one.
    pub fn offset_span(&self) -> i64 {
        match self {
            Self::Data(batch) => batch.records.len().max(1) as i64,
            Self::Control { .. } => 1,
        }
    }

    pub fn is_control(&self) -> bool {
        matches!(self, Self::Control { .. })
    }
}

/// One batch as stored, tagged with its assigned base offset.
#[derive(Debug, Clone)]
pub struct StoredBatch {
    pub base_offset: Offset,
    pub payload: StoredPayload,
}

impl StoredBatch {
    /// Offset of the last record in the batch.
    pub fn last_offset(&self) -> Offset {
        self.base_offset + self.payload.offset_span() - 1
    }
}

/// Handle to one partition of the underlying store.
#[async_trait]
pub trait PartitionStore: Send + Sync {
    /// Appends a batch, returning its assigned base offset.
    async fn append(&self, payload: StoredPayload) -> Result<Offset>;

    /// Reads up to `max_batches` batches starting at the first batch whose
    /// last offset is >= `from`.
    async fn read(&self, from: Offset, max_batches: usize) -> Result<Vec<StoredBatch>>;

    /// Earliest offset still present (advances after trim).
    async fn oldest_offset(&self) -> Result<Offset>;

    /// Offset that will be assigned to the next append (high watermark).
    async fn next_offset(&self) -> Result<Offset>;

    /// Uuid of the topic incarnation this partition belongs to.
    fn topic_uuid(&self) -> TopicUuid;

    /// Drops all batches whose last offset is below `before`.
    async fn trim(&self, before: Offset) -> Result<()>;
}

/// Factory for partition handles.
#[async_trait]
pub trait LogStore: Send + Sync {
    /// Opens (creating if absent) a partition of the store.
    async fn open(&self, tp: &TopicPartition) -> Result<Arc<dyn PartitionStore>>;

    /// Current uuid of a topic, if it exists.
    async fn topic_uuid(&self, topic: &str) -> Result<Option<TopicUuid>>;
}

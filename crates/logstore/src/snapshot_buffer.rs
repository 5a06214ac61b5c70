//! Latest-snapshot-per-partition store.
//!
//! Producer-state snapshots are published to a compacted internal topic keyed
//! by `{topic_uuid}:{partition}`, so the buffer always serves the most recent
//! snapshot for a partition incarnation in O(1).

use std::sync::Arc;
use tracing::debug;

use gateway_core::{Result, TopicUuid};

use crate::compacted::{route_key, CompactedTopic};
use crate::store::{LogStore, PartitionStore};

/// Snapshot blobs are opaque versioned bytes to the buffer.
pub struct SnapshotBuffer {
    partitions: Vec<CompactedTopic>,
}

impl SnapshotBuffer {
    pub fn new(partitions: Vec<CompactedTopic>) -> Self {
        assert!(!partitions.is_empty(), "snapshot buffer needs >= 1 partition");
        Self { partitions }
    }

    /// Opens the buffer over `num_partitions` partitions of an internal topic.
    pub async fn open(
        store: &dyn LogStore,
        topic: &str,
        num_partitions: i32,
    ) -> Result<Self> {
        let mut partitions = Vec::with_capacity(num_partitions as usize);
        for p in 0..num_partitions {
            let handle: Arc<dyn PartitionStore> =
                store.open(&gateway_core::TopicPartition::new(topic, p)).await?;
            partitions.push(CompactedTopic::new(handle));
        }
        Ok(Self::new(partitions))
    }

    fn key(topic_uuid: TopicUuid, partition: i32) -> String {
        format!("{topic_uuid}:{partition}")
    }

    fn route(&self, key: &str) -> &CompactedTopic {
        &self.partitions[route_key(key, self.partitions.len())]
    }

    /// Publishes a snapshot, superseding any prior one for the partition.
    pub async fn publish(
        &self,
        topic_uuid: TopicUuid,
        partition: i32,
        blob: Vec<u8>,
    ) -> Result<()> {
        let key = Self::key(topic_uuid, partition);
        debug!(%topic_uuid, partition, bytes = blob.len(), "Publishing producer-state snapshot");
        self.route(&key).publish(&key, Some(blob)).await
    }

    /// Most recent snapshot for a partition incarnation, if any.
    pub async fn read_latest(
        &self,
        topic_uuid: TopicUuid,
        partition: i32,
    ) -> Result<Option<Vec<u8>>> {
        let key = Self::key(topic_uuid, partition);
        self.route(&key).read_latest(&key).await
    }
}

//! Deterministic in-memory log store.
//!
//! Backs the integration tests and the local single-node mode. Supports the
//! store behaviors the transactional layer has to survive: head trimming,
//! partition unload/reload, and topic re-creation under the same name with a
//! fresh uuid.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use gateway_core::{Error, Offset, Result, TopicPartition, TopicUuid};

use crate::store::{LogStore, PartitionStore, StoredBatch, StoredPayload};

#[derive(Debug, Default)]
struct PartitionData {
    batches: Vec<StoredBatch>,
    log_start: Offset,
    next: Offset,
}

/// One in-memory partition.
pub struct MemoryPartition {
    uuid: TopicUuid,
    data: Mutex<PartitionData>,
}

impl MemoryPartition {
    fn new(uuid: TopicUuid) -> Self {
        Self {
            uuid,
            data: Mutex::new(PartitionData::default()),
        }
    }
}

#[async_trait]
impl PartitionStore for MemoryPartition {
    async fn append(&self, payload: StoredPayload) -> Result<Offset> {
        let mut data = self.data.lock();
        let base_offset = data.next;
        let span = payload.offset_span();
        data.batches.push(StoredBatch {
            base_offset,
            payload,
        });
        data.next += span;
        Ok(base_offset)
    }

    async fn read(&self, from: Offset, max_batches: usize) -> Result<Vec<StoredBatch>> {
        let data = self.data.lock();
        Ok(data
            .batches
            .iter()
            .filter(|b| b.last_offset() >= from)
            .take(max_batches)
            .cloned()
            .collect())
    }

    async fn oldest_offset(&self) -> Result<Offset> {
        Ok(self.data.lock().log_start)
    }

    async fn next_offset(&self) -> Result<Offset> {
        Ok(self.data.lock().next)
    }

    fn topic_uuid(&self) -> TopicUuid {
        self.uuid
    }

    async fn trim(&self, before: Offset) -> Result<()> {
        let mut data = self.data.lock();
        data.batches.retain(|b| b.last_offset() >= before);
        if before > data.log_start {
            data.log_start = before;
        }
        // Trimming past the end still leaves next where it was.
        if data.log_start > data.next {
            data.next = data.log_start;
        }
        Ok(())
    }
}

struct TopicState {
    uuid: TopicUuid,
    partitions: HashMap<i32, Arc<MemoryPartition>>,
}

/// In-memory log store over all topics.
#[derive(Default)]
pub struct MemoryLogStore {
    topics: Mutex<HashMap<String, TopicState>>,
}

impl MemoryLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deletes a topic and re-creates it empty under a fresh uuid.
    pub fn recreate_topic(&self, topic: &str) {
        let mut topics = self.topics.lock();
        topics.insert(
            topic.to_string(),
            TopicState {
                uuid: TopicUuid::random(),
                partitions: HashMap::new(),
            },
        );
    }

    fn partition(&self, tp: &TopicPartition) -> Arc<MemoryPartition> {
        let mut topics = self.topics.lock();
        let state = topics.entry(tp.topic.clone()).or_insert_with(|| TopicState {
            uuid: TopicUuid::random(),
            partitions: HashMap::new(),
        });
        let uuid = state.uuid;
        state
            .partitions
            .entry(tp.partition)
            .or_insert_with(|| Arc::new(MemoryPartition::new(uuid)))
            .clone()
    }
}

#[async_trait]
impl LogStore for MemoryLogStore {
    async fn open(&self, tp: &TopicPartition) -> Result<Arc<dyn PartitionStore>> {
        if tp.partition < 0 {
            return Err(Error::UnknownTopicOrPartition(tp.to_string()));
        }
        Ok(self.partition(tp))
    }

    async fn topic_uuid(&self, topic: &str) -> Result<Option<TopicUuid>> {
        Ok(self.topics.lock().get(topic).map(|t| t.uuid))
    }
}

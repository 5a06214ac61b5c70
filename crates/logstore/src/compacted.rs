//! Key-compacted internal topics.
//!
//! The coordinator's transaction log and the snapshot buffer are both
//! compacted topics: only the latest value per key matters. The store itself
//! does not compact, so each topic keeps a materialized last-write-wins view
//! that is rebuilt by replaying the partition on load.

use chrono::Utc;
use rskafka::record::Record;
use std::collections::{BTreeMap, HashMap};
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use gateway_core::{RecordBatch, Result, NO_PRODUCER_EPOCH, NO_PRODUCER_ID};

use crate::store::{PartitionStore, StoredPayload};

/// Routes a key to one of `n` partitions.
pub fn route_key(key: &str, n: usize) -> usize {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    key.hash(&mut hasher);
    (hasher.finish() % n as u64) as usize
}

/// One partition of a key-compacted internal topic.
pub struct CompactedTopic {
    store: Arc<dyn PartitionStore>,
    view: RwLock<Option<HashMap<String, Vec<u8>>>>,
}

impl CompactedTopic {
    pub fn new(store: Arc<dyn PartitionStore>) -> Self {
        Self {
            store,
            view: RwLock::new(None),
        }
    }

    /// Replays the partition and materializes the latest value per key.
    async fn load_view(&self) -> Result<HashMap<String, Vec<u8>>> {
        let mut view = HashMap::new();
        let mut from = self.store.oldest_offset().await?;
        let end = self.store.next_offset().await?;
        while from < end {
            let batches = self.store.read(from, 128).await?;
            if batches.is_empty() {
                break;
            }
            for batch in &batches {
                if let StoredPayload::Data(data) = &batch.payload {
                    for record in &data.records {
                        let Some(key) = &record.key else { continue };
                        let key = String::from_utf8_lossy(key).into_owned();
                        match &record.value {
                            Some(value) => {
                                view.insert(key, value.clone());
                            }
                            None => {
                                view.remove(&key);
                            }
                        }
                    }
                }
                from = batch.last_offset() + 1;
            }
        }
        debug!(keys = view.len(), "Loaded compacted topic view");
        Ok(view)
    }

    async fn ensure_loaded(&self) -> Result<()> {
        if self.view.read().await.is_some() {
            return Ok(());
        }
        let loaded = self.load_view().await?;
        let mut view = self.view.write().await;
        if view.is_none() {
            *view = Some(loaded);
        }
        Ok(())
    }

    /// Appends a key/value pair; a `None` value is a tombstone.
    pub async fn publish(&self, key: &str, value: Option<Vec<u8>>) -> Result<()> {
        self.ensure_loaded().await?;
        let record = Record {
            key: Some(key.as_bytes().to_vec()),
            value: value.clone(),
            headers: BTreeMap::new(),
            timestamp: Utc::now(),
        };
        self.store
            .append(StoredPayload::Data(RecordBatch {
                producer_id: NO_PRODUCER_ID,
                producer_epoch: NO_PRODUCER_EPOCH,
                base_sequence: 0,
                transactional: false,
                records: vec![record],
            }))
            .await?;

        let mut view = self.view.write().await;
        let map = view.get_or_insert_with(HashMap::new);
        match value {
            Some(v) => {
                map.insert(key.to_string(), v);
            }
            None => {
                map.remove(key);
            }
        }
        Ok(())
    }

    /// Latest value for a key, if any.
    pub async fn read_latest(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.ensure_loaded().await?;
        Ok(self.view.read().await.as_ref().and_then(|m| m.get(key).cloned()))
    }

    /// Snapshot of the whole materialized view.
    pub async fn entries(&self) -> Result<HashMap<String, Vec<u8>>> {
        self.ensure_loaded().await?;
        Ok(self.view.read().await.clone().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryLogStore;
    use crate::store::LogStore;
    use gateway_core::TopicPartition;

    async fn topic() -> CompactedTopic {
        let store = MemoryLogStore::new();
        let p = store.open(&TopicPartition::new("__compacted", 0)).await.unwrap();
        CompactedTopic::new(p)
    }

    #[tokio::test]
    async fn last_write_wins() {
        let t = topic().await;
        t.publish("k", Some(b"v1".to_vec())).await.unwrap();
        t.publish("k", Some(b"v2".to_vec())).await.unwrap();
        assert_eq!(t.read_latest("k").await.unwrap(), Some(b"v2".to_vec()));
    }

    #[tokio::test]
    async fn tombstone_deletes() {
        let t = topic().await;
        t.publish("k", Some(b"v".to_vec())).await.unwrap();
        t.publish("k", None).await.unwrap();
        assert_eq!(t.read_latest("k").await.unwrap(), None);
        assert!(t.entries().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn view_rebuilds_from_log() {
        let store = MemoryLogStore::new();
        let p = store.open(&TopicPartition::new("__compacted", 0)).await.unwrap();

        let t = CompactedTopic::new(p.clone());
        t.publish("a", Some(b"1".to_vec())).await.unwrap();
        t.publish("b", Some(b"2".to_vec())).await.unwrap();
        t.publish("a", None).await.unwrap();
        drop(t);

        // A fresh instance over the same partition replays to the same view.
        let reloaded = CompactedTopic::new(p);
        let entries = reloaded.entries().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries.get("b"), Some(&b"2".to_vec()));
    }
}

//! Registry of live partition logs.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use gateway_core::{Result, TopicPartition};
use logstore::{LogStore, SnapshotBuffer, TopicUuidCache};

use crate::log::PartitionLog;

/// Opens, caches, and unloads partition logs.
///
/// Re-opening an unloaded partition builds a fresh log that recovers from the
/// snapshot buffer and the store.
pub struct PartitionCatalog {
    store: Arc<dyn LogStore>,
    snapshots: Arc<SnapshotBuffer>,
    uuid_cache: TopicUuidCache,
    logs: RwLock<HashMap<TopicPartition, Arc<PartitionLog>>>,
}

impl PartitionCatalog {
    pub fn new(store: Arc<dyn LogStore>, snapshots: Arc<SnapshotBuffer>) -> Self {
        let uuid_cache = TopicUuidCache::new(store.clone());
        Self {
            store,
            snapshots,
            uuid_cache,
            logs: RwLock::new(HashMap::new()),
        }
    }

    /// Drops cached identity for a topic, forcing re-validation of its logs.
    pub fn invalidate_topic(&self, topic: &str) {
        self.uuid_cache.invalidate(topic);
    }

    /// Returns the ready partition log, opening and recovering it if needed.
    pub async fn get_or_open(&self, tp: &TopicPartition) -> Result<Arc<PartitionLog>> {
        if let Some(log) = self.logs.read().await.get(tp).cloned() {
            // A topic re-created under the same name gets a fresh uuid; a
            // cached log for the old incarnation must not keep serving.
            let recreated = match self.uuid_cache.get(&tp.topic).await? {
                Some(current) => current != log.topic_uuid(),
                None => false,
            };
            if !recreated {
                log.await_initialisation().await?;
                return Ok(log);
            }
            self.unload(tp).await;
        }

        let log = {
            let mut logs = self.logs.write().await;
            if let Some(existing) = logs.get(tp) {
                existing.clone()
            } else {
                let partition = self.store.open(tp).await?;
                let log = Arc::new(PartitionLog::new(
                    tp.clone(),
                    partition,
                    self.snapshots.clone(),
                ));
                logs.insert(tp.clone(), log.clone());
                debug!(%tp, "Opened partition log");
                log
            }
        };
        log.initialise().await?;
        Ok(log)
    }

    /// All currently loaded, ready partitions.
    pub async fn loaded(&self) -> Vec<Arc<PartitionLog>> {
        self.logs.read().await.values().cloned().collect()
    }

    /// Unloads a partition; the next access recovers it from scratch.
    pub async fn unload(&self, tp: &TopicPartition) {
        let removed = self.logs.write().await.remove(tp);
        if let Some(log) = removed {
            log.unload().await;
        }
    }
}

//! Read-mostly cache of topic uuids.

use moka::sync::Cache;
use std::sync::Arc;
use std::time::Duration;

use gateway_core::{Result, TopicUuid};

use crate::store::LogStore;

/// Caches topic uuid lookups in front of the store.
///
/// Entries are time-bounded so a deleted-and-recreated topic is observed
/// within the TTL even without an explicit invalidation.
pub struct TopicUuidCache {
    store: Arc<dyn LogStore>,
    cache: Cache<String, TopicUuid>,
}

impl TopicUuidCache {
    pub fn new(store: Arc<dyn LogStore>) -> Self {
        Self {
            store,
            cache: Cache::builder()
                .max_capacity(10_000)
                .time_to_live(Duration::from_secs(300))
                .build(),
        }
    }

    pub async fn get(&self, topic: &str) -> Result<Option<TopicUuid>> {
        if let Some(uuid) = self.cache.get(topic) {
            return Ok(Some(uuid));
        }
        let uuid = self.store.topic_uuid(topic).await?;
        if let Some(uuid) = uuid {
            self.cache.insert(topic.to_string(), uuid);
        }
        Ok(uuid)
    }

    /// Drops a cached entry, e.g. after a topic re-creation is observed.
    pub fn invalidate(&self, topic: &str) {
        self.cache.invalidate(topic);
    }
}

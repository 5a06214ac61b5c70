//! Persisted transaction state, sharded by transactional id.
//!
//! Every mutation is appended to the compacted transaction log before it is
//! acknowledged, so a reloaded coordinator replays to exactly the state its
//! clients observed. Producer ids are granted in persisted blocks for the
//! same reason: a reload may skip ids, never reissue them.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{info, warn};

use gateway_core::{Error, ProducerId, Result, TopicPartition};
use logstore::{route_key, CompactedTopic, LogStore};
use serde::{Deserialize, Serialize};

use crate::metadata::TransactionMetadata;

/// Reserved key holding the end of the highest granted producer-id block.
const PRODUCER_ID_BLOCK_KEY: &str = "__producer_id_block";

/// Reserved key holding the coordinator generation.
const COORDINATOR_EPOCH_KEY: &str = "__coordinator_epoch";

const PRODUCER_ID_BLOCK_SIZE: i64 = 1000;

const TXN_LOG_SCHEMA_VERSION: u16 = 1;

/// Envelope for persisted transaction metadata.
#[derive(Debug, Serialize, Deserialize)]
struct TxnLogRecord {
    version: u16,
    metadata: TransactionMetadata,
}

#[derive(Debug, Default)]
struct PidAllocator {
    next: ProducerId,
    block_end: ProducerId,
}

/// Sharded, persisted transaction metadata store.
pub struct TransactionStateManager {
    shards: Vec<Mutex<HashMap<String, TransactionMetadata>>>,
    txn_log: Vec<CompactedTopic>,
    allocator: Mutex<PidAllocator>,
    loaded: AtomicBool,
}

impl TransactionStateManager {
    /// Opens the manager over the internal transaction log topic.
    pub async fn open(
        store: &dyn LogStore,
        topic: &str,
        num_partitions: i32,
        num_shards: usize,
    ) -> Result<Self> {
        let mut txn_log = Vec::with_capacity(num_partitions as usize);
        for p in 0..num_partitions {
            let handle = store.open(&TopicPartition::new(topic, p)).await?;
            txn_log.push(CompactedTopic::new(handle));
        }
        Ok(Self {
            shards: (0..num_shards.max(1)).map(|_| Mutex::new(HashMap::new())).collect(),
            txn_log,
            allocator: Mutex::new(PidAllocator::default()),
            loaded: AtomicBool::new(false),
        })
    }

    /// Replays the transaction log into memory and bumps the coordinator
    /// generation. Serving before this completes yields
    /// `CoordinatorLoadInProgress`.
    pub async fn load(&self) -> Result<i32> {
        let mut count = 0usize;
        for topic in &self.txn_log {
            for (key, value) in topic.entries().await? {
                if key.starts_with("__") {
                    continue;
                }
                match serde_json::from_slice::<TxnLogRecord>(&value) {
                    Ok(record) if record.version == TXN_LOG_SCHEMA_VERSION => {
                        let shard = self.shard_index(&key);
                        self.shards[shard]
                            .lock()
                            .await
                            .insert(key, record.metadata);
                        count += 1;
                    }
                    Ok(record) => {
                        warn!(
                            transactional_id = %key, version = record.version,
                            "Skipping transaction log record with unknown schema"
                        );
                    }
                    Err(e) => {
                        warn!(transactional_id = %key, error = %e, "Skipping corrupt transaction log record");
                    }
                }
            }
        }

        {
            let mut allocator = self.allocator.lock().await;
            let block_end = match self.txn_log[0].read_latest(PRODUCER_ID_BLOCK_KEY).await? {
                Some(raw) => serde_json::from_slice::<i64>(&raw)?,
                None => 0,
            };
            // Skip the remainder of any partially used block.
            allocator.next = block_end;
            allocator.block_end = block_end;
        }

        let coordinator_epoch = match self.txn_log[0].read_latest(COORDINATOR_EPOCH_KEY).await? {
            Some(raw) => serde_json::from_slice::<i32>(&raw)?,
            None => 0,
        } + 1;
        self.txn_log[0]
            .publish(
                COORDINATOR_EPOCH_KEY,
                Some(serde_json::to_vec(&coordinator_epoch)?),
            )
            .await?;

        self.loaded.store(true, Ordering::Release);
        info!(transactional_ids = count, coordinator_epoch, "Loaded transaction state");
        Ok(coordinator_epoch)
    }

    fn ensure_loaded(&self) -> Result<()> {
        if self.loaded.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(Error::CoordinatorLoadInProgress)
        }
    }

    fn shard_index(&self, transactional_id: &str) -> usize {
        route_key(transactional_id, self.shards.len())
    }

    /// Locks the single-writer shard owning a transactional id.
    pub async fn shard(
        &self,
        transactional_id: &str,
    ) -> Result<MutexGuard<'_, HashMap<String, TransactionMetadata>>> {
        self.ensure_loaded()?;
        Ok(self.shards[self.shard_index(transactional_id)].lock().await)
    }

    /// Appends metadata to the transaction log. Callers hold the shard lock
    /// and only update the in-memory map after this returns.
    pub async fn persist(&self, metadata: &TransactionMetadata) -> Result<()> {
        let record = TxnLogRecord {
            version: TXN_LOG_SCHEMA_VERSION,
            metadata: metadata.clone(),
        };
        let partition = route_key(&metadata.transactional_id, self.txn_log.len());
        self.txn_log[partition]
            .publish(&metadata.transactional_id, Some(serde_json::to_vec(&record)?))
            .await
    }

    /// Appends a tombstone removing a transactional id.
    pub async fn persist_tombstone(&self, transactional_id: &str) -> Result<()> {
        let partition = route_key(transactional_id, self.txn_log.len());
        self.txn_log[partition].publish(transactional_id, None).await
    }

    /// Snapshot of a single id's metadata.
    pub async fn get(&self, transactional_id: &str) -> Result<Option<TransactionMetadata>> {
        Ok(self.shard(transactional_id).await?.get(transactional_id).cloned())
    }

    /// Snapshot of all known metadata across shards.
    pub async fn all(&self) -> Result<Vec<TransactionMetadata>> {
        self.ensure_loaded()?;
        let mut out = Vec::new();
        for shard in &self.shards {
            out.extend(shard.lock().await.values().cloned());
        }
        Ok(out)
    }

    /// Allocates a producer id, granting and persisting a new block as needed.
    pub async fn allocate_producer_id(&self) -> Result<ProducerId> {
        self.ensure_loaded()?;
        let mut allocator = self.allocator.lock().await;
        if allocator.next >= allocator.block_end {
            let new_end = allocator.block_end + PRODUCER_ID_BLOCK_SIZE;
            self.txn_log[0]
                .publish(PRODUCER_ID_BLOCK_KEY, Some(serde_json::to_vec(&new_end)?))
                .await?;
            allocator.block_end = new_end;
        }
        let pid = allocator.next;
        allocator.next += 1;
        Ok(pid)
    }
}

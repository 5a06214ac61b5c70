//! Transaction coordinator.
//!
//! Orchestrates producer-id assignment, participant registration, and
//! two-phase completion. Every state transition is persisted through the
//! transaction state manager before it is acknowledged; marker writes are
//! retried until they land because a transaction parked in a prepare state
//! cannot be abandoned.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use gateway_core::{
    ControlMarker, Error, GatewayConfig, Offset, ProducerEpoch, ProducerId, RecordBatch, Result,
    TopicPartition, OFFSETS_TOPIC,
};
use logstore::route_key;
use partition_log::PartitionCatalog;
use telemetry::metrics;

use crate::metadata::{TransactionMetadata, TxnState};
use crate::state_manager::TransactionStateManager;

const MARKER_RETRY_BACKOFF: Duration = Duration::from_millis(50);
const MARKER_RETRY_BACKOFF_MAX: Duration = Duration::from_secs(5);

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Producer identity returned by `init_producer_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitProducerIdResult {
    pub producer_id: ProducerId,
    pub producer_epoch: ProducerEpoch,
}

/// Filter for the admin transaction listing.
#[derive(Debug, Clone, Default)]
pub struct ListTransactionsFilter {
    /// Keep only these states (empty = all).
    pub states: Vec<TxnState>,
    /// Keep only these producer ids (empty = all).
    pub producer_ids: Vec<ProducerId>,
}

/// One row of the admin transaction listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionListing {
    pub transactional_id: String,
    pub producer_id: ProducerId,
    pub state: TxnState,
}

/// Full admin view of one transactional id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionDescription {
    pub transactional_id: String,
    pub producer_id: ProducerId,
    pub producer_epoch: ProducerEpoch,
    pub state: TxnState,
    pub txn_timeout_ms: i32,
    pub txn_start_time_ms: i64,
    pub partitions: Vec<TopicPartition>,
}

/// Key of a transactional offset-commit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetCommitKey {
    pub group: String,
    pub topic: String,
    pub partition: i32,
}

/// Value of a transactional offset-commit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetCommitValue {
    pub offset: Offset,
    pub commit_timestamp_ms: i64,
}

enum InitAction {
    Done(InitProducerIdResult),
    AbortFirst { producer_id: ProducerId, producer_epoch: ProducerEpoch },
}

/// The transaction coordinator.
pub struct TransactionCoordinator {
    config: GatewayConfig,
    state: TransactionStateManager,
    catalog: Arc<PartitionCatalog>,
    coordinator_epoch: AtomicI32,
}

impl TransactionCoordinator {
    pub fn new(
        config: GatewayConfig,
        state: TransactionStateManager,
        catalog: Arc<PartitionCatalog>,
    ) -> Self {
        Self {
            config,
            state,
            catalog,
            coordinator_epoch: AtomicI32::new(0),
        }
    }

    /// Replays the transaction log; must complete before serving requests.
    pub async fn load(&self) -> Result<()> {
        let epoch = self.state.load().await?;
        self.coordinator_epoch.store(epoch, Ordering::Release);
        Ok(())
    }

    pub fn coordinator_epoch(&self) -> i32 {
        self.coordinator_epoch.load(Ordering::Acquire)
    }

    /// Assigns or re-initialises the producer identity for a transactional id.
    ///
    /// A non-terminal transaction left by the previous owner is aborted first,
    /// so the returned epoch fences every zombie instance.
    pub async fn init_producer_id(
        &self,
        transactional_id: &str,
        txn_timeout_ms: i32,
    ) -> Result<InitProducerIdResult> {
        self.config.check_txn_timeout(txn_timeout_ms)?;

        loop {
            let action = {
                let mut shard = self.state.shard(transactional_id).await?;
                match shard.get(transactional_id).cloned() {
                    None => {
                        let producer_id = self.state.allocate_producer_id().await?;
                        let meta = TransactionMetadata::new(
                            transactional_id,
                            producer_id,
                            txn_timeout_ms,
                            now_ms(),
                        );
                        self.state.persist(&meta).await?;
                        let result = InitProducerIdResult {
                            producer_id: meta.producer_id,
                            producer_epoch: meta.producer_epoch,
                        };
                        shard.insert(transactional_id.to_string(), meta);
                        info!(transactional_id, producer_id, "Assigned new producer id");
                        InitAction::Done(result)
                    }
                    Some(meta) if meta.state.is_preparing() => {
                        return Err(Error::ConcurrentTransactions(format!(
                            "{transactional_id} is completing a transaction"
                        )));
                    }
                    Some(meta) if meta.state == TxnState::Ongoing => {
                        // Bump the epoch before aborting so the abort markers
                        // carry it and every partition fences the old owner.
                        let mut bumped = meta.clone();
                        bumped.last_producer_epoch = bumped.producer_epoch;
                        if bumped.producer_epoch < i16::MAX {
                            bumped.producer_epoch += 1;
                        }
                        bumped.txn_last_update_time_ms = now_ms();
                        self.state.persist(&bumped).await?;
                        let fencing_epoch = bumped.producer_epoch;
                        let producer_id = bumped.producer_id;
                        shard.insert(transactional_id.to_string(), bumped);
                        InitAction::AbortFirst {
                            producer_id,
                            producer_epoch: fencing_epoch,
                        }
                    }
                    Some(mut meta) => {
                        meta.txn_timeout_ms = txn_timeout_ms;
                        if meta.bump_epoch(now_ms()) {
                            // Epoch space exhausted: hand out a fresh pid.
                            meta.producer_id = self.state.allocate_producer_id().await?;
                            meta.producer_epoch = 0;
                        }
                        self.state.persist(&meta).await?;
                        let result = InitProducerIdResult {
                            producer_id: meta.producer_id,
                            producer_epoch: meta.producer_epoch,
                        };
                        metrics().producers_fenced.inc();
                        debug!(
                            transactional_id,
                            producer_id = result.producer_id,
                            producer_epoch = result.producer_epoch,
                            "Bumped producer epoch"
                        );
                        shard.insert(transactional_id.to_string(), meta);
                        InitAction::Done(result)
                    }
                }
            };

            match action {
                InitAction::Done(result) => return Ok(result),
                InitAction::AbortFirst {
                    producer_id,
                    producer_epoch,
                } => {
                    info!(
                        transactional_id,
                        "Aborting in-flight transaction before re-initialisation"
                    );
                    self.end_txn(transactional_id, producer_id, producer_epoch, false)
                        .await?;
                }
            }
        }
    }

    /// Registers data partitions as transaction participants.
    pub async fn add_partitions_to_txn(
        &self,
        transactional_id: &str,
        producer_id: ProducerId,
        producer_epoch: ProducerEpoch,
        partitions: Vec<TopicPartition>,
    ) -> Result<()> {
        for tp in &partitions {
            if !self.config.namespace_allowed(&tp.topic) {
                return Err(Error::NamespaceNotAllowed(tp.topic.clone()));
            }
        }

        let mut shard = self.state.shard(transactional_id).await?;
        let Some(current) = shard.get(transactional_id) else {
            return Err(Error::InvalidProducerIdMapping(transactional_id.to_string()));
        };
        let mut meta = current.clone();
        meta.check_producer(producer_id, producer_epoch)?;
        let was_idle = meta.state.is_idle();
        meta.add_partitions(partitions, now_ms())?;
        self.state.persist(&meta).await?;
        if was_idle {
            metrics().transactions_started.inc();
        }
        shard.insert(transactional_id.to_string(), meta);
        Ok(())
    }

    /// Registers the offsets-topic partition for a group as a participant.
    pub async fn add_offsets_to_txn(
        &self,
        transactional_id: &str,
        producer_id: ProducerId,
        producer_epoch: ProducerEpoch,
        group_id: &str,
    ) -> Result<TopicPartition> {
        let partition =
            route_key(group_id, self.config.offsets_topic_num_partitions as usize) as i32;
        let tp = TopicPartition::new(OFFSETS_TOPIC, partition);
        self.add_partitions_to_txn(
            transactional_id,
            producer_id,
            producer_epoch,
            vec![tp.clone()],
        )
        .await?;
        Ok(tp)
    }

    /// Writes consumed offsets into the group's offsets partition, inside the
    /// producer's transaction.
    pub async fn txn_offset_commit(
        &self,
        transactional_id: &str,
        producer_id: ProducerId,
        producer_epoch: ProducerEpoch,
        group_id: &str,
        offsets: Vec<(TopicPartition, Offset)>,
    ) -> Result<()> {
        let offsets_tp = {
            let shard = self.state.shard(transactional_id).await?;
            let Some(meta) = shard.get(transactional_id) else {
                return Err(Error::InvalidProducerIdMapping(transactional_id.to_string()));
            };
            meta.check_producer(producer_id, producer_epoch)?;
            if meta.state != TxnState::Ongoing {
                return Err(Error::invalid_state(format!(
                    "{transactional_id} has no ongoing transaction for offset commit"
                )));
            }
            let partition =
                route_key(group_id, self.config.offsets_topic_num_partitions as usize) as i32;
            let tp = TopicPartition::new(OFFSETS_TOPIC, partition);
            if !meta.partitions.contains(&tp) {
                return Err(Error::invalid_state(format!(
                    "offsets partition {tp} was not added to {transactional_id}"
                )));
            }
            tp
        };

        let now = Utc::now();
        let records = offsets
            .into_iter()
            .map(|(tp, offset)| {
                let key = OffsetCommitKey {
                    group: group_id.to_string(),
                    topic: tp.topic,
                    partition: tp.partition,
                };
                let value = OffsetCommitValue {
                    offset,
                    commit_timestamp_ms: now.timestamp_millis(),
                };
                Ok(rskafka::record::Record {
                    key: Some(serde_json::to_vec(&key)?),
                    value: Some(serde_json::to_vec(&value)?),
                    headers: Default::default(),
                    timestamp: now,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let log = self.catalog.get_or_open(&offsets_tp).await?;
        log.append(RecordBatch {
            producer_id,
            producer_epoch,
            base_sequence: -1,
            transactional: true,
            records,
        })
        .await?;
        Ok(())
    }

    /// Commits or aborts the ongoing transaction.
    pub async fn end_txn(
        &self,
        transactional_id: &str,
        producer_id: ProducerId,
        producer_epoch: ProducerEpoch,
        commit: bool,
    ) -> Result<()> {
        let started = Instant::now();

        // Phase 1: fence and persist the prepare state.
        let meta = {
            let mut shard = self.state.shard(transactional_id).await?;
            let Some(current) = shard.get(transactional_id) else {
                return Err(Error::InvalidProducerIdMapping(transactional_id.to_string()));
            };
            let mut meta = current.clone();
            meta.check_producer(producer_id, producer_epoch)?;

            match (meta.state, commit) {
                (TxnState::Ongoing, true) => {
                    meta.transition_to(TxnState::PrepareCommit, now_ms())?;
                    self.state.persist(&meta).await?;
                    shard.insert(transactional_id.to_string(), meta.clone());
                }
                (TxnState::Ongoing, false) => {
                    meta.transition_to(TxnState::PrepareAbort, now_ms())?;
                    self.state.persist(&meta).await?;
                    shard.insert(transactional_id.to_string(), meta.clone());
                }
                // Retried completion of an already-finished transaction.
                (TxnState::CompleteCommit, true) | (TxnState::CompleteAbort, false) => {
                    return Ok(())
                }
                // Marker writing was interrupted; resume it.
                (TxnState::PrepareCommit, true) | (TxnState::PrepareAbort, false) => {}
                (TxnState::Empty, _) => {
                    return Err(Error::invalid_state(format!(
                        "{transactional_id} has no transaction to end"
                    )))
                }
                (state, _) => {
                    return Err(Error::invalid_state(format!(
                        "cannot {} {transactional_id} in {state:?}",
                        if commit { "commit" } else { "abort" }
                    )))
                }
            }
            meta
        };

        // Phase 2: write markers to every participant. Uncancellable.
        self.write_markers(&meta, commit).await?;

        // Phase 3: persist the completed state.
        {
            let mut shard = self.state.shard(transactional_id).await?;
            if let Some(current) = shard.get(transactional_id) {
                if current.state.is_preparing() {
                    let mut meta = current.clone();
                    let next = if commit {
                        TxnState::CompleteCommit
                    } else {
                        TxnState::CompleteAbort
                    };
                    meta.transition_to(next, now_ms())?;
                    meta.partitions.clear();
                    self.state.persist(&meta).await?;
                    shard.insert(transactional_id.to_string(), meta);
                }
            }
        }

        if commit {
            metrics().transactions_committed.inc();
        } else {
            metrics().transactions_aborted.inc();
        }
        metrics()
            .end_txn_latency_ms
            .observe(started.elapsed().as_millis() as u64);
        Ok(())
    }

    /// Writes the commit/abort marker to all participants concurrently,
    /// retrying each with backoff until it lands.
    async fn write_markers(&self, meta: &TransactionMetadata, commit: bool) -> Result<()> {
        let coordinator_epoch = self.coordinator_epoch();
        let marker = if commit {
            ControlMarker::commit(coordinator_epoch)
        } else {
            ControlMarker::abort(coordinator_epoch)
        };

        let mut tasks = JoinSet::new();
        for tp in meta.partitions.iter().cloned() {
            let catalog = self.catalog.clone();
            let producer_id = meta.producer_id;
            let producer_epoch = meta.producer_epoch;
            tasks.spawn(async move {
                let mut backoff = MARKER_RETRY_BACKOFF;
                loop {
                    let attempt = async {
                        catalog
                            .get_or_open(&tp)
                            .await?
                            .complete_txn(producer_id, producer_epoch, marker)
                            .await
                    };
                    match attempt.await {
                        Ok(_) => break,
                        // A newer epoch already owns the partition; the
                        // transaction this marker belongs to is settled.
                        Err(Error::InvalidProducerEpoch(msg)) => {
                            warn!(%tp, producer_id, %msg, "Skipping superseded marker");
                            break;
                        }
                        Err(e) => {
                            metrics().marker_write_retries.inc();
                            warn!(%tp, producer_id, error = %e, "Retrying marker write");
                            sleep(backoff).await;
                            backoff = (backoff * 2).min(MARKER_RETRY_BACKOFF_MAX);
                        }
                    }
                }
            });
        }
        while let Some(joined) = tasks.join_next().await {
            joined.map_err(|e| Error::store(format!("marker writer task failed: {e}")))?;
        }
        Ok(())
    }

    /// Aborts every ongoing transaction that has outlived its timeout.
    pub async fn abort_timed_out_transactions(&self) -> Result<usize> {
        let now = now_ms();
        let timed_out: Vec<TransactionMetadata> = self
            .state
            .all()
            .await?
            .into_iter()
            .filter(|m| m.is_timed_out(now))
            .collect();

        let mut aborted = 0;
        for meta in timed_out {
            info!(
                transactional_id = %meta.transactional_id,
                producer_id = meta.producer_id,
                "Aborting timed-out transaction"
            );
            match self
                .end_txn(
                    &meta.transactional_id,
                    meta.producer_id,
                    meta.producer_epoch,
                    false,
                )
                .await
            {
                Ok(()) => {
                    aborted += 1;
                    metrics().transactions_timed_out.inc();
                }
                // The producer finished it between the scan and the abort.
                Err(Error::InvalidTxnState(_)) | Err(Error::ProducerFenced(_)) => {}
                Err(e) => {
                    warn!(
                        transactional_id = %meta.transactional_id, error = %e,
                        "Failed to abort timed-out transaction"
                    );
                }
            }
        }
        Ok(aborted)
    }

    /// Removes transactional ids idle in a terminal state past expiration.
    pub async fn expire_transactional_ids(&self) -> Result<usize> {
        let now = now_ms();
        let expiration_ms = self.config.transactional_id_expiration_ms;
        let candidates: Vec<String> = self
            .state
            .all()
            .await?
            .into_iter()
            .filter(|m| m.is_expired(now, expiration_ms))
            .map(|m| m.transactional_id)
            .collect();

        let mut expired = 0;
        for id in candidates {
            let mut shard = self.state.shard(&id).await?;
            let still_expired = shard
                .get(&id)
                .map(|m| m.is_expired(now, expiration_ms) && m.state.can_transition_to(TxnState::Dead))
                .unwrap_or(false);
            if still_expired {
                self.state.persist_tombstone(&id).await?;
                shard.remove(&id);
                expired += 1;
                info!(transactional_id = %id, "Expired transactional id");
            }
        }
        Ok(expired)
    }

    /// Admin: lists transactions, optionally filtered.
    pub async fn list_transactions(
        &self,
        filter: &ListTransactionsFilter,
    ) -> Result<Vec<TransactionListing>> {
        let mut listings: Vec<TransactionListing> = self
            .state
            .all()
            .await?
            .into_iter()
            .filter(|m| filter.states.is_empty() || filter.states.contains(&m.state))
            .filter(|m| {
                filter.producer_ids.is_empty() || filter.producer_ids.contains(&m.producer_id)
            })
            .map(|m| TransactionListing {
                transactional_id: m.transactional_id,
                producer_id: m.producer_id,
                state: m.state,
            })
            .collect();
        listings.sort_by(|a, b| a.transactional_id.cmp(&b.transactional_id));
        Ok(listings)
    }

    /// Admin: describes specific transactional ids.
    pub async fn describe_transactions(
        &self,
        transactional_ids: &[String],
    ) -> Result<Vec<Option<TransactionDescription>>> {
        let mut out = Vec::with_capacity(transactional_ids.len());
        for id in transactional_ids {
            let description = self.state.get(id).await?.map(|m| TransactionDescription {
                transactional_id: m.transactional_id,
                producer_id: m.producer_id,
                producer_epoch: m.producer_epoch,
                state: m.state,
                txn_timeout_ms: m.txn_timeout_ms,
                txn_start_time_ms: m.txn_start_time_ms,
                partitions: m.partitions.into_iter().collect(),
            });
            out.push(description);
        }
        Ok(out)
    }

    /// Admin: writes an abort marker directly to one partition.
    ///
    /// Deliberately bypasses coordinator state; the partition's producer
    /// state treats a later coordinator-driven marker as a no-op.
    pub async fn abort_transaction(
        &self,
        tp: &TopicPartition,
        producer_id: ProducerId,
        producer_epoch: ProducerEpoch,
        coordinator_epoch: i32,
    ) -> Result<Offset> {
        let log = self.catalog.get_or_open(tp).await?;
        log.complete_txn(
            producer_id,
            producer_epoch,
            ControlMarker::abort(coordinator_epoch),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_core::IsolationLevel;
    use logstore::{MemoryLogStore, SnapshotBuffer};

    async fn coordinator() -> TransactionCoordinator {
        let store = Arc::new(MemoryLogStore::new());
        let snapshots = Arc::new(
            SnapshotBuffer::open(store.as_ref(), "__txn_producer_state", 2)
                .await
                .unwrap(),
        );
        let catalog = Arc::new(PartitionCatalog::new(store.clone(), snapshots));
        let state = TransactionStateManager::open(store.as_ref(), "__transaction_state", 2, 2)
            .await
            .unwrap();
        let coordinator = TransactionCoordinator::new(GatewayConfig::default(), state, catalog);
        coordinator.load().await.unwrap();
        coordinator
    }

    fn data_batch(pid: ProducerId, epoch: ProducerEpoch, seq: i32, value: &str) -> RecordBatch {
        RecordBatch {
            producer_id: pid,
            producer_epoch: epoch,
            base_sequence: seq,
            transactional: true,
            records: vec![rskafka::record::Record {
                key: None,
                value: Some(value.as_bytes().to_vec()),
                headers: Default::default(),
                timestamp: Utc::now(),
            }],
        }
    }

    #[tokio::test]
    async fn init_assigns_then_bumps_epoch() {
        let c = coordinator().await;
        let first = c.init_producer_id("tid", 60_000).await.unwrap();
        assert_eq!(first.producer_epoch, 0);

        let second = c.init_producer_id("tid", 60_000).await.unwrap();
        assert_eq!(second.producer_id, first.producer_id);
        assert_eq!(second.producer_epoch, 1);
    }

    #[tokio::test]
    async fn init_rejects_oversized_timeout() {
        let c = coordinator().await;
        let cap = GatewayConfig::default().transaction_max_timeout_ms;
        assert!(matches!(
            c.init_producer_id("tid", cap + 1).await,
            Err(Error::InvalidTransactionTimeout(_))
        ));
    }

    #[tokio::test]
    async fn commit_writes_markers_to_participants() {
        let c = coordinator().await;
        let id = c.init_producer_id("tid", 60_000).await.unwrap();
        let tp = TopicPartition::new("t", 0);
        c.add_partitions_to_txn("tid", id.producer_id, id.producer_epoch, vec![tp.clone()])
            .await
            .unwrap();

        let log = c.catalog.get_or_open(&tp).await.unwrap();
        log.append(data_batch(id.producer_id, id.producer_epoch, 0, "v"))
            .await
            .unwrap();

        c.end_txn("tid", id.producer_id, id.producer_epoch, true)
            .await
            .unwrap();

        let fetched = log.fetch(0, 100, IsolationLevel::ReadCommitted).await.unwrap();
        assert_eq!(fetched.last_stable_offset, 2);
        assert!(fetched.aborted_txns.unwrap().is_empty());

        let meta = c.state.get("tid").await.unwrap().unwrap();
        assert_eq!(meta.state, TxnState::CompleteCommit);
        assert!(meta.partitions.is_empty());

        // Retried commit of the completed transaction is accepted.
        c.end_txn("tid", id.producer_id, id.producer_epoch, true)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn end_txn_without_transaction_is_invalid() {
        let c = coordinator().await;
        let id = c.init_producer_id("tid", 60_000).await.unwrap();
        assert!(matches!(
            c.end_txn("tid", id.producer_id, id.producer_epoch, true).await,
            Err(Error::InvalidTxnState(_))
        ));
    }

    #[tokio::test]
    async fn stale_epoch_is_fenced() {
        let c = coordinator().await;
        let first = c.init_producer_id("tid", 60_000).await.unwrap();
        let second = c.init_producer_id("tid", 60_000).await.unwrap();
        assert!(second.producer_epoch > first.producer_epoch);

        let err = c
            .add_partitions_to_txn(
                "tid",
                first.producer_id,
                first.producer_epoch,
                vec![TopicPartition::new("t", 0)],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ProducerFenced(_)));
    }

    #[tokio::test]
    async fn init_aborts_inflight_transaction() {
        let c = coordinator().await;
        let first = c.init_producer_id("tid", 60_000).await.unwrap();
        let tp = TopicPartition::new("t", 0);
        c.add_partitions_to_txn("tid", first.producer_id, first.producer_epoch, vec![tp.clone()])
            .await
            .unwrap();
        let log = c.catalog.get_or_open(&tp).await.unwrap();
        log.append(data_batch(first.producer_id, first.producer_epoch, 0, "zombie"))
            .await
            .unwrap();

        // Second instance takes over: the open transaction is aborted.
        let second = c.init_producer_id("tid", 60_000).await.unwrap();
        assert!(second.producer_epoch > first.producer_epoch);

        let fetched = log.fetch(0, 100, IsolationLevel::ReadCommitted).await.unwrap();
        let aborted = fetched.aborted_txns.unwrap();
        assert_eq!(aborted.len(), 1);
        assert_eq!(aborted[0].producer_id, first.producer_id);
    }

    #[tokio::test]
    async fn timed_out_transactions_are_aborted() {
        let c = coordinator().await;
        let id = c.init_producer_id("tid", 1_000).await.unwrap();
        let tp = TopicPartition::new("t", 0);
        c.add_partitions_to_txn("tid", id.producer_id, id.producer_epoch, vec![tp])
            .await
            .unwrap();

        // Backdate the start so the sweep sees it as expired.
        {
            let mut shard = c.state.shard("tid").await.unwrap();
            let meta = shard.get_mut("tid").unwrap();
            meta.txn_start_time_ms -= 10_000;
        }

        assert_eq!(c.abort_timed_out_transactions().await.unwrap(), 1);
        let meta = c.state.get("tid").await.unwrap().unwrap();
        assert_eq!(meta.state, TxnState::CompleteAbort);
    }

    #[tokio::test]
    async fn expired_ids_are_removed() {
        let c = coordinator().await;
        c.init_producer_id("tid", 60_000).await.unwrap();
        {
            let mut shard = c.state.shard("tid").await.unwrap();
            let meta = shard.get_mut("tid").unwrap();
            meta.txn_last_update_time_ms -= GatewayConfig::default().transactional_id_expiration_ms + 1;
        }
        assert_eq!(c.expire_transactional_ids().await.unwrap(), 1);
        assert_eq!(c.state.get("tid").await.unwrap(), None);
    }

    #[tokio::test]
    async fn offsets_participate_in_transactions() {
        let c = coordinator().await;
        let id = c.init_producer_id("tid", 60_000).await.unwrap();
        let offsets_tp = c
            .add_offsets_to_txn("tid", id.producer_id, id.producer_epoch, "group-1")
            .await
            .unwrap();
        assert_eq!(offsets_tp.topic, OFFSETS_TOPIC);

        c.txn_offset_commit(
            "tid",
            id.producer_id,
            id.producer_epoch,
            "group-1",
            vec![(TopicPartition::new("t", 0), 41)],
        )
        .await
        .unwrap();

        // Uncommitted offsets are invisible to read-committed readers.
        let log = c.catalog.get_or_open(&offsets_tp).await.unwrap();
        let fetched = log.fetch(0, 100, IsolationLevel::ReadCommitted).await.unwrap();
        assert!(fetched.batches.is_empty());

        c.end_txn("tid", id.producer_id, id.producer_epoch, true)
            .await
            .unwrap();
        let fetched = log.fetch(0, 100, IsolationLevel::ReadCommitted).await.unwrap();
        assert_eq!(
            fetched
                .batches
                .iter()
                .filter(|b| !b.payload.is_control())
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn admin_abort_bypasses_coordinator_state() {
        let c = coordinator().await;
        let id = c.init_producer_id("tid", 60_000).await.unwrap();
        let tp = TopicPartition::new("t", 0);
        c.add_partitions_to_txn("tid", id.producer_id, id.producer_epoch, vec![tp.clone()])
            .await
            .unwrap();
        let log = c.catalog.get_or_open(&tp).await.unwrap();
        log.append(data_batch(id.producer_id, id.producer_epoch, 0, "x"))
            .await
            .unwrap();

        c.abort_transaction(&tp, id.producer_id, id.producer_epoch, 0)
            .await
            .unwrap();

        // The partition saw the abort; the coordinator still thinks the
        // transaction is ongoing.
        let fetched = log.fetch(0, 100, IsolationLevel::ReadCommitted).await.unwrap();
        assert_eq!(fetched.aborted_txns.unwrap().len(), 1);
        let meta = c.state.get("tid").await.unwrap().unwrap();
        assert_eq!(meta.state, TxnState::Ongoing);
    }
}

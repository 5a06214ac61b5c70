//! Binds one logical partition to the underlying store.
//!
//! The partition log is a single-writer domain: appends, control markers,
//! purges, and recovery all serialise on one writer lock over the producer
//! state manager, while fetches share a read lock. The store itself is only
//! ever touched through this binding.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{watch, Mutex, RwLock};
use tracing::{debug, info, warn};

use gateway_core::{
    ControlMarker, Error, IsolationLevel, Offset, ProducerEpoch, ProducerId, RecordBatch, Result,
    TopicPartition,
};
use logstore::{PartitionStore, SnapshotBuffer, StoredBatch, StoredPayload};
use telemetry::metrics;

use crate::aborted::AbortedTxn;
use crate::manager::{ProducerDescription, ProducerStateManager, SequenceCheck};
use crate::snapshot::ProducerStateSnapshot;

/// Lifecycle of a partition log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Uninitialised,
    Recovering,
    Ready,
    Unloaded,
}

/// Result of a validated append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendReceipt {
    pub base_offset: Offset,
    pub last_offset: Offset,
    /// True when the batch was a retransmission and no data was written.
    pub duplicate: bool,
}

/// Result of a fetch.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub batches: Vec<StoredBatch>,
    pub high_watermark: Offset,
    pub last_stable_offset: Offset,
    /// Aborted ranges overlapping the fetched window, in read-committed mode.
    pub aborted_txns: Option<Vec<AbortedTxn>>,
}

/// One partition bound to the store, with its producer state.
pub struct PartitionLog {
    tp: TopicPartition,
    store: Arc<dyn PartitionStore>,
    snapshots: Arc<SnapshotBuffer>,
    state: RwLock<ProducerStateManager>,
    lifecycle_tx: watch::Sender<LifecycleState>,
    lifecycle_rx: watch::Receiver<LifecycleState>,
    init_guard: Mutex<()>,
    purge_floor: AtomicI64,
}

impl PartitionLog {
    pub fn new(
        tp: TopicPartition,
        store: Arc<dyn PartitionStore>,
        snapshots: Arc<SnapshotBuffer>,
    ) -> Self {
        let manager = ProducerStateManager::new(store.topic_uuid(), tp.partition);
        let (lifecycle_tx, lifecycle_rx) = watch::channel(LifecycleState::Uninitialised);
        Self {
            tp,
            store,
            snapshots,
            state: RwLock::new(manager),
            lifecycle_tx,
            lifecycle_rx,
            init_guard: Mutex::new(()),
            purge_floor: AtomicI64::new(0),
        }
    }

    pub fn topic_partition(&self) -> &TopicPartition {
        &self.tp
    }

    /// Uuid of the topic incarnation this log was opened against.
    pub fn topic_uuid(&self) -> gateway_core::TopicUuid {
        self.store.topic_uuid()
    }

    pub fn lifecycle(&self) -> LifecycleState {
        *self.lifecycle_rx.borrow()
    }

    pub fn is_unloaded(&self) -> bool {
        self.lifecycle() == LifecycleState::Unloaded
    }

    fn ensure_ready(&self) -> Result<()> {
        match self.lifecycle() {
            LifecycleState::Ready => Ok(()),
            LifecycleState::Unloaded => Err(Error::PartitionUnavailable(format!(
                "{} is unloaded",
                self.tp
            ))),
            _ => Err(Error::PartitionUnavailable(format!(
                "{} is not initialised",
                self.tp
            ))),
        }
    }

    /// Resolves once producer state has been recovered.
    pub async fn await_initialisation(&self) -> Result<()> {
        let mut rx = self.lifecycle_rx.clone();
        loop {
            match *rx.borrow_and_update() {
                LifecycleState::Ready => return Ok(()),
                LifecycleState::Unloaded => {
                    return Err(Error::PartitionUnavailable(format!(
                        "{} was unloaded",
                        self.tp
                    )))
                }
                _ => {}
            }
            rx.changed()
                .await
                .map_err(|_| Error::PartitionUnavailable(self.tp.to_string()))?;
        }
    }

    /// Recovers producer state from the latest snapshot plus log replay.
    ///
    /// Safe to call more than once; only the first call does the work.
    pub async fn initialise(&self) -> Result<()> {
        let _guard = self.init_guard.lock().await;
        match self.lifecycle() {
            LifecycleState::Ready => return Ok(()),
            LifecycleState::Unloaded => {
                return Err(Error::PartitionUnavailable(format!(
                    "{} is unloaded",
                    self.tp
                )))
            }
            _ => {}
        }
        self.lifecycle_tx.send_replace(LifecycleState::Recovering);
        let started = Instant::now();
        self.recover().await?;
        self.lifecycle_tx.send_replace(LifecycleState::Ready);
        metrics().partitions_recovered.inc();
        metrics().ready_partitions.inc();
        metrics()
            .recovery_latency_ms
            .observe(started.elapsed().as_millis() as u64);
        Ok(())
    }

    async fn recover(&self) -> Result<()> {
        let mut state = self.state.write().await;
        *state = ProducerStateManager::new(self.store.topic_uuid(), self.tp.partition);

        let oldest = self.store.oldest_offset().await?;
        let high_watermark = self.store.next_offset().await?;

        if let Some(blob) = self
            .snapshots
            .read_latest(self.store.topic_uuid(), self.tp.partition)
            .await?
        {
            match ProducerStateSnapshot::decode(&blob) {
                Ok(snap)
                    if snap.topic_uuid == self.store.topic_uuid()
                        && snap.offset < high_watermark
                        && snap.offset + 1 >= oldest =>
                {
                    debug!(tp = %self.tp, offset = snap.offset, "Installed producer-state snapshot");
                    state.load_snapshot(snap);
                    metrics().snapshots_loaded.inc();
                }
                Ok(snap) => {
                    warn!(
                        tp = %self.tp, snapshot_offset = snap.offset, oldest, high_watermark,
                        "Discarding out-of-range producer-state snapshot"
                    );
                    metrics().snapshots_discarded.inc();
                }
                Err(e) => {
                    warn!(tp = %self.tp, error = %e, "Discarding corrupt producer-state snapshot");
                    metrics().snapshots_discarded.inc();
                }
            }
        }

        let mut from = state.recovery_point().max(oldest);
        while from < high_watermark {
            let batches = self.store.read(from, 256).await?;
            if batches.is_empty() {
                break;
            }
            for batch in &batches {
                state.apply_stored(batch);
                from = batch.last_offset() + 1;
            }
        }

        info!(
            tp = %self.tp,
            producers = state.producer_count(),
            recovery_point = state.recovery_point(),
            "Recovered partition producer state"
        );
        Ok(())
    }

    /// Validates and appends a batch of user records.
    pub async fn append(&self, batch: RecordBatch) -> Result<AppendReceipt> {
        self.ensure_ready()?;
        let started = Instant::now();
        let mut state = self.state.write().await;
        self.ensure_ready()?;

        let receipt = match state.validate_append(&batch).map_err(|e| {
            metrics().appends_rejected.inc();
            e
        })? {
            SequenceCheck::Duplicate(cached) => {
                metrics().duplicate_batches_returned.inc();
                debug!(
                    tp = %self.tp, producer_id = batch.producer_id,
                    base_offset = cached.base_offset,
                    "Returning cached offsets for duplicate batch"
                );
                AppendReceipt {
                    base_offset: cached.base_offset,
                    last_offset: cached.last_offset,
                    duplicate: true,
                }
            }
            SequenceCheck::Fresh => {
                let opened_txn =
                    batch.transactional && state.producer_entry(batch.producer_id).map_or(true, |e| e.current_txn_first_offset.is_none());
                let base_offset = self
                    .store
                    .append(StoredPayload::Data(batch.clone()))
                    .await?;
                state.apply_append(&batch, base_offset);
                if opened_txn {
                    metrics().open_transactions.inc();
                }
                metrics().batches_appended.inc();
                AppendReceipt {
                    base_offset,
                    last_offset: base_offset + batch.record_count().max(1) as i64 - 1,
                    duplicate: false,
                }
            }
        };
        metrics()
            .append_latency_ms
            .observe(started.elapsed().as_millis() as u64);
        Ok(receipt)
    }

    /// Fetches batches from an offset, honoring the isolation level.
    pub async fn fetch(
        &self,
        offset: Offset,
        max_batches: usize,
        isolation: IsolationLevel,
    ) -> Result<FetchResult> {
        self.ensure_ready()?;
        let state = self.state.read().await;
        let high_watermark = self.store.next_offset().await?;
        let last_stable_offset = state.last_stable_offset(high_watermark);

        let visible_end = match isolation {
            IsolationLevel::ReadUncommitted => high_watermark,
            IsolationLevel::ReadCommitted => last_stable_offset,
        };

        let batches: Vec<StoredBatch> = if offset >= visible_end {
            Vec::new()
        } else {
            self.store
                .read(offset, max_batches)
                .await?
                .into_iter()
                .filter(|b| b.base_offset < visible_end)
                .collect()
        };

        let aborted_txns = match isolation {
            IsolationLevel::ReadCommitted => {
                let window_end = batches
                    .last()
                    .map(|b| b.last_offset())
                    .unwrap_or(visible_end - 1);
                Some(state.aborted_overlapping(offset, window_end.max(offset)))
            }
            IsolationLevel::ReadUncommitted => None,
        };

        Ok(FetchResult {
            batches,
            high_watermark,
            last_stable_offset,
            aborted_txns,
        })
    }

    /// Appends a transaction marker and applies it to producer state.
    pub async fn complete_txn(
        &self,
        producer_id: ProducerId,
        producer_epoch: ProducerEpoch,
        marker: ControlMarker,
    ) -> Result<Offset> {
        self.ensure_ready()?;
        let mut state = self.state.write().await;
        self.ensure_ready()?;
        state.check_marker(producer_id, producer_epoch)?;

        let marker_offset = self
            .store
            .append(StoredPayload::Control {
                producer_id,
                producer_epoch,
                marker,
            })
            .await?;
        let completed = state.complete_txn(
            producer_id,
            producer_epoch,
            marker.marker_type,
            marker_offset,
            marker.coordinator_epoch,
        )?;
        if completed.is_some() {
            metrics().open_transactions.dec();
        }
        metrics().markers_written.inc();
        debug!(
            tp = %self.tp, producer_id, marker_offset,
            marker_type = ?marker.marker_type,
            "Applied transaction marker"
        );
        Ok(marker_offset)
    }

    /// Serialises producer state at the current boundary and publishes it.
    ///
    /// Publication happens off the writer lock; it is not on the append path.
    pub async fn take_producer_snapshot(&self) -> Result<Option<Offset>> {
        self.ensure_ready()?;
        let snap = {
            let state = self.state.write().await;
            state.snapshot()
        };
        if snap.offset < 0 {
            return Ok(None);
        }
        let offset = snap.offset;
        let blob = snap.encode()?;
        self.snapshots
            .publish(self.store.topic_uuid(), self.tp.partition, blob)
            .await?;
        metrics().snapshots_taken.inc();
        Ok(Some(offset))
    }

    /// Earliest offset still present in the underlying store.
    pub async fn fetch_oldest_available_offset(&self) -> Result<Offset> {
        self.store.oldest_offset().await
    }

    /// First offsets of the recorded aborted transactions, in index order.
    pub async fn aborted_txn_first_offsets(&self) -> Vec<Offset> {
        self.state.read().await.aborted_first_offsets()
    }

    /// Admin view of the producers writing to this partition.
    pub async fn describe_producers(&self) -> Result<Vec<ProducerDescription>> {
        self.ensure_ready()?;
        Ok(self.state.read().await.describe_producers())
    }

    /// Recomputes the offset below which aborted-tx entries may be purged.
    pub async fn update_purge_aborted_txns_offset(&self) -> Result<Offset> {
        let oldest = self.store.oldest_offset().await?;
        self.purge_floor.store(oldest, Ordering::Relaxed);
        Ok(oldest)
    }

    /// Purges aborted-tx entries whose data has been trimmed away.
    ///
    /// Serialised on the writer lock so a purge can never race an append or a
    /// stable-offset read.
    pub async fn force_purge_abort_tx(&self) -> Result<u64> {
        self.ensure_ready()?;
        let floor = self
            .update_purge_aborted_txns_offset()
            .await?
            .max(self.purge_floor.load(Ordering::Relaxed));
        let mut state = self.state.write().await;
        let purged = state.purge_aborted_before(floor) as u64;
        if purged > 0 {
            metrics().aborted_txns_purged.inc_by(purged);
            info!(tp = %self.tp, purged, floor, "Purged aborted transactions below trim point");
        }
        Ok(purged)
    }

    /// Marks the partition unloaded; all subsequent operations are rejected.
    pub async fn unload(&self) {
        let _state = self.state.write().await;
        let was_ready = self.lifecycle() == LifecycleState::Ready;
        self.lifecycle_tx.send_replace(LifecycleState::Unloaded);
        if was_ready {
            metrics().ready_partitions.dec();
        }
        info!(tp = %self.tp, "Partition unloaded");
    }
}

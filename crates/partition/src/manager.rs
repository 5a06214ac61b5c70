//! Per-partition producer state manager.
//!
//! The single authority on idempotence and transaction membership for one
//! partition. Purely in-memory; the owning partition log serialises all
//! mutations and drives recovery, snapshotting, and purging.

use std::collections::{BTreeMap, HashMap};
use tracing::warn;

use gateway_core::{
    Error, MarkerType, Offset, ProducerEpoch, ProducerId, RecordBatch, Result, TopicUuid,
};
use logstore::{StoredBatch, StoredPayload};

use crate::aborted::{AbortedTxn, AbortedTxnIndex};
use crate::producer_state::{CachedBatch, ProducerStateEntry};
use crate::snapshot::ProducerStateSnapshot;

/// Outcome of validating an incoming batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceCheck {
    /// New data; append it and call [`ProducerStateManager::apply_append`].
    Fresh,
    /// Retransmission of a batch in the idempotence window; return the
    /// original offsets without appending.
    Duplicate(CachedBatch),
}

/// A transaction closed by a control marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletedTxn {
    pub producer_id: ProducerId,
    pub first_offset: Offset,
    pub marker_offset: Offset,
    pub aborted: bool,
}

/// Admin view of one producer's state on a partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducerDescription {
    pub producer_id: ProducerId,
    pub producer_epoch: ProducerEpoch,
    pub coordinator_epoch: i32,
    pub last_sequence: Option<i32>,
    pub last_offset: Option<Offset>,
    pub current_txn_first_offset: Option<Offset>,
}

/// Producer state for one partition.
#[derive(Debug)]
pub struct ProducerStateManager {
    topic_uuid: TopicUuid,
    partition: i32,
    producers: HashMap<ProducerId, ProducerStateEntry>,
    /// Open transactions keyed by first offset; the minimum bounds the LSO.
    ongoing: BTreeMap<Offset, ProducerId>,
    aborted: AbortedTxnIndex,
    /// Last offset applied through this manager, -1 before any.
    applied_offset: Offset,
}

impl ProducerStateManager {
    pub fn new(topic_uuid: TopicUuid, partition: i32) -> Self {
        Self {
            topic_uuid,
            partition,
            producers: HashMap::new(),
            ongoing: BTreeMap::new(),
            aborted: AbortedTxnIndex::default(),
            applied_offset: -1,
        }
    }

    pub fn topic_uuid(&self) -> TopicUuid {
        self.topic_uuid
    }

    /// Offset replay should continue from.
    pub fn recovery_point(&self) -> Offset {
        self.applied_offset + 1
    }

    /// Validates an incoming batch against the producer's entry.
    ///
    /// A batch from a lower epoch is always rejected, so a fenced producer
    /// instance fails at produce time rather than at commit.
    pub fn validate_append(&self, batch: &RecordBatch) -> Result<SequenceCheck> {
        if !batch.has_producer_id() {
            return Ok(SequenceCheck::Fresh);
        }
        let pid = batch.producer_id;
        let Some(entry) = self.producers.get(&pid) else {
            if batch.base_sequence == 0 || batch.base_sequence < 0 {
                return Ok(SequenceCheck::Fresh);
            }
            return Err(Error::UnknownProducerId(pid));
        };

        if batch.producer_epoch < entry.producer_epoch {
            return Err(Error::invalid_epoch(format!(
                "producer {pid} epoch {} is behind current epoch {}",
                batch.producer_epoch, entry.producer_epoch
            )));
        }

        // Coordinator-written batches (offset commits) carry no sequence.
        if batch.base_sequence < 0 {
            return Ok(SequenceCheck::Fresh);
        }

        if batch.producer_epoch > entry.producer_epoch {
            // A bumped producer starts over at sequence zero.
            if batch.base_sequence != 0 {
                return Err(Error::OutOfOrderSequenceNumber(format!(
                    "producer {pid} epoch {} must restart at sequence 0, got {}",
                    batch.producer_epoch, batch.base_sequence
                )));
            }
            return Ok(SequenceCheck::Fresh);
        }

        if let Some(dup) = entry.find_duplicate(batch.base_sequence, batch.last_sequence()) {
            return Ok(SequenceCheck::Duplicate(dup));
        }

        match entry.next_expected_sequence() {
            None => {
                if batch.base_sequence == 0 {
                    Ok(SequenceCheck::Fresh)
                } else {
                    Err(Error::OutOfOrderSequenceNumber(format!(
                        "producer {pid} has no sequence history, got {}",
                        batch.base_sequence
                    )))
                }
            }
            Some(expected) if batch.base_sequence == expected => Ok(SequenceCheck::Fresh),
            Some(expected) => {
                let last = entry.last_sequence().unwrap_or(-1);
                if batch.base_sequence <= last {
                    Err(Error::DuplicateSequenceNumber(format!(
                        "producer {pid} sequence {} at or below last {last}",
                        batch.base_sequence
                    )))
                } else {
                    Err(Error::OutOfOrderSequenceNumber(format!(
                        "producer {pid} sequence {} but expected {expected}",
                        batch.base_sequence
                    )))
                }
            }
        }
    }

    /// Applies an accepted batch at its assigned offsets.
    pub fn apply_append(&mut self, batch: &RecordBatch, base_offset: Offset) {
        let last_offset = base_offset + batch.record_count().max(1) as i64 - 1;
        self.applied_offset = last_offset;
        if !batch.has_producer_id() {
            return;
        }

        let timestamp_ms = batch
            .records
            .last()
            .map(|r| r.timestamp.timestamp_millis())
            .unwrap_or(0);

        let entry = self
            .producers
            .entry(batch.producer_id)
            .or_insert_with(|| ProducerStateEntry::new(batch.producer_epoch));
        if batch.producer_epoch > entry.producer_epoch {
            entry.bump_epoch(batch.producer_epoch);
        }
        if batch.base_sequence >= 0 {
            entry.add_batch(
                CachedBatch {
                    first_sequence: batch.base_sequence,
                    last_sequence: batch.last_sequence(),
                    base_offset,
                    last_offset,
                },
                timestamp_ms,
            );
        } else {
            entry.last_timestamp_ms = timestamp_ms;
        }

        if batch.transactional && entry.current_txn_first_offset.is_none() {
            entry.current_txn_first_offset = Some(base_offset);
            self.ongoing.insert(base_offset, batch.producer_id);
        }
    }

    /// Closes the open transaction for a producer at a marker offset.
    ///
    /// Idempotent: a marker for an already-completed transaction (or an
    /// unknown producer) is a no-op.
    pub fn complete_txn(
        &mut self,
        producer_id: ProducerId,
        producer_epoch: ProducerEpoch,
        marker_type: MarkerType,
        marker_offset: Offset,
        coordinator_epoch: i32,
    ) -> Result<Option<CompletedTxn>> {
        self.applied_offset = self.applied_offset.max(marker_offset);
        let Some(entry) = self.producers.get_mut(&producer_id) else {
            return Ok(None);
        };
        if producer_epoch < entry.producer_epoch {
            return Err(Error::invalid_epoch(format!(
                "marker for producer {producer_id} epoch {producer_epoch} behind {}",
                entry.producer_epoch
            )));
        }
        if producer_epoch > entry.producer_epoch {
            entry.bump_epoch(producer_epoch);
        }
        if coordinator_epoch > entry.coordinator_epoch {
            entry.coordinator_epoch = coordinator_epoch;
        }

        let Some(first_offset) = entry.current_txn_first_offset.take() else {
            return Ok(None);
        };
        self.ongoing.remove(&first_offset);

        let aborted = marker_type == MarkerType::Abort;
        if aborted {
            let last_stable = self.last_stable_offset(marker_offset + 1);
            self.aborted.insert(AbortedTxn {
                producer_id,
                first_offset,
                last_offset: marker_offset - 1,
                last_stable_offset: last_stable,
            });
        }

        Ok(Some(CompletedTxn {
            producer_id,
            first_offset,
            marker_offset,
            aborted,
        }))
    }

    /// Checks a marker's epoch without applying it.
    pub fn check_marker(&self, producer_id: ProducerId, producer_epoch: ProducerEpoch) -> Result<()> {
        if let Some(entry) = self.producers.get(&producer_id) {
            if producer_epoch < entry.producer_epoch {
                return Err(Error::invalid_epoch(format!(
                    "marker for producer {producer_id} epoch {producer_epoch} behind {}",
                    entry.producer_epoch
                )));
            }
        }
        Ok(())
    }

    /// Replays one stored batch during recovery.
    pub fn apply_stored(&mut self, stored: &StoredBatch) {
        if stored.last_offset() <= self.applied_offset {
            return;
        }
        match &stored.payload {
            StoredPayload::Data(batch) => self.apply_append(batch, stored.base_offset),
            StoredPayload::Control {
                producer_id,
                producer_epoch,
                marker,
            } => {
                if let Err(e) = self.complete_txn(
                    *producer_id,
                    *producer_epoch,
                    marker.marker_type,
                    stored.base_offset,
                    marker.coordinator_epoch,
                ) {
                    warn!(
                        partition = self.partition,
                        producer_id, error = %e,
                        "Skipping stale control marker during replay"
                    );
                }
            }
        }
    }

    /// First offset of the earliest open transaction.
    pub fn first_open_txn_offset(&self) -> Option<Offset> {
        self.ongoing.keys().next().copied()
    }

    /// Largest offset below which every transaction is complete.
    pub fn last_stable_offset(&self, high_watermark: Offset) -> Offset {
        match self.first_open_txn_offset() {
            Some(first) => first.min(high_watermark),
            None => high_watermark,
        }
    }

    pub fn aborted_overlapping(&self, fetch_start: Offset, fetch_end: Offset) -> Vec<AbortedTxn> {
        self.aborted.overlapping(fetch_start, fetch_end)
    }

    pub fn aborted_first_offsets(&self) -> Vec<Offset> {
        self.aborted.first_offsets()
    }

    pub fn purge_aborted_before(&mut self, min_valid_offset: Offset) -> usize {
        self.aborted.purge_before(min_valid_offset)
    }

    pub fn producer_entry(&self, producer_id: ProducerId) -> Option<&ProducerStateEntry> {
        self.producers.get(&producer_id)
    }

    /// Admin view of every producer on this partition.
    pub fn describe_producers(&self) -> Vec<ProducerDescription> {
        let mut out: Vec<ProducerDescription> = self
            .producers
            .iter()
            .map(|(&producer_id, entry)| ProducerDescription {
                producer_id,
                producer_epoch: entry.producer_epoch,
                coordinator_epoch: entry.coordinator_epoch,
                last_sequence: entry.last_sequence(),
                last_offset: entry.last_offset(),
                current_txn_first_offset: entry.current_txn_first_offset,
            })
            .collect();
        out.sort_by_key(|d| d.producer_id);
        out
    }

    pub fn producer_count(&self) -> usize {
        self.producers.len()
    }

    /// Takes a snapshot at the current applied-offset boundary.
    pub fn snapshot(&self) -> ProducerStateSnapshot {
        let ongoing_txns = self
            .ongoing
            .iter()
            .map(|(&offset, &pid)| (pid, offset))
            .collect();
        ProducerStateSnapshot {
            topic_uuid: self.topic_uuid,
            partition: self.partition,
            offset: self.applied_offset,
            producers: self.producers.iter().map(|(k, v)| (*k, v.clone())).collect(),
            ongoing_txns,
            aborted_index: self.aborted.clone(),
        }
    }

    /// Replaces in-memory state with a snapshot's contents.
    pub fn load_snapshot(&mut self, snap: ProducerStateSnapshot) {
        self.topic_uuid = snap.topic_uuid;
        self.producers = snap.producers.into_iter().collect();
        self.ongoing = snap
            .ongoing_txns
            .into_iter()
            .map(|(pid, offset)| (offset, pid))
            .collect();
        self.aborted = snap.aborted_index;
        self.applied_offset = snap.offset;
    }
}

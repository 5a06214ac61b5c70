//! Per-producer state within one partition.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use gateway_core::{next_sequence, Offset, ProducerEpoch, SequenceNumber};

/// How many accepted batches are kept per producer to answer duplicates.
pub const MAX_CACHED_BATCHES: usize = 5;

/// Metadata of one accepted batch, kept for the idempotence window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedBatch {
    pub first_sequence: SequenceNumber,
    pub last_sequence: SequenceNumber,
    pub base_offset: Offset,
    pub last_offset: Offset,
}

/// Sequence and transaction state for one producer id on one partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProducerStateEntry {
    pub producer_epoch: ProducerEpoch,
    pub coordinator_epoch: i32,
    pub last_timestamp_ms: i64,
    /// First offset of the producer's open transaction, if any.
    pub current_txn_first_offset: Option<Offset>,
    /// Most recent accepted batches, oldest first.
    batches: VecDeque<CachedBatch>,
}

impl ProducerStateEntry {
    pub fn new(producer_epoch: ProducerEpoch) -> Self {
        Self {
            producer_epoch,
            coordinator_epoch: -1,
            last_timestamp_ms: 0,
            current_txn_first_offset: None,
            batches: VecDeque::with_capacity(MAX_CACHED_BATCHES),
        }
    }

    /// Sequence number of the most recently accepted batch.
    pub fn last_sequence(&self) -> Option<SequenceNumber> {
        self.batches.back().map(|b| b.last_sequence)
    }

    /// Offset of the most recently accepted record.
    pub fn last_offset(&self) -> Option<Offset> {
        self.batches.back().map(|b| b.last_offset)
    }

    /// The sequence the next batch is expected to start at.
    pub fn next_expected_sequence(&self) -> Option<SequenceNumber> {
        self.last_sequence().map(next_sequence)
    }

    /// Looks the batch up in the idempotence window.
    pub fn find_duplicate(
        &self,
        first_sequence: SequenceNumber,
        last_sequence: SequenceNumber,
    ) -> Option<CachedBatch> {
        self.batches
            .iter()
            .find(|b| b.first_sequence == first_sequence && b.last_sequence == last_sequence)
            .copied()
    }

    /// Records an accepted batch, evicting the oldest beyond the window.
    pub fn add_batch(&mut self, batch: CachedBatch, timestamp_ms: i64) {
        if self.batches.len() == MAX_CACHED_BATCHES {
            self.batches.pop_front();
        }
        self.batches.push_back(batch);
        self.last_timestamp_ms = timestamp_ms;
    }

    /// Moves the entry to a newer epoch, resetting the sequence expectation.
    pub fn bump_epoch(&mut self, epoch: ProducerEpoch) {
        debug_assert!(epoch > self.producer_epoch);
        self.producer_epoch = epoch;
        self.batches.clear();
    }

    pub fn cached_batches(&self) -> impl Iterator<Item = &CachedBatch> {
        self.batches.iter()
    }
}

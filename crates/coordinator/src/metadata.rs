//! Per-transactional-id state machine.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use gateway_core::{Error, ProducerEpoch, ProducerId, Result, TopicPartition, NO_PRODUCER_EPOCH};

/// State of one transactional id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TxnState {
    Empty,
    Ongoing,
    PrepareCommit,
    PrepareAbort,
    CompleteCommit,
    CompleteAbort,
    Dead,
}

impl TxnState {
    /// States with no transaction in flight.
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Empty | Self::CompleteCommit | Self::CompleteAbort)
    }

    /// States where markers are being written and a new request must wait.
    pub fn is_preparing(&self) -> bool {
        matches!(self, Self::PrepareCommit | Self::PrepareAbort)
    }

    /// Valid transitions per the coordinator state machine.
    pub fn can_transition_to(self, next: TxnState) -> bool {
        use TxnState::*;
        match self {
            Empty => matches!(next, Empty | Ongoing | Dead),
            Ongoing => matches!(next, Ongoing | PrepareCommit | PrepareAbort),
            PrepareCommit => matches!(next, CompleteCommit),
            PrepareAbort => matches!(next, CompleteAbort),
            CompleteCommit | CompleteAbort => matches!(next, Empty | Ongoing | Dead),
            Dead => false,
        }
    }
}

/// Coordinator-side metadata for one transactional id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionMetadata {
    pub transactional_id: String,
    pub producer_id: ProducerId,
    pub producer_epoch: ProducerEpoch,
    pub last_producer_epoch: ProducerEpoch,
    pub txn_timeout_ms: i32,
    pub state: TxnState,
    pub partitions: BTreeSet<TopicPartition>,
    pub txn_start_time_ms: i64,
    pub txn_last_update_time_ms: i64,
}

impl TransactionMetadata {
    pub fn new(
        transactional_id: impl Into<String>,
        producer_id: ProducerId,
        txn_timeout_ms: i32,
        now_ms: i64,
    ) -> Self {
        Self {
            transactional_id: transactional_id.into(),
            producer_id,
            producer_epoch: 0,
            last_producer_epoch: NO_PRODUCER_EPOCH,
            txn_timeout_ms,
            state: TxnState::Empty,
            partitions: BTreeSet::new(),
            txn_start_time_ms: now_ms,
            txn_last_update_time_ms: now_ms,
        }
    }

    /// Fences requests from stale or foreign producers.
    pub fn check_producer(&self, producer_id: ProducerId, epoch: ProducerEpoch) -> Result<()> {
        if producer_id != self.producer_id {
            return Err(Error::fenced(format!(
                "producer {producer_id} does not own transactional id {}",
                self.transactional_id
            )));
        }
        if epoch < self.producer_epoch {
            return Err(Error::fenced(format!(
                "epoch {epoch} for {} superseded by {}",
                self.transactional_id, self.producer_epoch
            )));
        }
        if epoch > self.producer_epoch {
            return Err(Error::invalid_epoch(format!(
                "epoch {epoch} for {} ahead of coordinator epoch {}",
                self.transactional_id, self.producer_epoch
            )));
        }
        Ok(())
    }

    /// Moves to `next`, validating the transition.
    pub fn transition_to(&mut self, next: TxnState, now_ms: i64) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(Error::invalid_state(format!(
                "{}: {:?} -> {:?} is not a valid transition",
                self.transactional_id, self.state, next
            )));
        }
        if next == TxnState::Ongoing && self.state != TxnState::Ongoing {
            self.txn_start_time_ms = now_ms;
        }
        self.state = next;
        self.txn_last_update_time_ms = now_ms;
        Ok(())
    }

    /// Adds participants; only legal while idle-empty or ongoing.
    pub fn add_partitions(
        &mut self,
        partitions: impl IntoIterator<Item = TopicPartition>,
        now_ms: i64,
    ) -> Result<()> {
        match self.state {
            TxnState::Empty | TxnState::CompleteCommit | TxnState::CompleteAbort => {
                self.partitions = partitions.into_iter().collect();
                self.transition_to(TxnState::Ongoing, now_ms)
            }
            TxnState::Ongoing => {
                self.partitions.extend(partitions);
                self.txn_last_update_time_ms = now_ms;
                Ok(())
            }
            state if state.is_preparing() => Err(Error::ConcurrentTransactions(format!(
                "{} is completing a transaction",
                self.transactional_id
            ))),
            state => Err(Error::invalid_state(format!(
                "cannot add partitions to {} in {state:?}",
                self.transactional_id
            ))),
        }
    }

    /// Bumps the producer epoch for a re-initialisation.
    ///
    /// Returns `true` when the epoch space is exhausted and the caller must
    /// allocate a fresh producer id instead.
    pub fn bump_epoch(&mut self, now_ms: i64) -> bool {
        self.last_producer_epoch = self.producer_epoch;
        if self.producer_epoch == i16::MAX {
            return true;
        }
        self.producer_epoch += 1;
        self.partitions.clear();
        self.state = TxnState::Empty;
        self.txn_last_update_time_ms = now_ms;
        false
    }

    /// Whether an ongoing transaction has outlived its timeout.
    pub fn is_timed_out(&self, now_ms: i64) -> bool {
        self.state == TxnState::Ongoing
            && now_ms - self.txn_start_time_ms > self.txn_timeout_ms as i64
    }

    /// Whether an idle id has been unused long enough to expire.
    pub fn is_expired(&self, now_ms: i64, expiration_ms: i64) -> bool {
        self.state.is_idle() && now_ms - self.txn_last_update_time_ms > expiration_ms
    }
}

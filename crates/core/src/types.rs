//! Core identifier types shared across the gateway.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Producer id assigned by the transaction coordinator.
pub type ProducerId = i64;

/// Producer epoch, bumped on every re-initialisation of a transactional id.
pub type ProducerEpoch = i16;

/// Record sequence number, wrapping at 2^31.
pub type SequenceNumber = i32;

/// Offset within a partition.
pub type Offset = i64;

/// Sentinel for "no producer id".
pub const NO_PRODUCER_ID: ProducerId = -1;

/// Sentinel for "no producer epoch".
pub const NO_PRODUCER_EPOCH: ProducerEpoch = -1;

/// Internal topic holding coordinator transaction state.
pub const TXN_LOG_TOPIC: &str = "__transaction_state";

/// Internal topic holding producer-state snapshots.
pub const PRODUCER_SNAPSHOT_TOPIC: &str = "__txn_producer_state";

/// Internal topic holding consumer group offsets.
pub const OFFSETS_TOPIC: &str = "__consumer_offsets";

/// Advances a sequence number with wrap at 2^31.
pub fn next_sequence(seq: SequenceNumber) -> SequenceNumber {
    if seq == i32::MAX {
        0
    } else {
        seq + 1
    }
}

/// Increments a sequence by the number of records in a batch, with wrap.
pub fn sequence_add(seq: SequenceNumber, delta: i32) -> SequenceNumber {
    ((seq as i64 + delta as i64) % (1i64 << 31)) as i32
}

/// A topic and partition pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TopicPartition {
    pub topic: String,
    pub partition: i32,
}

impl TopicPartition {
    pub fn new(topic: impl Into<String>, partition: i32) -> Self {
        Self {
            topic: topic.into(),
            partition,
        }
    }
}

impl fmt::Display for TopicPartition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.topic, self.partition)
    }
}

/// Stable identity of a topic incarnation.
///
/// A deleted-and-recreated topic keeps its name but gets a fresh uuid, which
/// is how stale producer-state snapshots are told apart from live ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TopicUuid(pub Uuid);

impl TopicUuid {
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for TopicUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Fetch isolation level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IsolationLevel {
    #[default]
    ReadUncommitted,
    ReadCommitted,
}

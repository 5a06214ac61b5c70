//! Ordered index of aborted transactions for read-committed filtering.

use serde::{Deserialize, Serialize};

use gateway_core::{Offset, ProducerId};

/// One aborted transaction's offset range on a partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbortedTxn {
    pub producer_id: ProducerId,
    pub first_offset: Offset,
    pub last_offset: Offset,
    /// Stable offset observed when the abort marker was applied.
    pub last_stable_offset: Offset,
}

/// Aborted transactions sorted by `first_offset`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbortedTxnIndex {
    entries: Vec<AbortedTxn>,
}

impl AbortedTxnIndex {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Inserts keeping the `first_offset` ordering.
    pub fn insert(&mut self, txn: AbortedTxn) {
        debug_assert!(txn.last_offset >= txn.first_offset);
        let pos = self
            .entries
            .partition_point(|e| e.first_offset <= txn.first_offset);
        self.entries.insert(pos, txn);
    }

    /// All aborted ranges overlapping `[fetch_start, fetch_end]`.
    pub fn overlapping(&self, fetch_start: Offset, fetch_end: Offset) -> Vec<AbortedTxn> {
        let from = self.entries.partition_point(|e| e.last_offset < fetch_start);
        self.entries[from..]
            .iter()
            .take_while(|e| e.first_offset <= fetch_end)
            .filter(|e| e.last_offset >= fetch_start)
            .copied()
            .collect()
    }

    /// Removes entries whose data is fully below `min_valid_offset`.
    pub fn purge_before(&mut self, min_valid_offset: Offset) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| e.last_offset >= min_valid_offset);
        before - self.entries.len()
    }

    /// First offsets in index order.
    pub fn first_offsets(&self) -> Vec<Offset> {
        self.entries.iter().map(|e| e.first_offset).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AbortedTxn> {
        self.entries.iter()
    }
}

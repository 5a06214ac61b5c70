//! Versioned producer-state snapshot encoding.
//!
//! The blob layout is a 2-byte big-endian version prefix followed by the JSON
//! body, so the schema can evolve without breaking stored snapshots.

use bytes::{Buf, BufMut, BytesMut};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use gateway_core::{Error, Offset, ProducerId, Result, TopicUuid};

use crate::aborted::AbortedTxnIndex;
use crate::producer_state::ProducerStateEntry;

/// Current snapshot schema version.
pub const SNAPSHOT_VERSION: u16 = 1;

/// Durable image of a partition's producer state at an offset boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProducerStateSnapshot {
    pub topic_uuid: TopicUuid,
    pub partition: i32,
    /// Last offset included in the snapshot.
    pub offset: Offset,
    pub producers: BTreeMap<ProducerId, ProducerStateEntry>,
    /// First offset of each open transaction, by producer id.
    pub ongoing_txns: BTreeMap<ProducerId, Offset>,
    pub aborted_index: AbortedTxnIndex,
}

impl ProducerStateSnapshot {
    pub fn encode(&self) -> Result<Vec<u8>> {
        let body = serde_json::to_vec(self)?;
        let mut buf = BytesMut::with_capacity(2 + body.len());
        buf.put_u16(SNAPSHOT_VERSION);
        buf.put_slice(&body);
        Ok(buf.to_vec())
    }

    pub fn decode(mut blob: &[u8]) -> Result<Self> {
        if blob.remaining() < 2 {
            return Err(Error::corrupt("snapshot blob too short"));
        }
        let version = blob.get_u16();
        if version != SNAPSHOT_VERSION {
            return Err(Error::corrupt(format!(
                "unsupported snapshot version {version}"
            )));
        }
        Ok(serde_json::from_slice(blob)?)
    }
}

//! Record batches and transaction control markers.
//!
//! User records reuse the rskafka record model; control markers carry the
//! fixed binary encoding `{version: i16, type: i16, coordinator_epoch: i32}`.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use rskafka::record::Record;

use crate::error::{Error, Result};
use crate::types::{sequence_add, ProducerEpoch, ProducerId, SequenceNumber};

/// Current control marker schema version.
pub const CONTROL_MARKER_VERSION: i16 = 0;

/// A batch of user records from one producer.
#[derive(Debug, Clone)]
pub struct RecordBatch {
    pub producer_id: ProducerId,
    pub producer_epoch: ProducerEpoch,
    pub base_sequence: SequenceNumber,
    pub transactional: bool,
    pub records: Vec<Record>,
}

impl RecordBatch {
    pub fn record_count(&self) -> i32 {
        self.records.len() as i32
    }

    /// Sequence number of the last record in the batch, with wrap.
    pub fn last_sequence(&self) -> SequenceNumber {
        sequence_add(self.base_sequence, self.record_count().max(1) - 1)
    }

    /// True for batches written by an idempotent or transactional producer.
    pub fn has_producer_id(&self) -> bool {
        self.producer_id >= 0
    }
}

/// Whether a transaction marker commits or aborts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i16)]
pub enum MarkerType {
    Commit = 0,
    Abort = 1,
}

impl MarkerType {
    fn from_i16(v: i16) -> Result<Self> {
        match v {
            0 => Ok(Self::Commit),
            1 => Ok(Self::Abort),
            other => Err(Error::corrupt(format!("unknown marker type {other}"))),
        }
    }
}

/// Transaction marker written as a control batch to each participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlMarker {
    pub version: i16,
    pub marker_type: MarkerType,
    pub coordinator_epoch: i32,
}

impl ControlMarker {
    pub fn commit(coordinator_epoch: i32) -> Self {
        Self {
            version: CONTROL_MARKER_VERSION,
            marker_type: MarkerType::Commit,
            coordinator_epoch,
        }
    }

    pub fn abort(coordinator_epoch: i32) -> Self {
        Self {
            version: CONTROL_MARKER_VERSION,
            marker_type: MarkerType::Abort,
            coordinator_epoch,
        }
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(8);
        buf.put_i16(self.version);
        buf.put_i16(self.marker_type as i16);
        buf.put_i32(self.coordinator_epoch);
        buf.freeze()
    }

    pub fn decode(mut buf: &[u8]) -> Result<Self> {
        if buf.remaining() < 8 {
            return Err(Error::corrupt(format!(
                "control marker too short: {} bytes",
                buf.remaining()
            )));
        }
        let version = buf.get_i16();
        if version > CONTROL_MARKER_VERSION {
            return Err(Error::corrupt(format!(
                "unsupported control marker version {version}"
            )));
        }
        let marker_type = MarkerType::from_i16(buf.get_i16())?;
        let coordinator_epoch = buf.get_i32();
        Ok(Self {
            version,
            marker_type,
            coordinator_epoch,
        })
    }
}

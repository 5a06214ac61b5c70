//! Producer and consumer helpers for the end-to-end scenarios.

use std::collections::HashMap;

use chrono::Utc;
use rskafka::record::Record;

use gateway_core::{
    IsolationLevel, Offset, ProducerEpoch, ProducerId, RecordBatch, Result, TopicPartition,
};
use partition_log::{AbortedTxn, AppendReceipt};

use crate::setup::TestContext;

pub const TEST_TXN_TIMEOUT_MS: i32 = 60_000;

pub fn record(value: &str) -> Record {
    Record {
        key: None,
        value: Some(value.as_bytes().to_vec()),
        headers: Default::default(),
        timestamp: Utc::now(),
    }
}

/// A transactional producer instance driving the coordinator and the
/// partition logs the way a Kafka client would.
pub struct TxnProducer {
    txn_id: String,
    pub producer_id: ProducerId,
    pub producer_epoch: ProducerEpoch,
    sequences: HashMap<TopicPartition, i32>,
}

impl TxnProducer {
    /// `initTransactions`: obtains a (pid, epoch), fencing prior instances.
    pub async fn init(ctx: &TestContext, txn_id: &str) -> Result<Self> {
        let id = ctx
            .coordinator
            .init_producer_id(txn_id, TEST_TXN_TIMEOUT_MS)
            .await?;
        Ok(Self {
            txn_id: txn_id.to_string(),
            producer_id: id.producer_id,
            producer_epoch: id.producer_epoch,
            sequences: HashMap::new(),
        })
    }

    /// Sends one transactional record, registering the partition on first use.
    pub async fn send(
        &mut self,
        ctx: &TestContext,
        tp: &TopicPartition,
        value: &str,
    ) -> Result<AppendReceipt> {
        ctx.coordinator
            .add_partitions_to_txn(
                &self.txn_id,
                self.producer_id,
                self.producer_epoch,
                vec![tp.clone()],
            )
            .await?;

        let base_sequence = *self.sequences.get(tp).unwrap_or(&0);
        let batch = RecordBatch {
            producer_id: self.producer_id,
            producer_epoch: self.producer_epoch,
            base_sequence,
            transactional: true,
            records: vec![record(value)],
        };
        let log = ctx.catalog.get_or_open(tp).await?;
        let receipt = log.append(batch).await?;
        self.sequences.insert(tp.clone(), base_sequence + 1);
        Ok(receipt)
    }

    /// Direct access to the per-partition sequence counters, for tests that
    /// simulate client retries.
    pub fn sequences_mut(&mut self) -> &mut HashMap<TopicPartition, i32> {
        &mut self.sequences
    }

    pub async fn commit(&self, ctx: &TestContext) -> Result<()> {
        ctx.coordinator
            .end_txn(&self.txn_id, self.producer_id, self.producer_epoch, true)
            .await
    }

    pub async fn abort(&self, ctx: &TestContext) -> Result<()> {
        ctx.coordinator
            .end_txn(&self.txn_id, self.producer_id, self.producer_epoch, false)
            .await
    }
}

/// Everything a read-committed poll of one partition returned.
pub struct CommittedRead {
    pub values: Vec<String>,
    pub aborted: Vec<AbortedTxn>,
    pub last_stable_offset: Offset,
}

/// Consumes a partition from `from` in read-committed mode, applying the
/// aborted-transaction ranges the way a Kafka client does: control batches
/// are skipped, and data batches inside an aborted range of their producer
/// are dropped.
pub async fn read_committed(
    ctx: &TestContext,
    tp: &TopicPartition,
    from: Offset,
) -> Result<CommittedRead> {
    let log = ctx.catalog.get_or_open(tp).await?;

    let mut aborted: Vec<AbortedTxn> = Vec::new();
    let mut batches = Vec::new();
    let mut last_stable_offset = 0;
    let mut next = from;
    loop {
        let fetched = log.fetch(next, 128, IsolationLevel::ReadCommitted).await?;
        last_stable_offset = fetched.last_stable_offset;
        if let Some(ranges) = fetched.aborted_txns {
            for range in ranges {
                if !aborted.contains(&range) {
                    aborted.push(range);
                }
            }
        }
        let Some(last) = fetched.batches.last() else {
            break;
        };
        next = last.last_offset() + 1;
        batches.extend(fetched.batches);
    }

    let mut values = Vec::new();
    for batch in &batches {
        let logstore::StoredPayload::Data(data) = &batch.payload else {
            continue;
        };
        let in_aborted_range = aborted.iter().any(|a| {
            a.producer_id == data.producer_id
                && batch.base_offset >= a.first_offset
                && batch.base_offset <= a.last_offset
        });
        if in_aborted_range {
            continue;
        }
        for rec in &data.records {
            if let Some(value) = &rec.value {
                values.push(String::from_utf8_lossy(value).into_owned());
            }
        }
    }

    Ok(CommittedRead {
        values,
        aborted,
        last_stable_offset,
    })
}

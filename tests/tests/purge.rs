//! Aborted-transaction index purge after the store trims the log head.

use gateway_core::{RecordBatch, TopicPartition, NO_PRODUCER_EPOCH, NO_PRODUCER_ID};
use integration_tests::fixtures::{read_committed, record, TxnProducer};
use integration_tests::setup::TestContext;
use logstore::{LogStore, PartitionStore};

/// Aborted ranges whose data has been trimmed away are purged; ranges still
/// covered by live data survive.
#[tokio::test]
async fn purge_drops_trimmed_aborted_ranges() {
    let ctx = TestContext::new().await;
    let tp = TopicPartition::new("t", 0);

    let mut producer = TxnProducer::init(&ctx, "X").await.unwrap();

    // tx1 aborted: data at 0..=1, marker at 2.
    producer.send(&ctx, &tp, "tx1-a").await.unwrap();
    producer.send(&ctx, &tp, "tx1-b").await.unwrap();
    producer.abort(&ctx).await.unwrap();

    // tx2 committed: data at 3, marker at 4.
    producer.send(&ctx, &tp, "tx2-a").await.unwrap();
    producer.commit(&ctx).await.unwrap();

    // Store trims the head.
    let partition = ctx.store.open(&tp).await.unwrap();
    partition.trim(5).await.unwrap();

    // Non-transactional filler advances the log to offset 11.
    let log = ctx.catalog.get_or_open(&tp).await.unwrap();
    log.append(RecordBatch {
        producer_id: NO_PRODUCER_ID,
        producer_epoch: NO_PRODUCER_EPOCH,
        base_sequence: 0,
        transactional: false,
        records: (0..6).map(|i| record(&format!("fill-{i}"))).collect(),
    })
    .await
    .unwrap();

    // tx3 aborted: data at 11, marker at 12.
    producer.send(&ctx, &tp, "tx3-a").await.unwrap();
    producer.abort(&ctx).await.unwrap();

    // tx4 committed: data at 13, marker at 14.
    producer.send(&ctx, &tp, "tx4-a").await.unwrap();
    producer.commit(&ctx).await.unwrap();

    assert_eq!(log.aborted_txn_first_offsets().await, vec![0, 11]);

    let purged = log.force_purge_abort_tx().await.unwrap();
    assert_eq!(purged, 1);
    assert_eq!(log.aborted_txn_first_offsets().await, vec![11]);

    // Queries past the purge point are unchanged: tx3 is still filtered.
    let read = read_committed(&ctx, &tp, 5).await.unwrap();
    assert!(read.values.iter().all(|v| v != "tx3-a"));
    assert!(read.values.iter().any(|v| v == "tx4-a"));

    // A second purge with no further trim removes nothing.
    assert_eq!(log.force_purge_abort_tx().await.unwrap(), 0);
}

/// The periodic purge threshold follows the store's oldest offset forward.
#[tokio::test]
async fn purge_threshold_tracks_trim() {
    let ctx = TestContext::new().await;
    let tp = TopicPartition::new("t", 0);

    let mut producer = TxnProducer::init(&ctx, "X").await.unwrap();
    producer.send(&ctx, &tp, "a").await.unwrap();
    producer.abort(&ctx).await.unwrap();

    let log = ctx.catalog.get_or_open(&tp).await.unwrap();
    assert_eq!(log.update_purge_aborted_txns_offset().await.unwrap(), 0);

    let partition = ctx.store.open(&tp).await.unwrap();
    partition.trim(2).await.unwrap();
    assert_eq!(log.update_purge_aborted_txns_offset().await.unwrap(), 2);
    assert_eq!(log.force_purge_abort_tx().await.unwrap(), 1);
}

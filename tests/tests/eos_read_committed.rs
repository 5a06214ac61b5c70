//! Read-committed consumers must see only committed transactional data.

use gateway_core::TopicPartition;
use integration_tests::fixtures::{read_committed, TxnProducer};
use integration_tests::setup::TestContext;

/// An aborted transaction's records are filtered out; a committed one's are
/// visible, with the aborted range attached for the client.
#[tokio::test]
async fn read_committed_filters_aborted_transactions() {
    let ctx = TestContext::new().await;
    let tp = TopicPartition::new("t", 0);

    let mut producer = TxnProducer::init(&ctx, "X").await.unwrap();

    // First transaction: two records at offsets 0 and 1, aborted (marker 2).
    let r0 = producer.send(&ctx, &tp, "abort-0").await.unwrap();
    let r1 = producer.send(&ctx, &tp, "abort-1").await.unwrap();
    assert_eq!((r0.base_offset, r1.base_offset), (0, 1));
    producer.abort(&ctx).await.unwrap();

    // Second transaction: offsets 3 and 4, committed (marker 5).
    let r3 = producer.send(&ctx, &tp, "commit-0").await.unwrap();
    let r4 = producer.send(&ctx, &tp, "commit-1").await.unwrap();
    assert_eq!((r3.base_offset, r4.base_offset), (3, 4));
    producer.commit(&ctx).await.unwrap();

    let read = read_committed(&ctx, &tp, 0).await.unwrap();
    assert_eq!(read.values, vec!["commit-0", "commit-1"]);
    assert_eq!(read.aborted.len(), 1);
    assert_eq!(read.aborted[0].producer_id, producer.producer_id);
    assert_eq!(read.aborted[0].first_offset, 0);
    assert!(read.last_stable_offset >= 5);
}

/// Sequences accepted for a producer are strictly monotonic; the duplicate
/// of an in-window batch returns its original offsets without re-appending.
#[tokio::test]
async fn duplicate_send_is_idempotent() {
    let ctx = TestContext::new().await;
    let tp = TopicPartition::new("t", 0);

    let mut producer = TxnProducer::init(&ctx, "X").await.unwrap();
    let first = producer.send(&ctx, &tp, "once").await.unwrap();

    // Retransmit the same (sequence, batch) as a client retry would.
    producer.sequences_mut().insert(tp.clone(), 0);
    let retry = producer.send(&ctx, &tp, "once").await.unwrap();
    assert!(retry.duplicate);
    assert_eq!(retry.base_offset, first.base_offset);

    producer.commit(&ctx).await.unwrap();
    let read = read_committed(&ctx, &tp, 0).await.unwrap();
    assert_eq!(read.values, vec!["once"]);
}

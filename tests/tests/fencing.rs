//! Producer fencing when a second instance takes over a transactional id.

use gateway_core::{Error, TopicPartition};
use integration_tests::fixtures::{read_committed, TxnProducer};
use integration_tests::setup::TestContext;

/// A second `initTransactions` with the same transactional id aborts the
/// first instance's open transaction and fences it everywhere.
#[tokio::test]
async fn second_instance_fences_first() {
    let ctx = TestContext::new().await;
    let tp = TopicPartition::new("t", 0);

    let mut p1 = TxnProducer::init(&ctx, "X").await.unwrap();
    p1.send(&ctx, &tp, "m").await.unwrap();

    // New instance of the same logical producer takes over.
    let mut p2 = TxnProducer::init(&ctx, "X").await.unwrap();
    assert_eq!(p2.producer_id, p1.producer_id);
    assert!(p2.producer_epoch > p1.producer_epoch);

    // The zombie's commit must fail.
    let err = p1.commit(&ctx).await.unwrap_err();
    assert!(matches!(err, Error::ProducerFenced(_)), "got {err:?}");

    // And so must its appends.
    let err = p1.send(&ctx, &tp, "late").await.unwrap_err();
    assert!(matches!(err, Error::ProducerFenced(_)), "got {err:?}");

    // The new instance works, and only its data is visible.
    p2.send(&ctx, &tp, "k").await.unwrap();
    p2.commit(&ctx).await.unwrap();

    let read = read_committed(&ctx, &tp, 0).await.unwrap();
    assert_eq!(read.values, vec!["k"]);
}

/// The zombie append is also fenced at the partition itself, even without
/// going through the coordinator.
#[tokio::test]
async fn partition_fences_stale_epoch_directly() {
    let ctx = TestContext::new().await;
    let tp = TopicPartition::new("t", 0);

    let mut p1 = TxnProducer::init(&ctx, "X").await.unwrap();
    p1.send(&ctx, &tp, "first").await.unwrap();
    let _p2 = TxnProducer::init(&ctx, "X").await.unwrap();

    // Bypass the coordinator and append straight to the partition log with
    // the stale epoch. The producer state fences it.
    let log = ctx.catalog.get_or_open(&tp).await.unwrap();
    let batch = gateway_core::RecordBatch {
        producer_id: p1.producer_id,
        producer_epoch: p1.producer_epoch,
        base_sequence: 1,
        transactional: true,
        records: vec![integration_tests::fixtures::record("zombie")],
    };
    let err = log.append(batch).await.unwrap_err();
    assert!(matches!(err, Error::InvalidProducerEpoch(_)), "got {err:?}");
}

//! Producer-state recovery across partition unloads and store trims.

use gateway_core::TopicPartition;
use integration_tests::fixtures::{read_committed, TxnProducer};
use integration_tests::setup::TestContext;
use logstore::{LogStore, PartitionStore};

/// Ten transactions of twenty records each, alternating commit/abort, with
/// the partition unloaded every three transactions. The final read-committed
/// consumption sees exactly the five committed transactions.
#[tokio::test]
async fn unload_reload_preserves_transactional_state() {
    let ctx = TestContext::new().await;
    let tp = TopicPartition::new("t", 0);

    let mut producer = TxnProducer::init(&ctx, "X").await.unwrap();
    let mut last_committed = String::new();

    for txn in 0..10 {
        let commit = txn % 2 == 0;
        let prefix = if commit { "commit" } else { "abort" };
        for msg in 0..20 {
            let value = format!("{prefix}-{txn}-{msg}");
            producer.send(&ctx, &tp, &value).await.unwrap();
            if commit {
                last_committed = value;
            }
        }
        if commit {
            producer.commit(&ctx).await.unwrap();
        } else {
            producer.abort(&ctx).await.unwrap();
        }

        // Unload the partition every three transactions; the next send
        // recovers it from the snapshot buffer plus log replay.
        if txn % 3 == 2 {
            let log = ctx.catalog.get_or_open(&tp).await.unwrap();
            if txn == 5 {
                log.take_producer_snapshot().await.unwrap();
            }
            ctx.unload("t", 0).await;
        }
    }

    let read = read_committed(&ctx, &tp, 0).await.unwrap();
    assert_eq!(read.values.len(), 100);
    assert!(read.values.iter().all(|v| !v.contains("abort")));
    assert_eq!(read.values.last().unwrap(), &last_committed);
    assert_eq!(read.aborted.len(), 5);
}

/// A snapshot that predates a head trim is discarded and recovery restarts
/// from the store's new head.
#[tokio::test]
async fn invalid_snapshot_after_trim_is_discarded() {
    let ctx = TestContext::new().await;
    let tp = TopicPartition::new("t", 0);

    let mut producer = TxnProducer::init(&ctx, "X").await.unwrap();
    producer.send(&ctx, &tp, "msg0").await.unwrap();
    producer.send(&ctx, &tp, "msg1").await.unwrap();
    producer.commit(&ctx).await.unwrap();
    producer.send(&ctx, &tp, "msg2").await.unwrap();
    producer.send(&ctx, &tp, "msg3").await.unwrap();
    producer.commit(&ctx).await.unwrap();

    // Snapshot covers offsets 0..=5, then the store trims past it.
    let log = ctx.catalog.get_or_open(&tp).await.unwrap();
    log.take_producer_snapshot().await.unwrap();
    ctx.unload("t", 0).await;
    let partition = ctx.store.open(&tp).await.unwrap();
    partition.trim(8).await.unwrap();

    // The producer session recovers its identity and keeps writing.
    let mut producer = TxnProducer::init(&ctx, "X").await.unwrap();
    producer.send(&ctx, &tp, "msg4").await.unwrap();
    producer.send(&ctx, &tp, "msg5").await.unwrap();
    producer.commit(&ctx).await.unwrap();

    // A fresh consumer group sees only the post-trim data.
    let read = read_committed(&ctx, &tp, 0).await.unwrap();
    assert_eq!(read.values, vec!["msg4", "msg5"]);

    let log = ctx.catalog.get_or_open(&tp).await.unwrap();
    assert_eq!(log.fetch_oldest_available_offset().await.unwrap(), 8);
}

/// Recovery is idempotent: reloading twice in a row without new writes gives
/// the same observable state.
#[tokio::test]
async fn repeated_recovery_is_stable() {
    let ctx = TestContext::new().await;
    let tp = TopicPartition::new("t", 0);

    let mut producer = TxnProducer::init(&ctx, "X").await.unwrap();
    producer.send(&ctx, &tp, "a").await.unwrap();
    producer.abort(&ctx).await.unwrap();
    producer.send(&ctx, &tp, "b").await.unwrap();
    producer.commit(&ctx).await.unwrap();

    let first = read_committed(&ctx, &tp, 0).await.unwrap();
    ctx.unload("t", 0).await;
    let second = read_committed(&ctx, &tp, 0).await.unwrap();
    ctx.unload("t", 0).await;
    let third = read_committed(&ctx, &tp, 0).await.unwrap();

    assert_eq!(first.values, second.values);
    assert_eq!(second.values, third.values);
    assert_eq!(second.aborted, third.aborted);
    assert_eq!(second.last_stable_offset, third.last_stable_offset);
}

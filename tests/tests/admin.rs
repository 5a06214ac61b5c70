//! Admin-plane listing and description of transactions and producers.

use gateway_core::TopicPartition;
use integration_tests::fixtures::{TxnProducer, TEST_TXN_TIMEOUT_MS};
use integration_tests::setup::TestContext;
use txn_coordinator::{ListTransactionsFilter, TxnState};

#[tokio::test]
async fn list_and_describe_follow_transaction_lifecycle() {
    let ctx = TestContext::new().await;
    let tp = TopicPartition::new("t", 0);

    let mut producer = TxnProducer::init(&ctx, "X").await.unwrap();
    producer.send(&ctx, &tp, "m").await.unwrap();

    // Ongoing transaction shows up in the listing.
    let listings = ctx
        .coordinator
        .list_transactions(&ListTransactionsFilter::default())
        .await
        .unwrap();
    let listing = listings
        .iter()
        .find(|l| l.transactional_id == "X")
        .expect("transaction missing from listing");
    assert_eq!(listing.state, TxnState::Ongoing);
    assert_eq!(listing.producer_id, producer.producer_id);

    // Description reports the participant set and configuration.
    let described = ctx
        .coordinator
        .describe_transactions(&["X".to_string()])
        .await
        .unwrap();
    let description = described[0].as_ref().expect("missing description");
    assert_eq!(description.partitions, vec![tp.clone()]);
    assert_eq!(description.txn_timeout_ms, TEST_TXN_TIMEOUT_MS);
    assert!(description.producer_epoch >= 0);

    producer.commit(&ctx).await.unwrap();

    let described = ctx
        .coordinator
        .describe_transactions(&["X".to_string()])
        .await
        .unwrap();
    let description = described[0].as_ref().unwrap();
    assert_eq!(description.state, TxnState::CompleteCommit);
    assert!(description.partitions.is_empty());

    // State filters narrow the listing.
    let ongoing_only = ctx
        .coordinator
        .list_transactions(&ListTransactionsFilter {
            states: vec![TxnState::Ongoing],
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(ongoing_only.iter().all(|l| l.transactional_id != "X"));

    // Unknown ids describe to nothing.
    let missing = ctx
        .coordinator
        .describe_transactions(&["no-such-id".to_string()])
        .await
        .unwrap();
    assert!(missing[0].is_none());
}

#[tokio::test]
async fn describe_producers_reports_partition_state() {
    let ctx = TestContext::new().await;
    let tp = TopicPartition::new("t", 0);

    let mut producer = TxnProducer::init(&ctx, "X").await.unwrap();
    producer.send(&ctx, &tp, "a").await.unwrap();
    producer.send(&ctx, &tp, "b").await.unwrap();

    let log = ctx.catalog.get_or_open(&tp).await.unwrap();
    let producers = log.describe_producers().await.unwrap();
    assert_eq!(producers.len(), 1);
    let state = &producers[0];
    assert_eq!(state.producer_id, producer.producer_id);
    assert_eq!(state.last_sequence, Some(1));
    assert_eq!(state.last_offset, Some(1));
    assert_eq!(state.current_txn_first_offset, Some(0));

    producer.commit(&ctx).await.unwrap();
    let producers = log.describe_producers().await.unwrap();
    assert_eq!(producers[0].current_txn_first_offset, None);
}

//! Test environment wiring.

use std::sync::Arc;

use gateway_core::{GatewayConfig, PRODUCER_SNAPSHOT_TOPIC, TXN_LOG_TOPIC};
use logstore::{MemoryLogStore, SnapshotBuffer};
use partition_log::PartitionCatalog;
use txn_coordinator::{TransactionCoordinator, TransactionStateManager};

/// Fully wired gateway core over an in-memory store.
pub struct TestContext {
    pub config: GatewayConfig,
    pub store: Arc<MemoryLogStore>,
    pub snapshots: Arc<SnapshotBuffer>,
    pub catalog: Arc<PartitionCatalog>,
    pub coordinator: Arc<TransactionCoordinator>,
}

impl TestContext {
    pub async fn new() -> Self {
        Self::with_config(GatewayConfig::default()).await
    }

    pub async fn with_config(config: GatewayConfig) -> Self {
        let store = Arc::new(MemoryLogStore::new());
        let snapshots = Arc::new(
            SnapshotBuffer::open(
                store.as_ref(),
                PRODUCER_SNAPSHOT_TOPIC,
                config.txn_producer_state_topic_num_partitions,
            )
            .await
            .expect("Failed to open snapshot buffer"),
        );
        let catalog = Arc::new(PartitionCatalog::new(store.clone(), snapshots.clone()));

        let state = TransactionStateManager::open(
            store.as_ref(),
            TXN_LOG_TOPIC,
            config.txn_log_num_partitions,
            config.coordinator_shards,
        )
        .await
        .expect("Failed to open transaction state manager");
        let coordinator = Arc::new(TransactionCoordinator::new(
            config.clone(),
            state,
            catalog.clone(),
        ));
        coordinator.load().await.expect("Failed to load coordinator");

        Self {
            config,
            store,
            snapshots,
            catalog,
            coordinator,
        }
    }

    /// Simulates the store unloading a partition; the next access recovers it.
    pub async fn unload(&self, topic: &str, partition: i32) {
        self.catalog
            .unload(&gateway_core::TopicPartition::new(topic, partition))
            .await;
    }
}

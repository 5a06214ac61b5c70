//! Background maintenance scheduler.
//!
//! Periodic ticks for producer-state snapshots, aborted-transaction purges,
//! transaction timeouts, and transactional-id expiration. Worker errors are
//! logged and the loop continues; a zero interval disables that worker.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{debug, error, info};

use gateway_core::GatewayConfig;
use partition_log::PartitionCatalog;
use txn_coordinator::TransactionCoordinator;

/// Background worker scheduler for the gateway.
pub struct GatewayScheduler {
    config: GatewayConfig,
    catalog: Arc<PartitionCatalog>,
    coordinator: Arc<TransactionCoordinator>,
}

impl GatewayScheduler {
    pub fn new(
        config: GatewayConfig,
        catalog: Arc<PartitionCatalog>,
        coordinator: Arc<TransactionCoordinator>,
    ) -> Self {
        Self {
            config,
            catalog,
            coordinator,
        }
    }

    /// Starts all enabled workers.
    pub fn start(self: Arc<Self>) -> Vec<tokio::task::JoinHandle<()>> {
        let mut handles = Vec::new();

        if self.config.producer_state_snapshot_interval_secs > 0 {
            let scheduler = self.clone();
            handles.push(tokio::spawn(async move {
                scheduler.run_snapshot_worker().await;
            }));
        }

        if self.config.purge_aborted_txn_interval_secs > 0 {
            let scheduler = self.clone();
            handles.push(tokio::spawn(async move {
                scheduler.run_purge_worker().await;
            }));
        }

        let scheduler = self.clone();
        handles.push(tokio::spawn(async move {
            scheduler.run_txn_timeout_worker().await;
        }));

        let scheduler = self.clone();
        handles.push(tokio::spawn(async move {
            scheduler.run_txn_id_expiration_worker().await;
        }));

        info!(workers = handles.len(), "Background workers started");
        handles
    }

    async fn run_snapshot_worker(&self) {
        let mut ticker = interval(Duration::from_secs(
            self.config.producer_state_snapshot_interval_secs,
        ));
        loop {
            ticker.tick().await;
            for log in self.catalog.loaded().await {
                match log.take_producer_snapshot().await {
                    Ok(Some(offset)) => {
                        debug!(tp = %log.topic_partition(), offset, "Took producer-state snapshot");
                    }
                    Ok(None) => {}
                    Err(e) => {
                        error!(tp = %log.topic_partition(), "Snapshot worker error: {}", e);
                    }
                }
            }
        }
    }

    async fn run_purge_worker(&self) {
        let mut ticker = interval(Duration::from_secs(
            self.config.purge_aborted_txn_interval_secs,
        ));
        loop {
            ticker.tick().await;
            for log in self.catalog.loaded().await {
                if let Err(e) = log.update_purge_aborted_txns_offset().await {
                    error!(tp = %log.topic_partition(), "Purge threshold update error: {}", e);
                    continue;
                }
                if let Err(e) = log.force_purge_abort_tx().await {
                    error!(tp = %log.topic_partition(), "Purge worker error: {}", e);
                }
            }
        }
    }

    async fn run_txn_timeout_worker(&self) {
        let mut ticker = interval(Duration::from_secs(
            self.config.txn_abort_check_interval_secs.max(1),
        ));
        loop {
            ticker.tick().await;
            match self.coordinator.abort_timed_out_transactions().await {
                Ok(0) => {}
                Ok(aborted) => info!(aborted, "Aborted timed-out transactions"),
                Err(e) => error!("Transaction timeout worker error: {}", e),
            }
        }
    }

    async fn run_txn_id_expiration_worker(&self) {
        // Idle ids expire on day-scale timers; sweeping once a minute is plenty.
        let mut ticker = interval(Duration::from_secs(60));
        loop {
            ticker.tick().await;
            match self.coordinator.expire_transactional_ids().await {
                Ok(0) => {}
                Ok(expired) => info!(expired, "Expired transactional ids"),
                Err(e) => error!("Transactional-id expiration worker error: {}", e),
            }
        }
    }
}

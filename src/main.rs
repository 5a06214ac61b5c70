//! Kafka-compatible transactional gateway
//!
//! Runs the transactional core over an append-only log store:
//! - Transaction coordinator with a persisted, compacted transaction log
//! - Per-partition producer state with snapshot-bounded recovery
//! - Background snapshot, purge, timeout, and expiration workers
//!
//! Network framing and request decoding are hosted by the embedding broker
//! process; this binary wires the core together for a single-node deployment.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info};

use gateway_core::{GatewayConfig, PRODUCER_SNAPSHOT_TOPIC, TXN_LOG_TOPIC};
use logstore::{LogStore, MemoryLogStore, SnapshotBuffer};
use partition_log::PartitionCatalog;
use telemetry::{health, init_tracing_from_env};
use txn_coordinator::{TransactionCoordinator, TransactionStateManager};
use worker::GatewayScheduler;

/// Application configuration.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
struct Config {
    #[serde(default)]
    gateway: GatewayConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    init_tracing_from_env();

    info!("Starting Kafka gateway v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = load_config()?;
    info!(
        txn_log_partitions = config.gateway.txn_log_num_partitions,
        snapshot_interval_secs = config.gateway.producer_state_snapshot_interval_secs,
        "Loaded gateway config"
    );

    // The log store seam. The in-memory store backs the single-node mode;
    // a production deployment plugs its own store behind the same trait.
    let store: Arc<dyn LogStore> = Arc::new(MemoryLogStore::new());
    health().logstore.set_healthy();

    // Snapshot buffer and partition catalog
    let snapshots = Arc::new(
        SnapshotBuffer::open(
            store.as_ref(),
            PRODUCER_SNAPSHOT_TOPIC,
            config.gateway.txn_producer_state_topic_num_partitions,
        )
        .await
        .context("Failed to open snapshot buffer")?,
    );
    let catalog = Arc::new(PartitionCatalog::new(store.clone(), snapshots.clone()));

    // Transaction coordinator over the persisted transaction log
    let state = TransactionStateManager::open(
        store.as_ref(),
        TXN_LOG_TOPIC,
        config.gateway.txn_log_num_partitions,
        config.gateway.coordinator_shards,
    )
    .await
    .context("Failed to open transaction state manager")?;
    let coordinator = Arc::new(TransactionCoordinator::new(
        config.gateway.clone(),
        state,
        catalog.clone(),
    ));
    coordinator
        .load()
        .await
        .context("Failed to load transaction state")?;
    health().coordinator.set_healthy();
    info!(
        coordinator_epoch = coordinator.coordinator_epoch(),
        "Transaction coordinator loaded"
    );

    // Start background workers
    let scheduler = Arc::new(GatewayScheduler::new(
        config.gateway.clone(),
        catalog.clone(),
        coordinator.clone(),
    ));
    let _worker_handles = scheduler.start();

    // Run until asked to stop
    shutdown_signal().await;
    info!("Shutting down...");

    // Flush a final snapshot for every loaded partition
    for log in catalog.loaded().await {
        if let Err(e) = log.take_producer_snapshot().await {
            error!(tp = %log.topic_partition(), "Failed to take shutdown snapshot: {}", e);
        }
    }

    info!("Shutdown complete");
    Ok(())
}

/// Load configuration from files and environment.
fn load_config() -> Result<Config> {
    let config = config::Config::builder()
        .add_source(config::Config::try_from(&Config::default())?)
        .add_source(
            config::File::with_name("config/default")
                .required(false)
                .format(config::FileFormat::Toml),
        )
        .add_source(
            config::Environment::default()
                .separator("__")
                .prefix("GATEWAY")
                .try_parsing(true),
        )
        .build()
        .context("Failed to build configuration")?;

    config
        .try_deserialize()
        .context("Failed to deserialize configuration")
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received terminate signal");
        }
    }
}

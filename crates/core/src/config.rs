//! Gateway configuration.

use regex::Regex;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::{Error, Result};

/// Transactional gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct GatewayConfig {
    /// How long a transactional id may sit in a terminal state before removal
    #[serde(default = "default_transactional_id_expiration_ms")]
    #[validate(range(min = 60_000))]
    pub transactional_id_expiration_ms: i64,

    /// Upper bound on the client-requested transaction timeout
    #[serde(default = "default_transaction_max_timeout_ms")]
    #[validate(range(min = 1000))]
    pub transaction_max_timeout_ms: i32,

    /// Periodic producer-state snapshot interval (0 disables)
    #[serde(default = "default_snapshot_interval_secs")]
    pub producer_state_snapshot_interval_secs: u64,

    /// Periodic aborted-transaction purge interval (0 disables)
    #[serde(default = "default_purge_interval_secs")]
    pub purge_aborted_txn_interval_secs: u64,

    /// Partition count of the internal transaction log topic
    #[serde(default = "default_internal_partitions")]
    #[validate(range(min = 1, max = 256))]
    pub txn_log_num_partitions: i32,

    /// Partition count of the internal producer-state snapshot topic
    #[serde(default = "default_internal_partitions")]
    #[validate(range(min = 1, max = 256))]
    pub txn_producer_state_topic_num_partitions: i32,

    /// Partition count of the consumer offsets topic
    #[serde(default = "default_internal_partitions")]
    #[validate(range(min = 1, max = 256))]
    pub offsets_topic_num_partitions: i32,

    /// Number of single-writer coordinator shards
    #[serde(default = "default_coordinator_shards")]
    #[validate(range(min = 1, max = 1024))]
    pub coordinator_shards: usize,

    /// Transaction timeout sweep interval
    #[serde(default = "default_txn_abort_check_interval_secs")]
    pub txn_abort_check_interval_secs: u64,

    /// Namespace patterns allowed to participate in transactions (empty = all)
    #[serde(default)]
    pub allowed_namespaces: Vec<String>,
}

fn default_transactional_id_expiration_ms() -> i64 {
    7 * 24 * 3600 * 1000 // 7 days
}

fn default_transaction_max_timeout_ms() -> i32 {
    15 * 60 * 1000 // 15 minutes
}

fn default_snapshot_interval_secs() -> u64 {
    300
}

fn default_purge_interval_secs() -> u64 {
    600
}

fn default_internal_partitions() -> i32 {
    8
}

fn default_coordinator_shards() -> usize {
    8
}

fn default_txn_abort_check_interval_secs() -> u64 {
    10
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            transactional_id_expiration_ms: default_transactional_id_expiration_ms(),
            transaction_max_timeout_ms: default_transaction_max_timeout_ms(),
            producer_state_snapshot_interval_secs: default_snapshot_interval_secs(),
            purge_aborted_txn_interval_secs: default_purge_interval_secs(),
            txn_log_num_partitions: default_internal_partitions(),
            txn_producer_state_topic_num_partitions: default_internal_partitions(),
            offsets_topic_num_partitions: default_internal_partitions(),
            coordinator_shards: default_coordinator_shards(),
            txn_abort_check_interval_secs: default_txn_abort_check_interval_secs(),
            allowed_namespaces: Vec::new(),
        }
    }
}

impl GatewayConfig {
    /// Checks a topic against the allowed-namespace patterns.
    ///
    /// An empty pattern list allows everything. Internal topics are always
    /// allowed regardless of policy.
    pub fn namespace_allowed(&self, topic: &str) -> bool {
        if topic.starts_with("__") || self.allowed_namespaces.is_empty() {
            return true;
        }
        self.allowed_namespaces
            .iter()
            .filter_map(|p| Regex::new(p).ok())
            .any(|re| re.is_match(topic))
    }

    /// Validates a client-requested transaction timeout against the cap.
    pub fn check_txn_timeout(&self, timeout_ms: i32) -> Result<()> {
        if timeout_ms <= 0 || timeout_ms > self.transaction_max_timeout_ms {
            return Err(Error::InvalidTransactionTimeout(timeout_ms));
        }
        Ok(())
    }
}

//! Component health tracking.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};

/// Health state of one component.
#[derive(Debug)]
pub struct ComponentHealth {
    name: &'static str,
    healthy: AtomicBool,
    message: parking_lot::RwLock<Option<String>>,
}

impl ComponentHealth {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            healthy: AtomicBool::new(false),
            message: parking_lot::RwLock::new(None),
        }
    }

    pub fn set_healthy(&self) {
        self.healthy.store(true, Ordering::Relaxed);
        *self.message.write() = None;
    }

    pub fn set_unhealthy(&self, msg: impl Into<String>) {
        self.healthy.store(false, Ordering::Relaxed);
        *self.message.write() = Some(msg.into());
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentReport {
    pub name: String,
    pub healthy: bool,
    pub message: Option<String>,
}

/// Health registry for the gateway's components.
pub struct HealthRegistry {
    pub logstore: ComponentHealth,
    pub coordinator: ComponentHealth,
}

impl HealthRegistry {
    pub const fn new() -> Self {
        Self {
            logstore: ComponentHealth::new("logstore"),
            coordinator: ComponentHealth::new("coordinator"),
        }
    }

    pub fn report(&self) -> Vec<ComponentReport> {
        [&self.logstore, &self.coordinator]
            .into_iter()
            .map(|c| ComponentReport {
                name: c.name.to_string(),
                healthy: c.is_healthy(),
                message: c.message.read().clone(),
            })
            .collect()
    }

    /// True once every component can serve traffic.
    pub fn is_ready(&self) -> bool {
        self.logstore.is_healthy() && self.coordinator.is_healthy()
    }
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Global health registry.
pub static HEALTH: std::sync::LazyLock<HealthRegistry> =
    std::sync::LazyLock::new(HealthRegistry::new);

/// Get the global health registry.
pub fn health() -> &'static HealthRegistry {
    &HEALTH
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readiness_requires_all_components() {
        let registry = HealthRegistry::new();
        assert!(!registry.is_ready());
        registry.logstore.set_healthy();
        assert!(!registry.is_ready());
        registry.coordinator.set_healthy();
        assert!(registry.is_ready());

        registry.coordinator.set_unhealthy("txn log replay failed");
        assert!(!registry.is_ready());
        let report = registry.report();
        assert_eq!(report[1].message.as_deref(), Some("txn log replay failed"));
    }
}

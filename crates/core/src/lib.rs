//! Core types, error codes, and configuration for the Kafka gateway.

pub mod config;
pub mod error;
pub mod records;
pub mod types;

pub use config::GatewayConfig;
pub use error::{Error, ErrorCode, Result};
pub use records::{ControlMarker, MarkerType, RecordBatch, CONTROL_MARKER_VERSION};
pub use types::*;

//! Background workers for the Kafka gateway.
//!
//! Handles the maintenance loops:
//! - Producer-state snapshots (bounds partition recovery time)
//! - Aborted-transaction purge after store trims
//! - Transaction timeout aborts
//! - Transactional-id expiration

pub mod scheduler;

pub use scheduler::*;

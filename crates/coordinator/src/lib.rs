//! Transaction coordination for the Kafka gateway.

pub mod coordinator;
pub mod metadata;
pub mod state_manager;

pub use coordinator::{
    InitProducerIdResult, ListTransactionsFilter, OffsetCommitKey, OffsetCommitValue,
    TransactionCoordinator, TransactionDescription, TransactionListing,
};
pub use metadata::{TransactionMetadata, TxnState};
pub use state_manager::TransactionStateManager;

//! Unified error types for the gateway.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Kafka wire error codes surfaced by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i16)]
pub enum ErrorCode {
    None = 0,
    UnknownTopicOrPartition = 3,
    NotLeaderOrFollower = 6,
    CoordinatorLoadInProgress = 14,
    CoordinatorNotAvailable = 15,
    NotCoordinator = 16,
    OutOfOrderSequenceNumber = 45,
    DuplicateSequenceNumber = 46,
    InvalidProducerEpoch = 47,
    InvalidTxnState = 48,
    InvalidProducerIdMapping = 49,
    InvalidTransactionTimeout = 50,
    ConcurrentTransactions = 51,
    TransactionCoordinatorFenced = 52,
    UnknownProducerId = 59,
    ProducerFenced = 90,
    UnknownServerError = -1,
}

impl ErrorCode {
    pub fn as_i16(self) -> i16 {
        self as i16
    }
}

/// Unified error type for the gateway.
#[derive(Debug, Error)]
pub enum Error {
    #[error("producer fenced: {0}")]
    ProducerFenced(String),

    #[error("invalid producer epoch: {0}")]
    InvalidProducerEpoch(String),

    #[error("duplicate sequence number: {0}")]
    DuplicateSequenceNumber(String),

    #[error("out of order sequence number: {0}")]
    OutOfOrderSequenceNumber(String),

    #[error("unknown producer id {0}")]
    UnknownProducerId(i64),

    #[error("invalid producer id mapping: {0}")]
    InvalidProducerIdMapping(String),

    #[error("invalid transaction state: {0}")]
    InvalidTxnState(String),

    #[error("invalid transaction timeout {0}ms")]
    InvalidTransactionTimeout(i32),

    #[error("concurrent transactions: {0}")]
    ConcurrentTransactions(String),

    #[error("transaction coordinator fenced: {0}")]
    TransactionCoordinatorFenced(String),

    #[error("coordinator load in progress")]
    CoordinatorLoadInProgress,

    #[error("not coordinator for {0}")]
    NotCoordinator(String),

    #[error("unknown topic or partition: {0}")]
    UnknownTopicOrPartition(String),

    #[error("partition unavailable: {0}")]
    PartitionUnavailable(String),

    #[error("namespace not allowed: {0}")]
    NamespaceNotAllowed(String),

    #[error("corrupt record: {0}")]
    CorruptRecord(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("log store error: {0}")]
    Store(String),
}

impl Error {
    /// The Kafka error code this error maps to on the wire.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::ProducerFenced(_) => ErrorCode::ProducerFenced,
            Self::InvalidProducerEpoch(_) => ErrorCode::InvalidProducerEpoch,
            Self::DuplicateSequenceNumber(_) => ErrorCode::DuplicateSequenceNumber,
            Self::OutOfOrderSequenceNumber(_) => ErrorCode::OutOfOrderSequenceNumber,
            Self::UnknownProducerId(_) => ErrorCode::UnknownProducerId,
            Self::InvalidProducerIdMapping(_) => ErrorCode::InvalidProducerIdMapping,
            Self::InvalidTxnState(_) => ErrorCode::InvalidTxnState,
            Self::InvalidTransactionTimeout(_) => ErrorCode::InvalidTransactionTimeout,
            Self::ConcurrentTransactions(_) => ErrorCode::ConcurrentTransactions,
            Self::TransactionCoordinatorFenced(_) => ErrorCode::TransactionCoordinatorFenced,
            Self::CoordinatorLoadInProgress => ErrorCode::CoordinatorLoadInProgress,
            Self::NotCoordinator(_) => ErrorCode::NotCoordinator,
            Self::UnknownTopicOrPartition(_) => ErrorCode::UnknownTopicOrPartition,
            Self::PartitionUnavailable(_) => ErrorCode::NotLeaderOrFollower,
            Self::NamespaceNotAllowed(_) => ErrorCode::UnknownTopicOrPartition,
            Self::CorruptRecord(_) | Self::Serialization(_) | Self::Store(_) => {
                ErrorCode::UnknownServerError
            }
        }
    }

    /// True for errors a client should retry after backoff.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::CoordinatorLoadInProgress | Self::ConcurrentTransactions(_)
        )
    }

    pub fn fenced(msg: impl Into<String>) -> Self {
        Self::ProducerFenced(msg.into())
    }

    pub fn invalid_epoch(msg: impl Into<String>) -> Self {
        Self::InvalidProducerEpoch(msg.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidTxnState(msg.into())
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    pub fn corrupt(msg: impl Into<String>) -> Self {
        Self::CorruptRecord(msg.into())
    }
}

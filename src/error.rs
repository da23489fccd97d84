use crate::domain::ids::{AggregateKey, InstructionId, PaymentId, TransactionId};
use crate::domain::transaction::TransactionType;
use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("{0} was not found")]
    NotFound(AggregateKey),
    #[error("{aggregate} is busy: transaction {transaction} is still pending")]
    ConcurrentOperation {
        aggregate: AggregateKey,
        transaction: TransactionId,
    },
    #[error(
        "{transaction_type} of {requested} on {target} exceeds the remaining {available}"
    )]
    Overflow {
        target: String,
        transaction_type: TransactionType,
        requested: Decimal,
        available: Decimal,
    },
    #[error("payment system `{payment_system}` does not support {transaction_type}")]
    UnsupportedOperation {
        payment_system: String,
        transaction_type: TransactionType,
    },
    #[error("payment instruction {0} is closed")]
    InstructionClosed(InstructionId),
    #[error("dispatch of transaction {0} timed out; it stays pending until reconciled")]
    DispatchTimeout(TransactionId),
    #[error("payment {0} has expired")]
    Expired(PaymentId),
    #[error("no plugin registered for payment system `{0}`")]
    PluginNotFound(String),
    #[error("plugin error: {0}")]
    Plugin(String),
    #[error("Invalid state: {0}")]
    InvalidState(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Ledger invariant violated: {0}")]
    LedgerInvariant(String),
    #[error("Internal error: {0}")]
    InternalError(Box<dyn std::error::Error + Send + Sync>),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[cfg(feature = "storage-rocksdb")]
    #[error("RocksDB error: {0}")]
    RocksDbError(#[from] rocksdb::Error),
}

impl PaymentError {
    /// Only a busy aggregate is worth retrying after a backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PaymentError::ConcurrentOperation { .. })
    }
}

pub type Result<T> = std::result::Result<T, PaymentError>;

use crate::domain::account::AccountId;
use crate::domain::advance::{AdvanceId, PaymentKey};
use std::fmt;
use thiserror::Error;

/// Faults that abort an operation outright.
///
/// Business outcomes of a transfer are reported through [`TransferError`]
/// instead; only storage-level problems travel through this type.
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Account {0} not found")]
    AccountNotFound(AccountId),
    #[error("Advance {0} not found")]
    AdvanceNotFound(AdvanceId),
    #[error("Advance payment {0} not found")]
    PaymentNotFound(PaymentKey),
    #[error("Integrity violation: {0}")]
    IntegrityViolation(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Internal error: {0}")]
    InternalError(Box<dyn std::error::Error + Send + Sync>),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[cfg(feature = "storage-rocksdb")]
    #[error("RocksDB error: {0}")]
    RocksDBError(#[from] rocksdb::Error),
}

impl LedgerError {
    pub fn internal(message: impl Into<String>) -> Self {
        Self::InternalError(Box::new(std::io::Error::other(message.into())))
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;

/// Which leg of a transfer an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Source,
    Destination,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Source => f.write_str("source"),
            Side::Destination => f.write_str("destination"),
        }
    }
}

/// Why a transfer was rejected. The `Display` text is what lands in the
/// ledger record's `reason`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransferError {
    #[error("Source and destination accounts must differ")]
    SameAccount,
    #[error("Transfer amount must be non-zero")]
    InvalidAmount,
    #[error("{side} account with ID {1} does not exist", side = capitalize(.0))]
    AccountNotFound(Side, AccountId),
    #[error("Insufficient funds in the {0} account")]
    InsufficientFunds(Side),
    #[error("Internal error: {0}")]
    IntegrityViolation(String),
    #[error("Internal unexpected error: {0}")]
    Unexpected(String),
}

fn capitalize(side: &Side) -> &'static str {
    match side {
        Side::Source => "Source",
        Side::Destination => "Destination",
    }
}

/// Failure reported by the external deduction dependency.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeductionError {
    #[error("Deduction rejected: {0}")]
    Rejected(String),
    #[error("Deduction timed out")]
    TimedOut,
    #[error("Deduction service unavailable: {0}")]
    Unavailable(String),
}

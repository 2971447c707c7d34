use super::account::{AccountId, Amount};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub type TransactionId = u64;

/// Direction of a transfer relative to the stated source/destination pair.
///
/// `Debit` moves money from the source to the destination; `Credit` moves it
/// the other way round.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Debit,
    Credit,
}

impl Direction {
    /// Signed amount handed to the transfer engine: positive for a debit,
    /// negative for a credit.
    pub fn signed(&self, amount: Amount) -> Decimal {
        match self {
            Direction::Debit => amount.value(),
            Direction::Credit => -amount.value(),
        }
    }
}

/// Outcome of a transfer attempt. A failed transaction moved no money.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Successful,
    Fail,
}

/// A ledger entry that has not been appended yet.
#[derive(Debug, PartialEq, Clone)]
pub struct NewTransaction {
    pub src_account_id: AccountId,
    pub dst_account_id: AccountId,
    pub timestamp: DateTime<Utc>,
    pub amount: Amount,
    pub direction: Direction,
    pub status: TransactionStatus,
    pub reason: Option<String>,
}

impl NewTransaction {
    pub fn with_id(self, id: TransactionId) -> Transaction {
        Transaction {
            id,
            src_account_id: self.src_account_id,
            dst_account_id: self.dst_account_id,
            timestamp: self.timestamp,
            amount: self.amount,
            direction: self.direction,
            status: self.status,
            reason: self.reason,
        }
    }
}

/// An immutable record of one transfer attempt.
///
/// `amount` is always the requested magnitude; the sign used internally by
/// the engine is captured by `direction`.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Transaction {
    pub id: TransactionId,
    pub src_account_id: AccountId,
    pub dst_account_id: AccountId,
    pub timestamp: DateTime<Utc>,
    pub amount: Amount,
    pub direction: Direction,
    pub status: TransactionStatus,
    pub reason: Option<String>,
}

impl Transaction {
    pub fn is_successful(&self) -> bool {
        self.status == TransactionStatus::Successful
    }
}

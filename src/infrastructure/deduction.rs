use crate::application::service::{BankService, TransferRequest};
use crate::domain::account::{AccountId, Amount};
use crate::domain::ports::Deduction;
use crate::domain::transaction::Direction;
use crate::error::DeductionError;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Collects installments in-process by debiting the borrower's account into a
/// collection account through the regular transfer path, so every collection
/// attempt is also a ledger record.
///
/// Not cancel-safe: a dropped call may already have moved the money without
/// its ledger record being written.
pub struct LedgerDeduction {
    service: Arc<BankService>,
    collection_account_id: AccountId,
}

impl LedgerDeduction {
    pub fn new(service: Arc<BankService>, collection_account_id: AccountId) -> Self {
        Self {
            service,
            collection_account_id,
        }
    }
}

#[async_trait]
impl Deduction for LedgerDeduction {
    async fn deduct(&self, account_id: AccountId, amount: Amount) -> Result<(), DeductionError> {
        let tx = self
            .service
            .submit_transfer(TransferRequest {
                src_account_id: account_id,
                dst_account_id: self.collection_account_id,
                amount,
                direction: Direction::Debit,
            })
            .await
            .map_err(|e| DeductionError::Unavailable(e.to_string()))?;

        debug!(transaction_id = tx.id, account_id, %amount, status = ?tx.status, "Deduction attempted");
        if tx.is_successful() {
            Ok(())
        } else {
            Err(DeductionError::Rejected(tx.reason.unwrap_or_default()))
        }
    }

    fn cancel_safe(&self) -> bool {
        false
    }
}

use crate::domain::account::{AccountId, Balance};
use crate::domain::ports::AccountStoreHandle;
use crate::error::{LedgerError, Side, TransferError};
use rust_decimal::Decimal;
use tracing::{debug, warn};

/// Moves money between two accounts atomically.
///
/// The engine never writes ledger records; callers record the outcome so that
/// rejected transfers are audited as well.
pub struct TransferEngine {
    accounts: AccountStoreHandle,
}

impl TransferEngine {
    pub fn new(accounts: AccountStoreHandle) -> Self {
        Self { accounts }
    }

    /// Applies a signed transfer between `src_id` and `dst_id`.
    ///
    /// A positive `amount` debits the source and credits the destination; a
    /// negative one moves money the other way. Whichever side loses funds must
    /// be able to cover them. Either both balances change or neither does.
    pub async fn transfer(
        &self,
        src_id: AccountId,
        dst_id: AccountId,
        amount: Decimal,
    ) -> Result<(), TransferError> {
        if src_id == dst_id {
            return Err(TransferError::SameAccount);
        }
        if amount.is_zero() {
            return Err(TransferError::InvalidAmount);
        }

        let mut locked = self
            .accounts
            .lock_accounts(&[src_id, dst_id])
            .await
            .map_err(|e| match e {
                LedgerError::AccountNotFound(id) if id == src_id => {
                    TransferError::AccountNotFound(Side::Source, id)
                }
                LedgerError::AccountNotFound(id) => {
                    TransferError::AccountNotFound(Side::Destination, id)
                }
                other => TransferError::Unexpected(other.to_string()),
            })?;

        let src = locked
            .account(src_id)
            .ok_or(TransferError::AccountNotFound(Side::Source, src_id))?;
        let dst = locked
            .account(dst_id)
            .ok_or(TransferError::AccountNotFound(Side::Destination, dst_id))?;

        let delta = Balance::new(amount);
        let (payer, payer_side) = if amount.is_sign_positive() {
            (&src, Side::Source)
        } else {
            (&dst, Side::Destination)
        };
        if !payer.can_cover(Balance::new(amount.abs())) {
            warn!(
                src_id,
                dst_id,
                %amount,
                side = %payer_side,
                "Transfer rejected: insufficient funds"
            );
            return Err(TransferError::InsufficientFunds(payer_side));
        }

        let src_balance = src.balance - delta;
        let dst_balance = dst.balance + delta;
        locked
            .set_balance(src_id, src_balance)
            .and_then(|_| locked.set_balance(dst_id, dst_balance))
            .map_err(|e| TransferError::Unexpected(e.to_string()))?;

        locked.commit().map_err(|e| match e {
            LedgerError::IntegrityViolation(msg) => TransferError::IntegrityViolation(msg),
            other => TransferError::Unexpected(other.to_string()),
        })?;

        debug!(
            src_id,
            dst_id,
            %amount,
            %src_balance,
            %dst_balance,
            "Transfer completed"
        );
        Ok(())
    }
}

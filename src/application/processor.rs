use crate::domain::account::{AccountId, Amount};
use crate::domain::advance::{
    AdvancePayment, AdvanceStatus, INSTALLMENT_SPACING_DAYS, PaymentKey, PaymentStatus,
};
use crate::domain::ports::{AdvanceStoreHandle, DeductionHandle, PaymentStoreHandle};
use crate::error::{DeductionError, LedgerError, Result};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProcessorConfig {
    /// Upper bound on a single deduction call when the deduction is
    /// cancel-safe; an elapsed call counts as a failed deduction. Other
    /// deductions always run to completion.
    pub deduction_timeout: Duration,
    /// Distance between installments, used to date successor payments.
    pub spacing: chrono::Duration,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            deduction_timeout: Duration::from_secs(30),
            spacing: chrono::Duration::days(INSTALLMENT_SPACING_DAYS),
        }
    }
}

/// Result of settling one claimed payment.
#[derive(Debug, Clone, PartialEq)]
pub enum Settlement {
    Paid(PaymentKey),
    /// The deduction failed; `successor` carries the obligation forward.
    Failed {
        key: PaymentKey,
        successor: AdvancePayment,
    },
    /// The payment was not `pending_processing` any more (late or duplicate
    /// dispatch) and was left untouched.
    Skipped(PaymentKey, PaymentStatus),
}

/// Collects due installments: claims them, calls the deduction dependency and
/// records the outcome.
///
/// The claim (`not_due_yet -> pending_processing`) is the only thing that keeps
/// two workers from settling the same payment, so no lock is held while the
/// deduction call is in flight.
pub struct DuePaymentProcessor {
    advances: AdvanceStoreHandle,
    payments: PaymentStoreHandle,
    deduction: DeductionHandle,
    config: ProcessorConfig,
}

impl DuePaymentProcessor {
    pub fn new(
        advances: AdvanceStoreHandle,
        payments: PaymentStoreHandle,
        deduction: DeductionHandle,
        config: ProcessorConfig,
    ) -> Self {
        Self {
            advances,
            payments,
            deduction,
            config,
        }
    }

    /// Payments a previous run claimed but never settled, e.g. because the
    /// process stopped mid-settlement. They are redelivered to [`settle`].
    ///
    /// [`settle`]: DuePaymentProcessor::settle
    pub async fn recover_pending(&self) -> Result<Vec<AdvancePayment>> {
        let stale = self.payments.pending_processing().await?;
        if !stale.is_empty() {
            warn!(count = stale.len(), "Redelivering unsettled advance payments");
        }
        Ok(stale)
    }

    /// Claim phase: takes exclusive ownership of every payment due at `now`.
    pub async fn claim_due(&self, now: DateTime<Utc>) -> Result<Vec<AdvancePayment>> {
        let claimed = self.payments.claim_due(now).await?;
        if !claimed.is_empty() {
            info!(count = claimed.len(), %now, "Claimed due advance payments");
        }
        Ok(claimed)
    }

    /// Settles one claimed payment.
    ///
    /// Deduction failures are outcomes, not errors: the payment is marked
    /// `failed` and a successor is scheduled. Only local persistence problems
    /// are returned as `Err`.
    pub async fn settle(&self, key: PaymentKey) -> Result<Settlement> {
        let payment = self
            .payments
            .get(key)
            .await?
            .ok_or(LedgerError::PaymentNotFound(key))?;
        if payment.status != PaymentStatus::PendingProcessing {
            debug!(%key, status = ?payment.status, "Payment no longer pending, skipping");
            return Ok(Settlement::Skipped(key, payment.status));
        }

        let advance = self
            .advances
            .get(key.advance_id)
            .await?
            .ok_or(LedgerError::AdvanceNotFound(key.advance_id))?;

        let deducted = self.deduct(advance.dst_account_id, payment.amount).await?;

        match deducted {
            Ok(()) => {
                if !self.payments.finish(key, PaymentStatus::Paid).await? {
                    return self.skipped(key).await;
                }
                info!(%key, amount = %payment.amount, "Advance payment collected");
                self.close_if_repaid(key).await?;
                Ok(Settlement::Paid(key))
            }
            Err(e) => {
                warn!(%key, error = %e, "Advance payment deduction failed");
                let Some(successor) = self
                    .payments
                    .fail_with_successor(key, self.config.spacing)
                    .await?
                else {
                    return self.skipped(key).await;
                };
                info!(
                    failed = %key,
                    successor = %successor.key(),
                    due_at = %successor.due_at,
                    "Scheduled successor payment"
                );
                self.mark_overdue(key).await?;
                Ok(Settlement::Failed { key, successor })
            }
        }
    }

    /// Runs one deduction. A cancel-safe deduction is abandoned after the
    /// configured timeout; any other runs on its own task, so dropping the
    /// settlement never interrupts a half-applied deduction.
    async fn deduct(
        &self,
        account_id: AccountId,
        amount: Amount,
    ) -> Result<std::result::Result<(), DeductionError>> {
        if self.deduction.cancel_safe() {
            let outcome = tokio::time::timeout(
                self.config.deduction_timeout,
                self.deduction.deduct(account_id, amount),
            )
            .await;
            return Ok(outcome.unwrap_or(Err(DeductionError::TimedOut)));
        }

        let deduction = Arc::clone(&self.deduction);
        tokio::spawn(async move { deduction.deduct(account_id, amount).await })
            .await
            .map_err(|e| LedgerError::internal(e.to_string()))
    }

    /// Redelivers unsettled payments, claims everything due at `now` and
    /// settles all of it concurrently.
    ///
    /// Every settlement runs to completion; if any of them fails, the first
    /// error is returned once all have finished.
    pub async fn run_once(self: &Arc<Self>, now: DateTime<Utc>) -> Result<Vec<Settlement>> {
        let mut keys: Vec<PaymentKey> = self
            .recover_pending()
            .await?
            .iter()
            .map(AdvancePayment::key)
            .collect();
        keys.extend(self.claim_due(now).await?.iter().map(AdvancePayment::key));

        let mut tasks = JoinSet::new();
        for key in keys {
            let processor = Arc::clone(self);
            tasks.spawn(async move { processor.settle(key).await });
        }

        let mut settlements = Vec::new();
        let mut first_error = None;
        while let Some(joined) = tasks.join_next().await {
            match joined.map_err(|e| LedgerError::internal(e.to_string())) {
                Ok(Ok(settlement)) => settlements.push(settlement),
                Ok(Err(e)) | Err(e) => {
                    error!(error = %e, "Failed to settle advance payment");
                    first_error.get_or_insert(e);
                }
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }
        settlements.sort_by_key(|s| match s {
            Settlement::Paid(key) | Settlement::Skipped(key, _) => *key,
            Settlement::Failed { key, .. } => *key,
        });
        Ok(settlements)
    }

    async fn skipped(&self, key: PaymentKey) -> Result<Settlement> {
        let status = self
            .payments
            .get(key)
            .await?
            .map_or(PaymentStatus::PendingProcessing, |p| p.status);
        warn!(%key, ?status, "Payment settled elsewhere while deducting");
        Ok(Settlement::Skipped(key, status))
    }

    async fn mark_overdue(&self, key: PaymentKey) -> Result<()> {
        self.advance_to(key, AdvanceStatus::Overdue).await
    }

    async fn close_if_repaid(&self, key: PaymentKey) -> Result<()> {
        let payments = self.payments.for_advance(key.advance_id).await?;
        if payments.iter().all(|p| p.status == PaymentStatus::Paid) {
            self.advance_to(key, AdvanceStatus::Paid).await?;
        }
        Ok(())
    }

    async fn advance_to(&self, key: PaymentKey, status: AdvanceStatus) -> Result<()> {
        let Some(advance) = self.advances.get(key.advance_id).await? else {
            return Err(LedgerError::AdvanceNotFound(key.advance_id));
        };
        if !advance.status.can_transition_to(status) {
            return Ok(());
        }
        match self.advances.update_status(advance.id, status).await {
            Ok(_) => {
                info!(advance_id = advance.id, ?status, "Advance status updated");
                Ok(())
            }
            // Another worker moved it first.
            Err(LedgerError::IntegrityViolation(_)) => Ok(()),
            Err(e) => {
                error!(advance_id = advance.id, error = %e, "Failed to update advance status");
                Err(e)
            }
        }
    }
}

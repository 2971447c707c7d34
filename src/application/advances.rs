use crate::domain::account::{AccountId, Amount};
use crate::domain::advance::{
    Advance, AdvancePayment, AdvanceStatus, INSTALLMENT_SPACING_DAYS, installment_plan,
};
use crate::domain::ports::{AdvanceStoreHandle, ClockHandle, PaymentStoreHandle};
use crate::error::{LedgerError, Result};
use chrono::Duration;
use tracing::{debug, info};

/// Creates advances and materialises their repayment schedule.
pub struct AdvanceScheduler {
    advances: AdvanceStoreHandle,
    payments: PaymentStoreHandle,
    clock: ClockHandle,
    spacing: Duration,
}

impl AdvanceScheduler {
    pub fn new(advances: AdvanceStoreHandle, payments: PaymentStoreHandle, clock: ClockHandle) -> Self {
        Self {
            advances,
            payments,
            clock,
            spacing: Duration::days(INSTALLMENT_SPACING_DAYS),
        }
    }

    pub fn with_spacing(mut self, spacing: Duration) -> Self {
        self.spacing = spacing;
        self
    }

    /// Registers a new advance in `pending_transaction`, starting now.
    pub async fn create_advance(&self, dst_account_id: AccountId, amount: Amount) -> Result<Advance> {
        let advance = self
            .advances
            .create(
                dst_account_id,
                amount,
                AdvanceStatus::PendingTransaction,
                self.clock.now(),
            )
            .await?;
        debug!(advance_id = advance.id, dst_account_id, %amount, "Advance created");
        Ok(advance)
    }

    /// Marks a funded advance as active.
    pub async fn activate(&self, advance: &Advance) -> Result<Advance> {
        let advance = self
            .advances
            .update_status(advance.id, AdvanceStatus::Active)
            .await?;
        info!(advance_id = advance.id, "Advance activated");
        Ok(advance)
    }

    /// Stores the installment schedule of an active advance and returns it in
    /// schedule order.
    pub async fn schedule_payments(
        &self,
        advance: &Advance,
        installments: u32,
    ) -> Result<Vec<AdvancePayment>> {
        if advance.status != AdvanceStatus::Active {
            return Err(LedgerError::ValidationError(format!(
                "Advance {} must be active to schedule payments",
                advance.id
            )));
        }

        let payments = installment_plan(advance, installments, self.spacing)?;
        self.payments.insert_all(payments.clone()).await?;
        debug!(
            advance_id = advance.id,
            installments,
            "Advance payments scheduled"
        );
        Ok(payments)
    }
}

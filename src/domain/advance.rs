use super::account::{AccountId, Amount};
use crate::error::{LedgerError, Result};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;

pub type AdvanceId = u64;

/// Number of installments an advance is repaid in unless configured otherwise.
pub const DEFAULT_INSTALLMENTS: u32 = 12;
/// Days between two consecutive installments.
pub const INSTALLMENT_SPACING_DAYS: i64 = 7;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum AdvanceStatus {
    PendingTransaction,
    Active,
    Paid,
    Overdue,
}

impl AdvanceStatus {
    /// Forward-only lifecycle: `pending_transaction -> active -> {paid, overdue}`.
    pub fn can_transition_to(&self, next: AdvanceStatus) -> bool {
        use AdvanceStatus::*;
        matches!(
            (self, next),
            (PendingTransaction, Active) | (Active, Paid) | (Active, Overdue)
        )
    }
}

/// Money advanced to an account, repaid through [`AdvancePayment`]s.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Advance {
    pub id: AdvanceId,
    pub dst_account_id: AccountId,
    pub amount: Amount,
    pub start_timestamp: DateTime<Utc>,
    pub status: AdvanceStatus,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    NotDueYet,
    PendingProcessing,
    Paid,
    Failed,
}

/// Identity of an installment: `(advance_id, payment_number)`.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy)]
pub struct PaymentKey {
    pub advance_id: AdvanceId,
    pub payment_number: u32,
}

impl PaymentKey {
    pub fn new(advance_id: AdvanceId, payment_number: u32) -> Self {
        Self {
            advance_id,
            payment_number,
        }
    }
}

impl fmt::Display for PaymentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.advance_id, self.payment_number)
    }
}

/// A single installment of an advance.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct AdvancePayment {
    pub advance_id: AdvanceId,
    pub payment_number: u32,
    pub amount: Amount,
    pub due_at: DateTime<Utc>,
    pub status: PaymentStatus,
}

impl AdvancePayment {
    pub fn key(&self) -> PaymentKey {
        PaymentKey::new(self.advance_id, self.payment_number)
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == PaymentStatus::NotDueYet && self.due_at <= now
    }
}

/// Splits an advance into `installments` equal payments due every `spacing`,
/// the first one `spacing` after the advance starts.
///
/// Installments are rounded toward zero at the advance amount's scale (two
/// places at least) and the remainder is added to the last installment, so
/// the schedule always sums to the advance amount exactly.
pub fn installment_plan(
    advance: &Advance,
    installments: u32,
    spacing: Duration,
) -> Result<Vec<AdvancePayment>> {
    if installments == 0 {
        return Err(LedgerError::ValidationError(
            "An advance needs at least one installment".to_string(),
        ));
    }

    let total = advance.amount.value();
    let count = Decimal::from(installments);
    let scale = total.scale().max(2);
    let share = (total / count).round_dp_with_strategy(scale, RoundingStrategy::ToZero);
    let last = total - share * Decimal::from(installments - 1);

    let share = Amount::new(share).map_err(|_| {
        LedgerError::ValidationError(format!(
            "Advance of {total} is too small for {installments} installments"
        ))
    })?;
    let last = Amount::new(last)?;

    let mut due_at = advance.start_timestamp;
    let payments = (0..installments)
        .map(|payment_number| {
            due_at += spacing;
            AdvancePayment {
                advance_id: advance.id,
                payment_number,
                amount: if payment_number + 1 == installments {
                    last
                } else {
                    share
                },
                due_at,
                status: PaymentStatus::NotDueYet,
            }
        })
        .collect();

    Ok(payments)
}

/// Due date of the successor created when `failed` could not be collected.
///
/// The successor falls on the next scheduled installment still waiting to be
/// collected, but never earlier than one spacing after the failed one.
pub fn successor_due_at(
    failed: &AdvancePayment,
    siblings: &[AdvancePayment],
    spacing: Duration,
) -> DateTime<Utc> {
    let floor = failed.due_at + spacing;
    siblings
        .iter()
        .filter(|p| p.status == PaymentStatus::NotDueYet && p.due_at > failed.due_at)
        .map(|p| p.due_at)
        .min()
        .map_or(floor, |next| next.max(floor))
}

/// Installment appended in place of `failed`: same amount, numbered after the
/// highest existing installment of the advance, due per [`successor_due_at`].
pub fn successor_of(
    failed: &AdvancePayment,
    siblings: &[AdvancePayment],
    spacing: Duration,
) -> AdvancePayment {
    let last = siblings
        .iter()
        .map(|p| p.payment_number)
        .fold(failed.payment_number, u32::max);
    AdvancePayment {
        advance_id: failed.advance_id,
        payment_number: last + 1,
        amount: failed.amount,
        due_at: successor_due_at(failed, siblings, spacing),
        status: PaymentStatus::NotDueYet,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn advance(amount: Decimal) -> Advance {
        Advance {
            id: 1,
            dst_account_id: 2,
            amount: Amount::new(amount).unwrap(),
            start_timestamp: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            status: AdvanceStatus::Active,
        }
    }

    #[test]
    fn test_status_transitions_are_forward_only() {
        use AdvanceStatus::*;
        assert!(PendingTransaction.can_transition_to(Active));
        assert!(Active.can_transition_to(Paid));
        assert!(Active.can_transition_to(Overdue));
        assert!(!Active.can_transition_to(PendingTransaction));
        assert!(!Paid.can_transition_to(Overdue));
        assert!(!Overdue.can_transition_to(Active));
        assert!(!PendingTransaction.can_transition_to(Paid));
    }

    #[test]
    fn test_even_plan() {
        let advance = advance(dec!(1200));
        let plan = installment_plan(&advance, 12, Duration::days(7)).unwrap();

        assert_eq!(plan.len(), 12);
        for (k, payment) in plan.iter().enumerate() {
            assert_eq!(payment.payment_number, k as u32);
            assert_eq!(payment.amount.value(), dec!(100));
            assert_eq!(
                payment.due_at,
                advance.start_timestamp + Duration::days(7 * (k as i64 + 1))
            );
            assert_eq!(payment.status, PaymentStatus::NotDueYet);
        }
    }

    #[test]
    fn test_remainder_goes_to_last_installment() {
        let plan = installment_plan(&advance(dec!(100)), 3, Duration::days(7)).unwrap();
        let amounts: Vec<_> = plan.iter().map(|p| p.amount.value()).collect();
        assert_eq!(amounts, vec![dec!(33.33), dec!(33.33), dec!(33.34)]);
        assert_eq!(amounts.iter().sum::<Decimal>(), dec!(100));
    }

    #[test]
    fn test_plan_rejects_degenerate_splits() {
        assert!(installment_plan(&advance(dec!(10)), 0, Duration::days(7)).is_err());
        assert!(installment_plan(&advance(dec!(0.05)), 12, Duration::days(7)).is_err());
    }

    #[test]
    fn test_successor_due_at() {
        let plan = installment_plan(&advance(dec!(300)), 3, Duration::days(7)).unwrap();
        let spacing = Duration::days(7);

        // A later installment exists: the successor lands on it.
        assert_eq!(successor_due_at(&plan[0], &plan, spacing), plan[1].due_at);

        // The last installment failed: one week later.
        assert_eq!(
            successor_due_at(&plan[2], &plan, spacing),
            plan[2].due_at + spacing
        );

        // Settled siblings are not scheduled installments anymore.
        let mut settled = plan.clone();
        settled[1].status = PaymentStatus::Paid;
        settled[2].status = PaymentStatus::Paid;
        assert_eq!(
            successor_due_at(&settled[0], &settled, spacing),
            plan[0].due_at + spacing
        );
    }

    #[test]
    fn test_successor_of_takes_next_number() {
        let plan = installment_plan(&advance(dec!(300)), 3, Duration::days(7)).unwrap();
        let successor = successor_of(&plan[1], &plan, Duration::days(7));

        assert_eq!(successor.key(), PaymentKey::new(plan[1].advance_id, 3));
        assert_eq!(successor.amount, plan[1].amount);
        assert_eq!(successor.due_at, plan[2].due_at);
        assert_eq!(successor.status, PaymentStatus::NotDueYet);
    }
}

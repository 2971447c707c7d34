use super::account::{Account, AccountId, Amount, Balance};
use super::advance::{Advance, AdvanceId, AdvancePayment, AdvanceStatus, PaymentKey, PaymentStatus};
use super::transaction::{NewTransaction, Transaction, TransactionId};
use crate::error::{DeductionError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

/// Exclusive access to a set of accounts, obtained from
/// [`AccountStore::lock_accounts`].
///
/// Balance changes are staged until [`commit`](LockedAccounts::commit), which
/// applies all of them or none. Dropping the guard without committing releases
/// the locks and discards the staged changes.
pub trait LockedAccounts: Send {
    /// The locked account with any staged balance applied.
    fn account(&self, id: AccountId) -> Option<Account>;
    fn set_balance(&mut self, id: AccountId, balance: Balance) -> Result<()>;
    fn commit(self: Box<Self>) -> Result<()>;
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Creates an account. Fails with `IntegrityViolation` if the id is taken.
    async fn open_account(&self, account: Account) -> Result<()>;
    async fn get(&self, id: AccountId) -> Result<Option<Account>>;
    async fn get_all(&self) -> Result<Vec<Account>>;
    /// Locks every account in `ids`, in ascending id order whatever order the
    /// caller passes them in. Fails with `AccountNotFound` for the first
    /// missing id.
    async fn lock_accounts(&self, ids: &[AccountId]) -> Result<Box<dyn LockedAccounts>>;
}

#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Appends a record and assigns its id. Ids increase with insertion order.
    async fn append(&self, tx: NewTransaction) -> Result<Transaction>;
    async fn get(&self, id: TransactionId) -> Result<Option<Transaction>>;
    /// Records with `start <= timestamp < end`, ordered by `(timestamp, id)`,
    /// skipping `offset` and returning at most `limit`, together with the size
    /// of the whole filtered set.
    async fn query(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        offset: usize,
        limit: usize,
    ) -> Result<(Vec<Transaction>, usize)>;
}

#[async_trait]
pub trait AdvanceStore: Send + Sync {
    async fn create(
        &self,
        dst_account_id: AccountId,
        amount: Amount,
        status: AdvanceStatus,
        start_timestamp: DateTime<Utc>,
    ) -> Result<Advance>;
    async fn get(&self, id: AdvanceId) -> Result<Option<Advance>>;
    /// Moves an advance forward. Fails with `IntegrityViolation` when
    /// `status` is not a legal successor of the current one.
    async fn update_status(&self, id: AdvanceId, status: AdvanceStatus) -> Result<Advance>;
}

#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// Inserts a batch of installments. Fails with `IntegrityViolation` if any
    /// `(advance_id, payment_number)` already exists, in which case nothing is
    /// inserted.
    async fn insert_all(&self, payments: Vec<AdvancePayment>) -> Result<()>;
    async fn get(&self, key: PaymentKey) -> Result<Option<AdvancePayment>>;
    async fn for_advance(&self, advance_id: AdvanceId) -> Result<Vec<AdvancePayment>>;
    /// Atomically moves every `not_due_yet` payment with `due_at <= now` to
    /// `pending_processing` and returns them ordered by key. A payment is
    /// returned by at most one call.
    async fn claim_due(&self, now: DateTime<Utc>) -> Result<Vec<AdvancePayment>>;
    /// Moves a `pending_processing` payment to `status`. Returns `false`
    /// without writing if the payment is no longer `pending_processing`.
    async fn finish(&self, key: PaymentKey, status: PaymentStatus) -> Result<bool>;
    /// In one atomic write, marks a `pending_processing` payment `failed` and
    /// inserts its [`successor_of`](crate::domain::advance::successor_of).
    /// Returns `None` without writing if the payment is no longer
    /// `pending_processing`.
    async fn fail_with_successor(
        &self,
        key: PaymentKey,
        spacing: Duration,
    ) -> Result<Option<AdvancePayment>>;
    /// Payments claimed but never settled, ordered by key.
    async fn pending_processing(&self) -> Result<Vec<AdvancePayment>>;
}

/// The account-deduction dependency used to collect installments.
#[async_trait]
pub trait Deduction: Send + Sync {
    async fn deduct(
        &self,
        account_id: AccountId,
        amount: Amount,
    ) -> std::result::Result<(), DeductionError>;

    /// Whether dropping an in-flight [`deduct`](Deduction::deduct) guarantees
    /// nothing was deducted. Only such deductions are bounded by a timeout.
    fn cancel_safe(&self) -> bool {
        true
    }
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The four storage handles the application layer is built from.
#[derive(Clone)]
pub struct Stores {
    pub accounts: AccountStoreHandle,
    pub transactions: TransactionStoreHandle,
    pub advances: AdvanceStoreHandle,
    pub payments: PaymentStoreHandle,
}

pub type AccountStoreHandle = Arc<dyn AccountStore>;
pub type TransactionStoreHandle = Arc<dyn TransactionStore>;
pub type AdvanceStoreHandle = Arc<dyn AdvanceStore>;
pub type PaymentStoreHandle = Arc<dyn PaymentStore>;
pub type DeductionHandle = Arc<dyn Deduction>;
pub type ClockHandle = Arc<dyn Clock>;

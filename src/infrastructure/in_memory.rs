use crate::domain::account::{Account, AccountId, Amount, Balance};
use crate::domain::advance::{
    Advance, AdvanceId, AdvancePayment, AdvanceStatus, PaymentKey, PaymentStatus, successor_of,
};
use crate::domain::ports::{AccountStore, AdvanceStore, LockedAccounts, PaymentStore, TransactionStore};
use crate::domain::transaction::{NewTransaction, Transaction, TransactionId};
use crate::error::{LedgerError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

type AccountCell = Arc<Mutex<Account>>;

/// A thread-safe in-memory store for accounts.
///
/// Every account lives in its own `Mutex` so that transfers touching disjoint
/// accounts never contend; the outer `RwLock` only guards the id index.
#[derive(Default, Clone)]
pub struct InMemoryAccountStore {
    accounts: Arc<RwLock<BTreeMap<AccountId, AccountCell>>>,
}

impl InMemoryAccountStore {
    /// Creates a new, empty in-memory account store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccountStore for InMemoryAccountStore {
    async fn open_account(&self, account: Account) -> Result<()> {
        if account.balance.is_negative() {
            return Err(LedgerError::IntegrityViolation(format!(
                "Account {} cannot open with a negative balance",
                account.id
            )));
        }
        let mut accounts = self.accounts.write().await;
        if accounts.contains_key(&account.id) {
            return Err(LedgerError::IntegrityViolation(format!(
                "Account {} already exists",
                account.id
            )));
        }
        accounts.insert(account.id, Arc::new(Mutex::new(account)));
        Ok(())
    }

    async fn get(&self, id: AccountId) -> Result<Option<Account>> {
        let cell = self.accounts.read().await.get(&id).cloned();
        match cell {
            Some(cell) => Ok(Some(cell.lock().await.clone())),
            None => Ok(None),
        }
    }

    async fn get_all(&self) -> Result<Vec<Account>> {
        let cells: Vec<AccountCell> = self.accounts.read().await.values().cloned().collect();
        let mut accounts = Vec::with_capacity(cells.len());
        for cell in cells {
            accounts.push(cell.lock().await.clone());
        }
        Ok(accounts)
    }

    async fn lock_accounts(&self, ids: &[AccountId]) -> Result<Box<dyn LockedAccounts>> {
        let mut ids = ids.to_vec();
        ids.sort_unstable();
        ids.dedup();

        let cells = {
            let accounts = self.accounts.read().await;
            ids.iter()
                .map(|id| {
                    accounts
                        .get(id)
                        .cloned()
                        .ok_or(LedgerError::AccountNotFound(*id))
                })
                .collect::<Result<Vec<_>>>()?
        };

        // Ascending id order keeps concurrent lockers deadlock-free.
        let mut guards = BTreeMap::new();
        for (id, cell) in ids.into_iter().zip(cells) {
            guards.insert(id, cell.lock_owned().await);
        }

        Ok(Box::new(InMemoryLockedAccounts {
            guards,
            staged: HashMap::new(),
        }))
    }
}

struct InMemoryLockedAccounts {
    guards: BTreeMap<AccountId, OwnedMutexGuard<Account>>,
    staged: HashMap<AccountId, Balance>,
}

impl LockedAccounts for InMemoryLockedAccounts {
    fn account(&self, id: AccountId) -> Option<Account> {
        self.guards.get(&id).map(|guard| {
            let mut account = (**guard).clone();
            if let Some(balance) = self.staged.get(&id) {
                account.balance = *balance;
            }
            account
        })
    }

    fn set_balance(&mut self, id: AccountId, balance: Balance) -> Result<()> {
        if !self.guards.contains_key(&id) {
            return Err(LedgerError::AccountNotFound(id));
        }
        self.staged.insert(id, balance);
        Ok(())
    }

    fn commit(self: Box<Self>) -> Result<()> {
        let Self { mut guards, staged } = *self;
        if let Some((id, _)) = staged.iter().find(|(_, balance)| balance.is_negative()) {
            return Err(LedgerError::IntegrityViolation(format!(
                "check_balance_not_negative failed for account {id}"
            )));
        }
        for (id, balance) in staged {
            if let Some(guard) = guards.get_mut(&id) {
                guard.balance = balance;
            }
        }
        Ok(())
    }
}

/// A thread-safe, append-only in-memory ledger.
///
/// Records are kept in insertion order; the position in the vector is the
/// transaction id minus one.
#[derive(Default, Clone)]
pub struct InMemoryTransactionStore {
    transactions: Arc<RwLock<Vec<Transaction>>>,
}

impl InMemoryTransactionStore {
    /// Creates a new, empty in-memory transaction store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TransactionStore for InMemoryTransactionStore {
    async fn append(&self, tx: NewTransaction) -> Result<Transaction> {
        let mut transactions = self.transactions.write().await;
        let tx = tx.with_id(transactions.len() as TransactionId + 1);
        transactions.push(tx.clone());
        Ok(tx)
    }

    async fn get(&self, id: TransactionId) -> Result<Option<Transaction>> {
        let transactions = self.transactions.read().await;
        Ok(id
            .checked_sub(1)
            .and_then(|index| transactions.get(index as usize))
            .cloned())
    }

    async fn query(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        offset: usize,
        limit: usize,
    ) -> Result<(Vec<Transaction>, usize)> {
        let transactions = self.transactions.read().await;
        let mut matching: Vec<&Transaction> = transactions
            .iter()
            .filter(|tx| tx.timestamp >= start && tx.timestamp < end)
            .collect();
        matching.sort_by_key(|tx| (tx.timestamp, tx.id));

        let total = matching.len();
        let items = matching
            .into_iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect();
        Ok((items, total))
    }
}

/// In-memory advance records.
#[derive(Default, Clone)]
pub struct InMemoryAdvanceStore {
    advances: Arc<RwLock<BTreeMap<AdvanceId, Advance>>>,
}

impl InMemoryAdvanceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AdvanceStore for InMemoryAdvanceStore {
    async fn create(
        &self,
        dst_account_id: AccountId,
        amount: Amount,
        status: AdvanceStatus,
        start_timestamp: DateTime<Utc>,
    ) -> Result<Advance> {
        let mut advances = self.advances.write().await;
        let id = advances.keys().next_back().map_or(1, |last| last + 1);
        let advance = Advance {
            id,
            dst_account_id,
            amount,
            start_timestamp,
            status,
        };
        advances.insert(id, advance.clone());
        Ok(advance)
    }

    async fn get(&self, id: AdvanceId) -> Result<Option<Advance>> {
        Ok(self.advances.read().await.get(&id).cloned())
    }

    async fn update_status(&self, id: AdvanceId, status: AdvanceStatus) -> Result<Advance> {
        let mut advances = self.advances.write().await;
        let advance = advances
            .get_mut(&id)
            .ok_or(LedgerError::AdvanceNotFound(id))?;
        if !advance.status.can_transition_to(status) {
            return Err(LedgerError::IntegrityViolation(format!(
                "Advance {id} cannot move from {:?} to {:?}",
                advance.status, status
            )));
        }
        advance.status = status;
        Ok(advance.clone())
    }
}

/// In-memory installments, keyed and ordered by `(advance_id, payment_number)`.
///
/// A single `Mutex` serialises every status change, which is what makes the
/// claim phase exclusive.
#[derive(Default, Clone)]
pub struct InMemoryPaymentStore {
    payments: Arc<Mutex<BTreeMap<PaymentKey, AdvancePayment>>>,
}

impl InMemoryPaymentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PaymentStore for InMemoryPaymentStore {
    async fn insert_all(&self, batch: Vec<AdvancePayment>) -> Result<()> {
        let mut payments = self.payments.lock().await;
        if let Some(existing) = batch.iter().find(|p| payments.contains_key(&p.key())) {
            return Err(LedgerError::IntegrityViolation(format!(
                "Advance payment {} already exists",
                existing.key()
            )));
        }
        payments.extend(batch.into_iter().map(|p| (p.key(), p)));
        Ok(())
    }

    async fn get(&self, key: PaymentKey) -> Result<Option<AdvancePayment>> {
        Ok(self.payments.lock().await.get(&key).cloned())
    }

    async fn for_advance(&self, advance_id: AdvanceId) -> Result<Vec<AdvancePayment>> {
        let payments = self.payments.lock().await;
        Ok(payments
            .range(PaymentKey::new(advance_id, 0)..=PaymentKey::new(advance_id, u32::MAX))
            .map(|(_, p)| p.clone())
            .collect())
    }

    async fn claim_due(&self, now: DateTime<Utc>) -> Result<Vec<AdvancePayment>> {
        let mut payments = self.payments.lock().await;
        Ok(payments
            .values_mut()
            .filter(|p| p.is_due(now))
            .map(|p| {
                p.status = PaymentStatus::PendingProcessing;
                p.clone()
            })
            .collect())
    }

    async fn finish(&self, key: PaymentKey, status: PaymentStatus) -> Result<bool> {
        let mut payments = self.payments.lock().await;
        let payment = payments
            .get_mut(&key)
            .ok_or(LedgerError::PaymentNotFound(key))?;
        if payment.status != PaymentStatus::PendingProcessing {
            return Ok(false);
        }
        payment.status = status;
        Ok(true)
    }

    async fn fail_with_successor(
        &self,
        key: PaymentKey,
        spacing: Duration,
    ) -> Result<Option<AdvancePayment>> {
        let mut payments = self.payments.lock().await;
        let failed = payments
            .get(&key)
            .cloned()
            .ok_or(LedgerError::PaymentNotFound(key))?;
        if failed.status != PaymentStatus::PendingProcessing {
            return Ok(None);
        }
        let siblings: Vec<AdvancePayment> = payments
            .range(PaymentKey::new(key.advance_id, 0)..=PaymentKey::new(key.advance_id, u32::MAX))
            .map(|(_, p)| p.clone())
            .collect();
        let successor = successor_of(&failed, &siblings, spacing);

        // Both writes happen under the same guard.
        if let Some(payment) = payments.get_mut(&key) {
            payment.status = PaymentStatus::Failed;
        }
        payments.insert(successor.key(), successor.clone());
        Ok(Some(successor))
    }

    async fn pending_processing(&self) -> Result<Vec<AdvancePayment>> {
        let payments = self.payments.lock().await;
        Ok(payments
            .values()
            .filter(|p| p.status == PaymentStatus::PendingProcessing)
            .cloned()
            .collect())
    }
}

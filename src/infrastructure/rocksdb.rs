use crate::domain::account::{Account, AccountId, Amount, Balance};
use crate::domain::advance::{
    Advance, AdvanceId, AdvancePayment, AdvanceStatus, PaymentKey, PaymentStatus, successor_of,
};
use crate::domain::ports::{AccountStore, AdvanceStore, LockedAccounts, PaymentStore, TransactionStore};
use crate::domain::transaction::{NewTransaction, Transaction, TransactionId};
use crate::error::{LedgerError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, IteratorMode, Options, WriteBatch};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Column Family for storing account states.
pub const CF_ACCOUNTS: &str = "accounts";
/// Column Family for the append-only ledger.
pub const CF_TRANSACTIONS: &str = "transactions";
/// Column Family for advances.
pub const CF_ADVANCES: &str = "advances";
/// Column Family for advance installments, keyed by `(advance_id, payment_number)`.
pub const CF_PAYMENTS: &str = "advance_payments";
/// Index of the ledger keyed by `(timestamp, id)`, with empty values.
pub const CF_TRANSACTIONS_BY_TIME: &str = "transactions_by_time";
/// Index of `not_due_yet` installments keyed by `(due_at, advance_id,
/// payment_number)`, with empty values.
pub const CF_PAYMENTS_BY_DUE: &str = "advance_payments_by_due";

const FAMILIES: [&str; 6] = [
    CF_ACCOUNTS,
    CF_TRANSACTIONS,
    CF_ADVANCES,
    CF_PAYMENTS,
    CF_TRANSACTIONS_BY_TIME,
    CF_PAYMENTS_BY_DUE,
];
const TIME_KEY_LEN: usize = 12;

/// A persistent store implementation using RocksDB.
///
/// Backs all four storage ports with one database, one Column Family per
/// entity. Values are JSON; keys are big-endian so that iteration follows id
/// order. Two index families keep the ledger window query and the due-payment
/// claim from scanning whole families.
///
/// Multi-key invariants are kept with in-process locks: a per-account lock
/// table for transfers and one mutex per entity family for read-modify-write
/// sequences. This struct is thread-safe (`Clone` shares the underlying
/// `Arc<DB>` and the locks).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    account_locks: Arc<std::sync::Mutex<HashMap<AccountId, Arc<Mutex<()>>>>>,
    accounts_write: Arc<Mutex<()>>,
    transactions_write: Arc<Mutex<()>>,
    advances_write: Arc<Mutex<()>>,
    payments_write: Arc<Mutex<()>>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path.
    ///
    /// Ensures that the required column families exist.
    ///
    /// # Arguments
    ///
    /// * `path` - The filesystem path where the database will be stored.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let families = FAMILIES
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()));
        let db = DB::open_cf_descriptors(&opts, path, families)?;

        Ok(Self {
            db: Arc::new(db),
            account_locks: Arc::default(),
            accounts_write: Arc::default(),
            transactions_write: Arc::default(),
            advances_write: Arc::default(),
            payments_write: Arc::default(),
        })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        cf_handle(&self.db, name)
    }

    fn put<T: Serialize>(&self, family: &str, key: &[u8], value: &T) -> Result<()> {
        let cf = self.cf(family)?;
        self.db.put_cf(cf, key, encode(value)?)?;
        Ok(())
    }

    fn load<T: DeserializeOwned>(&self, family: &str, key: &[u8]) -> Result<Option<T>> {
        let cf = self.cf(family)?;
        match self.db.get_cf(cf, key)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn scan<T: DeserializeOwned>(&self, family: &str, prefix: &[u8]) -> Result<Vec<T>> {
        let cf = self.cf(family)?;
        let mut values = Vec::new();
        let mode = IteratorMode::From(prefix, rocksdb::Direction::Forward);
        for item in self.db.iterator_cf(cf, mode) {
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            values.push(decode(&value)?);
        }
        Ok(values)
    }

    fn last_key(&self, family: &str) -> Result<Option<Box<[u8]>>> {
        let cf = self.cf(family)?;
        match self.db.iterator_cf(cf, IteratorMode::End).next() {
            Some(item) => Ok(Some(item?.0)),
            None => Ok(None),
        }
    }

    fn next_id(&self, family: &str) -> Result<u64> {
        match self.last_key(family)? {
            Some(key) => {
                let bytes: [u8; 8] = key[..8]
                    .try_into()
                    .map_err(|_| LedgerError::internal(format!("Malformed key in {family}")))?;
                Ok(u64::from_be_bytes(bytes) + 1)
            }
            None => Ok(1),
        }
    }

    fn account_lock(&self, id: AccountId) -> Arc<Mutex<()>> {
        let mut locks = self.account_locks.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(locks.entry(id).or_default())
    }

    fn payments_of(&self, advance_id: AdvanceId) -> Result<Vec<AdvancePayment>> {
        self.scan(CF_PAYMENTS, &advance_id.to_be_bytes())
    }
}

fn cf_handle<'a>(db: &'a DB, name: &str) -> Result<&'a ColumnFamily> {
    db.cf_handle(name)
        .ok_or_else(|| LedgerError::internal(format!("Column family {name} not found")))
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| {
        LedgerError::InternalError(Box::new(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("Serialization error: {}", e),
        )))
    })
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|e| {
        LedgerError::InternalError(Box::new(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("Deserialization error: {}", e),
        )))
    })
}

fn payment_key(key: PaymentKey) -> [u8; 12] {
    let mut bytes = [0u8; 12];
    bytes[..8].copy_from_slice(&key.advance_id.to_be_bytes());
    bytes[8..].copy_from_slice(&key.payment_number.to_be_bytes());
    bytes
}

/// Bytes that sort like the timestamp: sign-flipped seconds, then nanoseconds.
fn time_key(at: DateTime<Utc>) -> [u8; TIME_KEY_LEN] {
    let mut bytes = [0u8; TIME_KEY_LEN];
    bytes[..8].copy_from_slice(&((at.timestamp() as u64) ^ (1 << 63)).to_be_bytes());
    bytes[8..].copy_from_slice(&at.timestamp_subsec_nanos().to_be_bytes());
    bytes
}

fn ledger_key(tx: &Transaction) -> [u8; TIME_KEY_LEN + 8] {
    let mut bytes = [0u8; TIME_KEY_LEN + 8];
    bytes[..TIME_KEY_LEN].copy_from_slice(&time_key(tx.timestamp));
    bytes[TIME_KEY_LEN..].copy_from_slice(&tx.id.to_be_bytes());
    bytes
}

fn due_key(payment: &AdvancePayment) -> [u8; TIME_KEY_LEN + 12] {
    let mut bytes = [0u8; TIME_KEY_LEN + 12];
    bytes[..TIME_KEY_LEN].copy_from_slice(&time_key(payment.due_at));
    bytes[TIME_KEY_LEN..].copy_from_slice(&payment_key(payment.key()));
    bytes
}

fn malformed(family: &str) -> LedgerError {
    LedgerError::internal(format!("Malformed key in {family}"))
}

fn transaction_id_of(ledger_key: &[u8]) -> Result<TransactionId> {
    let bytes: [u8; 8] = ledger_key
        .get(TIME_KEY_LEN..)
        .and_then(|id| id.try_into().ok())
        .ok_or_else(|| malformed(CF_TRANSACTIONS_BY_TIME))?;
    Ok(TransactionId::from_be_bytes(bytes))
}

fn payment_key_of(due_key: &[u8]) -> Result<PaymentKey> {
    let rest = due_key
        .get(TIME_KEY_LEN..)
        .filter(|rest| rest.len() == 12)
        .ok_or_else(|| malformed(CF_PAYMENTS_BY_DUE))?;
    let (advance_id, payment_number) = rest.split_at(8);
    match (advance_id.try_into(), payment_number.try_into()) {
        (Ok(advance_id), Ok(payment_number)) => Ok(PaymentKey::new(
            AdvanceId::from_be_bytes(advance_id),
            u32::from_be_bytes(payment_number),
        )),
        _ => Err(malformed(CF_PAYMENTS_BY_DUE)),
    }
}

#[async_trait]
impl AccountStore for RocksDBStore {
    async fn open_account(&self, account: Account) -> Result<()> {
        if account.balance.is_negative() {
            return Err(LedgerError::IntegrityViolation(format!(
                "Account {} cannot open with a negative balance",
                account.id
            )));
        }
        let _write = self.accounts_write.lock().await;
        let key = account.id.to_be_bytes();
        if self.load::<Account>(CF_ACCOUNTS, &key)?.is_some() {
            return Err(LedgerError::IntegrityViolation(format!(
                "Account {} already exists",
                account.id
            )));
        }
        self.put(CF_ACCOUNTS, &key, &account)
    }

    async fn get(&self, id: AccountId) -> Result<Option<Account>> {
        self.load(CF_ACCOUNTS, &id.to_be_bytes())
    }

    async fn get_all(&self) -> Result<Vec<Account>> {
        self.scan(CF_ACCOUNTS, &[])
    }

    async fn lock_accounts(&self, ids: &[AccountId]) -> Result<Box<dyn LockedAccounts>> {
        let mut ids = ids.to_vec();
        ids.sort_unstable();
        ids.dedup();

        // Accounts are never deleted, so only ids that exist get a lock entry.
        let cf = self.cf(CF_ACCOUNTS)?;
        for id in &ids {
            if self.db.get_pinned_cf(cf, id.to_be_bytes())?.is_none() {
                return Err(LedgerError::AccountNotFound(*id));
            }
        }

        let mut guards = Vec::with_capacity(ids.len());
        for id in &ids {
            guards.push(self.account_lock(*id).lock_owned().await);
        }

        let mut accounts = BTreeMap::new();
        for id in ids {
            let account = self
                .load::<Account>(CF_ACCOUNTS, &id.to_be_bytes())?
                .ok_or(LedgerError::AccountNotFound(id))?;
            accounts.insert(id, account);
        }

        Ok(Box::new(RocksDBLockedAccounts {
            db: Arc::clone(&self.db),
            accounts,
            staged: HashMap::new(),
            _guards: guards,
        }))
    }
}

struct RocksDBLockedAccounts {
    db: Arc<DB>,
    accounts: BTreeMap<AccountId, Account>,
    staged: HashMap<AccountId, Balance>,
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl LockedAccounts for RocksDBLockedAccounts {
    fn account(&self, id: AccountId) -> Option<Account> {
        self.accounts.get(&id).map(|account| {
            let mut account = account.clone();
            if let Some(balance) = self.staged.get(&id) {
                account.balance = *balance;
            }
            account
        })
    }

    fn set_balance(&mut self, id: AccountId, balance: Balance) -> Result<()> {
        if !self.accounts.contains_key(&id) {
            return Err(LedgerError::AccountNotFound(id));
        }
        self.staged.insert(id, balance);
        Ok(())
    }

    fn commit(self: Box<Self>) -> Result<()> {
        if let Some((id, _)) = self.staged.iter().find(|(_, balance)| balance.is_negative()) {
            return Err(LedgerError::IntegrityViolation(format!(
                "check_balance_not_negative failed for account {id}"
            )));
        }

        let cf = cf_handle(&self.db, CF_ACCOUNTS)?;
        let mut batch = WriteBatch::default();
        for (id, balance) in &self.staged {
            if let Some(account) = self.accounts.get(id) {
                let account = Account {
                    balance: *balance,
                    ..account.clone()
                };
                batch.put_cf(cf, id.to_be_bytes(), encode(&account)?);
            }
        }
        self.db.write(batch)?;
        Ok(())
    }
}

#[async_trait]
impl TransactionStore for RocksDBStore {
    async fn append(&self, tx: NewTransaction) -> Result<Transaction> {
        let _write = self.transactions_write.lock().await;
        let tx = tx.with_id(self.next_id(CF_TRANSACTIONS)?);
        let mut batch = WriteBatch::default();
        batch.put_cf(self.cf(CF_TRANSACTIONS)?, tx.id.to_be_bytes(), encode(&tx)?);
        batch.put_cf(self.cf(CF_TRANSACTIONS_BY_TIME)?, ledger_key(&tx), b"");
        self.db.write(batch)?;
        Ok(tx)
    }

    async fn get(&self, id: TransactionId) -> Result<Option<Transaction>> {
        self.load(CF_TRANSACTIONS, &id.to_be_bytes())
    }

    async fn query(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        offset: usize,
        limit: usize,
    ) -> Result<(Vec<Transaction>, usize)> {
        if start >= end {
            return Ok((Vec::new(), 0));
        }
        let index = self.cf(CF_TRANSACTIONS_BY_TIME)?;
        let lower = time_key(start);
        let upper = time_key(end);

        // Only index keys are read to count the window; records are loaded
        // for the requested page alone.
        let mut total = 0;
        let mut ids = Vec::new();
        let mode = IteratorMode::From(&lower, rocksdb::Direction::Forward);
        for item in self.db.iterator_cf(index, mode) {
            let (key, _) = item?;
            let id = transaction_id_of(&key)?;
            if key[..TIME_KEY_LEN] >= upper[..] {
                break;
            }
            if total >= offset && ids.len() < limit {
                ids.push(id);
            }
            total += 1;
        }

        let mut items = Vec::with_capacity(ids.len());
        for id in ids {
            let tx = self.load(CF_TRANSACTIONS, &id.to_be_bytes())?.ok_or_else(|| {
                LedgerError::internal(format!("Ledger index points at missing transaction {id}"))
            })?;
            items.push(tx);
        }
        Ok((items, total))
    }
}

#[async_trait]
impl AdvanceStore for RocksDBStore {
    async fn create(
        &self,
        dst_account_id: AccountId,
        amount: Amount,
        status: AdvanceStatus,
        start_timestamp: DateTime<Utc>,
    ) -> Result<Advance> {
        let _write = self.advances_write.lock().await;
        let advance = Advance {
            id: self.next_id(CF_ADVANCES)?,
            dst_account_id,
            amount,
            start_timestamp,
            status,
        };
        self.put(CF_ADVANCES, &advance.id.to_be_bytes(), &advance)?;
        Ok(advance)
    }

    async fn get(&self, id: AdvanceId) -> Result<Option<Advance>> {
        self.load(CF_ADVANCES, &id.to_be_bytes())
    }

    async fn update_status(&self, id: AdvanceId, status: AdvanceStatus) -> Result<Advance> {
        let _write = self.advances_write.lock().await;
        let mut advance: Advance = self
            .load(CF_ADVANCES, &id.to_be_bytes())?
            .ok_or(LedgerError::AdvanceNotFound(id))?;
        if !advance.status.can_transition_to(status) {
            return Err(LedgerError::IntegrityViolation(format!(
                "Advance {id} cannot move from {:?} to {:?}",
                advance.status, status
            )));
        }
        advance.status = status;
        self.put(CF_ADVANCES, &id.to_be_bytes(), &advance)?;
        Ok(advance)
    }
}

#[async_trait]
impl PaymentStore for RocksDBStore {
    async fn insert_all(&self, payments: Vec<AdvancePayment>) -> Result<()> {
        let _write = self.payments_write.lock().await;
        let cf = self.cf(CF_PAYMENTS)?;
        let due = self.cf(CF_PAYMENTS_BY_DUE)?;
        let mut batch = WriteBatch::default();
        for payment in &payments {
            let key = payment_key(payment.key());
            if self.db.get_pinned_cf(cf, key)?.is_some() {
                return Err(LedgerError::IntegrityViolation(format!(
                    "Advance payment {} already exists",
                    payment.key()
                )));
            }
            batch.put_cf(cf, key, encode(payment)?);
            if payment.status == PaymentStatus::NotDueYet {
                batch.put_cf(due, due_key(payment), b"");
            }
        }
        self.db.write(batch)?;
        Ok(())
    }

    async fn get(&self, key: PaymentKey) -> Result<Option<AdvancePayment>> {
        self.load(CF_PAYMENTS, &payment_key(key))
    }

    async fn for_advance(&self, advance_id: AdvanceId) -> Result<Vec<AdvancePayment>> {
        self.payments_of(advance_id)
    }

    async fn claim_due(&self, now: DateTime<Utc>) -> Result<Vec<AdvancePayment>> {
        let _write = self.payments_write.lock().await;
        let cf = self.cf(CF_PAYMENTS)?;
        let due = self.cf(CF_PAYMENTS_BY_DUE)?;
        let bound = time_key(now);
        let mut batch = WriteBatch::default();
        let mut claimed = Vec::new();
        for item in self.db.iterator_cf(due, IteratorMode::Start) {
            let (index_key, _) = item?;
            let key = payment_key_of(&index_key)?;
            if index_key[..TIME_KEY_LEN] > bound[..] {
                break;
            }
            batch.delete_cf(due, &index_key);
            let Some(mut payment) = self.load::<AdvancePayment>(CF_PAYMENTS, &payment_key(key))?
            else {
                continue;
            };
            if payment.is_due(now) {
                payment.status = PaymentStatus::PendingProcessing;
                batch.put_cf(cf, payment_key(key), encode(&payment)?);
                claimed.push(payment);
            }
        }
        self.db.write(batch)?;
        claimed.sort_by_key(AdvancePayment::key);
        Ok(claimed)
    }

    async fn finish(&self, key: PaymentKey, status: PaymentStatus) -> Result<bool> {
        let _write = self.payments_write.lock().await;
        let mut payment: AdvancePayment = self
            .load(CF_PAYMENTS, &payment_key(key))?
            .ok_or(LedgerError::PaymentNotFound(key))?;
        if payment.status != PaymentStatus::PendingProcessing {
            return Ok(false);
        }
        payment.status = status;
        self.put(CF_PAYMENTS, &payment_key(key), &payment)?;
        Ok(true)
    }

    async fn fail_with_successor(
        &self,
        key: PaymentKey,
        spacing: Duration,
    ) -> Result<Option<AdvancePayment>> {
        let _write = self.payments_write.lock().await;
        let mut failed: AdvancePayment = self
            .load(CF_PAYMENTS, &payment_key(key))?
            .ok_or(LedgerError::PaymentNotFound(key))?;
        if failed.status != PaymentStatus::PendingProcessing {
            return Ok(None);
        }
        let successor = successor_of(&failed, &self.payments_of(key.advance_id)?, spacing);
        failed.status = PaymentStatus::Failed;

        let cf = self.cf(CF_PAYMENTS)?;
        let mut batch = WriteBatch::default();
        batch.put_cf(cf, payment_key(key), encode(&failed)?);
        batch.put_cf(cf, payment_key(successor.key()), encode(&successor)?);
        batch.put_cf(self.cf(CF_PAYMENTS_BY_DUE)?, due_key(&successor), b"");
        self.db.write(batch)?;
        Ok(Some(successor))
    }

    async fn pending_processing(&self) -> Result<Vec<AdvancePayment>> {
        Ok(self
            .scan::<AdvancePayment>(CF_PAYMENTS, &[])?
            .into_iter()
            .filter(|p| p.status == PaymentStatus::PendingProcessing)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::transaction::{Direction, TransactionStatus};
    use chrono::Duration;
    use rust_decimal_macros::dec;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_rocksdb_open_cf() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).expect("Failed to open RocksDB");

        for name in FAMILIES {
            assert!(store.db.cf_handle(name).is_some());
        }
    }

    #[tokio::test]
    async fn test_rocksdb_account_store() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).unwrap();

        let account = Account::new(1, "alice", Balance::new(dec!(100.0)));
        store.open_account(account.clone()).await.unwrap();
        store
            .open_account(Account::new(2, "bob", Balance::ZERO))
            .await
            .unwrap();

        let retrieved = AccountStore::get(&store, 1).await.unwrap().unwrap();
        assert_eq!(retrieved, account);
        assert_eq!(store.get_all().await.unwrap().len(), 2);

        let mut locked = store.lock_accounts(&[2, 1]).await.unwrap();
        locked.set_balance(1, Balance::new(dec!(60))).unwrap();
        locked.set_balance(2, Balance::new(dec!(40))).unwrap();
        locked.commit().unwrap();

        let bob = AccountStore::get(&store, 2).await.unwrap().unwrap();
        assert_eq!(bob.balance, Balance::new(dec!(40)));
        assert!(AccountStore::get(&store, 3).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rocksdb_unknown_accounts_leave_no_lock_entry() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).unwrap();
        store
            .open_account(Account::new(1, "alice", Balance::ZERO))
            .await
            .unwrap();
        drop(store.lock_accounts(&[1]).await.unwrap());

        for id in 100..200 {
            assert!(matches!(
                store.lock_accounts(&[1, id]).await,
                Err(LedgerError::AccountNotFound(missing)) if missing == id
            ));
        }
        assert_eq!(store.account_locks.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rocksdb_transaction_store() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).unwrap();

        let tx = NewTransaction {
            src_account_id: 1,
            dst_account_id: 2,
            timestamp: DateTime::from_timestamp(100, 0).unwrap(),
            amount: Amount::new(dec!(100.0)).unwrap(),
            direction: Direction::Debit,
            status: TransactionStatus::Successful,
            reason: None,
        };

        let first = store.append(tx.clone()).await.unwrap();
        let second = store.append(tx).await.unwrap();
        assert_eq!((first.id, second.id), (1, 2));

        let retrieved = TransactionStore::get(&store, 1).await.unwrap().unwrap();
        assert_eq!(retrieved, first);

        let (items, total) = store
            .query(
                DateTime::from_timestamp(0, 0).unwrap(),
                DateTime::from_timestamp(200, 0).unwrap(),
                1,
                5,
            )
            .await
            .unwrap();
        assert_eq!(total, 2);
        assert_eq!(items, vec![second]);
    }

    #[tokio::test]
    async fn test_rocksdb_ledger_window_follows_timestamps() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).unwrap();
        let record = |secs: i64, nanos: u32| NewTransaction {
            src_account_id: 1,
            dst_account_id: 2,
            timestamp: DateTime::from_timestamp(secs, nanos).unwrap(),
            amount: Amount::new(dec!(1)).unwrap(),
            direction: Direction::Debit,
            status: TransactionStatus::Successful,
            reason: None,
        };

        // Appended out of time order, one of them before the epoch.
        let late = store.append(record(300, 0)).await.unwrap();
        let early = store.append(record(-50, 0)).await.unwrap();
        let mid = store.append(record(100, 500)).await.unwrap();
        let tie = store.append(record(100, 500)).await.unwrap();
        let end = store.append(record(400, 0)).await.unwrap();

        let from = DateTime::from_timestamp(-100, 0).unwrap();
        let (items, total) = store.query(from, end.timestamp, 0, 10).await.unwrap();
        assert_eq!(total, 4);
        assert_eq!(items, vec![early, mid.clone(), tie.clone(), late]);

        let (items, total) = store.query(from, end.timestamp, 1, 2).await.unwrap();
        assert_eq!(total, 4);
        assert_eq!(items, vec![mid, tie]);

        let (items, total) = store
            .query(end.timestamp, end.timestamp, 0, 10)
            .await
            .unwrap();
        assert!(items.is_empty());
        assert_eq!(total, 0);
    }

    #[tokio::test]
    async fn test_rocksdb_payment_claims() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).unwrap();
        let start = DateTime::from_timestamp(0, 0).unwrap();

        let advance = store
            .create(1, Amount::new(dec!(20)).unwrap(), AdvanceStatus::Active, start)
            .await
            .unwrap();
        let payments: Vec<_> = (0..2)
            .map(|n| AdvancePayment {
                advance_id: advance.id,
                payment_number: n,
                amount: Amount::new(dec!(10)).unwrap(),
                due_at: start + Duration::days(7 * (n as i64 + 1)),
                status: PaymentStatus::NotDueYet,
            })
            .collect();
        store.insert_all(payments).await.unwrap();

        let claimed = store.claim_due(start + Duration::days(7)).await.unwrap();
        assert_eq!(claimed.len(), 1);
        assert!(store.claim_due(start + Duration::days(7)).await.unwrap().is_empty());

        let key = claimed[0].key();
        assert_eq!(store.pending_processing().await.unwrap(), claimed);
        let successor = store
            .fail_with_successor(key, Duration::days(7))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(successor.payment_number, 2);
        assert_eq!(successor.due_at, start + Duration::days(14));
        assert!(store.fail_with_successor(key, Duration::days(7)).await.unwrap().is_none());
        assert!(store.pending_processing().await.unwrap().is_empty());

        let failed = PaymentStore::get(&store, key).await.unwrap().unwrap();
        assert_eq!(failed.status, PaymentStatus::Failed);

        // The installment and its successor fall due together and are
        // claimed once, in key order.
        let claimed = store.claim_due(start + Duration::days(14)).await.unwrap();
        let keys: Vec<_> = claimed.iter().map(AdvancePayment::key).collect();
        assert_eq!(
            keys,
            vec![PaymentKey::new(advance.id, 1), PaymentKey::new(advance.id, 2)]
        );
        assert!(store.claim_due(start + Duration::days(365)).await.unwrap().is_empty());

        let due = store.cf(CF_PAYMENTS_BY_DUE).unwrap();
        assert_eq!(store.db.iterator_cf(due, IteratorMode::Start).count(), 0);
    }
}

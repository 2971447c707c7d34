#![allow(dead_code)]

use advance_ledger::application::service::BankService;
use advance_ledger::domain::account::{Account, AccountId, Amount, Balance};
use advance_ledger::domain::ports::Deduction;
use advance_ledger::error::DeductionError;
use advance_ledger::infrastructure::Stores;
use advance_ledger::infrastructure::clock::ManualClock;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::fs::File;
use std::io::Error;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const TREASURY: AccountId = 100;
pub const COLLECTION: AccountId = 99;

pub fn epoch() -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000, 0).unwrap()
}

pub async fn stores_with(accounts: &[(AccountId, Decimal)]) -> Stores {
    let stores = Stores::in_memory();
    for (id, balance) in accounts {
        stores
            .accounts
            .open_account(Account::new(*id, format!("owner-{id}"), Balance::new(*balance)))
            .await
            .unwrap();
    }
    stores
}

pub async fn balance(stores: &Stores, id: AccountId) -> Decimal {
    stores.accounts.get(id).await.unwrap().unwrap().balance.0
}

pub fn service(stores: &Stores, clock: &ManualClock) -> BankService {
    BankService::new(stores, Arc::new(clock.clone()), TREASURY)
}

/// Deduction double: succeeds unless the account is marked failing, and can
/// be slowed down to exercise timeouts.
#[derive(Default)]
pub struct ScriptedDeduction {
    failing: Mutex<HashSet<AccountId>>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl ScriptedDeduction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn fail_for(&self, account_id: AccountId) {
        self.failing.lock().unwrap().insert(account_id);
    }

    pub fn succeed_for(&self, account_id: AccountId) {
        self.failing.lock().unwrap().remove(&account_id);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Deduction for ScriptedDeduction {
    async fn deduct(&self, account_id: AccountId, _amount: Amount) -> Result<(), DeductionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.lock().unwrap().contains(&account_id) {
            return Err(DeductionError::Rejected("account closed".to_string()));
        }
        Ok(())
    }
}

pub fn write_csv(path: &Path, header: &[&str], rows: &[&[&str]]) -> Result<(), Error> {
    let file = File::create(path)?;
    let mut wtr = csv::WriterBuilder::new().from_writer(file);
    wtr.write_record(header)?;
    for row in rows {
        wtr.write_record(*row)?;
    }
    wtr.flush()?;
    Ok(())
}

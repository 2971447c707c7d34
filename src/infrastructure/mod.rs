//! Adapters implementing the domain ports.

pub mod clock;
pub mod deduction;
pub mod in_memory;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;

pub use crate::domain::ports::Stores;

use in_memory::{
    InMemoryAccountStore, InMemoryAdvanceStore, InMemoryPaymentStore, InMemoryTransactionStore,
};
use std::sync::Arc;

impl Stores {
    pub fn in_memory() -> Self {
        Self {
            accounts: Arc::new(InMemoryAccountStore::new()),
            transactions: Arc::new(InMemoryTransactionStore::new()),
            advances: Arc::new(InMemoryAdvanceStore::new()),
            payments: Arc::new(InMemoryPaymentStore::new()),
        }
    }

    /// Opens (or creates) a RocksDB database at `path` backing all four stores.
    #[cfg(feature = "storage-rocksdb")]
    pub fn rocksdb<P: AsRef<std::path::Path>>(path: P) -> crate::error::Result<Self> {
        let store = self::rocksdb::RocksDBStore::open(path)?;
        Ok(Self {
            accounts: Arc::new(store.clone()),
            transactions: Arc::new(store.clone()),
            advances: Arc::new(store.clone()),
            payments: Arc::new(store),
        })
    }
}

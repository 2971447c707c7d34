use crate::domain::ports::TransactionStoreHandle;
use crate::domain::transaction::{NewTransaction, Transaction};
use crate::error::{LedgerError, Result};
use chrono::{DateTime, Utc};
use tracing::debug;

/// A page request over the ledger: the half-open window `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LedgerQuery {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub page: usize,
    pub limit: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LedgerPage {
    pub items: Vec<Transaction>,
    /// Size of the whole filtered set, whatever the page.
    pub total_count: usize,
}

impl LedgerPage {
    pub fn number_of_pages(&self, limit: usize) -> usize {
        if limit == 0 {
            0
        } else {
            self.total_count.div_ceil(limit)
        }
    }
}

/// Append-only record of every transfer attempt.
pub struct TransactionLedger {
    store: TransactionStoreHandle,
}

impl TransactionLedger {
    pub fn new(store: TransactionStoreHandle) -> Self {
        Self { store }
    }

    pub async fn record(&self, tx: NewTransaction) -> Result<Transaction> {
        let tx = self.store.append(tx).await?;
        debug!(
            id = tx.id,
            src_account_id = tx.src_account_id,
            dst_account_id = tx.dst_account_id,
            status = ?tx.status,
            "Transaction recorded"
        );
        Ok(tx)
    }

    /// Returns records `[page * limit, page * limit + limit)` of the window,
    /// ordered by timestamp and then by insertion order.
    pub async fn query(&self, query: LedgerQuery) -> Result<LedgerPage> {
        if query.limit == 0 {
            return Err(LedgerError::ValidationError(
                "limit must be greater than zero".to_string(),
            ));
        }
        if query.end <= query.start {
            return Ok(LedgerPage {
                items: Vec::new(),
                total_count: 0,
            });
        }

        let offset = query.page.saturating_mul(query.limit);
        let (items, total_count) = self
            .store
            .query(query.start, query.end, offset, query.limit)
            .await?;
        Ok(LedgerPage { items, total_count })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::account::Amount;
    use crate::domain::transaction::{Direction, TransactionStatus};
    use crate::infrastructure::in_memory::InMemoryTransactionStore;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    async fn ledger_with(timestamps: &[i64]) -> TransactionLedger {
        let ledger = TransactionLedger::new(Arc::new(InMemoryTransactionStore::new()));
        for secs in timestamps {
            ledger
                .record(NewTransaction {
                    src_account_id: 1,
                    dst_account_id: 2,
                    timestamp: at(*secs),
                    amount: Amount::new(dec!(5)).unwrap(),
                    direction: Direction::Debit,
                    status: TransactionStatus::Successful,
                    reason: None,
                })
                .await
                .unwrap();
        }
        ledger
    }

    #[tokio::test]
    async fn test_window_is_half_open() {
        let ledger = ledger_with(&[10, 20, 30]).await;
        let page = ledger
            .query(LedgerQuery {
                start: at(10),
                end: at(30),
                page: 0,
                limit: 10,
            })
            .await
            .unwrap();
        let stamps: Vec<_> = page.items.iter().map(|tx| tx.timestamp).collect();
        assert_eq!(stamps, vec![at(10), at(20)]);
        assert_eq!(page.total_count, 2);
    }

    #[tokio::test]
    async fn test_page_past_the_end_keeps_total() {
        let ledger = ledger_with(&[1, 2, 3, 4, 5]).await;
        let query = LedgerQuery {
            start: at(0),
            end: at(100),
            page: 7,
            limit: 2,
        };
        let page = ledger.query(query).await.unwrap();
        assert!(page.items.is_empty());
        assert_eq!(page.total_count, 5);
        assert_eq!(page.number_of_pages(2), 3);
    }

    #[tokio::test]
    async fn test_zero_limit_is_rejected() {
        let ledger = ledger_with(&[]).await;
        let result = ledger
            .query(LedgerQuery {
                start: at(0),
                end: at(1),
                page: 0,
                limit: 0,
            })
            .await;
        assert!(matches!(result, Err(LedgerError::ValidationError(_))));
    }
}

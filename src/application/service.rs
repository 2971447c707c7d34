use super::advances::AdvanceScheduler;
use super::ledger::{LedgerPage, LedgerQuery, TransactionLedger};
use super::transfer::TransferEngine;
use crate::domain::account::{AccountId, Amount};
use crate::domain::advance::{Advance, AdvancePayment, DEFAULT_INSTALLMENTS};
use crate::domain::ports::{ClockHandle, Stores};
use crate::domain::transaction::{Direction, NewTransaction, Transaction, TransactionStatus};
use crate::error::Result;
use tracing::{info, warn};

/// A transfer as requested by a client: always a positive amount plus a
/// direction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransferRequest {
    pub src_account_id: AccountId,
    pub dst_account_id: AccountId,
    pub amount: Amount,
    pub direction: Direction,
}

/// What happened to an advance request.
#[derive(Debug, Clone, PartialEq)]
pub struct AdvanceReceipt {
    /// `active` when funded, still `pending_transaction` otherwise.
    pub advance: Advance,
    /// The ledger record of the funding transfer.
    pub funding: Transaction,
    /// Empty when the funding transfer failed.
    pub payments: Vec<AdvancePayment>,
}

/// Orchestrates the engine, the ledger and the advance scheduler the way a
/// request handler does: transfer outcomes are business results that always
/// end up in the ledger, and only storage faults escape as errors.
pub struct BankService {
    engine: TransferEngine,
    ledger: TransactionLedger,
    scheduler: AdvanceScheduler,
    clock: ClockHandle,
    treasury_account_id: AccountId,
    installments: u32,
}

impl BankService {
    /// # Arguments
    ///
    /// * `stores` - Storage handles shared with the rest of the process.
    /// * `clock` - Source of transaction and advance timestamps.
    /// * `treasury_account_id` - Account advances are funded from.
    pub fn new(stores: &Stores, clock: ClockHandle, treasury_account_id: AccountId) -> Self {
        Self {
            engine: TransferEngine::new(stores.accounts.clone()),
            ledger: TransactionLedger::new(stores.transactions.clone()),
            scheduler: AdvanceScheduler::new(
                stores.advances.clone(),
                stores.payments.clone(),
                clock.clone(),
            ),
            clock,
            treasury_account_id,
            installments: DEFAULT_INSTALLMENTS,
        }
    }

    pub fn with_installments(mut self, installments: u32) -> Self {
        self.installments = installments;
        self
    }

    pub fn with_scheduler(mut self, scheduler: AdvanceScheduler) -> Self {
        self.scheduler = scheduler;
        self
    }

    /// Runs a transfer and records its outcome.
    ///
    /// Always returns the ledger record; its `status` tells whether money
    /// moved. Fails only when the ledger itself cannot be written.
    pub async fn submit_transfer(&self, request: TransferRequest) -> Result<Transaction> {
        let outcome = self
            .engine
            .transfer(
                request.src_account_id,
                request.dst_account_id,
                request.direction.signed(request.amount),
            )
            .await;

        let (status, reason) = match outcome {
            Ok(()) => (TransactionStatus::Successful, None),
            Err(e) => {
                warn!(
                    src_account_id = request.src_account_id,
                    dst_account_id = request.dst_account_id,
                    error = %e,
                    "Transfer failed"
                );
                (TransactionStatus::Fail, Some(e.to_string()))
            }
        };

        self.ledger
            .record(NewTransaction {
                src_account_id: request.src_account_id,
                dst_account_id: request.dst_account_id,
                timestamp: self.clock.now(),
                amount: request.amount,
                direction: request.direction,
                status,
                reason,
            })
            .await
    }

    /// Creates an advance, funds it from the treasury account and, once the
    /// money has moved, activates it and schedules its installments.
    pub async fn request_advance(
        &self,
        dst_account_id: AccountId,
        amount: Amount,
    ) -> Result<AdvanceReceipt> {
        let advance = self.scheduler.create_advance(dst_account_id, amount).await?;

        let funding = self
            .submit_transfer(TransferRequest {
                src_account_id: self.treasury_account_id,
                dst_account_id,
                amount,
                direction: Direction::Debit,
            })
            .await?;

        if !funding.is_successful() {
            warn!(
                advance_id = advance.id,
                reason = funding.reason.as_deref().unwrap_or_default(),
                "Advance funding failed, advance left pending"
            );
            return Ok(AdvanceReceipt {
                advance,
                funding,
                payments: Vec::new(),
            });
        }

        let advance = self.scheduler.activate(&advance).await?;
        let payments = self
            .scheduler
            .schedule_payments(&advance, self.installments)
            .await?;
        info!(
            advance_id = advance.id,
            dst_account_id,
            %amount,
            installments = payments.len(),
            "Advance granted"
        );

        Ok(AdvanceReceipt {
            advance,
            funding,
            payments,
        })
    }

    pub async fn transactions(&self, query: LedgerQuery) -> Result<LedgerPage> {
        self.ledger.query(query).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::account::{Account, Balance};
    use crate::domain::advance::AdvanceStatus;
    use crate::infrastructure::clock::ManualClock;
    use chrono::DateTime;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    async fn service() -> (BankService, Stores) {
        let stores = Stores::in_memory();
        for (id, balance) in [(1, dec!(500)), (2, dec!(50)), (100, dec!(10_000))] {
            stores
                .accounts
                .open_account(Account::new(id, format!("owner-{id}"), Balance::new(balance)))
                .await
                .unwrap();
        }
        let clock = ManualClock::new(DateTime::from_timestamp(1_700_000_000, 0).unwrap());
        (BankService::new(&stores, Arc::new(clock), 100), stores)
    }

    #[tokio::test]
    async fn test_failed_transfer_is_still_recorded() {
        let (service, _) = service().await;
        let tx = service
            .submit_transfer(TransferRequest {
                src_account_id: 1,
                dst_account_id: 2,
                amount: Amount::new(dec!(1000)).unwrap(),
                direction: Direction::Debit,
            })
            .await
            .unwrap();
        assert_eq!(tx.status, TransactionStatus::Fail);
        assert_eq!(tx.amount.value(), dec!(1000));
        assert!(tx.reason.unwrap().contains("Insufficient funds"));
    }

    #[tokio::test]
    async fn test_advance_is_funded_and_scheduled() {
        let (service, stores) = service().await;
        let receipt = service
            .request_advance(2, Amount::new(dec!(1200)).unwrap())
            .await
            .unwrap();
        assert_eq!(receipt.advance.status, AdvanceStatus::Active);
        assert!(receipt.funding.is_successful());
        assert_eq!(receipt.payments.len(), 12);

        let dst = stores.accounts.get(2).await.unwrap().unwrap();
        assert_eq!(dst.balance, Balance::new(dec!(1250)));
    }

    #[tokio::test]
    async fn test_unfunded_advance_stays_pending() {
        let (service, stores) = service().await;
        let receipt = service
            .request_advance(2, Amount::new(dec!(20_000)).unwrap())
            .await
            .unwrap();
        assert_eq!(receipt.advance.status, AdvanceStatus::PendingTransaction);
        assert_eq!(receipt.funding.status, TransactionStatus::Fail);
        assert!(receipt.payments.is_empty());
        assert!(stores.payments.for_advance(receipt.advance.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_service_is_built_from_port_handles() {
        use crate::infrastructure::in_memory::{
            InMemoryAccountStore, InMemoryAdvanceStore, InMemoryPaymentStore,
            InMemoryTransactionStore,
        };

        // Any set of port implementations will do; no storage engine is implied.
        let stores = Stores {
            accounts: Arc::new(InMemoryAccountStore::new()),
            transactions: Arc::new(InMemoryTransactionStore::new()),
            advances: Arc::new(InMemoryAdvanceStore::new()),
            payments: Arc::new(InMemoryPaymentStore::new()),
        };
        stores
            .accounts
            .open_account(Account::new(1, "alice", Balance::new(dec!(5))))
            .await
            .unwrap();
        let clock = ManualClock::new(DateTime::from_timestamp(0, 0).unwrap());
        let service = BankService::new(&stores, Arc::new(clock), 100);

        let tx = service
            .submit_transfer(TransferRequest {
                src_account_id: 1,
                dst_account_id: 7,
                amount: Amount::new(dec!(1)).unwrap(),
                direction: Direction::Debit,
            })
            .await
            .unwrap();
        assert_eq!(tx.status, TransactionStatus::Fail);
        let page = service
            .transactions(LedgerQuery {
                start: DateTime::from_timestamp(0, 0).unwrap(),
                end: DateTime::from_timestamp(1, 0).unwrap(),
                page: 0,
                limit: 10,
            })
            .await
            .unwrap();
        assert_eq!(page.total_count, 1);
    }
}

use crate::application::ledger::LedgerQuery;
use crate::application::service::{BankService, TransferRequest};
use crate::domain::account::{AccountId, Amount};
use crate::domain::advance::Advance;
use crate::domain::transaction::{Direction, Transaction};
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const DEFAULT_PAGE_LIMIT: usize = 100;

/// Body of `POST /transaction`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransactionRequest {
    pub src_account_id: AccountId,
    pub dst_account_id: AccountId,
    pub amount: Amount,
    pub direction: Direction,
}

/// Query string of `GET /transactions`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransactionsQuery {
    pub start_timestamp: DateTime<Utc>,
    pub end_timestamp: DateTime<Utc>,
    #[serde(default)]
    pub page: usize,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    DEFAULT_PAGE_LIMIT
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionsPage {
    pub items: Vec<Transaction>,
    pub page: usize,
    pub limit: usize,
    pub total_items: usize,
    pub number_of_pages: usize,
}

/// Body of `POST /advance`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdvanceRequest {
    pub dst_account_id: AccountId,
    pub amount: Amount,
}

/// Transport-agnostic handlers. An HTTP layer only has to decode the request,
/// call the matching method and encode the result; an `Err` here is always a
/// server fault, never a rejected transfer.
#[derive(Clone)]
pub struct Api {
    service: Arc<BankService>,
}

impl Api {
    pub fn new(service: Arc<BankService>) -> Self {
        Self { service }
    }

    /// `POST /transaction`: the returned record's `status` carries the outcome.
    pub async fn post_transaction(&self, request: TransactionRequest) -> Result<Transaction> {
        self.service
            .submit_transfer(TransferRequest {
                src_account_id: request.src_account_id,
                dst_account_id: request.dst_account_id,
                amount: request.amount,
                direction: request.direction,
            })
            .await
    }

    /// `GET /transactions`
    pub async fn get_transactions(&self, query: TransactionsQuery) -> Result<TransactionsPage> {
        let page = self
            .service
            .transactions(LedgerQuery {
                start: query.start_timestamp,
                end: query.end_timestamp,
                page: query.page,
                limit: query.limit,
            })
            .await?;

        Ok(TransactionsPage {
            number_of_pages: page.number_of_pages(query.limit),
            total_items: page.total_count,
            items: page.items,
            page: query.page,
            limit: query.limit,
        })
    }

    /// `POST /advance`: returns the advance, `active` when funded and
    /// `pending_transaction` when the funding transfer failed.
    pub async fn post_advance(&self, request: AdvanceRequest) -> Result<Advance> {
        let receipt = self
            .service
            .request_advance(request.dst_account_id, request.amount)
            .await?;
        Ok(receipt.advance)
    }
}

//! Application layer containing the core business logic orchestration.
//!
//! `TransferEngine` and `TransactionLedger` are combined by `BankService` into
//! the request-level operations; `DuePaymentProcessor` and `PaymentScheduler`
//! run the time-driven installment collection.

pub mod advances;
pub mod ledger;
pub mod processor;
pub mod scheduler;
pub mod service;
pub mod transfer;

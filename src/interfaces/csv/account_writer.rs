use crate::domain::account::{Account, AccountId};
use crate::error::Result;
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct AccountRow<'a> {
    id: AccountId,
    owner_name: &'a str,
    balance: rust_decimal::Decimal,
}

/// Writes final balances as `id,owner_name,balance`, one row per account in
/// the order given.
pub struct AccountWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> AccountWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_accounts(&mut self, accounts: impl IntoIterator<Item = Account>) -> Result<()> {
        for account in accounts {
            self.writer.serialize(AccountRow {
                id: account.id,
                owner_name: &account.owner_name,
                balance: account.balance.0.normalize(),
            })?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

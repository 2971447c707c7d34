//! CSV formats of the command line: account seeds and transfer batches in,
//! balances, ledger records and payment schedules out.

pub mod account_reader;
pub mod account_writer;
pub mod schedule_writer;
pub mod transaction_writer;
pub mod transfer_reader;

use std::io::Read;

fn reader<R: Read>(source: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(source)
}

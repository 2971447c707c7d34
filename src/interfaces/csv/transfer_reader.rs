use crate::error::{LedgerError, Result};
use crate::interfaces::api::TransactionRequest;
use std::io::Read;

/// Reads transfer requests from a CSV source with the columns
/// `src_account_id, dst_account_id, amount, direction`.
///
/// This reader wraps `csv::Reader` and provides an iterator over
/// `Result<TransactionRequest>`. It handles whitespace trimming and flexible
/// record lengths automatically.
pub struct TransferReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> TransferReader<R> {
    /// Creates a new `TransferReader` from any `Read` source (e.g., File, Stdin).
    pub fn new(source: R) -> Self {
        Self {
            reader: super::reader(source),
        }
    }

    /// Returns an iterator that lazily reads and deserializes requests.
    ///
    /// A malformed row yields an `Err` for that row only; the rows after it are
    /// still read.
    pub fn transfers(self) -> impl Iterator<Item = Result<TransactionRequest>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(LedgerError::from))
    }
}

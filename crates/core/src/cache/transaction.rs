//! The transaction wrapping a cache handle's whole lifetime.
//!
//! SQLite commits are expensive; one transaction is opened when the handle
//! is constructed and committed when it is torn down, so normal reads and
//! writes never pay for a commit of their own.

use super::connection::Storage;
use crate::Error;

/// Tracks the enclosing transaction and how many times it was begun.
#[derive(Debug, Default)]
pub struct TransactionEnvelope {
    count: u32,
}

impl TransactionEnvelope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the transaction if none is open. A nested begin only bumps the
    /// counter, since SQLite does not nest transactions.
    pub fn begin(&mut self, storage: &Storage) -> Result<(), Error> {
        if storage.conn()?.is_autocommit() {
            storage.exec("BEGIN TRANSACTION;")?;
        }
        self.count += 1;
        Ok(())
    }

    /// Commit the transaction if one is open and reset the counter.
    pub fn end(&mut self, storage: &Storage) -> Result<(), Error> {
        if !storage.conn()?.is_autocommit() {
            storage.exec("END TRANSACTION;")?;
        }
        self.count = 0;
        Ok(())
    }

    /// Number of `begin` calls since the last `end`.
    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn is_open(&self) -> bool {
        self.count > 0
    }
}

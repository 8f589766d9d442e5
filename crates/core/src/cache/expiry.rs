//! Time source and garbage collection of expired rows.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use rusqlite::named_params;

use super::connection::Storage;
use crate::Error;

/// Source of the current unix time in seconds.
pub trait Clock: Send {
    fn now(&self) -> i64;
}

/// Wall clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

/// A clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock(Arc<AtomicI64>);

impl ManualClock {
    pub fn new(now: i64) -> Self {
        Self(Arc::new(AtomicI64::new(now)))
    }

    pub fn set(&self, now: i64) {
        self.0.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, seconds: i64) {
        self.0.fetch_add(seconds, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }
}

impl Storage {
    /// Delete rows whose expiry has passed at `now`.
    ///
    /// Rows with `expire_at = 0` never expire. Returns the number of rows
    /// removed.
    pub fn purge_expired(&self, now: i64) -> Result<usize, Error> {
        let count = self
            .conn()?
            .execute("DELETE FROM cache WHERE expire_at > 0 AND expire_at <= :now", named_params! { ":now": now })?;
        Ok(count)
    }

    /// Delete every row.
    pub fn delete_all(&self) -> Result<usize, Error> {
        let count = self.conn()?.execute("DELETE FROM cache WHERE id != ''", [])?;
        Ok(count)
    }
}

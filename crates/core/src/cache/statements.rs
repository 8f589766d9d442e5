//! Prepared row operations.
//!
//! Every operation goes through the connection's prepared statement cache:
//! the SQL is parsed once, and when a statement is released back into the
//! cache its bindings are cleared and it is reset for the next call.

use rusqlite::{OptionalExtension, named_params};

use super::connection::Storage;
use crate::Error;

/// Fetch the payload of a row that has not expired yet.
pub const SELECT: &str = "SELECT data FROM cache WHERE id = :id AND (expire_at = 0 OR expire_at > :now)";

/// Row presence, expired or not.
pub const EXISTS: &str = "SELECT 1 FROM cache WHERE id = :id";

pub const INSERT: &str = "INSERT INTO cache (id, expire_at, data) VALUES (:id, :expire_at, :data)";

pub const UPDATE: &str = "UPDATE cache SET expire_at = :expire_at, data = :data WHERE id = :id";

pub const DELETE: &str = "DELETE FROM cache WHERE id = :id";

const ALL: &[&str] = &[SELECT, EXISTS, INSERT, UPDATE, DELETE];

impl Storage {
    /// Parse every row statement once so later calls reuse them.
    pub fn prepare_statements(&self) -> Result<(), Error> {
        let conn = self.conn()?;
        conn.set_prepared_statement_cache_capacity(ALL.len().max(16));
        for sql in ALL {
            conn.prepare_cached(sql)?;
        }
        tracing::debug!(statements = ALL.len(), "prepared cache statements");
        Ok(())
    }

    /// Serialized envelope for `id`, unless missing or expired at `now`.
    pub fn select_data(&self, id: &str, now: i64) -> Result<Option<String>, Error> {
        let mut stmt = self.conn()?.prepare_cached(SELECT)?;
        let data = stmt.query_row(named_params! { ":id": id, ":now": now }, |row| row.get(0)).optional()?;
        Ok(data)
    }

    /// Whether a row exists for `id`, ignoring expiry.
    pub fn row_exists(&self, id: &str) -> Result<bool, Error> {
        let mut stmt = self.conn()?.prepare_cached(EXISTS)?;
        Ok(stmt.exists(named_params! { ":id": id })?)
    }

    pub fn insert_row(&self, id: &str, expire_at: i64, data: &str) -> Result<(), Error> {
        let mut stmt = self.conn()?.prepare_cached(INSERT)?;
        stmt.execute(named_params! { ":id": id, ":expire_at": expire_at, ":data": data })?;
        Ok(())
    }

    pub fn update_row(&self, id: &str, expire_at: i64, data: &str) -> Result<usize, Error> {
        let mut stmt = self.conn()?.prepare_cached(UPDATE)?;
        Ok(stmt.execute(named_params! { ":id": id, ":expire_at": expire_at, ":data": data })?)
    }

    /// Update the row if it exists, insert it otherwise.
    ///
    /// Existence is checked without regard to expiry so an expired row is
    /// overwritten instead of colliding with the primary key.
    pub fn upsert_row(&self, id: &str, expire_at: i64, data: &str) -> Result<(), Error> {
        if self.row_exists(id)? {
            self.update_row(id, expire_at, data)?;
        } else {
            self.insert_row(id, expire_at, data)?;
        }
        Ok(())
    }

    /// Delete the row for `id`. Returns the number of rows removed.
    pub fn delete_row(&self, id: &str) -> Result<usize, Error> {
        let mut stmt = self.conn()?.prepare_cached(DELETE)?;
        Ok(stmt.execute(named_params! { ":id": id })?)
    }

    /// Number of rows, expired or not.
    pub fn row_count(&self) -> Result<u64, Error> {
        let count: i64 = self.conn()?.query_row("SELECT COUNT(*) FROM cache", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

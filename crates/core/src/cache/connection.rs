//! Database connection and file lifecycle.
//!
//! This module handles opening the SQLite file, recovering from a corrupt
//! file by deleting it and its side files, creating the schema, and closing
//! the connection.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use rusqlite::{Connection, ErrorCode};

use crate::Error;

/// Schema of the single cache table.
pub const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS cache (id TEXT primary key unique, expire_at INTEGER, data TEXT)";

/// Storage handle.
///
/// Owns the connection for the lifetime of the cache. Once closed, every
/// operation fails with [`Error::Closed`].
#[derive(Debug)]
pub struct Storage {
    conn: Option<Connection>,
    path: Option<PathBuf>,
}

impl Storage {
    /// Open the database at the specified path.
    ///
    /// Creates the parent directory and the file if they don't exist and
    /// probes the file header. If the file is corrupt or cannot be opened,
    /// it and its `-wal`/`-shm` side files are removed and a fresh empty
    /// store is created before the open error is returned. A file that
    /// is merely locked by another process is left alone.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        match Self::connect(path) {
            Ok(conn) => {
                tracing::debug!(path = %path.display(), "opened cache database");
                Ok(Self { conn: Some(conn), path: Some(path.to_path_buf()) })
            }
            Err(source) if needs_reset(&source) => {
                tracing::warn!(path = %path.display(), error = %source, "cache open failed; resetting database file");
                reset_files(path);
                Err(Error::OpenFailed { path: path.to_path_buf(), source, reset: true })
            }
            Err(source) => {
                tracing::warn!(path = %path.display(), error = %source, "cache open failed");
                Err(Error::OpenFailed { path: path.to_path_buf(), source, reset: false })
            }
        }
    }

    /// Open an in-memory database for testing.
    pub fn open_in_memory() -> Result<Self, Error> {
        let conn = Connection::open_in_memory()?;
        Ok(Self { conn: Some(conn), path: None })
    }

    fn connect(path: &Path) -> Result<Connection, rusqlite::Error> {
        let conn = Connection::open(path)?;
        conn.query_row("SELECT COUNT(*) FROM sqlite_master", [], |row| row.get::<_, i64>(0))?;
        Ok(conn)
    }

    /// Borrow the live connection.
    pub fn conn(&self) -> Result<&Connection, Error> {
        self.conn.as_ref().ok_or(Error::Closed)
    }

    pub fn is_open(&self) -> bool {
        self.conn.is_some()
    }

    /// Run one or more administrative statements.
    pub fn exec(&self, sql: &str) -> Result<(), Error> {
        self.conn()?.execute_batch(sql)?;
        Ok(())
    }

    /// Create the cache table if it is missing.
    pub fn ensure_schema(&self) -> Result<(), Error> {
        self.exec(SCHEMA)
    }

    /// Version string of the linked SQLite library.
    pub fn sqlite_version() -> &'static str {
        rusqlite::version()
    }

    /// Close the connection. Closing twice is a no-op.
    pub fn close(&mut self) -> Result<(), Error> {
        let Some(conn) = self.conn.take() else {
            return Ok(());
        };
        conn.close().map_err(|(_, e)| Error::from(e))?;
        if let Some(path) = &self.path {
            tracing::debug!(path = %path.display(), "closed cache database");
        }
        Ok(())
    }
}

/// Paths of the database file and the side files SQLite keeps next to it.
pub fn side_files(path: &Path) -> [PathBuf; 3] {
    let base = path.as_os_str();
    let with_suffix = |suffix: &str| {
        let mut name = base.to_os_string();
        name.push(suffix);
        PathBuf::from(name)
    };
    [path.to_path_buf(), with_suffix("-wal"), with_suffix("-shm")]
}

fn needs_reset(err: &rusqlite::Error) -> bool {
    matches!(
        err.sqlite_error_code(),
        Some(ErrorCode::DatabaseCorrupt | ErrorCode::NotADatabase | ErrorCode::CannotOpen)
    )
}

/// Remove the database and its side files, then create an empty store.
///
/// Best effort: failures are logged, never raised, since the caller is
/// already propagating the error that triggered the reset.
fn reset_files(path: &Path) {
    for file in side_files(path) {
        match fs::remove_file(&file) {
            Ok(()) => tracing::info!(file = %file.display(), "removed cache file"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(file = %file.display(), error = %e, "failed to remove cache file"),
        }
    }

    match Connection::open(path).and_then(|conn| conn.close().map_err(|(_, e)| e)) {
        Ok(()) => tracing::info!(path = %path.display(), "recreated empty cache database"),
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to recreate cache database"),
    }
}

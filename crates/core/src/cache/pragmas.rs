//! Tuning pragmas applied when the connection opens and before it closes.
//!
//! The default profile depends on the linked SQLite version: write-ahead
//! logging needs 3.7.1 or newer, older libraries get an in-memory journal
//! with synchronous writes disabled.

use super::connection::Storage;

/// First SQLite version (as `sqlite3_libversion_number`) with usable WAL.
pub const WAL_MIN_VERSION: i32 = 3_007_001;

const CONSTRUCT_DEFAULTS: &[&str] = &[
    "PRAGMA main.cache_size = 10000;",
    "PRAGMA case_sensitive_like = false;",
    "PRAGMA main.auto_vacuum = INCREMENTAL;",
    "PRAGMA main.locking_mode = EXCLUSIVE;",
    "PRAGMA main.page_size = 4096;",
    "PRAGMA temp_store = MEMORY;",
];

const CONSTRUCT_WAL: &[&str] = &["PRAGMA main.synchronous = NORMAL;", "PRAGMA main.journal_mode = WAL;"];

const CONSTRUCT_LEGACY: &[&str] = &["PRAGMA main.synchronous = OFF;", "PRAGMA main.journal_mode = MEMORY;"];

const DESTRUCT_DEFAULTS: &[&str] = &["PRAGMA main.incremental_vacuum;"];

const DESTRUCT_LEGACY: &[&str] = &[];

const DESTRUCT_WAL: &[&str] = &[
    "PRAGMA main.wal_checkpoint(TRUNCATE);",
    "PRAGMA main.synchronous = NORMAL;",
    "PRAGMA main.locking_mode = NORMAL;",
];

/// When a profile is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Construct,
    Destruct,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Construct => "construct",
            Phase::Destruct => "destruct",
        }
    }
}

/// Ordered pragma statements for both phases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PragmaProfile {
    construct: Vec<String>,
    destruct: Vec<String>,
}

impl PragmaProfile {
    /// Default profile for a given `sqlite3_libversion_number`.
    pub fn for_version(version: i32) -> Self {
        let wal = version >= WAL_MIN_VERSION;
        let construct = CONSTRUCT_DEFAULTS.iter().chain(if wal { CONSTRUCT_WAL } else { CONSTRUCT_LEGACY });
        let destruct = DESTRUCT_DEFAULTS.iter().chain(if wal { DESTRUCT_WAL } else { DESTRUCT_LEGACY });
        Self {
            construct: construct.map(|s| (*s).to_string()).collect(),
            destruct: destruct.map(|s| (*s).to_string()).collect(),
        }
    }

    /// Default profile for the linked SQLite library.
    pub fn detect() -> Self {
        Self::for_version(rusqlite::version_number())
    }

    /// Detected profile with either phase replaced by configured statements.
    pub fn with_overrides(construct: Option<Vec<String>>, destruct: Option<Vec<String>>) -> Self {
        let detected = Self::detect();
        Self {
            construct: construct.unwrap_or(detected.construct),
            destruct: destruct.unwrap_or(detected.destruct),
        }
    }

    pub fn construct(&self) -> &[String] {
        &self.construct
    }

    pub fn destruct(&self) -> &[String] {
        &self.destruct
    }

    pub fn statements(&self, phase: Phase) -> &[String] {
        match phase {
            Phase::Construct => &self.construct,
            Phase::Destruct => &self.destruct,
        }
    }

    /// Apply every statement of a phase in order.
    ///
    /// Each statement runs on its own; a failure is logged and the rest
    /// still run. Returns the number of statements that failed.
    pub fn apply(&self, storage: &Storage, phase: Phase) -> usize {
        let mut failures = 0;
        for pragma in self.statements(phase) {
            if let Err(e) = storage.exec(pragma) {
                failures += 1;
                tracing::warn!(phase = phase.as_str(), pragma = %pragma, error = %e, "pragma failed");
            }
        }
        tracing::debug!(phase = phase.as_str(), applied = self.statements(phase).len() - failures, failures, "applied pragmas");
        failures
    }
}

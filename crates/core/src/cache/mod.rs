//! SQLite-backed persistent key-value cache.
//!
//! One database file per cache root holds every entry as a JSON envelope
//! keyed by id. The handle keeps the file under an exclusive lock with a
//! single long-lived transaction, so writes are only made durable at
//! teardown or at an explicit checkpoint. It supports:
//!
//! - Recovery from corrupt database files
//! - Version-dependent pragma profiles (WAL on new enough SQLite)
//! - TTLs in minutes with lazy expiry on read and sweeping on open
//! - A startup probe that proves the backend persists writes
//! - An in-process mirror for repeated reads

pub mod connection;
pub mod driver;
pub mod envelope;
pub mod expiry;
pub mod mirror;
pub mod pragmas;
pub mod statements;
pub mod transaction;
pub mod validation;

pub use crate::Error;

pub use connection::Storage;
pub use driver::SqliteCache;
pub use envelope::ValueEnvelope;
pub use expiry::{Clock, ManualClock, SystemClock};
pub use pragmas::{Phase, PragmaProfile};
pub use validation::{MARKER_KEY, ValidationState};

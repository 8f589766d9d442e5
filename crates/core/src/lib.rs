//! Core types and shared functionality for feather.
//!
//! This crate provides:
//! - Persistent cache implementation with SQLite backend
//! - Fallback stores used for the cache root and the validation marker
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod error;
pub mod store;

pub use cache::{Clock, ManualClock, PragmaProfile, SqliteCache, SystemClock, ValidationState, ValueEnvelope};
pub use config::CacheOptions;
pub use error::Error;
pub use store::{FallbackStore, FileStore, MemoryStore};

//! Secondary key-value stores the cache engine leans on.
//!
//! The engine needs a second store for two things only: remembering that
//! the validation marker was confirmed, and supplying a root directory when
//! none is configured. Hosts plug in their own store through
//! [`FallbackStore`]; [`FileStore`] and [`MemoryStore`] cover the common
//! cases.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Error;

pub mod file;
pub mod hash;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

/// Location settings a fallback store exposes to the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreOptions {
    pub root: PathBuf,
    #[serde(default)]
    pub prefix: Option<String>,
}

/// A generic key-value store with TTLs in minutes (0 = never expires).
pub trait FallbackStore: Send {
    /// Value for `key`, `None` when missing or expired.
    fn get(&self, key: &str) -> Result<Option<Value>, Error>;

    fn set(&mut self, key: &str, value: Value, minutes: u32) -> Result<(), Error>;

    /// Remove `key`. Removing a missing key succeeds.
    fn remove(&mut self, key: &str) -> Result<(), Error>;

    fn options(&self) -> &StoreOptions;
}

//! In-memory fallback store.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde_json::Value;

use super::{FallbackStore, StoreOptions};
use crate::Error;
use crate::cache::envelope::ValueEnvelope;
use crate::cache::expiry::{Clock, SystemClock};

/// Keeps entries in a map. The root only feeds path resolution.
pub struct MemoryStore {
    options: StoreOptions,
    entries: HashMap<String, ValueEnvelope>,
    clock: Box<dyn Clock>,
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore").field("options", &self.options).field("entries", &self.entries.len()).finish()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(std::env::temp_dir())
    }
}

impl MemoryStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self::with_clock(root, Box::new(SystemClock))
    }

    pub fn with_clock(root: impl AsRef<Path>, clock: Box<dyn Clock>) -> Self {
        Self { options: StoreOptions { root: PathBuf::from(root.as_ref()), prefix: None }, entries: HashMap::new(), clock }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.options.prefix = Some(prefix.into());
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FallbackStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>, Error> {
        let now = self.clock.now();
        Ok(self.entries.get(key).filter(|envelope| !envelope.is_expired(now)).map(|envelope| envelope.value.clone()))
    }

    fn set(&mut self, key: &str, value: Value, minutes: u32) -> Result<(), Error> {
        let envelope = ValueEnvelope::new(value, minutes, self.clock.now());
        self.entries.insert(key.to_string(), envelope);
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), Error> {
        self.entries.remove(key);
        Ok(())
    }

    fn options(&self) -> &StoreOptions {
        &self.options
    }
}

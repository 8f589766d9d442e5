//! In-process mirror of decoded envelopes.
//!
//! Shadows the database for the lifetime of one handle so repeated reads
//! of the same key skip the row fetch and JSON decode. It is an
//! optimization only; the database stays the source of truth.

use std::collections::HashMap;

use super::envelope::ValueEnvelope;

#[derive(Debug, Default)]
pub struct Mirror {
    entries: HashMap<String, ValueEnvelope>,
}

impl Mirror {
    pub fn new() -> Self {
        Self::default()
    }

    /// Envelope for `key` if present and not expired at `now`.
    ///
    /// An expired entry is evicted and reported as a miss.
    pub fn get(&mut self, key: &str, now: i64) -> Option<&ValueEnvelope> {
        if self.entries.get(key).is_some_and(|envelope| envelope.is_expired(now)) {
            self.entries.remove(key);
            return None;
        }
        self.entries.get(key)
    }

    pub fn insert(&mut self, key: &str, envelope: ValueEnvelope) {
        self.entries.insert(key.to_string(), envelope);
    }

    pub fn invalidate(&mut self, key: &str) {
        self.entries.remove(key);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }
}

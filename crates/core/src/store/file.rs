//! File-per-key fallback store.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde_json::Value;

use super::hash::entry_file_name;
use super::{FallbackStore, StoreOptions};
use crate::Error;
use crate::cache::envelope::ValueEnvelope;
use crate::cache::expiry::{Clock, SystemClock};

/// Stores each entry as a JSON envelope file under `root/prefix`.
pub struct FileStore {
    options: StoreOptions,
    clock: Box<dyn Clock>,
}

impl std::fmt::Debug for FileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileStore").field("options", &self.options).finish_non_exhaustive()
    }
}

impl FileStore {
    pub fn new(root: impl AsRef<Path>, prefix: Option<String>) -> Self {
        Self::with_clock(root, prefix, Box::new(SystemClock))
    }

    pub fn with_clock(root: impl AsRef<Path>, prefix: Option<String>, clock: Box<dyn Clock>) -> Self {
        Self { options: StoreOptions { root: root.as_ref().to_path_buf(), prefix }, clock }
    }

    /// Directory holding the entry files.
    pub fn directory(&self) -> PathBuf {
        match self.options.prefix.as_deref() {
            Some(prefix) if !prefix.is_empty() => self.options.root.join(prefix),
            _ => self.options.root.clone(),
        }
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.directory().join(entry_file_name(key))
    }
}

impl FallbackStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<Value>, Error> {
        let path = self.entry_path(key);
        let data = match fs::read_to_string(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let envelope = match ValueEnvelope::from_json(&data) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "unreadable fallback entry; ignoring");
                return Ok(None);
            }
        };

        if envelope.is_expired(self.clock.now()) {
            return Ok(None);
        }
        Ok(Some(envelope.value))
    }

    fn set(&mut self, key: &str, value: Value, minutes: u32) -> Result<(), Error> {
        let envelope = ValueEnvelope::new(value, minutes, self.clock.now());
        fs::create_dir_all(self.directory())?;
        fs::write(self.entry_path(key), envelope.to_json()?)?;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), Error> {
        match fs::remove_file(self.entry_path(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn options(&self) -> &StoreOptions {
        &self.options
    }
}

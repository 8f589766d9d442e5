//! Startup probe proving the backend persists what it is given.
//!
//! A marker row holding the time it was written is stored and read straight
//! back from the database. The fallback store remembers a confirmed marker
//! so later handles only need to read it. A backend that loses the marker
//! (wrong library build, pragmas that disable durability) fails the probe
//! and the handle is never returned to the host.

use serde_json::Value;

use super::connection::Storage;
use super::driver::SqliteCache;
use crate::Error;

/// Key of the validation marker, in the database and in the fallback store.
pub const MARKER_KEY: &str = "sqlitecache-1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationState {
    Unvalidated,
    Validating,
    Validated,
    Failed,
}

impl SqliteCache {
    /// Run the probe. Bypasses the mirror so the database itself answers.
    pub(crate) fn validate(&mut self) -> Result<(), Error> {
        self.validation = ValidationState::Validating;

        if self.fallback.get(MARKER_KEY)?.is_some() {
            if self.retrieve_stored(MARKER_KEY)?.is_some() {
                self.validation = ValidationState::Validated;
                tracing::debug!("validation marker confirmed");
                return Ok(());
            }
            tracing::info!("validation marker missing from database; probing again");
        }

        let stamp = Value::from(self.clock.now());
        self.mirror.invalidate(MARKER_KEY);

        if let Err(e) = self.write_marker(stamp.clone()) {
            return Err(self.fail_validation(format!("writing the marker failed: {e}")));
        }
        self.mirror.invalidate(MARKER_KEY);

        match self.retrieve_stored(MARKER_KEY) {
            Ok(Some(envelope)) if envelope.value == stamp => {
                self.validation = ValidationState::Validated;
                tracing::info!(marker = MARKER_KEY, "cache backend validated");
                Ok(())
            }
            Ok(Some(_)) => Err(self.fail_validation("the marker read back with a different value".into())),
            Ok(None) => Err(self.fail_validation("the marker was not read back".into())),
            Err(e) => Err(self.fail_validation(format!("reading the marker failed: {e}"))),
        }
    }

    fn write_marker(&mut self, stamp: Value) -> Result<(), Error> {
        self.set_value(MARKER_KEY, stamp.clone(), 0)?;
        self.fallback.set(MARKER_KEY, stamp, 0)
    }

    fn fail_validation(&mut self, reason: String) -> Error {
        self.validation = ValidationState::Failed;
        if let Err(e) = self.fallback.remove(MARKER_KEY) {
            tracing::warn!(error = %e, "failed to forget validation marker");
        }

        let sqlite_version = Storage::sqlite_version().to_string();
        let pragmas = self.pragmas.construct().join(" ");
        tracing::error!(%sqlite_version, %pragmas, %reason, "cache backend failed validation");
        Error::ValidationFailed { sqlite_version, pragmas, reason }
    }
}

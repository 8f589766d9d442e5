//! Option validation rules.
//!
//! This module provides validation logic for `CacheOptions` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::CacheOptions;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },
}

impl CacheOptions {
    /// Validate option values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `root` is set to an empty path
    /// - `store_ignore` is set to an empty string
    /// - a pragma list contains a blank statement
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(root) = &self.root {
            if root.as_os_str().is_empty() {
                return Err(ConfigError::Invalid { field: "root".into(), reason: "must not be empty".into() });
            }
        }

        if let Some(ignore) = &self.store_ignore {
            if ignore.is_empty() {
                return Err(ConfigError::Invalid {
                    field: "store_ignore".into(),
                    reason: "must not be empty; leave unset to mirror every key".into(),
                });
            }
        }

        for (field, list) in [("pragmas_construct", &self.pragmas_construct), ("pragmas_destruct", &self.pragmas_destruct)]
        {
            if let Some(list) = list {
                if list.iter().any(|stmt| stmt.trim().is_empty()) {
                    return Err(ConfigError::Invalid { field: field.into(), reason: "contains a blank statement".into() });
                }
            }
        }

        if self.debug && self.validate {
            tracing::debug!("debug mode flushes on open; validation will be skipped");
        }

        if !self.store && self.store_ignore.is_some() {
            tracing::warn!("store_ignore is set but the mirror is disabled; the filter has no effect");
        }

        Ok(())
    }
}

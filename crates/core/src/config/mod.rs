//! Cache options with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (FEATHER_*)
//! 2. TOML config file (if FEATHER_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::store::StoreOptions;

mod validation;

pub use validation::ConfigError;

/// Base name of the database file, completed by [`DB_VERSION`].
pub const DB_FILENAME: &str = "sqlitecache-";

/// Schema version; part of the file name and of the validation marker key.
pub const DB_VERSION: &str = "1";

/// Extension of the database file.
pub const DB_EXTENSION: &str = "sqlite";

/// Options recognized by the cache engine.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (FEATHER_*)
/// 2. TOML config file (if FEATHER_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheOptions {
    /// Directory holding the database file.
    ///
    /// When unset, the root (and prefix) of the fallback store is used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,

    /// Debug mode: reads always miss and the store is flushed on open.
    #[serde(default)]
    pub debug: bool,

    /// Keep decoded values in an in-process mirror.
    #[serde(default = "default_true")]
    pub store: bool,

    /// Keys containing this substring are never mirrored.
    #[serde(default, alias = "store-ignore", skip_serializing_if = "Option::is_none")]
    pub store_ignore: Option<String>,

    /// Pragmas applied after opening. Defaults to the detected profile.
    #[serde(default, alias = "pragmas-construct", skip_serializing_if = "Option::is_none")]
    pub pragmas_construct: Option<Vec<String>>,

    /// Pragmas applied before closing. Defaults to the detected profile.
    #[serde(default, alias = "pragmas-destruct", skip_serializing_if = "Option::is_none")]
    pub pragmas_destruct: Option<Vec<String>>,

    /// Probe the backend with a marker write on open.
    #[serde(default = "default_true")]
    pub validate: bool,
}

fn default_true() -> bool {
    true
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            root: None,
            debug: false,
            store: true,
            store_ignore: None,
            pragmas_construct: None,
            pragmas_destruct: None,
            validate: true,
        }
    }
}

impl CacheOptions {
    /// Options rooted at a directory, everything else default.
    pub fn rooted(root: impl AsRef<Path>) -> Self {
        Self { root: Some(root.as_ref().to_path_buf()), ..Default::default() }
    }

    /// Load options from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `FEATHER_`
    /// 2. TOML file from `FEATHER_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("FEATHER_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("FEATHER_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let options: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        options.validate()?;

        Ok(options)
    }

    /// Directory the database file lives in.
    ///
    /// Falls back to the fallback store's root, with its prefix appended
    /// when one is set.
    pub fn resolve_root(&self, fallback: &StoreOptions) -> PathBuf {
        if let Some(root) = &self.root {
            return root.clone();
        }
        match fallback.prefix.as_deref() {
            Some(prefix) if !prefix.is_empty() => fallback.root.join(prefix),
            _ => fallback.root.clone(),
        }
    }

    /// Full path of the database file for a resolved root.
    pub fn database_path(root: &Path) -> PathBuf {
        root.join(format!("{DB_FILENAME}{DB_VERSION}.{DB_EXTENSION}"))
    }

    /// Whether a key may be admitted to the in-process mirror.
    pub fn mirrors(&self, key: &str) -> bool {
        if !self.store {
            return false;
        }
        match self.store_ignore.as_deref() {
            Some(ignore) if !ignore.is_empty() => !key.contains(ignore),
            _ => true,
        }
    }
}

//! The stored unit: a JSON payload plus the time it was written and its TTL.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Error;

/// A cached value with its expiry metadata.
///
/// Serialized as `{"created": .., "minutes": .., "value": ..}`. The row's
/// `expire_at` column is derived from the same fields via
/// [`ValueEnvelope::expire_at`], so the two never disagree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueEnvelope {
    /// Unix seconds at write time.
    pub created: i64,
    /// Time to live in minutes; 0 never expires.
    pub minutes: u32,
    pub value: Value,
}

impl ValueEnvelope {
    pub fn new(value: Value, minutes: u32, created: i64) -> Self {
        Self { created, minutes, value }
    }

    /// Absolute expiry in unix seconds, `None` when the value never expires.
    pub fn expires(&self) -> Option<i64> {
        if self.minutes == 0 {
            return None;
        }
        Some(self.created + i64::from(self.minutes) * 60)
    }

    /// Value for the `expire_at` column (0 = never).
    pub fn expire_at(&self) -> i64 {
        self.expires().unwrap_or(0)
    }

    /// An envelope expires at the exact second of its expiry, matching the
    /// garbage collector's `expire_at <= now` boundary.
    pub fn is_expired(&self, now: i64) -> bool {
        self.expires().is_some_and(|expires| expires <= now)
    }

    pub fn to_json(&self) -> Result<String, Error> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(data: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(data)?)
    }
}

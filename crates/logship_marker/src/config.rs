//! Marker configuration.

use crate::error::{MarkerError, MarkerResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What to do when the marker file exists but cannot be decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorruptionPolicy {
    /// Refuse to open the store.
    #[default]
    Fail,
    /// Log the problem and start with no checkpoint.
    ///
    /// Only safe when the downstream store tolerates re-delivery of
    /// everything still present in the WAL.
    Reset,
}

/// Configuration for a marker store and handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkerConfig {
    /// Name of the shipping client, used to label logs and stats.
    pub client_id: String,

    /// How long a segment may go without progress before it is
    /// force-resolved.
    #[serde(with = "duration_ms", rename = "max_segment_age_ms")]
    pub max_segment_age: Duration,

    /// How often the background task re-runs advancement.
    #[serde(with = "duration_ms", rename = "tick_interval_ms")]
    pub tick_interval: Duration,

    /// Behaviour on an unreadable marker file.
    pub corruption_policy: CorruptionPolicy,

    /// Whether to fsync the marker directory after each rename.
    pub sync_directory: bool,
}

impl Default for MarkerConfig {
    fn default() -> Self {
        Self {
            client_id: "default".to_string(),
            max_segment_age: Duration::from_secs(60 * 60),
            tick_interval: Duration::from_secs(1),
            corruption_policy: CorruptionPolicy::Fail,
            sync_directory: true,
        }
    }
}

impl MarkerConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the client identifier.
    #[must_use]
    pub fn client_id(mut self, id: impl Into<String>) -> Self {
        self.client_id = id.into();
        self
    }

    /// Sets the maximum segment age (TTL).
    #[must_use]
    pub const fn max_segment_age(mut self, ttl: Duration) -> Self {
        self.max_segment_age = ttl;
        self
    }

    /// Sets the background tick interval.
    #[must_use]
    pub const fn tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Sets the corruption policy.
    #[must_use]
    pub const fn corruption_policy(mut self, policy: CorruptionPolicy) -> Self {
        self.corruption_policy = policy;
        self
    }

    /// Sets whether to fsync the marker directory.
    #[must_use]
    pub const fn sync_directory(mut self, value: bool) -> Self {
        self.sync_directory = value;
        self
    }

    /// Checks that all values are usable.
    ///
    /// # Errors
    ///
    /// Returns [`MarkerError::InvalidConfig`] for a zero tick interval or a
    /// zero segment age.
    pub fn validate(&self) -> MarkerResult<()> {
        if self.tick_interval.is_zero() {
            return Err(MarkerError::invalid_config("tick_interval must be non-zero"));
        }
        if self.max_segment_age.is_zero() {
            return Err(MarkerError::invalid_config(
                "max_segment_age must be non-zero",
            ));
        }
        Ok(())
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let ms = u64::try_from(value.as_millis()).unwrap_or(u64::MAX);
        serializer.serialize_u64(ms)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

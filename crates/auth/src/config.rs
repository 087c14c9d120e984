//! Session manager configuration.
//!
//! Defaults match the production portal. Every knob can be overridden from
//! the environment via [`SessionConfig::from_env`].

use std::time::Duration;

use anyhow::{Context, ensure};
use serde::{Deserialize, Serialize};

/// Tunables for the session lifecycle manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Hard deadline for the startup sequence (scan, session fetch, profile).
    #[serde(with = "duration_ms", rename = "init_timeout_ms")]
    pub init_timeout: Duration,

    /// Two renewals closer together than this count towards a storm.
    #[serde(with = "duration_ms", rename = "refresh_window_ms")]
    pub refresh_window: Duration,

    /// The breaker trips once the burst counter exceeds this value.
    pub refresh_trip_threshold: u32,

    /// A persisted entry whose expiry is further in the past than this is
    /// treated as corrupt.
    #[serde(with = "duration_secs", rename = "stale_entry_grace_secs")]
    pub stale_entry_grace: Duration,

    /// Deadline for a single profile fetch.
    #[serde(with = "duration_ms", rename = "profile_fetch_timeout_ms")]
    pub profile_fetch_timeout: Duration,

    /// Credential-store keys starting with this prefix belong to the
    /// identity provider and are scanned at startup.
    pub storage_key_prefix: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            init_timeout: Duration::from_secs(10),
            refresh_window: Duration::from_secs(5),
            refresh_trip_threshold: 3,
            stale_entry_grace: Duration::from_secs(60 * 60),
            profile_fetch_timeout: Duration::from_secs(10),
            storage_key_prefix: "sb-".to_string(),
        }
    }
}

pub const ENV_INIT_TIMEOUT_MS: &str = "LECTERN_SESSION_INIT_TIMEOUT_MS";
pub const ENV_REFRESH_WINDOW_MS: &str = "LECTERN_REFRESH_WINDOW_MS";
pub const ENV_REFRESH_TRIP_THRESHOLD: &str = "LECTERN_REFRESH_TRIP_THRESHOLD";
pub const ENV_STALE_ENTRY_GRACE_SECS: &str = "LECTERN_STALE_ENTRY_GRACE_SECS";
pub const ENV_PROFILE_FETCH_TIMEOUT_MS: &str = "LECTERN_PROFILE_FETCH_TIMEOUT_MS";
pub const ENV_STORAGE_KEY_PREFIX: &str = "LECTERN_STORAGE_KEY_PREFIX";

impl SessionConfig {
    /// Defaults overridden by `LECTERN_*` environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each variable name.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let mut config = Self::default();

        if let Some(ms) = parse_var::<u64>(&lookup, ENV_INIT_TIMEOUT_MS)? {
            config.init_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var::<u64>(&lookup, ENV_REFRESH_WINDOW_MS)? {
            config.refresh_window = Duration::from_millis(ms);
        }
        if let Some(n) = parse_var::<u32>(&lookup, ENV_REFRESH_TRIP_THRESHOLD)? {
            config.refresh_trip_threshold = n;
        }
        if let Some(secs) = parse_var::<u64>(&lookup, ENV_STALE_ENTRY_GRACE_SECS)? {
            config.stale_entry_grace = Duration::from_secs(secs);
        }
        if let Some(ms) = parse_var::<u64>(&lookup, ENV_PROFILE_FETCH_TIMEOUT_MS)? {
            config.profile_fetch_timeout = Duration::from_millis(ms);
        }
        if let Some(prefix) = lookup(ENV_STORAGE_KEY_PREFIX) {
            config.storage_key_prefix = prefix;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject values that would disable a guard outright.
    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(!self.init_timeout.is_zero(), "init_timeout must be non-zero");
        ensure!(!self.refresh_window.is_zero(), "refresh_window must be non-zero");
        ensure!(
            !self.profile_fetch_timeout.is_zero(),
            "profile_fetch_timeout must be non-zero"
        );
        ensure!(
            !self.storage_key_prefix.is_empty(),
            "storage_key_prefix must not be empty"
        );
        Ok(())
    }

    /// Stale-entry grace as a chrono duration (for wall-clock comparisons).
    pub fn stale_entry_grace_chrono(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.stale_entry_grace).unwrap_or(chrono::Duration::MAX)
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> anyhow::Result<Option<T>>
where
    T: core::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .with_context(|| format!("{name} has invalid value {raw:?}")),
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn defaults_without_overrides() {
        let config = SessionConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config, SessionConfig::default());
        assert_eq!(config.init_timeout, Duration::from_secs(10));
        assert_eq!(config.refresh_window, Duration::from_secs(5));
        assert_eq!(config.refresh_trip_threshold, 3);
        assert_eq!(config.stale_entry_grace, Duration::from_secs(3600));
    }

    #[test]
    fn env_overrides_apply() {
        let config = SessionConfig::from_lookup(lookup_from(&[
            (ENV_INIT_TIMEOUT_MS, "2500"),
            (ENV_REFRESH_TRIP_THRESHOLD, " 5 "),
            (ENV_STORAGE_KEY_PREFIX, "lectern-auth-"),
        ]))
        .unwrap();

        assert_eq!(config.init_timeout, Duration::from_millis(2500));
        assert_eq!(config.refresh_trip_threshold, 5);
        assert_eq!(config.storage_key_prefix, "lectern-auth-");
        assert_eq!(config.refresh_window, Duration::from_secs(5));
    }

    #[test]
    fn malformed_value_names_the_variable() {
        let err = SessionConfig::from_lookup(lookup_from(&[(ENV_REFRESH_WINDOW_MS, "soon")]))
            .unwrap_err();
        assert!(err.to_string().contains(ENV_REFRESH_WINDOW_MS));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let err = SessionConfig::from_lookup(lookup_from(&[(ENV_INIT_TIMEOUT_MS, "0")]))
            .unwrap_err();
        assert!(err.to_string().contains("init_timeout"));
    }

    #[test]
    fn deserializes_partial_document() {
        let config: SessionConfig = serde_json::from_value(serde_json::json!({
            "refresh_window_ms": 1000,
            "stale_entry_grace_secs": 60,
        }))
        .unwrap();

        assert_eq!(config.refresh_window, Duration::from_secs(1));
        assert_eq!(config.stale_entry_grace, Duration::from_secs(60));
        assert_eq!(config.init_timeout, Duration::from_secs(10));
    }
}

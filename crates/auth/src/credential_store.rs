//! Persisted credential store contract and startup corruption scan.
//!
//! The store is a flat key/value map shared with the identity-provider client,
//! which writes serialized token bundles under its own key namespace. Nothing
//! here assumes atomicity across keys; individual entries may be truncated,
//! hand-edited, or left over from a long-dead session.

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;

use crate::error::StoreError;

/// Key/value storage holding serialized session bundles.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn list_keys(&self) -> Result<Vec<String>, StoreError>;

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn set(&self, key: &str, value: String) -> Result<(), StoreError>;

    /// Remove every entry, including ones outside the provider namespace.
    async fn remove_all(&self) -> Result<(), StoreError>;
}

/// In-memory credential store.
///
/// Intended for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryCredentialStore {
    entries: RwLock<BTreeMap<String, String>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a store with the given entries.
    pub fn with_entries<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            entries: RwLock::new(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn list_keys(&self) -> Result<Vec<String>, StoreError> {
        let entries = self.entries.read().map_err(|_| StoreError::Poisoned)?;
        Ok(entries.keys().cloned().collect())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let entries = self.entries.read().map_err(|_| StoreError::Poisoned)?;
        Ok(entries.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
        let mut entries = self.entries.write().map_err(|_| StoreError::Poisoned)?;
        entries.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove_all(&self) -> Result<(), StoreError> {
        let mut entries = self.entries.write().map_err(|_| StoreError::Poisoned)?;
        entries.clear();
        Ok(())
    }
}

/// Why a persisted entry was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorruptionReason {
    /// The store itself failed while listing or reading.
    Unreadable(StoreError),
    /// The value is not valid JSON, or its `expires_at` is not a timestamp.
    Unparsable(String),
    /// `expires_at` lies further in the past than the grace period allows.
    Stale { expired_at: DateTime<Utc> },
}

impl core::fmt::Display for CorruptionReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            CorruptionReason::Unreadable(e) => write!(f, "unreadable: {e}"),
            CorruptionReason::Unparsable(msg) => write!(f, "unparsable: {msg}"),
            CorruptionReason::Stale { expired_at } => {
                write!(f, "stale: expired at {}", expired_at.to_rfc3339())
            }
        }
    }
}

/// Result of scanning the provider namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    /// Every provider entry parsed and none is stale.
    Clean { inspected: usize },
    /// The first offending entry. `key` is `None` when listing failed.
    Corrupt {
        key: Option<String>,
        reason: CorruptionReason,
    },
}

impl ScanOutcome {
    pub fn is_clean(&self) -> bool {
        matches!(self, ScanOutcome::Clean { .. })
    }
}

/// Scan every provider-owned entry for corruption.
///
/// An entry is corrupt if it does not parse as JSON, if its `expires_at`
/// is present but not a unix timestamp, or if `expires_at` is more than
/// `grace` before `now`. The scan stops at the first corrupt entry; the
/// caller decides what to wipe.
pub async fn scan_credentials(
    store: &dyn CredentialStore,
    key_prefix: &str,
    grace: Duration,
    now: DateTime<Utc>,
) -> ScanOutcome {
    let keys = match store.list_keys().await {
        Ok(keys) => keys,
        Err(e) => {
            return ScanOutcome::Corrupt {
                key: None,
                reason: CorruptionReason::Unreadable(e),
            };
        }
    };

    let mut inspected = 0;
    for key in keys.into_iter().filter(|k| k.starts_with(key_prefix)) {
        let raw = match store.get(&key).await {
            Ok(Some(raw)) => raw,
            // Removed between list and get.
            Ok(None) => continue,
            Err(e) => {
                return ScanOutcome::Corrupt {
                    key: Some(key),
                    reason: CorruptionReason::Unreadable(e),
                };
            }
        };

        inspected += 1;
        if let Err(reason) = check_entry(&raw, grace, now) {
            return ScanOutcome::Corrupt {
                key: Some(key),
                reason,
            };
        }
    }

    ScanOutcome::Clean { inspected }
}

fn check_entry(raw: &str, grace: Duration, now: DateTime<Utc>) -> Result<(), CorruptionReason> {
    let value: Value =
        serde_json::from_str(raw).map_err(|e| CorruptionReason::Unparsable(e.to_string()))?;

    let Some(expires_at) = value.get("expires_at").filter(|v| !v.is_null()) else {
        return Ok(());
    };

    let expired_at = parse_expiry(expires_at).ok_or_else(|| {
        CorruptionReason::Unparsable(format!("expires_at is not a timestamp: {expires_at}"))
    })?;

    let stale = now
        .checked_sub_signed(grace)
        .is_some_and(|cutoff| expired_at < cutoff);
    if stale {
        return Err(CorruptionReason::Stale { expired_at });
    }
    Ok(())
}

/// Unix seconds (integer or float) or an RFC 3339 string.
fn parse_expiry(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0)),
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|at| at.with_timezone(&Utc)),
        _ => None,
    }
}

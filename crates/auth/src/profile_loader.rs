//! Profile loading, single-flight per session identity.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use lectern_core::{Profile, UserId};

use crate::error::ProfileStoreError;
use crate::single_flight::SingleFlight;

/// Remote store holding one profile row per identity.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// `Ok(None)` when the identity has no profile row yet.
    async fn fetch_profile(&self, id: &UserId) -> Result<Option<Profile>, ProfileStoreError>;
}

/// Fetches profiles without ever overlapping two fetches for one identity.
///
/// Failures never reach the caller: errors, timeouts, and overlapping calls
/// all yield `None`.
pub struct ProfileLoader {
    store: Arc<dyn ProfileStore>,
    flights: SingleFlight<UserId>,
    timeout: Duration,
}

impl ProfileLoader {
    pub fn new(store: Arc<dyn ProfileStore>, timeout: Duration) -> Self {
        Self {
            store,
            flights: SingleFlight::new(),
            timeout,
        }
    }

    pub async fn fetch_profile(&self, id: UserId) -> Option<Profile> {
        let Some(_guard) = self.flights.try_begin(id) else {
            tracing::debug!(user_id = %id, "profile fetch already in flight; skipping");
            return None;
        };

        match tokio::time::timeout(self.timeout, self.store.fetch_profile(&id)).await {
            Ok(Ok(Some(profile))) => Some(profile),
            Ok(Ok(None)) => {
                tracing::info!(user_id = %id, "no profile record for user");
                None
            }
            Ok(Err(e)) => {
                tracing::warn!(user_id = %id, error = %e, "profile fetch failed");
                None
            }
            Err(_) => {
                tracing::warn!(
                    user_id = %id,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "profile fetch timed out"
                );
                None
            }
        }
    }

    pub fn is_fetching(&self, id: &UserId) -> bool {
        self.flights.is_in_flight(id)
    }
}

impl core::fmt::Debug for ProfileLoader {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ProfileLoader")
            .field("in_flight", &self.flights.len())
            .field("timeout", &self.timeout)
            .finish()
    }
}

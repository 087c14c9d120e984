//! Startup sequence: produce the first authoritative session state.
//!
//! ```text
//! scan store --corrupt--> wipe, signed out
//!     |
//!   clean
//!     v
//! get_session --error--> (wipe if credential invalid), signed out
//!     |
//!  Some/None
//!     v
//! load profile --> signed in / signed out
//! ```
//!
//! The whole sequence runs under one deadline. On expiry the in-progress
//! future is dropped, so a late provider result can never be applied.

use std::sync::Arc;

use chrono::Utc;

use crate::config::SessionConfig;
use crate::credential_store::{CredentialStore, ScanOutcome, scan_credentials};
use crate::profile_loader::ProfileLoader;
use crate::provider::IdentityProvider;
use crate::state::{AuthState, SessionCell};

/// How the startup sequence ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitOutcome {
    /// Provider returned an active session.
    Restored { profile_loaded: bool },
    /// Provider reports nobody signed in.
    NoSession,
    /// A corrupt persisted entry was found; the store was wiped.
    StoreWiped,
    /// Provider rejected the persisted refresh credential; the store was wiped.
    CredentialRejected,
    /// Transient provider failure; the store was kept.
    ProviderUnavailable,
    /// Deadline hit before the sequence finished.
    TimedOut,
    /// An explicit sign-out arrived first; the result was replaced by
    /// signed out.
    SignedOutDuringStartup,
    /// The result was computed but not committed (manager torn down).
    Discarded,
}

pub(crate) struct Initializer {
    pub(crate) config: Arc<SessionConfig>,
    pub(crate) store: Arc<dyn CredentialStore>,
    pub(crate) provider: Arc<dyn IdentityProvider>,
    pub(crate) profiles: Arc<ProfileLoader>,
    pub(crate) cell: Arc<SessionCell>,
}

impl Initializer {
    /// Run the startup sequence under the configured deadline and commit the
    /// result. Sets the initialization flag on every path.
    pub(crate) async fn run(self) -> InitOutcome {
        let deadline = self.config.init_timeout;

        let (state, outcome) = match tokio::time::timeout(deadline, self.establish()).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    timeout_ms = deadline.as_millis() as u64,
                    "session initialization timed out; continuing signed out"
                );
                (AuthState::SignedOut, InitOutcome::TimedOut)
            }
        };

        match self.cell.complete_initialization(state, outcome.clone()) {
            Some(committed) => {
                tracing::info!(outcome = ?committed, "session initialized");
                committed
            }
            None => {
                tracing::debug!(outcome = ?outcome, "session initialization result discarded");
                InitOutcome::Discarded
            }
        }
    }

    async fn establish(&self) -> (AuthState, InitOutcome) {
        let scan = scan_credentials(
            self.store.as_ref(),
            &self.config.storage_key_prefix,
            self.config.stale_entry_grace_chrono(),
            Utc::now(),
        )
        .await;

        if let ScanOutcome::Corrupt { key, reason } = scan {
            tracing::warn!(
                key = key.as_deref().unwrap_or("<list>"),
                reason = %reason,
                "corrupt persisted credentials; wiping store"
            );
            self.wipe_store().await;
            return (AuthState::SignedOut, InitOutcome::StoreWiped);
        }

        let session = match self.provider.get_session().await {
            Ok(Some(session)) => session,
            Ok(None) => {
                tracing::debug!("no active session");
                return (AuthState::SignedOut, InitOutcome::NoSession);
            }
            Err(e) if e.is_invalid_credential() => {
                tracing::warn!(error = %e, "persisted credential rejected; wiping store");
                self.wipe_store().await;
                return (AuthState::SignedOut, InitOutcome::CredentialRejected);
            }
            Err(e) => {
                tracing::warn!(error = %e, "session fetch failed; continuing signed out");
                return (AuthState::SignedOut, InitOutcome::ProviderUnavailable);
            }
        };

        let profile = self.profiles.fetch_profile(session.user_id()).await;
        let outcome = InitOutcome::Restored {
            profile_loaded: profile.is_some(),
        };
        (AuthState::signed_in(session, profile), outcome)
    }

    async fn wipe_store(&self) {
        if let Err(e) = self.store.remove_all().await {
            tracing::error!(error = %e, "failed to wipe credential store");
        }
    }
}

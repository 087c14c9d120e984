//! External collaborators: identity-provider client and restart hook.

use async_trait::async_trait;

use lectern_core::Session;
use lectern_events::{AuthEvent, Subscription};

use crate::error::ProviderError;

/// Email/password pair handed to the identity provider.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub email: String,
    password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl core::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Client for the hosted identity provider.
///
/// The provider owns token renewal; it reports what happened through the
/// notification stream returned by [`IdentityProvider::subscribe`].
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Current session, restoring from persisted credentials if needed.
    /// `Ok(None)` means nobody is signed in.
    async fn get_session(&self) -> Result<Option<Session>, ProviderError>;

    /// Subscribe to lifecycle notifications.
    fn subscribe(&self) -> Subscription<AuthEvent>;

    /// Password sign-in. On success the provider emits `SIGNED_IN`.
    async fn sign_in(&self, credentials: &Credentials) -> Result<(), ProviderError>;

    async fn sign_out(&self) -> Result<(), ProviderError>;
}

/// Forces a full restart of the execution environment.
///
/// Used as the last-resort recovery when in-memory state can no longer be
/// trusted. Injected so tests can observe it instead of restarting.
pub trait Restarter: Send + Sync {
    fn force_restart(&self);
}

impl<F> Restarter for F
where
    F: Fn() + Send + Sync,
{
    fn force_restart(&self) {
        self()
    }
}

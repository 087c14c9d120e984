//! Session lifecycle manager: wiring, UI-facing surface, teardown.
//!
//! Construction subscribes to the provider first, then spawns the consumer
//! and the initializer. Notifications that arrive before the initializer
//! commits are drained and ignored by the consumer's gate.

use std::sync::Arc;

use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

use crate::breaker::RefreshBreaker;
use crate::config::SessionConfig;
use crate::consumer::{self, NotificationConsumer};
use crate::credential_store::CredentialStore;
use crate::error::SessionError;
use crate::initializer::{InitOutcome, Initializer};
use crate::profile_loader::{ProfileLoader, ProfileStore};
use crate::provider::{Credentials, IdentityProvider, Restarter};
use crate::state::{SessionCell, SessionSnapshot};

/// External collaborators the manager is built from.
#[derive(Clone)]
pub struct SessionDeps {
    pub provider: Arc<dyn IdentityProvider>,
    pub profiles: Arc<dyn ProfileStore>,
    pub store: Arc<dyn CredentialStore>,
    pub restarter: Arc<dyn Restarter>,
}

/// Owns the session state for one portal instance.
///
/// Every flag, counter and in-flight table lives on this value, so
/// independent managers (e.g. in tests) never interfere.
pub struct SessionManager {
    cell: Arc<SessionCell>,
    provider: Arc<dyn IdentityProvider>,
    init_task: Option<JoinHandle<InitOutcome>>,
    consumer_task: Option<JoinHandle<()>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl SessionManager {
    /// Start the manager. Must be called from within a Tokio runtime.
    pub fn start(deps: SessionDeps, config: SessionConfig) -> Self {
        let config = Arc::new(config);
        let cell = Arc::new(SessionCell::new());
        let profiles = Arc::new(ProfileLoader::new(
            deps.profiles.clone(),
            config.profile_fetch_timeout,
        ));

        let subscription = deps.provider.subscribe();
        let consumer = NotificationConsumer::new(
            cell.clone(),
            profiles.clone(),
            deps.store.clone(),
            deps.restarter.clone(),
            RefreshBreaker::new(config.refresh_window, config.refresh_trip_threshold),
        );
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let consumer_task = tokio::spawn(consumer::run(subscription, consumer, shutdown_rx));

        let initializer = Initializer {
            config,
            store: deps.store,
            provider: deps.provider.clone(),
            profiles,
            cell: cell.clone(),
        };
        let init_task = tokio::spawn(initializer.run());

        tracing::debug!("session manager started");

        Self {
            cell,
            provider: deps.provider,
            init_task: Some(init_task),
            consumer_task: Some(consumer_task),
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Current `{ user, session, profile, loading }`.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.cell.snapshot()
    }

    /// Receiver that observes every published snapshot.
    pub fn watch(&self) -> watch::Receiver<SessionSnapshot> {
        self.cell.subscribe()
    }

    /// How startup ended; `None` while it is still running or if the
    /// manager was torn down first.
    pub fn init_outcome(&self) -> Option<InitOutcome> {
        self.cell.init_outcome()
    }

    /// Resolve once the startup sequence has completed.
    ///
    /// If the manager is shut down before that, returns the last snapshot
    /// (still loading).
    pub async fn wait_until_ready(&self) -> SessionSnapshot {
        let mut rx = self.cell.subscribe();
        match rx.wait_for(|snapshot| !snapshot.loading()).await {
            Ok(snapshot) => snapshot.clone(),
            Err(_) => self.cell.snapshot(),
        }
    }

    /// Password sign-in.
    ///
    /// State is not touched here: on success the provider emits `SIGNED_IN`
    /// and the consumer applies it.
    pub async fn sign_in(
        &self,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<(), SessionError> {
        self.ensure_open()?;
        let credentials = Credentials::new(email, password);

        self.provider.sign_in(&credentials).await.map_err(|e| {
            tracing::info!(email = %credentials.email, error = %e, "sign-in rejected");
            SessionError::from(e)
        })
    }

    /// Sign out with the provider, then clear local state regardless of the
    /// provider's answer. During startup, the startup result is replaced by
    /// signed out once it lands.
    pub async fn sign_out(&self) {
        if self.ensure_open().is_err() {
            return;
        }
        if let Err(e) = self.provider.sign_out().await {
            tracing::warn!(error = %e, "provider sign-out failed; clearing local session anyway");
        }
        self.cell.clear();
    }

    fn ensure_open(&self) -> Result<(), SessionError> {
        if self.cell.is_disposed() {
            return Err(SessionError::ShutDown);
        }
        if self.cell.is_halted() {
            return Err(SessionError::Halted);
        }
        Ok(())
    }

    /// Tear down: reject further mutation, cancel the initializer (and with
    /// it the startup deadline), stop the consumer and unsubscribe.
    pub async fn shutdown(mut self) {
        self.cell.dispose();

        if let Some(init) = self.init_task.take() {
            init.abort();
            let _ = init.await;
        }
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(consumer) = self.consumer_task.take() {
            if let Err(e) = consumer.await {
                tracing::warn!(error = %e, "notification consumer ended abnormally");
            }
        }

        tracing::debug!("session manager shut down");
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.cell.dispose();
        if let Some(init) = self.init_task.take() {
            init.abort();
        }
        // Dropping the sender stops the consumer loop.
        self.shutdown_tx.take();
    }
}

impl core::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SessionManager")
            .field("snapshot", &self.cell.snapshot())
            .field("initialized", &self.cell.is_initialized())
            .finish_non_exhaustive()
    }
}

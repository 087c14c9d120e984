//! Fake collaborators for black-box session manager tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Notify, watch};

use lectern_auth::{
    Credentials, IdentityProvider, InMemoryCredentialStore, ProfileStore, ProfileStoreError,
    ProviderError, Restarter, SessionConfig, SessionDeps, SessionManager, SessionSnapshot,
};
use lectern_core::{Profile, Role, Session, User, UserId};
use lectern_events::{AuthEvent, InMemoryNotificationBus, NotificationBus, Subscription};

pub const PASSWORD: &str = "correct horse battery staple";

pub fn session_for(user: &User, token: &str) -> Session {
    Session {
        access_token: token.to_string(),
        refresh_token: format!("{token}-refresh"),
        expires_at: Utc::now() + chrono::Duration::hours(1),
        user: user.clone(),
    }
}

pub fn learner() -> User {
    User {
        id: UserId::new(),
        email: "learner@example.com".to_string(),
    }
}

pub fn profile_for(user: &User) -> Profile {
    Profile {
        id: user.id,
        full_name: "Ada Learner".to_string(),
        role: Role::new("student"),
        email: user.email.clone(),
        phone: Some("+44 20 7946 0000".to_string()),
        avatar_url: None,
    }
}

/// Serialized bundle the provider client would persist.
pub fn persisted_bundle(session: &Session) -> String {
    serde_json::to_string(session).unwrap()
}

/// The same bundle with `expires_at` in unix seconds.
pub fn persisted_bundle_unix(session: &Session) -> String {
    serde_json::json!({
        "access_token": session.access_token,
        "refresh_token": session.refresh_token,
        "expires_at": session.expires_at.timestamp(),
        "user": session.user,
    })
    .to_string()
}

/// Identity provider backed by an in-memory notification bus.
pub struct FakeProvider {
    pub bus: InMemoryNotificationBus<AuthEvent>,
    response: Mutex<Result<Option<Session>, ProviderError>>,
    session_calls: AtomicUsize,
    sign_out_calls: AtomicUsize,
    hang: AtomicBool,
    gated: AtomicBool,
    release: Notify,
}

impl FakeProvider {
    pub fn new(response: Result<Option<Session>, ProviderError>) -> Arc<Self> {
        Arc::new(Self {
            bus: InMemoryNotificationBus::new(),
            response: Mutex::new(response),
            session_calls: AtomicUsize::new(0),
            sign_out_calls: AtomicUsize::new(0),
            hang: AtomicBool::new(false),
            gated: AtomicBool::new(false),
            release: Notify::new(),
        })
    }

    pub fn signed_out() -> Arc<Self> {
        Self::new(Ok(None))
    }

    /// `get_session` never resolves.
    pub fn hanging() -> Arc<Self> {
        let provider = Self::signed_out();
        provider.hang.store(true, Ordering::SeqCst);
        provider
    }

    /// `get_session` waits for [`FakeProvider::release`] before answering.
    pub fn gated(response: Result<Option<Session>, ProviderError>) -> Arc<Self> {
        let provider = Self::new(response);
        provider.gated.store(true, Ordering::SeqCst);
        provider
    }

    pub fn release(&self) {
        self.release.notify_one();
    }

    pub fn publish(&self, event: AuthEvent) {
        self.bus.publish(event).unwrap();
    }

    pub fn session_calls(&self) -> usize {
        self.session_calls.load(Ordering::SeqCst)
    }

    pub fn sign_out_calls(&self) -> usize {
        self.sign_out_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityProvider for FakeProvider {
    async fn get_session(&self) -> Result<Option<Session>, ProviderError> {
        self.session_calls.fetch_add(1, Ordering::SeqCst);
        if self.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.gated.load(Ordering::SeqCst) {
            self.release.notified().await;
        }
        self.response.lock().unwrap().clone()
    }

    fn subscribe(&self) -> Subscription<AuthEvent> {
        self.bus.subscribe()
    }

    async fn sign_in(&self, credentials: &Credentials) -> Result<(), ProviderError> {
        if credentials.password() != PASSWORD {
            return Err(ProviderError::InvalidCredentials);
        }
        let user = User {
            id: UserId::new(),
            email: credentials.email.clone(),
        };
        self.publish(AuthEvent::signed_in(session_for(&user, "fresh-sign-in")));
        Ok(())
    }

    async fn sign_out(&self) -> Result<(), ProviderError> {
        self.sign_out_calls.fetch_add(1, Ordering::SeqCst);
        self.publish(AuthEvent::signed_out());
        Ok(())
    }
}

/// Profile store keyed by identity, counting remote calls.
#[derive(Default)]
pub struct FakeProfiles {
    rows: Mutex<HashMap<UserId, Profile>>,
    failure: Mutex<Option<ProfileStoreError>>,
    calls: AtomicUsize,
}

impl FakeProfiles {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with(profiles: impl IntoIterator<Item = Profile>) -> Arc<Self> {
        let store = Self::default();
        store
            .rows
            .lock()
            .unwrap()
            .extend(profiles.into_iter().map(|p| (p.id, p)));
        Arc::new(store)
    }

    pub fn failing(error: ProfileStoreError) -> Arc<Self> {
        let store = Self::default();
        *store.failure.lock().unwrap() = Some(error);
        Arc::new(store)
    }

    pub fn insert(&self, profile: Profile) {
        self.rows.lock().unwrap().insert(profile.id, profile);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProfileStore for FakeProfiles {
    async fn fetch_profile(&self, id: &UserId) -> Result<Option<Profile>, ProfileStoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.failure.lock().unwrap().clone() {
            return Err(err);
        }
        Ok(self.rows.lock().unwrap().get(id).cloned())
    }
}

/// Records restarts instead of performing them.
#[derive(Default)]
pub struct RecordingRestarter {
    calls: AtomicUsize,
    restarted: Notify,
}

impl RecordingRestarter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub async fn wait(&self) {
        tokio::time::timeout(Duration::from_secs(60), self.restarted.notified())
            .await
            .expect("restart was never forced");
    }
}

impl Restarter for RecordingRestarter {
    fn force_restart(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.restarted.notify_one();
    }
}

/// A manager together with handles on every fake behind it.
pub struct Harness {
    pub manager: SessionManager,
    pub provider: Arc<FakeProvider>,
    pub profiles: Arc<FakeProfiles>,
    pub store: Arc<InMemoryCredentialStore>,
    pub restarter: Arc<RecordingRestarter>,
}

impl Harness {
    pub fn start(
        provider: Arc<FakeProvider>,
        profiles: Arc<FakeProfiles>,
        store: InMemoryCredentialStore,
    ) -> Self {
        lectern_observability::init_pretty();

        let store = Arc::new(store);
        let restarter = RecordingRestarter::new();
        let deps = SessionDeps {
            provider: provider.clone(),
            profiles: profiles.clone(),
            store: store.clone(),
            restarter: restarter.clone(),
        };
        let manager = SessionManager::start(deps, SessionConfig::default());

        Self {
            manager,
            provider,
            profiles,
            store,
            restarter,
        }
    }

    /// Start with a persisted bundle for `session`, the provider restoring
    /// it, and a profile row for its user.
    pub fn restored(session: &Session) -> Self {
        let store = InMemoryCredentialStore::with_entries([(
            "sb-portal-auth-token",
            persisted_bundle(session),
        )]);
        Self::start(
            FakeProvider::new(Ok(Some(session.clone()))),
            FakeProfiles::with([profile_for(&session.user)]),
            store,
        )
    }

    pub async fn wait_for(
        &self,
        predicate: impl FnMut(&SessionSnapshot) -> bool,
    ) -> SessionSnapshot {
        wait_for(self.manager.watch(), predicate).await
    }
}

pub async fn wait_for(
    mut rx: watch::Receiver<SessionSnapshot>,
    predicate: impl FnMut(&SessionSnapshot) -> bool,
) -> SessionSnapshot {
    tokio::time::timeout(Duration::from_secs(60), rx.wait_for(predicate))
        .await
        .expect("timed out waiting for session state")
        .expect("session state channel closed")
        .clone()
}

/// Let every runnable task finish its current work.
///
/// Under a paused clock the runtime only advances time once all tasks are
/// idle, so this returns after the consumer has drained what it can.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

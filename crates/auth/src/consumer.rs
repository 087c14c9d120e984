//! Identity-provider notification consumer.
//!
//! One task drains the subscription and hands each notification to
//! [`NotificationConsumer::dispatch`], to completion, before taking the next.
//! Nothing is applied until the initializer has committed.

use std::ops::ControlFlow;
use std::sync::Arc;

use tokio::sync::oneshot;
use tokio::time::Instant;

use lectern_core::Session;
use lectern_events::{AuthEvent, AuthEventKind, Subscription};

use crate::breaker::{BreakerDecision, RefreshBreaker};
use crate::credential_store::CredentialStore;
use crate::profile_loader::ProfileLoader;
use crate::provider::Restarter;
use crate::state::{Applied, AuthState, SessionCell};

/// Applies notifications to the session state.
pub struct NotificationConsumer {
    cell: Arc<SessionCell>,
    profiles: Arc<ProfileLoader>,
    store: Arc<dyn CredentialStore>,
    restarter: Arc<dyn Restarter>,
    breaker: RefreshBreaker,
}

impl NotificationConsumer {
    pub(crate) fn new(
        cell: Arc<SessionCell>,
        profiles: Arc<ProfileLoader>,
        store: Arc<dyn CredentialStore>,
        restarter: Arc<dyn Restarter>,
        breaker: RefreshBreaker,
    ) -> Self {
        Self {
            cell,
            profiles,
            store,
            restarter,
            breaker,
        }
    }

    /// Apply one notification. `Break` means the consumer is finished for
    /// good (breaker tripped or manager closed).
    pub async fn dispatch(&mut self, event: AuthEvent) -> ControlFlow<()> {
        if self.cell.is_halted() || self.cell.is_disposed() {
            return ControlFlow::Break(());
        }
        if !self.cell.is_initialized() {
            tracing::debug!(kind = %event.kind, "notification before initialization; ignored");
            return ControlFlow::Continue(());
        }

        let kind = event.kind;
        let applied = match (kind, event.session) {
            (AuthEventKind::TokenRefreshed, Some(session)) => {
                return self.on_token_refreshed(session).await;
            }
            (AuthEventKind::SignedIn, Some(session)) => {
                let profile = self.profiles.fetch_profile(session.user_id()).await;
                self.cell
                    .apply_notification(|_| Some(AuthState::signed_in(session, profile)))
            }
            (AuthEventKind::SignedOut, _) => {
                self.cell.apply_notification(|_| Some(AuthState::SignedOut))
            }
            (AuthEventKind::UserUpdated, Some(session)) => {
                self.cell.apply_notification(|current| {
                    let profile = current.profile().cloned();
                    Some(AuthState::signed_in(session, profile))
                })
            }
            (
                AuthEventKind::TokenRefreshed | AuthEventKind::SignedIn | AuthEventKind::UserUpdated,
                None,
            ) => {
                tracing::warn!(kind = %kind, "notification without session payload; ignored");
                return ControlFlow::Continue(());
            }
            (other, _) => {
                tracing::debug!(kind = %other, "notification kind has no state effect");
                return ControlFlow::Continue(());
            }
        };

        self.after_apply(kind, applied)
    }

    async fn on_token_refreshed(&mut self, session: Session) -> ControlFlow<()> {
        if self.breaker.record_renewal(Instant::now()) == BreakerDecision::Trip {
            self.trip().await;
            return ControlFlow::Break(());
        }

        let applied = self.cell.apply_notification(|current| match current {
            AuthState::SignedIn { user, profile, .. } => Some(AuthState::SignedIn {
                user: user.clone(),
                session,
                profile: profile.clone(),
            }),
            // A renewal with nobody signed in would leave a session without a user.
            AuthState::SignedOut => None,
        });
        self.after_apply(AuthEventKind::TokenRefreshed, applied)
    }

    async fn trip(&self) {
        if !self.cell.halt() {
            return;
        }
        if let Err(e) = self.store.remove_all().await {
            tracing::error!(error = %e, "failed to wipe credential store after refresh storm");
        }
        tracing::error!("forcing environment restart after refresh storm");
        self.restarter.force_restart();
    }

    fn after_apply(&self, kind: AuthEventKind, applied: Applied) -> ControlFlow<()> {
        match applied {
            Applied::Changed => {
                tracing::info!(kind = %kind, "session state updated");
                ControlFlow::Continue(())
            }
            Applied::Unchanged => {
                tracing::debug!(kind = %kind, "notification left session state unchanged");
                ControlFlow::Continue(())
            }
            Applied::Gated => ControlFlow::Continue(()),
            Applied::Closed => ControlFlow::Break(()),
        }
    }

    pub fn breaker(&self) -> &RefreshBreaker {
        &self.breaker
    }
}

/// Drain `subscription` until shutdown, close, or a terminal dispatch.
pub(crate) async fn run(
    mut subscription: Subscription<AuthEvent>,
    mut consumer: NotificationConsumer,
    mut shutdown: oneshot::Receiver<()>,
) {
    loop {
        let event = tokio::select! {
            biased;
            _ = &mut shutdown => break,
            next = subscription.recv() => match next {
                Some(event) => event,
                None => {
                    tracing::debug!("notification stream closed");
                    break;
                }
            },
        };

        let flow = tokio::select! {
            biased;
            _ = &mut shutdown => break,
            flow = consumer.dispatch(event) => flow,
        };
        if flow.is_break() {
            break;
        }
    }

    subscription.unsubscribe();
    tracing::debug!(
        renewals = consumer.breaker().renewals(),
        tripped = consumer.breaker().is_tripped(),
        "notification consumer stopped"
    );
}

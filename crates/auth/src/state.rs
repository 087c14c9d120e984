//! Session state: the single source of truth exposed to UI collaborators.
//!
//! `user`, `session` and `profile` live inside one [`AuthState`] value, so a
//! half-populated state is unrepresentable. The state, the initialization
//! gate and the halt/dispose flags sit behind one mutex in [`SessionCell`];
//! every gate check and the mutation it guards happen inside a single lock
//! scope with no suspension point in between.

use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Serialize, Serializer};
use tokio::sync::watch;

use lectern_core::{Profile, Session, User};

use crate::initializer::InitOutcome;

/// Authentication state: fully signed in or fully signed out.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AuthState {
    #[default]
    SignedOut,
    SignedIn {
        user: User,
        session: Session,
        /// `None` when the profile fetch failed or no row exists.
        profile: Option<Profile>,
    },
}

impl AuthState {
    /// Signed-in state for `session`, with the user taken from the session.
    pub fn signed_in(session: Session, profile: Option<Profile>) -> Self {
        Self::SignedIn {
            user: session.user.clone(),
            session,
            profile,
        }
    }

    pub fn is_signed_in(&self) -> bool {
        matches!(self, AuthState::SignedIn { .. })
    }

    pub fn user(&self) -> Option<&User> {
        match self {
            AuthState::SignedIn { user, .. } => Some(user),
            AuthState::SignedOut => None,
        }
    }

    pub fn session(&self) -> Option<&Session> {
        match self {
            AuthState::SignedIn { session, .. } => Some(session),
            AuthState::SignedOut => None,
        }
    }

    pub fn profile(&self) -> Option<&Profile> {
        match self {
            AuthState::SignedIn { profile, .. } => profile.as_ref(),
            AuthState::SignedOut => None,
        }
    }
}

/// Read-only view handed to UI collaborators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    state: AuthState,
    loading: bool,
}

impl SessionSnapshot {
    fn initial() -> Self {
        Self {
            state: AuthState::SignedOut,
            loading: true,
        }
    }

    pub fn state(&self) -> &AuthState {
        &self.state
    }

    pub fn user(&self) -> Option<&User> {
        self.state.user()
    }

    pub fn session(&self) -> Option<&Session> {
        self.state.session()
    }

    pub fn profile(&self) -> Option<&Profile> {
        self.state.profile()
    }

    /// True until the startup sequence completes (success, failure or timeout).
    pub fn loading(&self) -> bool {
        self.loading
    }

    pub fn is_signed_in(&self) -> bool {
        self.state.is_signed_in()
    }
}

impl Serialize for SessionSnapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct Wire<'a> {
            user: Option<&'a User>,
            session: Option<&'a Session>,
            profile: Option<&'a Profile>,
            loading: bool,
        }

        Wire {
            user: self.user(),
            session: self.session(),
            profile: self.profile(),
            loading: self.loading,
        }
        .serialize(serializer)
    }
}

/// Outcome of offering a change to the cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// State replaced and published.
    Changed,
    /// Gate open, but the transition left the state as it was.
    Unchanged,
    /// Initialization has not completed; notification ignored.
    Gated,
    /// Manager halted by the breaker or shut down.
    Closed,
}

#[derive(Debug, Default)]
struct Gate {
    initialized: bool,
    halted: bool,
    disposed: bool,
    /// An explicit sign-out arrived before the startup result was committed.
    signed_out_during_init: bool,
    outcome: Option<InitOutcome>,
}

impl Gate {
    fn closed(&self) -> bool {
        self.halted || self.disposed
    }
}

/// Owner of the session state and the flags that guard it.
#[derive(Debug)]
pub(crate) struct SessionCell {
    gate: Mutex<Gate>,
    tx: watch::Sender<SessionSnapshot>,
}

impl SessionCell {
    pub(crate) fn new() -> Self {
        let (tx, _rx) = watch::channel(SessionSnapshot::initial());
        Self {
            gate: Mutex::new(Gate::default()),
            tx,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Gate> {
        self.gate.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn snapshot(&self) -> SessionSnapshot {
        self.tx.borrow().clone()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.tx.subscribe()
    }

    pub(crate) fn is_initialized(&self) -> bool {
        self.lock().initialized
    }

    pub(crate) fn is_halted(&self) -> bool {
        self.lock().halted
    }

    pub(crate) fn is_disposed(&self) -> bool {
        self.lock().disposed
    }

    /// How startup ended, once it has been committed.
    pub(crate) fn init_outcome(&self) -> Option<InitOutcome> {
        self.lock().outcome.clone()
    }

    /// Commit the startup result: publish `state`, clear `loading`, set the
    /// initialization flag. A sign-out that arrived during startup wins over
    /// `state`. Returns the recorded outcome, or `None` (publishing nothing)
    /// if the flag was already set or the cell is closed.
    pub(crate) fn complete_initialization(
        &self,
        state: AuthState,
        outcome: InitOutcome,
    ) -> Option<InitOutcome> {
        let mut gate = self.lock();
        if gate.initialized || gate.closed() {
            return None;
        }

        let (state, outcome) = if gate.signed_out_during_init {
            (AuthState::SignedOut, InitOutcome::SignedOutDuringStartup)
        } else {
            (state, outcome)
        };
        self.tx.send_replace(SessionSnapshot {
            state,
            loading: false,
        });
        gate.initialized = true;
        gate.outcome = Some(outcome.clone());
        Some(outcome)
    }

    /// Apply a notification-driven transition, only once initialization has
    /// completed. `transition` sees the current state and returns the next one,
    /// or `None` to leave it untouched.
    pub(crate) fn apply_notification(
        &self,
        transition: impl FnOnce(&AuthState) -> Option<AuthState>,
    ) -> Applied {
        let gate = self.lock();
        if !gate.initialized {
            return Applied::Gated;
        }
        if gate.closed() {
            return Applied::Closed;
        }

        let mut applied = Applied::Unchanged;
        self.tx.send_if_modified(|snapshot| match transition(&snapshot.state) {
            Some(next) if next != snapshot.state => {
                snapshot.state = next;
                applied = Applied::Changed;
                true
            }
            _ => false,
        });
        drop(gate);
        applied
    }

    /// Explicit sign-out from a UI action. Not gated on initialization; if
    /// startup is still running, its result is replaced by signed out.
    pub(crate) fn clear(&self) -> Applied {
        let mut gate = self.lock();
        if gate.closed() {
            return Applied::Closed;
        }
        if !gate.initialized {
            gate.signed_out_during_init = true;
        }
        let changed = self.tx.send_if_modified(|snapshot| {
            let was_signed_in = snapshot.state.is_signed_in();
            snapshot.state = AuthState::SignedOut;
            was_signed_in
        });
        drop(gate);
        if changed {
            Applied::Changed
        } else {
            Applied::Unchanged
        }
    }

    /// Breaker trip: clear the state and refuse every later mutation.
    /// Returns `false` if the cell was already closed.
    pub(crate) fn halt(&self) -> bool {
        let mut gate = self.lock();
        if gate.closed() {
            return false;
        }
        gate.halted = true;
        self.tx.send_modify(|snapshot| {
            snapshot.state = AuthState::SignedOut;
        });
        true
    }

    /// Teardown: refuse every later mutation.
    pub(crate) fn dispose(&self) {
        self.lock().disposed = true;
    }
}

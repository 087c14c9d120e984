//! `lectern-auth`: session lifecycle manager for the course portal.
//!
//! Establishes, persists, synchronizes and recovers a user's authentication
//! session across startups and identity-provider notifications. The rest of
//! the portal only ever sees a [`SessionSnapshot`]: either fully signed in or
//! fully signed out.
//!
//! This crate is intentionally decoupled from HTTP and storage: the identity
//! provider, profile store, credential store and restart hook are traits.

pub mod breaker;
pub mod config;
pub mod consumer;
pub mod credential_store;
pub mod error;
pub mod initializer;
pub mod manager;
pub mod profile_loader;
pub mod provider;
pub mod single_flight;
pub mod state;

pub use breaker::{BreakerDecision, RefreshBreaker};
pub use config::SessionConfig;
pub use credential_store::{
    CorruptionReason, CredentialStore, InMemoryCredentialStore, ScanOutcome, scan_credentials,
};
pub use error::{ProfileStoreError, ProviderError, SessionError, StoreError};
pub use initializer::InitOutcome;
pub use manager::{SessionDeps, SessionManager};
pub use profile_loader::{ProfileLoader, ProfileStore};
pub use provider::{Credentials, IdentityProvider, Restarter};
pub use single_flight::{FlightGuard, SingleFlight};
pub use state::{AuthState, SessionSnapshot};

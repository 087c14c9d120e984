//! `lectern-core`: session data model shared by the portal crates.
//!
//! This crate contains **pure data** primitives (no IO, no async).

pub mod error;
pub mod id;
pub mod profile;
pub mod session;

pub use error::CoreError;
pub use id::UserId;
pub use profile::{Profile, Role};
pub use session::{Session, User};

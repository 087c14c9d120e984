//! Refresh-storm circuit breaker.
//!
//! A healthy provider renews tokens minutes apart. Renewals arriving seconds
//! apart mean something is looping (a clock skew, a bad persisted bundle, two
//! clients fighting over one refresh token). Past a threshold the only safe
//! recovery is to wipe credentials and restart the environment.
//!
//! ```text
//! NORMAL --(burst counter > threshold within window)--> TRIPPED (terminal)
//! ```

use std::time::Duration;

use tokio::time::Instant;

/// What the caller must do with the renewal that was just recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerDecision {
    /// Apply the renewal.
    Allow,
    /// Do not apply it; wipe, clear, and restart.
    Trip,
}

/// Tracks renewal frequency for one manager instance.
///
/// Time is passed in explicitly so the breaker stays deterministic.
#[derive(Debug, Clone)]
pub struct RefreshBreaker {
    window: Duration,
    threshold: u32,
    renewals: u32,
    last_renewal: Option<Instant>,
    tripped: bool,
}

impl RefreshBreaker {
    pub fn new(window: Duration, threshold: u32) -> Self {
        Self {
            window,
            threshold,
            renewals: 0,
            last_renewal: None,
            tripped: false,
        }
    }

    /// Record a renewal observed at `now`.
    ///
    /// A renewal closer than `window` to the previous one extends the current
    /// burst; anything slower resets the counter and opens a new burst. Once
    /// tripped, every later call returns [`BreakerDecision::Trip`].
    pub fn record_renewal(&mut self, now: Instant) -> BreakerDecision {
        if self.tripped {
            return BreakerDecision::Trip;
        }

        let within_window = self
            .last_renewal
            .is_some_and(|last| now.saturating_duration_since(last) < self.window);

        if !within_window {
            self.renewals = 0;
        }
        self.renewals = self.renewals.saturating_add(1);
        self.last_renewal = Some(now);

        if self.renewals > self.threshold {
            self.tripped = true;
            tracing::error!(
                renewals = self.renewals,
                window_ms = self.window.as_millis() as u64,
                "token renewal storm detected; tripping breaker"
            );
            return BreakerDecision::Trip;
        }

        BreakerDecision::Allow
    }

    pub fn is_tripped(&self) -> bool {
        self.tripped
    }

    /// Renewals counted in the current burst.
    pub fn renewals(&self) -> u32 {
        self.renewals
    }
}

//! Keyed single-flight guard.
//!
//! At most one execution per key is in progress at a time. Overlapping
//! callers are short-circuited rather than queued: [`SingleFlight::try_begin`]
//! returns `None` while another caller holds the key.

use std::collections::HashSet;
use std::hash::Hash;
use std::sync::{Mutex, PoisonError};

/// Table of keys with an execution in progress.
#[derive(Debug)]
pub struct SingleFlight<K> {
    in_flight: Mutex<HashSet<K>>,
}

impl<K> Default for SingleFlight<K> {
    fn default() -> Self {
        Self {
            in_flight: Mutex::new(HashSet::new()),
        }
    }
}

impl<K> SingleFlight<K>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `key`. Returns `None` if it is already in flight.
    ///
    /// The claim is released when the returned guard drops, including when
    /// the owning future is cancelled mid-flight.
    pub fn try_begin(&self, key: K) -> Option<FlightGuard<'_, K>> {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if !in_flight.insert(key.clone()) {
            return None;
        }
        Some(FlightGuard { flight: self, key })
    }

    pub fn is_in_flight(&self, key: &K) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(key)
    }

    /// Number of keys currently in flight.
    pub fn len(&self) -> usize {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn release(&self, key: &K) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }
}

/// Proof of an in-flight claim; releases the key on drop.
#[derive(Debug)]
pub struct FlightGuard<'a, K>
where
    K: Eq + Hash + Clone,
{
    flight: &'a SingleFlight<K>,
    key: K,
}

impl<K> Drop for FlightGuard<'_, K>
where
    K: Eq + Hash + Clone,
{
    fn drop(&mut self) {
        self.flight.release(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_claim_is_rejected_until_release() {
        let flight = SingleFlight::new();

        let guard = flight.try_begin("alice").unwrap();
        assert!(flight.try_begin("alice").is_none());
        assert!(flight.is_in_flight(&"alice"));

        drop(guard);
        assert!(!flight.is_in_flight(&"alice"));
        assert!(flight.try_begin("alice").is_some());
    }

    #[test]
    fn keys_are_independent() {
        let flight = SingleFlight::new();

        let _alice = flight.try_begin("alice").unwrap();
        let bob = flight.try_begin("bob");
        assert!(bob.is_some());
        assert_eq!(flight.len(), 2);
    }

    #[tokio::test]
    async fn cancelled_future_releases_claim() {
        let flight = SingleFlight::new();

        let pending = async {
            let _guard = flight.try_begin(1u32).unwrap();
            std::future::pending::<()>().await;
        };
        // Poll once so the claim is taken, then drop the future.
        let _ = tokio::time::timeout(std::time::Duration::from_millis(1), pending).await;

        assert!(flight.is_empty());
        assert!(flight.try_begin(1u32).is_some());
    }
}

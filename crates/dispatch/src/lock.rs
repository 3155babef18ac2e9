//! Single-flight dispatch lock keyed by campaign id.
//!
//! Holding a [`DispatchGuard`] is the only way to run a batch. The guard
//! releases the key on drop, so early returns and panics cannot leak it.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use clinic_core::types::DbId;

/// Set of campaigns with a dispatch in flight.
#[derive(Debug, Default)]
pub struct DispatchLocks {
    held: Mutex<HashSet<DbId>>,
}

impl DispatchLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the campaign, or `None` if another dispatch holds it.
    pub fn try_acquire(self: &Arc<Self>, campaign_id: DbId) -> Option<DispatchGuard> {
        if !self.held().insert(campaign_id) {
            return None;
        }
        Some(DispatchGuard {
            locks: Arc::clone(self),
            campaign_id,
        })
    }

    pub fn is_held(&self, campaign_id: DbId) -> bool {
        self.held().contains(&campaign_id)
    }

    /// The set stays consistent even if a holder panicked, so poisoning is ignored.
    fn held(&self) -> MutexGuard<'_, HashSet<DbId>> {
        self.held.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Releases its campaign when dropped.
#[derive(Debug)]
pub struct DispatchGuard {
    locks: Arc<DispatchLocks>,
    campaign_id: DbId,
}

impl DispatchGuard {
    pub fn campaign_id(&self) -> DbId {
        self.campaign_id
    }
}

impl Drop for DispatchGuard {
    fn drop(&mut self) {
        self.locks.held().remove(&self.campaign_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_is_rejected_until_drop() {
        let locks = Arc::new(DispatchLocks::new());
        let guard = locks.try_acquire(7).unwrap();
        assert_eq!(guard.campaign_id(), 7);
        assert!(locks.try_acquire(7).is_none());
        assert!(locks.is_held(7));

        drop(guard);
        assert!(!locks.is_held(7));
        assert!(locks.try_acquire(7).is_some());
    }

    #[test]
    fn keys_are_independent() {
        let locks = Arc::new(DispatchLocks::new());
        let _a = locks.try_acquire(1).unwrap();
        assert!(locks.try_acquire(2).is_some());
    }

    #[test]
    fn released_when_holder_panics() {
        let locks = Arc::new(DispatchLocks::new());
        let cloned = Arc::clone(&locks);
        let result = std::thread::spawn(move || {
            let _guard = cloned.try_acquire(3).unwrap();
            panic!("batch blew up");
        })
        .join();
        assert!(result.is_err());
        assert!(!locks.is_held(3));
    }
}

//! Per-session concurrency control.
//!
//! Only one turn runs per session. A second message arriving while a turn
//! is in flight is rejected with `SessionBusy`; callers retry when the
//! first turn finishes.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use uuid::Uuid;

use lucid_domain::{Error, Result};

/// Manages per-session run locks.
///
/// Each session id maps to a `Semaphore(1)`; holding the permit means
/// owning the session for one turn. The permit releases on drop.
#[derive(Default)]
pub struct SessionLockMap {
    locks: Mutex<HashMap<Uuid, Arc<Semaphore>>>,
}

impl SessionLockMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the run lock for a session without waiting.
    pub fn try_acquire(&self, session_id: Uuid) -> Result<OwnedSemaphorePermit> {
        let sem = {
            let mut locks = self.locks.lock();
            locks
                .entry(session_id)
                .or_insert_with(|| Arc::new(Semaphore::new(1)))
                .clone()
        };
        sem.try_acquire_owned()
            .map_err(|_| Error::SessionBusy(session_id.to_string()))
    }

    /// Number of tracked sessions (for monitoring).
    pub fn session_count(&self) -> usize {
        self.locks.lock().len()
    }

    /// Drop lock entries for sessions with no active holder.
    pub fn prune_idle(&self) {
        let mut locks = self.locks.lock();
        locks.retain(|_, sem| sem.available_permits() == 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequential_turns_on_one_session() {
        let map = SessionLockMap::new();
        let session = Uuid::new_v4();

        let permit = map.try_acquire(session).unwrap();
        drop(permit);
        let permit = map.try_acquire(session).unwrap();
        drop(permit);
    }

    #[test]
    fn concurrent_turn_is_rejected() {
        let map = SessionLockMap::new();
        let session = Uuid::new_v4();

        let _held = map.try_acquire(session).unwrap();
        let err = map.try_acquire(session).unwrap_err();
        assert!(matches!(err, Error::SessionBusy(_)));
    }

    #[test]
    fn different_sessions_do_not_contend() {
        let map = SessionLockMap::new();
        let _a = map.try_acquire(Uuid::new_v4()).unwrap();
        let _b = map.try_acquire(Uuid::new_v4()).unwrap();
        assert_eq!(map.session_count(), 2);
    }

    #[test]
    fn prune_drops_released_locks() {
        let map = SessionLockMap::new();
        let held_session = Uuid::new_v4();
        let _held = map.try_acquire(held_session).unwrap();

        let released = map.try_acquire(Uuid::new_v4()).unwrap();
        drop(released);

        map.prune_idle();
        assert_eq!(map.session_count(), 1);
        assert!(map.try_acquire(held_session).is_err());
    }
}

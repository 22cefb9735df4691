//! Per-session cancellation tokens.
//!
//! Each running turn registers a `CancelToken` keyed by session id.
//! Cancelling it makes the executor stop cleanly at its next suspension
//! point. Child delegations inherit the parent's token through the
//! delegation context, so cancelling a parent reaches its children too.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use uuid::Uuid;

/// A cancellation flag checked by the turn loop.
#[derive(Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Active cancellation tokens, one per in-flight session turn.
#[derive(Default)]
pub struct CancelMap {
    tokens: Mutex<HashMap<Uuid, CancelToken>>,
}

impl CancelMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and register a fresh token for a session turn.
    pub fn register(&self, session_id: Uuid) -> CancelToken {
        let token = CancelToken::new();
        self.tokens.lock().insert(session_id, token.clone());
        token
    }

    /// Cancel the in-flight turn for a session. Returns whether a token
    /// was registered.
    pub fn cancel(&self, session_id: Uuid) -> bool {
        match self.tokens.lock().get(&session_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Remove the token when a turn completes.
    pub fn remove(&self, session_id: Uuid) {
        self.tokens.lock().remove(&session_id);
    }

    /// Whether a session has an in-flight turn.
    pub fn is_running(&self, session_id: Uuid) -> bool {
        self.tokens.lock().contains_key(&session_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_lifecycle() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        token.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn clones_share_state() {
        let token = CancelToken::new();
        let clone = token.clone();
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn map_register_cancel_remove() {
        let map = CancelMap::new();
        let session = Uuid::new_v4();

        let token = map.register(session);
        assert!(map.is_running(session));
        assert!(map.cancel(session));
        assert!(token.is_cancelled());

        map.remove(session);
        assert!(!map.is_running(session));
        assert!(!map.cancel(session));
    }

    #[test]
    fn register_replaces_previous_token() {
        let map = CancelMap::new();
        let session = Uuid::new_v4();
        let old = map.register(session);
        let new = map.register(session);

        map.cancel(session);
        assert!(new.is_cancelled());
        assert!(!old.is_cancelled());
    }
}

//! Process-wide registry of sessions that currently have a live connection.
//!
//! A session is driven by at most one `Conversation` at a time. The claim is
//! taken before prior turns are loaded and released when the claim is dropped,
//! so a reconnect after disconnect always sees everything the previous
//! connection wrote.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;
use uuid::Uuid;

#[derive(Clone, Default)]
pub struct LiveSessions {
    claimed: Arc<Mutex<HashSet<Uuid>>>,
}

impl LiveSessions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes exclusive ownership of `session_id`, or `None` if another
    /// connection already holds it.
    pub fn claim(&self, session_id: Uuid) -> Option<SessionClaim> {
        if !lock(&self.claimed).insert(session_id) {
            debug!(%session_id, "Session already claimed by another connection");
            return None;
        }
        Some(SessionClaim {
            session_id,
            claimed: Arc::clone(&self.claimed),
        })
    }

    pub fn is_claimed(&self, session_id: Uuid) -> bool {
        lock(&self.claimed).contains(&session_id)
    }
}

/// Held for the lifetime of a conversation; releases the session on drop.
pub struct SessionClaim {
    session_id: Uuid,
    claimed: Arc<Mutex<HashSet<Uuid>>>,
}

impl Drop for SessionClaim {
    fn drop(&mut self) {
        lock(&self.claimed).remove(&self.session_id);
    }
}

// The set stays consistent even if a holder panicked mid-insert.
fn lock(claimed: &Mutex<HashSet<Uuid>>) -> MutexGuard<'_, HashSet<Uuid>> {
    claimed.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

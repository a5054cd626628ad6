// src/synth/sessions.rs
//! Per-caller single flight: at most one live synthesis per caller.
//! Starting a new one cancels the previous one first.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;

struct Live {
    generation: u64,
    token: CancellationToken,
}

#[derive(Default)]
pub struct CallerSessions {
    live: Mutex<HashMap<String, Live>>,
    next_generation: AtomicU64,
}

/// Handle for the caller's current operation. Dropping it cancels the
/// operation and releases the slot if it is still the latest one.
pub struct SessionTicket {
    sessions: Arc<CallerSessions>,
    caller: String,
    generation: u64,
    token: CancellationToken,
}

impl SessionTicket {
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl Drop for SessionTicket {
    fn drop(&mut self) {
        self.token.cancel();
        let mut live = self.sessions.lock();
        if live
            .get(&self.caller)
            .is_some_and(|l| l.generation == self.generation)
        {
            live.remove(&self.caller);
        }
    }
}

impl CallerSessions {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Live>> {
        self.live.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Cancel the caller's live operation (if any) and register a new one.
    pub fn begin(self: &Arc<Self>, caller: &str) -> SessionTicket {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed) + 1;
        let token = CancellationToken::new();
        let prior = self.lock().insert(
            caller.to_string(),
            Live {
                generation,
                token: token.clone(),
            },
        );
        if let Some(prior) = prior {
            prior.token.cancel();
            tracing::debug!(target: "synth", superseded = prior.generation, generation, "superseding live request");
        }
        SessionTicket {
            sessions: Arc::clone(self),
            caller: caller.to_string(),
            generation,
            token,
        }
    }

    /// Returns `true` if something was live.
    pub fn cancel(&self, caller: &str) -> bool {
        match self.lock().remove(caller) {
            Some(l) => {
                l.token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_live(&self, caller: &str) -> bool {
        self.lock().contains_key(caller)
    }

    pub fn live_count(&self) -> usize {
        self.lock().len()
    }
}

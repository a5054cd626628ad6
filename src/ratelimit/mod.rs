// src/ratelimit/mod.rs
//! Fixed-window admission control keyed by `(identifier, endpoint)`.
//!
//! Each check is one increment-and-compare under a single mutex, so two
//! concurrent requests for the same key can never both read "under limit".
//! Windows are fixed, not sliding: a caller can burst up to twice the quota
//! across a window boundary.

pub mod middleware;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use metrics::{counter, gauge};
use tokio::task::JoinHandle;
use tracing::{debug, info};

pub use middleware::{rate_limit, resolve_identifier, Caller, RateGate};

/* ---- Policies ---- */

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub max_requests: u32,
    pub window: Duration,
}

impl RateLimitPolicy {
    pub const fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
        }
    }

    fn reset_from(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        TimeDelta::from_std(self.window)
            .ok()
            .and_then(|d| now.checked_add_signed(d))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

/// Closed set of compiled-in tiers; endpoints pick one, callers cannot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PolicyTier {
    Standard,
    AiCall,
    Expensive,
    AuthAttempt,
    Webhook,
}

impl PolicyTier {
    pub const ALL: [PolicyTier; 5] = [
        PolicyTier::Standard,
        PolicyTier::AiCall,
        PolicyTier::Expensive,
        PolicyTier::AuthAttempt,
        PolicyTier::Webhook,
    ];

    pub const fn policy(self) -> RateLimitPolicy {
        const MINUTE: Duration = Duration::from_secs(60);
        match self {
            PolicyTier::Standard => RateLimitPolicy::new(100, MINUTE),
            PolicyTier::AiCall => RateLimitPolicy::new(10, MINUTE),
            PolicyTier::Expensive => RateLimitPolicy::new(5, MINUTE),
            PolicyTier::AuthAttempt => RateLimitPolicy::new(5, Duration::from_secs(15 * 60)),
            PolicyTier::Webhook => RateLimitPolicy::new(50, MINUTE),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PolicyTier::Standard => "standard",
            PolicyTier::AiCall => "ai_call",
            PolicyTier::Expensive => "expensive",
            PolicyTier::AuthAttempt => "auth_attempt",
            PolicyTier::Webhook => "webhook",
        }
    }
}

/* ---- Table ---- */

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitEntry {
    pub count: u32,
    pub window_reset_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
}

impl RateLimitDecision {
    /// Whole seconds until the window resets, never below 1 when denied.
    pub fn retry_after_secs(&self, now: DateTime<Utc>) -> u64 {
        let ms = (self.reset_at - now).num_milliseconds().max(0) as u64;
        ms.div_ceil(1000).max(1)
    }
}

type Key = (String, String);

#[derive(Debug, Default)]
pub struct RateLimiter {
    table: Mutex<HashMap<Key, RateLimitEntry>>,
}

impl RateLimiter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Key, RateLimitEntry>> {
        self.table.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn check(
        &self,
        identifier: &str,
        endpoint: &str,
        policy: RateLimitPolicy,
    ) -> RateLimitDecision {
        self.check_at(identifier, endpoint, policy, Utc::now())
    }

    /// Same as [`check`](Self::check) with an explicit clock.
    pub fn check_at(
        &self,
        identifier: &str,
        endpoint: &str,
        policy: RateLimitPolicy,
        now: DateTime<Utc>,
    ) -> RateLimitDecision {
        let decision = {
            let mut table = self.lock();
            let entry = table
                .entry((identifier.to_string(), endpoint.to_string()))
                .or_insert(RateLimitEntry {
                    count: 0,
                    window_reset_at: policy.reset_from(now),
                });
            if now > entry.window_reset_at {
                *entry = RateLimitEntry {
                    count: 0,
                    window_reset_at: policy.reset_from(now),
                };
            }
            entry.count = entry.count.saturating_add(1);
            RateLimitDecision {
                allowed: entry.count <= policy.max_requests,
                limit: policy.max_requests,
                remaining: policy.max_requests.saturating_sub(entry.count),
                reset_at: entry.window_reset_at,
            }
        };

        counter!("ratelimit_checks_total", "endpoint" => endpoint.to_string()).increment(1);
        if !decision.allowed {
            counter!("ratelimit_denied_total", "endpoint" => endpoint.to_string()).increment(1);
        }
        decision
    }

    /// Drop entries whose window has already expired. Returns how many went.
    pub fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        let mut table = self.lock();
        let before = table.len();
        table.retain(|_, e| e.window_reset_at >= now);
        before - table.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn entry(&self, identifier: &str, endpoint: &str) -> Option<RateLimitEntry> {
        self.lock()
            .get(&(identifier.to_string(), endpoint.to_string()))
            .copied()
    }
}

/// Periodic expiry sweep; bounds the table to recently active callers.
pub fn spawn_sweeper(limiter: Arc<RateLimiter>, every: Duration) -> JoinHandle<()> {
    info!(target: "ratelimit", every_secs = every.as_secs(), "rate-limit sweeper started");
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        // First tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = limiter.sweep_at(Utc::now());
            let left = limiter.len();
            gauge!("ratelimit_table_entries").set(left as f64);
            debug!(target: "ratelimit", removed, left, "swept expired windows");
        }
    })
}

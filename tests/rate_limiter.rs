// tests/rate_limiter.rs
//
// Admission controller properties.
//
// Covered:
// - fairness: N allowed in a window, N+1 denied, allowed again after W
// - keys are (identifier, endpoint): neither dimension leaks into the other
// - no lost updates under concurrent checks for one identifier

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

use news_brief_synth::ratelimit::{PolicyTier, RateLimitPolicy, RateLimiter};

fn t0() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2026-05-04T09:00:00Z")
        .expect("ts")
        .with_timezone(&Utc)
}

#[test]
fn fairness_over_one_window() {
    let rl = RateLimiter::default();
    let n = 10;
    let w = Duration::from_millis(60_000);
    let policy = RateLimitPolicy::new(n, w);
    let start = t0();

    for i in 0..n {
        let at = start + TimeDelta::milliseconds(i as i64 * 100);
        assert!(rl.check_at("user:u1", "/synthesize", policy, at).allowed, "call {i}");
    }
    let denied = rl.check_at("user:u1", "/synthesize", policy, start + TimeDelta::seconds(30));
    assert!(!denied.allowed);
    assert_eq!(denied.remaining, 0);

    let later = start + TimeDelta::milliseconds(60_001);
    let fresh = rl.check_at("user:u1", "/synthesize", policy, later);
    assert!(fresh.allowed);
    assert_eq!(fresh.remaining, n - 1);
}

#[test]
fn identifiers_and_endpoints_are_separate_buckets() {
    let rl = RateLimiter::default();
    let policy = RateLimitPolicy::new(1, Duration::from_secs(60));
    let now = t0();

    assert!(rl.check_at("ip:1.1.1.1", "/a", policy, now).allowed);
    assert!(!rl.check_at("ip:1.1.1.1", "/a", policy, now).allowed);
    assert!(rl.check_at("ip:1.1.1.1", "/b", policy, now).allowed);
    assert!(rl.check_at("ip:2.2.2.2", "/a", policy, now).allowed);
    assert_eq!(rl.len(), 3);
}

#[test]
fn concurrent_checks_never_over_admit() {
    let rl = Arc::new(RateLimiter::default());
    let policy = PolicyTier::Standard.policy();
    let now = t0();

    let allowed: usize = std::thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let rl = Arc::clone(&rl);
                s.spawn(move || {
                    (0..50)
                        .filter(|_| rl.check_at("user:burst", "/synthesize", policy, now).allowed)
                        .count()
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("thread"))
            .sum()
    });

    assert_eq!(allowed, policy.max_requests as usize);
    assert_eq!(
        rl.entry("user:burst", "/synthesize").map(|e| e.count),
        Some(400)
    );
}

// src/ratelimit/middleware.rs
//! axum gate in front of abusable routes: resolve the caller, check the
//! tier, then either pass through (with a [`Caller`] extension) or answer 429.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use super::{PolicyTier, RateLimitDecision, RateLimiter};
use crate::auth::{bearer_token, Principal, PrincipalResolver};
use crate::synth::failure::SynthesisError;
use crate::telemetry::anon_hash;

/// Resolved rate-limit identity (`user:<id>` or `ip:<addr>`), inserted as a
/// request extension for downstream handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller(pub String);

#[derive(Clone)]
pub struct RateGate {
    pub limiter: Arc<RateLimiter>,
    pub resolver: Arc<dyn PrincipalResolver>,
    pub tier: PolicyTier,
    pub endpoint: &'static str,
    pub enabled: bool,
    pub trust_forwarded_for: bool,
}

/// Authenticated principal first; otherwise the coarse network origin.
pub fn resolve_identifier(
    principal: &Principal,
    headers: &HeaderMap,
    remote: Option<IpAddr>,
    trust_forwarded_for: bool,
) -> String {
    if let Some(id) = principal.user_id() {
        return format!("user:{id}");
    }
    let forwarded = if trust_forwarded_for {
        forwarded_ip(headers)
    } else {
        None
    };
    match forwarded.or_else(|| remote.map(|ip| ip.to_string())) {
        Some(ip) => format!("ip:{ip}"),
        None => "ip:unknown".to_string(),
    }
}

fn forwarded_ip(headers: &HeaderMap) -> Option<String> {
    let first = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    first("x-forwarded-for").or_else(|| first("x-real-ip"))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitBody {
    pub error: &'static str,
    pub message: &'static str,
    pub limit: u32,
    /// Window length in seconds.
    pub window: u64,
    pub reset_in: u64,
    pub retry_after: u64,
}

pub fn too_many_requests(decision: &RateLimitDecision, tier: PolicyTier) -> Response {
    let now = Utc::now();
    let retry_after = decision.retry_after_secs(now);
    let body = RateLimitBody {
        error: "rate_limited",
        message: "Too many requests. Please wait a moment and try again.",
        limit: decision.limit,
        window: tier.policy().window.as_secs(),
        reset_in: retry_after,
        retry_after,
    };
    let headers = [
        ("x-ratelimit-limit", decision.limit.to_string()),
        ("x-ratelimit-remaining", decision.remaining.to_string()),
        ("x-ratelimit-reset", decision.reset_at.timestamp().to_string()),
        ("retry-after", retry_after.to_string()),
    ];
    (StatusCode::TOO_MANY_REQUESTS, headers, Json(body)).into_response()
}

pub async fn rate_limit(State(gate): State<RateGate>, mut req: Request, next: Next) -> Response {
    let principal = match bearer_token(req.headers()).and_then(|b| gate.resolver.resolve(b)) {
        Ok(p) => p,
        Err(e) => {
            warn!(target: "ratelimit", endpoint = gate.endpoint, error = %e, "principal resolution failed");
            return SynthesisError::from(e).into_response();
        }
    };
    let remote = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    let id = resolve_identifier(&principal, req.headers(), remote, gate.trust_forwarded_for);

    if gate.enabled {
        let decision = gate.limiter.check(&id, gate.endpoint, gate.tier.policy());
        if !decision.allowed {
            info!(
                target: "ratelimit",
                caller = %anon_hash(&id), endpoint = gate.endpoint, tier = gate.tier.as_str(),
                "admission denied"
            );
            return too_many_requests(&decision, gate.tier);
        }
    }

    req.extensions_mut().insert(Caller(id));
    next.run(req).await
}

// src/api.rs
use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    middleware::from_fn_with_state,
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::auth::PrincipalResolver;
use crate::config::service::RateLimitSection;
use crate::metrics::Metrics;
use crate::ratelimit::{rate_limit, Caller, PolicyTier, RateGate, RateLimiter};
use crate::synth::{SynthesisError, SynthesisRequest, SynthesisService};
use crate::telemetry::anon_hash;

#[derive(Clone)]
pub struct AppState {
    pub service: SynthesisService,
}

/// Everything the router needs from bootstrap.
pub struct ApiDeps {
    pub service: SynthesisService,
    pub limiter: Arc<RateLimiter>,
    pub resolver: Arc<dyn PrincipalResolver>,
    pub rate_limit: RateLimitSection,
    /// Mounted at `/metrics` when present.
    pub metrics: Option<Metrics>,
}

impl IntoResponse for SynthesisError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.kind.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}

#[derive(Debug, Serialize)]
struct InvalidBody {
    error: &'static str,
    message: String,
}

#[derive(Debug, Serialize)]
struct CancelBody {
    cancelled: bool,
}

pub fn create_router(deps: ApiDeps) -> Router {
    let gate = |tier: PolicyTier, endpoint: &'static str| RateGate {
        limiter: Arc::clone(&deps.limiter),
        resolver: Arc::clone(&deps.resolver),
        tier,
        endpoint,
        enabled: deps.rate_limit.enabled,
        trust_forwarded_for: deps.rate_limit.trust_forwarded_for,
    };

    let state = AppState {
        service: deps.service.clone(),
    };

    let mut router = Router::new()
        .route("/health", get(|| async { "ok" }))
        .route(
            "/synthesize",
            post(synthesize).route_layer(from_fn_with_state(
                gate(PolicyTier::AiCall, "/synthesize"),
                rate_limit,
            )),
        )
        .route(
            "/synthesize/cancel",
            post(cancel).route_layer(from_fn_with_state(
                gate(PolicyTier::Standard, "/synthesize/cancel"),
                rate_limit,
            )),
        )
        .with_state(state);

    if let Some(m) = &deps.metrics {
        router = router.merge(m.router());
    }
    router.layer(CorsLayer::very_permissive())
}

/// The handler future owns the caller's session ticket: if the client goes
/// away, the future is dropped and the in-flight synthesis is cancelled.
async fn synthesize(
    State(state): State<AppState>,
    Extension(Caller(caller)): Extension<Caller>,
    Json(body): Json<SynthesisRequest>,
) -> Response {
    let request = match body.validated() {
        Ok(r) => r,
        Err(e) => {
            info!(target: "api", caller = %anon_hash(&caller), reason = %e, "rejected invalid request");
            let body = InvalidBody {
                error: "invalid_request",
                message: e.to_string(),
            };
            return (StatusCode::BAD_REQUEST, Json(body)).into_response();
        }
    };

    match state.service.synthesize_for(&caller, &request).await {
        Ok(result) => Json(result).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn cancel(
    State(state): State<AppState>,
    Extension(Caller(caller)): Extension<Caller>,
) -> Json<CancelBody> {
    let cancelled = state.service.cancel(&caller);
    info!(target: "api", caller = %anon_hash(&caller), cancelled, "cancel requested");
    Json(CancelBody { cancelled })
}

// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod ai_bootstrap;
pub mod api;
pub mod auth;
pub mod config;
pub mod metrics;
pub mod ratelimit;
pub mod synth;
pub mod telemetry;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tracing::info;

pub use crate::api::create_router;
pub use crate::synth::{FailureKind, SynthesisError, SynthesisRequest, SynthesisResult};

use crate::ai_bootstrap::AiRuntime;
use crate::api::ApiDeps;
use crate::auth::StaticTokenResolver;
use crate::config::{AiConfig, ServiceConfig};
use crate::metrics::Metrics;
use crate::ratelimit::RateLimiter;
use crate::synth::SynthesisService;

/// Router plus the pieces the entrypoint still has to drive.
pub struct App {
    pub router: Router,
    pub limiter: Arc<RateLimiter>,
    pub sweep_interval: Duration,
}

pub fn build_app(ai: AiConfig, service: &ServiceConfig, metrics: Option<Metrics>) -> anyhow::Result<App> {
    let runtime = AiRuntime::from_config(ai)?;
    let synth = SynthesisService::new(runtime.orchestrator(service.retry_policy()));
    let limiter = RateLimiter::new();

    let router = create_router(ApiDeps {
        service: synth,
        limiter: Arc::clone(&limiter),
        resolver: Arc::new(StaticTokenResolver::new(service.auth.tokens.clone())),
        rate_limit: service.rate_limit.clone(),
        metrics,
    });

    Ok(App {
        router,
        limiter,
        sweep_interval: service.sweep_interval(),
    })
}

/// Load both config files and honour `METRICS_ROUTE=1`.
pub fn app_from_env() -> anyhow::Result<App> {
    let ai = AiConfig::load_default()?;
    let service = ServiceConfig::load_default()?;
    let metrics = if std::env::var("METRICS_ROUTE").is_ok_and(|v| v == "1") {
        Some(Metrics::init()?)
    } else {
        None
    };
    build_app(ai, &service, metrics)
}

/// Call this from the entrypoint (after tracing init) for a one-off smoke
/// test of the configured provider. Logs the result; never panics.
pub async fn run_ai_quick_probe() -> anyhow::Result<()> {
    let ai = AiRuntime::load_default()?;
    ai.quick_probe().await;
    info!("AI quick probe finished");
    Ok(())
}

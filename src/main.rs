//! News Brief Synthesis Service — Binary Entrypoint
//! Boots the Axum HTTP server: configuration, tracing, the synthesis
//! pipeline, admission control and the rate-limit sweeper.

use news_brief_synth::{app_from_env, ratelimit::spawn_sweeper, run_ai_quick_probe, telemetry};
use shuttle_axum::ShuttleAxum;

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();

    telemetry::init_tracing();

    let app = app_from_env()?;
    spawn_sweeper(app.limiter.clone(), app.sweep_interval);

    if std::env::var("AI_QUICK_PROBE").is_ok_and(|v| v == "1") {
        tokio::spawn(async {
            if let Err(e) = run_ai_quick_probe().await {
                tracing::warn!(error = ?e, "AI quick probe didn't run");
            }
        });
    }

    Ok(app.router.into())
}

// src/telemetry.rs
//! Tracing setup and log-safe identifiers.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_FILTER: &str = "news_brief_synth=info,warn";

/// Install the global subscriber. `RUST_LOG` overrides the filter;
/// `LOG_FORMAT=json` switches to structured output. Safe to call twice.
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let res = if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .try_init()
    };
    if res.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

/// Short SHA-256 prefix so topics and caller ids never hit the logs raw.
pub fn anon_hash(text: &str) -> String {
    use sha2::{Digest, Sha256};
    Sha256::digest(text.as_bytes())[..6]
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

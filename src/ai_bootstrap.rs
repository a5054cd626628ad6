// src/ai_bootstrap.rs
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::ai::AiConfig;
use crate::synth::orchestrator::{Orchestrator, RetryPolicy};
use crate::synth::provider::{DisabledProvider, DynProvider, MockProvider, OpenAiProvider};
use crate::synth::SynthesisRequest;

pub struct AiRuntime {
    pub cfg: AiConfig,
    pub provider: DynProvider,
}

/// `AI_TEST_MODE=mock` or `provider = "mock"` → canned answers; disabled →
/// every call fails as a config error; otherwise the OpenAI-compatible client.
pub fn build_provider(cfg: &AiConfig) -> anyhow::Result<DynProvider> {
    let test_mode = std::env::var("AI_TEST_MODE")
        .map(|v| v.eq_ignore_ascii_case("mock"))
        .unwrap_or(false);

    let provider: DynProvider = if test_mode || cfg.provider.eq_ignore_ascii_case("mock") {
        Arc::new(MockProvider::canned())
    } else if !cfg.enabled {
        Arc::new(DisabledProvider)
    } else {
        Arc::new(OpenAiProvider::new(cfg)?)
    };
    Ok(provider)
}

impl AiRuntime {
    pub fn from_config(cfg: AiConfig) -> anyhow::Result<Self> {
        // Safe diagnostics: only provider + enabled + key length
        info!(
            provider = %cfg.provider,
            enabled = cfg.enabled,
            model = %cfg.model,
            key_len = cfg.api_key.len(),
            "AI cfg loaded"
        );
        let provider = build_provider(&cfg)?;
        Ok(Self { cfg, provider })
    }

    pub fn from_path(path: &str) -> anyhow::Result<Self> {
        Self::from_config(AiConfig::load_from_file(path)?)
    }

    pub fn load_default() -> anyhow::Result<Self> {
        Self::from_config(AiConfig::load_default()?)
    }

    pub fn orchestrator(&self, policy: RetryPolicy) -> Orchestrator {
        Orchestrator::new(Arc::clone(&self.provider), policy)
    }

    /// One-off end-to-end call; logs the outcome, never fails the caller.
    pub async fn quick_probe(&self) {
        if !self.cfg.enabled {
            warn!("AI quick_probe skipped: AI is disabled in config");
            return;
        }
        let orchestrator = self.orchestrator(RetryPolicy {
            max_attempts: 1,
            ..RetryPolicy::default()
        });
        let req = SynthesisRequest::new("central bank interest rate decisions");
        match orchestrator.synthesize(&req, &CancellationToken::new()).await {
            Ok(r) => info!(sources = r.sources.len(), "AI quick_probe succeeded"),
            Err(e) => warn!(kind = e.kind.as_str(), "AI quick_probe failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn mock_provider_selected_by_config() {
        std::env::remove_var("AI_TEST_MODE");
        let cfg = AiConfig::from_json_str(r#"{"enabled": true, "provider": "mock"}"#)
            .expect("cfg");
        assert_eq!(build_provider(&cfg).expect("provider").name(), "mock");
    }

    #[test]
    #[serial]
    fn disabled_config_yields_disabled_provider() {
        std::env::remove_var("AI_TEST_MODE");
        let cfg = AiConfig::default();
        assert!(!cfg.enabled);
        assert_eq!(build_provider(&cfg).expect("provider").name(), "disabled");
    }
}

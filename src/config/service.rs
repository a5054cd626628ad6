// src/config/service.rs
//! Service-level knobs loaded from TOML: retry timing, rate-limit sweep, auth tokens.

use anyhow::Context;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::synth::orchestrator::{RetryPolicy, MAX_ATTEMPTS};

pub const DEFAULT_SERVICE_CONFIG_PATH: &str = "config/service.toml";
pub const ENV_SERVICE_CONFIG_PATH: &str = "SERVICE_CONFIG_PATH";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub retry: RetrySection,
    pub rate_limit: RateLimitSection,
    pub auth: AuthSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    pub max_attempts: u32,
    pub backoff_step_ms: u64,
    pub rate_limited_delay_ms: u64,
    pub attempt_timeout_secs: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS,
            backoff_step_ms: 2_000,
            rate_limited_delay_ms: 3_000,
            attempt_timeout_secs: 90,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitSection {
    pub enabled: bool,
    pub sweep_interval_secs: u64,
    /// Use `X-Forwarded-For` / `X-Real-IP` for anonymous callers (behind a proxy).
    pub trust_forwarded_for: bool,
}

impl Default for RateLimitSection {
    fn default() -> Self {
        Self {
            enabled: true,
            sweep_interval_secs: 300,
            trust_forwarded_for: true,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AuthSection {
    /// bearer token -> principal id
    pub tokens: HashMap<String, String>,
}

impl ServiceConfig {
    /// `$SERVICE_CONFIG_PATH`, then `config/service.toml`; missing file → defaults.
    pub fn load_default() -> anyhow::Result<Self> {
        let path = std::env::var(ENV_SERVICE_CONFIG_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_SERVICE_CONFIG_PATH));
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading service config from {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("parsing service config at {}", path.display()))
    }

    pub fn from_toml_str(s: &str) -> anyhow::Result<Self> {
        let mut cfg: ServiceConfig = toml::from_str(s)?;
        cfg.retry.max_attempts = cfg.retry.max_attempts.clamp(1, MAX_ATTEMPTS);
        if cfg.retry.attempt_timeout_secs == 0 {
            cfg.retry.attempt_timeout_secs = RetrySection::default().attempt_timeout_secs;
        }
        if cfg.rate_limit.sweep_interval_secs == 0 {
            cfg.rate_limit.sweep_interval_secs = RateLimitSection::default().sweep_interval_secs;
        }
        Ok(cfg)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts,
            backoff_step: Duration::from_millis(self.retry.backoff_step_ms),
            rate_limited_delay: Duration::from_millis(self.retry.rate_limited_delay_ms),
            attempt_timeout: Duration::from_secs(self.retry.attempt_timeout_secs),
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.rate_limit.sweep_interval_secs)
    }
}

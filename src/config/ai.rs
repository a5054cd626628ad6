// src/config/ai.rs
use serde::{Deserialize, Serialize};
use std::{env, fs, path::Path};

pub const DEFAULT_AI_CONFIG_PATH: &str = "config/ai.json";
pub const ENV_AI_CONFIG_PATH: &str = "AI_CONFIG_PATH";

fn default_provider() -> String {
    "openai".to_string()
}
fn default_model() -> String {
    "gpt-4o-search-preview".to_string()
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_max_tokens() -> u32 {
    4_096
}
fn default_request_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    pub enabled: bool,
    /// "openai" | "mock" (case-insensitive)
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// "ENV" means: read from OPENAI_API_KEY
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Transport-level ceiling for one HTTP exchange.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: default_provider(),
            model: default_model(),
            api_key: String::new(),
            base_url: default_base_url(),
            max_tokens: default_max_tokens(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl AiConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let data = fs::read_to_string(path)?;
        Self::from_json_str(&data)
    }

    /// `$AI_CONFIG_PATH`, then `config/ai.json`; a missing file yields the disabled default.
    pub fn load_default() -> anyhow::Result<Self> {
        let path = env::var(ENV_AI_CONFIG_PATH).unwrap_or_else(|_| DEFAULT_AI_CONFIG_PATH.into());
        if !Path::new(&path).exists() {
            return Ok(Self::default());
        }
        Self::load_from_file(&path)
            .map_err(|e| anyhow::anyhow!("Failed to load AI config at {path}: {e}"))
    }

    pub fn from_json_str(data: &str) -> anyhow::Result<Self> {
        let mut cfg: AiConfig = serde_json::from_str(data)?;

        cfg.provider = cfg.provider.trim().to_lowercase();
        cfg.base_url = cfg.base_url.trim_end_matches('/').to_string();

        // Resolve api key if "ENV"
        if cfg.api_key.trim().eq_ignore_ascii_case("env") {
            cfg.api_key = match cfg.provider.as_str() {
                "openai" => match env::var("OPENAI_API_KEY") {
                    Ok(key) => key,
                    // disabled configs may ship without a key
                    Err(_) if !cfg.enabled => String::new(),
                    Err(_) => anyhow::bail!("Missing OPENAI_API_KEY env var"),
                },
                "mock" => String::new(),
                other => anyhow::bail!("Unsupported provider in config: {other}"),
            };
        }

        if cfg.max_tokens == 0 {
            cfg.max_tokens = default_max_tokens();
        }
        if cfg.request_timeout_secs == 0 {
            cfg.request_timeout_secs = default_request_timeout_secs();
        }

        Ok(cfg)
    }
}

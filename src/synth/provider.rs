// src/synth/provider.rs
//! Remote LLM invocation surface. The orchestrator only looks at the status
//! code, the body text, and the transport error shape.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::config::AiConfig;

/// System + user message pair sent to the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

/// Capability the model may use while answering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolSpec {
    WebSearch,
}

/// Raw HTTP exchange result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderReply {
    pub status: u16,
    pub body: String,
}

impl ProviderReply {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    #[error("network error: {0}")]
    Network(String),
    #[error("provider request timed out")]
    Timeout,
    #[error("provider call cancelled")]
    Cancelled,
    #[error("provider misconfigured: {0}")]
    Config(String),
}

#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Must stop in-flight I/O promptly once `cancel` fires.
    async fn invoke(
        &self,
        prompt: &Prompt,
        tools: &[ToolSpec],
        cancel: &CancellationToken,
    ) -> Result<ProviderReply, ProviderError>;

    /// Provider name for diagnostics.
    fn name(&self) -> &'static str;
}

pub type DynProvider = Arc<dyn LlmProvider>;

/// Builds an OpenAI-style chat completion body carrying `content`.
pub fn chat_completion_body(content: &str, finish_reason: &str) -> String {
    serde_json::json!({
        "object": "chat.completion",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": content },
            "finish_reason": finish_reason,
        }]
    })
    .to_string()
}

// ------------------------------------------------------------
// OpenAI-compatible provider
// ------------------------------------------------------------

/// Chat Completions provider. Requires an API key (see `AiConfig::api_key`).
pub struct OpenAiProvider {
    http: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
    max_tokens: u32,
}

impl OpenAiProvider {
    pub fn new(cfg: &AiConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent("news-brief-synth/0.1")
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(cfg.request_timeout_secs))
            .build()?;
        Ok(Self {
            http,
            api_key: cfg.api_key.clone(),
            model: cfg.model.clone(),
            endpoint: format!("{}/chat/completions", cfg.base_url),
            max_tokens: cfg.max_tokens,
        })
    }
}

#[derive(Serialize)]
struct Msg<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct WebSearchOptions {}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Msg<'a>>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    web_search_options: Option<WebSearchOptions>,
}

fn map_transport(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout
    } else {
        ProviderError::Network(e.to_string())
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    async fn invoke(
        &self,
        prompt: &Prompt,
        tools: &[ToolSpec],
        cancel: &CancellationToken,
    ) -> Result<ProviderReply, ProviderError> {
        if self.api_key.is_empty() {
            return Err(ProviderError::Config("missing API key".into()));
        }

        let req = ChatRequest {
            model: &self.model,
            messages: vec![
                Msg {
                    role: "system",
                    content: &prompt.system,
                },
                Msg {
                    role: "user",
                    content: &prompt.user,
                },
            ],
            max_tokens: self.max_tokens,
            web_search_options: tools
                .contains(&ToolSpec::WebSearch)
                .then_some(WebSearchOptions {}),
        };

        // Dropping the reqwest future aborts the connection.
        let send = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&req)
            .send();
        let resp = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
            r = send => r.map_err(map_transport)?,
        };

        let status = resp.status().as_u16();
        let body = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
            b = resp.text() => b.map_err(map_transport)?,
        };
        Ok(ProviderReply { status, body })
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

// ------------------------------------------------------------
// Mock / scripted providers
// ------------------------------------------------------------

/// Always answers with the same model content; used for `AI_TEST_MODE=mock`
/// and local runs without a key.
#[derive(Clone)]
pub struct MockProvider {
    content: String,
}

impl MockProvider {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }

    /// A small, valid brief with three sources.
    pub fn canned() -> Self {
        let content = serde_json::json!({
            "sources": [
                {"id": "s1", "outlet": "Reuters", "type": "news", "url": "https://www.reuters.com/mock-1", "headline": "Mock headline one", "analysisNote": "Wire report"},
                {"id": "s2", "outlet": "Associated Press", "type": "news", "url": "https://apnews.com/mock-2", "headline": "Mock headline two", "analysisNote": "Wire report"},
                {"id": "s3", "outlet": "BBC", "type": "analysis", "url": "https://www.bbc.com/mock-3", "headline": "Mock headline three", "analysisNote": "Broadcaster analysis"}
            ],
            "article": {"base": "This is a mock brief. It exists for local runs.", "eli5": "This is a pretend news story."},
            "summaryPoints": ["Mock summary point."],
            "confidenceLevel": "Medium",
            "topicHottness": "Low",
            "keyQuestions": [],
            "disagreements": []
        });
        Self::new(content.to_string())
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    async fn invoke(
        &self,
        _prompt: &Prompt,
        _tools: &[ToolSpec],
        cancel: &CancellationToken,
    ) -> Result<ProviderReply, ProviderError> {
        if cancel.is_cancelled() {
            return Err(ProviderError::Cancelled);
        }
        Ok(ProviderReply::ok(chat_completion_body(&self.content, "stop")))
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// Stands in when AI is switched off in config; every call is a config error.
pub struct DisabledProvider;

#[async_trait]
impl LlmProvider for DisabledProvider {
    async fn invoke(
        &self,
        _prompt: &Prompt,
        _tools: &[ToolSpec],
        _cancel: &CancellationToken,
    ) -> Result<ProviderReply, ProviderError> {
        Err(ProviderError::Config("AI is disabled in config".into()))
    }

    fn name(&self) -> &'static str {
        "disabled"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prompt() -> Prompt {
        Prompt {
            system: "s".into(),
            user: "u".into(),
        }
    }

    #[tokio::test]
    async fn openai_without_key_is_config_error() {
        let cfg = AiConfig {
            enabled: true,
            ..AiConfig::default()
        };
        let p = OpenAiProvider::new(&cfg).unwrap();
        let out = p
            .invoke(&prompt(), &[ToolSpec::WebSearch], &CancellationToken::new())
            .await;
        assert!(matches!(out, Err(ProviderError::Config(_))));
    }
}

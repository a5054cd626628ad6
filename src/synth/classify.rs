// src/synth/classify.rs
//! Maps one provider exchange onto an [`AttemptOutcome`].
//!
//! Precedence: structured provider error code > HTTP status / transport
//! failure > missing payload > parser failure > success.

use metrics::counter;
use serde_json::Value;
use tracing::debug;

use crate::synth::failure::FailureKind;
use crate::synth::orchestrator::{AttemptOutcome, RetryPolicy};
use crate::synth::parser::{self, ParseFailure};
use crate::synth::provider::{ProviderError, ProviderReply};

/// What the provider's response envelope carried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Envelope {
    Content { text: String, truncated: bool },
    ErrorCode(String),
    Empty,
}

/// Understands OpenAI chat completions and Anthropic messages bodies;
/// any other body, JSON or not, is treated as the model text itself.
pub fn decode_envelope(body: &str) -> Envelope {
    if body.trim().is_empty() {
        return Envelope::Empty;
    }
    let Ok(v) = serde_json::from_str::<Value>(body) else {
        return Envelope::Content {
            text: body.to_string(),
            truncated: false,
        };
    };
    if let Some(code) = error_code(&v) {
        return Envelope::ErrorCode(code);
    }

    let (text, truncated) = if let Some(choices) = v.get("choices") {
        let choice = choices.get(0);
        (
            choice
                .and_then(|c| c.pointer("/message/content"))
                .and_then(Value::as_str),
            choice.and_then(|c| c.get("finish_reason")).and_then(Value::as_str)
                == Some("length"),
        )
    } else if let Some(blocks) = v.get("content").and_then(Value::as_array) {
        (
            blocks
                .iter()
                .rev()
                .find(|b| b.get("type").and_then(Value::as_str) == Some("text"))
                .and_then(|b| b.get("text"))
                .and_then(Value::as_str),
            v.get("stop_reason").and_then(Value::as_str) == Some("max_tokens"),
        )
    } else {
        return Envelope::Content {
            text: body.to_string(),
            truncated: false,
        };
    };

    match text.map(str::trim) {
        Some(t) if !t.is_empty() => Envelope::Content {
            text: t.to_string(),
            truncated,
        },
        _ => Envelope::Empty,
    }
}

fn error_code(v: &Value) -> Option<String> {
    match v.get("error")? {
        Value::String(s) => Some(s.clone()),
        Value::Object(o) => Some(
            ["code", "type"]
                .iter()
                .find_map(|k| o.get(*k).and_then(Value::as_str))
                .unwrap_or("unknown")
                .to_string(),
        ),
        Value::Null => None,
        _ => Some("unknown".to_string()),
    }
}

/// Provider error codes we know how to act on.
pub fn kind_for_error_code(code: &str) -> FailureKind {
    match code.to_ascii_lowercase().as_str() {
        "rate_limit_exceeded" | "rate_limit_error" | "rate_limited" => FailureKind::RateLimited,
        "overloaded_error" | "server_error" | "api_error" | "service_unavailable" => {
            FailureKind::ProviderUnavailable
        }
        "context_length_exceeded" | "max_tokens_exceeded" | "token_limit_exceeded"
        | "request_too_large" => FailureKind::TokenLimitExceeded,
        "invalid_api_key" | "authentication_error" | "permission_error" | "insufficient_quota"
        | "model_not_found" | "invalid_request_error" => FailureKind::ConfigError,
        "timeout" | "request_timeout" => FailureKind::Timeout,
        "no_sources" | "no_articles_found" => FailureKind::NoSources,
        "insufficient_sources" => FailureKind::InsufficientSources,
        _ => FailureKind::Unknown,
    }
}

pub fn kind_for_status(status: u16) -> FailureKind {
    match status {
        429 => FailureKind::RateLimited,
        408 | 504 => FailureKind::Timeout,
        401 | 403 => FailureKind::ConfigError,
        413 => FailureKind::TokenLimitExceeded,
        500..=599 => FailureKind::ProviderUnavailable,
        _ => FailureKind::Unknown,
    }
}

pub fn classify(
    exchange: Result<ProviderReply, ProviderError>,
    policy: &RetryPolicy,
    attempt: u32,
) -> AttemptOutcome {
    let reply = match exchange {
        Ok(r) => r,
        Err(ProviderError::Cancelled) => return AttemptOutcome::Cancelled,
        Err(ProviderError::Timeout) => return policy.outcome_for(FailureKind::Timeout, attempt),
        Err(ProviderError::Network(e)) => {
            debug!(target: "synth", attempt, error = %e, "provider transport failure");
            return policy.outcome_for(FailureKind::ProviderUnavailable, attempt);
        }
        Err(ProviderError::Config(e)) => {
            debug!(target: "synth", attempt, error = %e, "provider misconfigured");
            return policy.outcome_for(FailureKind::ConfigError, attempt);
        }
    };

    let envelope = decode_envelope(&reply.body);

    if let Envelope::ErrorCode(code) = &envelope {
        let by_code = kind_for_error_code(code);
        let kind = match by_code {
            FailureKind::Unknown if !reply.is_ok() => kind_for_status(reply.status),
            k => k,
        };
        debug!(target: "synth", attempt, status = reply.status, code = %code, kind = kind.as_str(), "provider error code");
        return policy.outcome_for(kind, attempt);
    }

    if !reply.is_ok() {
        return policy.outcome_for(kind_for_status(reply.status), attempt);
    }

    let (text, truncated) = match envelope {
        Envelope::Content { text, truncated } => (text, truncated),
        _ => {
            debug!(target: "synth", attempt, "provider returned no content");
            return policy.outcome_for(FailureKind::ProviderUnavailable, attempt);
        }
    };

    match parser::parse_detailed(&text) {
        Ok(parsed) => {
            if parsed.repaired {
                counter!("synth_parse_repaired_total").increment(1);
            }
            AttemptOutcome::Success(parsed.result)
        }
        Err(failure) => {
            debug!(target: "synth", attempt, reason = failure.reason(), truncated, "parse failed");
            // A cut-off reply explains any structural shortfall, including lost sources.
            let kind = match failure {
                _ if truncated => FailureKind::TokenLimitExceeded,
                ParseFailure::InsufficientSources { valid: 0 } => FailureKind::NoSources,
                ParseFailure::InsufficientSources { .. } => FailureKind::InsufficientSources,
                _ => FailureKind::ParseFailure,
            };
            policy.outcome_for(kind, attempt)
        }
    }
}

// src/synth/failure.rs
//! Closed failure taxonomy and its user-facing wording.

use serde::{Deserialize, Serialize};

/// Drives both retry policy and user messaging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureKind {
    NoSources,
    InsufficientSources,
    RateLimited,
    ProviderUnavailable,
    ParseFailure,
    ConfigError,
    Timeout,
    TokenLimitExceeded,
    Cancelled,
    Unknown,
}

impl FailureKind {
    pub const ALL: [FailureKind; 10] = [
        FailureKind::NoSources,
        FailureKind::InsufficientSources,
        FailureKind::RateLimited,
        FailureKind::ProviderUnavailable,
        FailureKind::ParseFailure,
        FailureKind::ConfigError,
        FailureKind::Timeout,
        FailureKind::TokenLimitExceeded,
        FailureKind::Cancelled,
        FailureKind::Unknown,
    ];

    /// Short, non-technical text shown to end users. Part of the public contract.
    pub fn user_message(self) -> &'static str {
        match self {
            FailureKind::NoSources => "No current articles were found for this topic.",
            FailureKind::InsufficientSources => {
                "Not enough reliable sources were found to build a balanced brief."
            }
            FailureKind::RateLimited => {
                "The news service is busy right now. Please try again in a moment."
            }
            FailureKind::ProviderUnavailable => {
                "The news service is temporarily unavailable. Please try again shortly."
            }
            FailureKind::ParseFailure => {
                "We couldn't put together a readable brief this time. Please try again."
            }
            FailureKind::ConfigError => {
                "The service is not configured correctly. Please contact support."
            }
            FailureKind::Timeout => "The request took too long. Please try again.",
            FailureKind::TokenLimitExceeded => {
                "This topic produced too much material to summarize. Try a narrower topic."
            }
            FailureKind::Cancelled => "The request was cancelled.",
            FailureKind::Unknown => "Something went wrong. Please try again.",
        }
    }

    /// HTTP status used when the failure is surfaced by the API.
    pub fn http_status(self) -> u16 {
        match self {
            FailureKind::NoSources | FailureKind::InsufficientSources => 422,
            FailureKind::RateLimited => 503,
            FailureKind::ProviderUnavailable
            | FailureKind::ParseFailure
            | FailureKind::TokenLimitExceeded => 502,
            FailureKind::Timeout => 504,
            FailureKind::Cancelled => 409,
            FailureKind::ConfigError | FailureKind::Unknown => 500,
        }
    }

    /// Stable label for metrics and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::NoSources => "no_sources",
            FailureKind::InsufficientSources => "insufficient_sources",
            FailureKind::RateLimited => "rate_limited",
            FailureKind::ProviderUnavailable => "provider_unavailable",
            FailureKind::ParseFailure => "parse_failure",
            FailureKind::ConfigError => "config_error",
            FailureKind::Timeout => "timeout",
            FailureKind::TokenLimitExceeded => "token_limit_exceeded",
            FailureKind::Cancelled => "cancelled",
            FailureKind::Unknown => "unknown",
        }
    }
}

/// Error returned from `synthesize`. The message always comes from
/// [`FailureKind::user_message`], never from internal error text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{message}")]
pub struct SynthesisError {
    pub kind: FailureKind,
    pub message: String,
}

impl From<FailureKind> for SynthesisError {
    fn from(kind: FailureKind) -> Self {
        Self {
            kind,
            message: kind.user_message().to_string(),
        }
    }
}

impl SynthesisError {
    pub fn is_cancelled(&self) -> bool {
        self.kind == FailureKind::Cancelled
    }
}

// src/synth/types.rs
//! Request/result value objects shared by the parser, orchestrator and API.

use serde::{Deserialize, Serialize};

pub const DEFAULT_FRESHNESS_HOURS: u32 = 48;
pub const DEFAULT_TARGET_WORDS: u32 = 600;

const MAX_TOPIC_CHARS: usize = 200;
const MAX_OUTLETS: usize = 12;
const MIN_TARGET_WORDS: u32 = 100;
const MAX_TARGET_WORDS: u32 = 5_000;

fn default_freshness() -> u32 {
    DEFAULT_FRESHNESS_HOURS
}
fn default_target_words() -> u32 {
    DEFAULT_TARGET_WORDS
}

/// A news outlet the caller wants represented in the brief.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutletRef {
    pub name: String,
    /// Optional domain hint, e.g. "reuters.com".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
}

/// One logical "synthesize(topic)" call. Immutable once issued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SynthesisRequest {
    pub topic: String,
    #[serde(default)]
    pub target_outlets: Vec<OutletRef>,
    #[serde(default = "default_freshness")]
    pub freshness_horizon_hours: u32,
    #[serde(default = "default_target_words")]
    pub target_word_count: u32,
    #[serde(default)]
    pub include_extended_analysis: bool,
}

/// Why a request was refused before any remote work started.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidRequest {
    #[error("topic must not be empty")]
    EmptyTopic,
    #[error("topic is longer than 200 characters")]
    TopicTooLong,
    #[error("freshness horizon must be at least one hour")]
    ZeroFreshness,
    #[error("target word count must be between 100 and 5000")]
    WordCountOutOfRange,
    #[error("at most 12 target outlets are allowed")]
    TooManyOutlets,
}

impl SynthesisRequest {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            target_outlets: Vec::new(),
            freshness_horizon_hours: DEFAULT_FRESHNESS_HOURS,
            target_word_count: DEFAULT_TARGET_WORDS,
            include_extended_analysis: false,
        }
    }

    pub fn with_outlets<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.target_outlets = names
            .into_iter()
            .map(|n| OutletRef {
                name: n.into(),
                domain: None,
            })
            .collect();
        self
    }

    pub fn with_extended_analysis(mut self, on: bool) -> Self {
        self.include_extended_analysis = on;
        self
    }

    /// Check field ranges and return a copy with the topic trimmed.
    pub fn validated(&self) -> Result<Self, InvalidRequest> {
        let topic = self.topic.trim();
        if topic.is_empty() {
            return Err(InvalidRequest::EmptyTopic);
        }
        if topic.chars().count() > MAX_TOPIC_CHARS {
            return Err(InvalidRequest::TopicTooLong);
        }
        if self.freshness_horizon_hours == 0 {
            return Err(InvalidRequest::ZeroFreshness);
        }
        if !(MIN_TARGET_WORDS..=MAX_TARGET_WORDS).contains(&self.target_word_count) {
            return Err(InvalidRequest::WordCountOutOfRange);
        }
        if self.target_outlets.len() > MAX_OUTLETS {
            return Err(InvalidRequest::TooManyOutlets);
        }
        Ok(Self {
            topic: topic.to_string(),
            ..self.clone()
        })
    }
}

/// Three-valued rating used for confidence and topic heat.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Level {
    High,
    #[default]
    Medium,
    Low,
}

impl Level {
    /// Lenient parse; anything unrecognized is `None` so callers pick the default.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" => Some(Level::High),
            "medium" | "med" => Some(Level::Medium),
            "low" => Some(Level::Low),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    pub id: String,
    pub outlet: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub url: String,
    pub headline: String,
    /// RFC 3339 timestamp when the model supplied a parseable one.
    pub published_at: Option<String>,
    pub analysis_note: String,
}

/// Article bodies keyed by reading level. `eli5` falls back to `base` when absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    pub base: String,
    pub eli5: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phd: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Disagreement {
    pub point_of_contention: String,
    pub details: String,
    pub likely_reason: String,
}

/// Fully normalized brief. Every field is populated so it can be rendered as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SynthesisResult {
    pub sources: Vec<Source>,
    pub article: Article,
    pub summary_points: Vec<String>,
    pub confidence_level: Level,
    pub topic_hottness: Level,
    pub key_questions: Vec<String>,
    pub disagreements: Vec<Disagreement>,
}

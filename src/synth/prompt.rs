// src/synth/prompt.rs
use crate::synth::provider::{Prompt, ToolSpec};
use crate::synth::types::SynthesisRequest;

const SYSTEM: &str = "You are a news editor. Search for current reporting on the topic and return ONE JSON object only, no prose, with keys: sources (array of {id, outlet, type, url, headline, publishedAt, analysisNote}), article ({base, eli5, phd?}), summaryPoints, confidenceLevel (High|Medium|Low), topicHottness (High|Medium|Low), keyQuestions, disagreements (array of {pointOfContention, details, likelyReason}). Use at least 3 distinct sources with real absolute URLs.";

pub fn build_prompt(req: &SynthesisRequest) -> Prompt {
    let mut user = format!(
        "Topic: {}\nOnly use articles published in the last {} hours.\nTarget length of article.base: about {} words.",
        req.topic, req.freshness_horizon_hours, req.target_word_count
    );
    if !req.target_outlets.is_empty() {
        let names = req
            .target_outlets
            .iter()
            .map(|o| match &o.domain {
                Some(d) => format!("{} ({d})", o.name),
                None => o.name.clone(),
            })
            .collect::<Vec<_>>()
            .join(", ");
        user.push_str(&format!("\nPrefer these outlets: {names}."));
    }
    if req.include_extended_analysis {
        user.push_str("\nAlso include article.phd: an expert-level analysis.");
    }
    Prompt {
        system: SYSTEM.to_string(),
        user,
    }
}

pub fn tools_for(_req: &SynthesisRequest) -> Vec<ToolSpec> {
    vec![ToolSpec::WebSearch]
}

// tests/parser_recovery.rs
//
// Recovery parser properties over realistic model output.
//
// Covered:
// - idempotence
// - truncation at every char boundary never panics; any Ok keeps >= 3 sources
// - 0..=2 valid sources always fail as insufficient-sources
// - prose + fence + truncated mid-string payload repairs to a full result

use news_brief_synth::synth::parser::{parse, parse_detailed, ParseFailure, MIN_VALID_SOURCES};
use news_brief_synth::synth::types::Level;
use serde_json::json;

fn source(n: usize) -> serde_json::Value {
    json!({
        "id": format!("s{n}"),
        "outlet": format!("Outlet {n}"),
        "type": "news",
        "url": format!("https://news{n}.example.com/story/{n}"),
        "headline": format!("Headline number {n}"),
        "publishedAt": "2026-02-11T08:30:00Z",
        "analysisNote": "Straight report"
    })
}

fn full_payload() -> String {
    json!({
        "sources": [source(1), source(2), source(3), source(4)],
        "article": {
            "base": "Regulators met on Tuesday. They agreed on a framework.",
            "eli5": "Some rule makers talked and agreed.",
            "phd": "A long-form treatment."
        },
        "summaryPoints": ["Regulators agreed a framework.", "Details follow in spring."],
        "confidenceLevel": "High",
        "topicHottness": "Medium",
        "keyQuestions": ["Who enforces it?"],
        "disagreements": [{
            "pointOfContention": "Timeline",
            "details": "Outlets differ on the start date.",
            "likelyReason": "Draft text is ambiguous."
        }]
    })
    .to_string()
}

#[test]
fn parse_is_idempotent() {
    let raw = format!("Here you go:\n```json\n{}\n```\nHope this helps!", full_payload());
    let a = parse(&raw).expect("first parse");
    let b = parse(&raw).expect("second parse");
    assert_eq!(a, b);
    assert_eq!(a.sources.len(), 4);
    assert_eq!(a.confidence_level, Level::High);
}

#[test]
fn truncation_at_any_offset_is_sound() {
    let raw = full_payload();
    let mut oks = 0usize;
    for (i, _) in raw.char_indices().chain(std::iter::once((raw.len(), ' '))) {
        if let Ok(r) = parse(&raw[..i]) {
            oks += 1;
            assert!(
                r.sources.len() >= MIN_VALID_SOURCES,
                "offset {i}: {} sources",
                r.sources.len()
            );
            assert!(!r.article.base.is_empty(), "offset {i}: empty base");
        }
    }
    // At least the untruncated payload parses.
    assert!(oks >= 1);
    assert!(parse(&raw).is_ok());
}

#[test]
fn fewer_than_three_valid_sources_always_fail() {
    for n in 0..MIN_VALID_SOURCES {
        let sources: Vec<_> = (1..=n).map(source).collect();
        let raw = json!({
            "sources": sources,
            "article": { "base": "Body." }
        })
        .to_string();
        assert_eq!(
            parse(&raw),
            Err(ParseFailure::InsufficientSources { valid: n }),
            "{n} sources"
        );
    }
}

#[test]
fn invalid_sources_do_not_count() {
    let raw = json!({
        "sources": [
            source(1),
            source(2),
            { "outlet": "No Url", "headline": "h" },
            { "outlet": "Bad Url", "headline": "h", "url": "javascript:alert(1)" },
            { "outlet": "", "headline": "h", "url": "https://x.example.com/a" },
        ],
        "article": { "base": "Body." }
    })
    .to_string();
    assert_eq!(
        parse(&raw).map(|r| r.sources.len()),
        Err(ParseFailure::InsufficientSources { valid: 2 })
    );
}

#[test]
fn prose_fence_and_truncated_string_repairs() {
    let sources = json!([source(1), source(2), source(3)]).to_string();
    let raw = format!(
        "Sure! ```json\n{{\"sources\":{sources}, \"article\":{{\"base\":\"The summit closed without a joint statement and"
    );

    let parsed = parse_detailed(&raw).expect("repairable");
    assert!(parsed.repaired);
    let r = parsed.result;
    assert_eq!(r.sources.len(), 3);
    assert_eq!(
        r.article.base,
        "The summit closed without a joint statement and"
    );
    assert_eq!(r.article.eli5, r.article.base);
    assert_eq!(r.confidence_level, Level::Medium);
    assert_eq!(r.topic_hottness, Level::Medium);
    assert!(r.key_questions.is_empty());
    assert!(r.disagreements.is_empty());
    assert_eq!(r.summary_points.len(), 1);
}

#[test]
fn no_brace_is_no_structure() {
    assert_eq!(
        parse("I could not find any coverage of that topic."),
        Err(ParseFailure::NoStructureFound)
    );
}

// src/synth/parser.rs
//! Recovery parser: turns a free-text model reply into a normalized [`SynthesisResult`].
//!
//! Pipeline:
//! 1) trim + strip leading/trailing code fences
//! 2) slice from the first `{` to the last `}`
//! 3) direct JSON parse
//! 4) on failure, a single linear repair pass (truncate to the first complete
//!    top-level object, or close whatever is still open) and one more parse
//! 5) normalization: filter sources, cap lengths, fill defaults
//!
//! Pure and synchronous; no I/O, no clock, no global state.

use chrono::{DateTime, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::HashSet;

use crate::synth::types::{Article, Disagreement, Level, Source, SynthesisResult};

pub const MIN_VALID_SOURCES: usize = 3;

const PREVIEW_CHARS: usize = 200;
const MAX_SOURCES: usize = 20;
const MAX_SUMMARY_POINTS: usize = 5;
const MAX_KEY_QUESTIONS: usize = 5;
const MAX_DISAGREEMENTS: usize = 3;

const MAX_ID_CHARS: usize = 64;
const MAX_OUTLET_CHARS: usize = 120;
const MAX_TYPE_CHARS: usize = 40;
const MAX_URL_CHARS: usize = 2_048;
const MAX_HEADLINE_CHARS: usize = 300;
const MAX_NOTE_CHARS: usize = 1_000;
const MAX_ARTICLE_CHARS: usize = 20_000;
const MAX_POINT_CHARS: usize = 280;
const MAX_QUESTION_CHARS: usize = 300;
const MAX_DISAGREEMENT_CHARS: usize = 600;

static LEADING_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^```[a-z0-9_+-]*").expect("leading fence regex"));
static TRAILING_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"```\s*$").expect("trailing fence regex"));
static ABSOLUTE_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^https?://[a-z0-9](?:[a-z0-9.-]*[a-z0-9])?(?::\d{1,5})?(?:[/?#]\S*)?$")
        .expect("absolute url regex")
});

/// Structural failure. Never a panic, never an I/O error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseFailure {
    #[error("no-structure-found")]
    NoStructureFound,
    #[error("unrecoverable")]
    Unrecoverable { preview: String },
    #[error("insufficient-sources")]
    InsufficientSources { valid: usize },
    #[error("missing-article")]
    MissingArticle,
}

impl ParseFailure {
    pub fn reason(&self) -> &'static str {
        match self {
            ParseFailure::NoStructureFound => "no-structure-found",
            ParseFailure::Unrecoverable { .. } => "unrecoverable",
            ParseFailure::InsufficientSources { .. } => "insufficient-sources",
            ParseFailure::MissingArticle => "missing-article",
        }
    }
}

/// Parse result plus whether the repair pass was needed.
#[derive(Debug, Clone, PartialEq)]
pub struct Parsed {
    pub result: SynthesisResult,
    pub repaired: bool,
}

pub fn parse(raw: &str) -> Result<SynthesisResult, ParseFailure> {
    parse_detailed(raw).map(|p| p.result)
}

pub fn parse_detailed(raw: &str) -> Result<Parsed, ParseFailure> {
    let text = strip_fences(raw.trim());
    let start = text.find('{').ok_or(ParseFailure::NoStructureFound)?;
    let tail = &text[start..];

    if let Some(end) = tail.rfind('}') {
        if let Ok(value) = serde_json::from_str::<Value>(&tail[..=end]) {
            return match value.as_object() {
                Some(obj) => normalize(obj).map(|result| Parsed {
                    result,
                    repaired: false,
                }),
                None => Err(unrecoverable(raw)),
            };
        }
    }

    // The repair pass sees everything after the first `{`: a truncated reply
    // has no closing brace for its outer object, and slicing at the last `}`
    // would throw away the partially written tail.
    let candidate = repair(tail);
    match serde_json::from_str::<Value>(&candidate) {
        Ok(Value::Object(obj)) => normalize(&obj).map(|result| Parsed {
            result,
            repaired: true,
        }),
        _ => Err(unrecoverable(raw)),
    }
}

fn unrecoverable(raw: &str) -> ParseFailure {
    ParseFailure::Unrecoverable {
        preview: raw.chars().take(PREVIEW_CHARS).collect(),
    }
}

fn strip_fences(s: &str) -> &str {
    let s = match LEADING_FENCE.find(s) {
        Some(m) => &s[m.end()..],
        None => s,
    };
    let s = match TRAILING_FENCE.find(s) {
        Some(m) => &s[..m.start()],
        None => s,
    };
    s.trim()
}

/* ----------------------------
Repair
---------------------------- */

#[derive(Debug, Default)]
struct Scan {
    in_string: bool,
    escape_next: bool,
    /// Expected closers for every open container, innermost last.
    open: Vec<u8>,
    last_string_start: Option<usize>,
    complete_at: Option<usize>,
}

impl Scan {
    fn run(input: &str) -> Self {
        let mut st = Scan::default();
        for (i, &b) in input.as_bytes().iter().enumerate() {
            if st.in_string {
                if st.escape_next {
                    st.escape_next = false;
                } else if b == b'\\' {
                    st.escape_next = true;
                } else if b == b'"' {
                    st.in_string = false;
                }
                continue;
            }
            match b {
                b'"' => {
                    st.in_string = true;
                    st.last_string_start = Some(i);
                }
                b'{' => st.open.push(b'}'),
                b'[' => st.open.push(b']'),
                b'}' | b']' => {
                    if st.open.pop().is_some() && st.open.is_empty() {
                        st.complete_at = Some(i + 1);
                        break;
                    }
                }
                _ => {}
            }
        }
        st
    }
}

/// `input` starts at the first `{`. Output is linear in the input length.
fn repair(input: &str) -> String {
    let scan = Scan::run(input);

    let mut out = match scan.complete_at {
        Some(end) => input[..end].to_string(),
        None => close_open(input, &scan),
    };
    strip_trailing_commas(&mut out);
    out
}

fn close_open(input: &str, scan: &Scan) -> String {
    let mut out = input.to_string();
    if scan.in_string {
        if scan.escape_next {
            out.pop();
        }
        out.push('"');
    }

    trim_dangling(&mut out, scan);

    for closer in scan.open.iter().rev() {
        out.push(*closer as char);
    }
    out
}

/// Remove a half-written member at the cut point so the closers can follow it.
fn trim_dangling(out: &mut String, scan: &Scan) {
    truncate_ws(out);

    // A bare key with no value: `{"a":1, "b"` or `{"b` (closed above).
    if out.ends_with('"') && scan.open.last() == Some(&b'}') {
        if let Some(start) = scan.last_string_start {
            let before = out[..start].trim_end();
            if before.ends_with('{') || before.ends_with(',') {
                out.truncate(start);
                truncate_ws(out);
            }
        }
    }

    // A literal cut mid-token: `tru`, `nul`, `-`, `1e`.
    let tok_start = out
        .char_indices()
        .rev()
        .find(|(_, c)| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '+' | '-')))
        .map(|(i, c)| i + c.len_utf8())
        .unwrap_or(0);
    if tok_start < out.len() && !out.ends_with('"') {
        let tok = &out[tok_start..];
        let complete = matches!(tok, "true" | "false" | "null")
            || (tok.ends_with(|c: char| c.is_ascii_digit()) && tok.parse::<f64>().is_ok());
        if !complete {
            out.truncate(tok_start);
            truncate_ws(out);
        }
    }

    if out.ends_with(':') {
        out.push_str("null");
    } else if out.ends_with(',') {
        out.pop();
    }
}

fn truncate_ws(s: &mut String) {
    let len = s.trim_end().len();
    s.truncate(len);
}

/// Drop `,` that directly precedes (modulo whitespace) a `}` or `]`, outside strings.
fn strip_trailing_commas(s: &mut String) {
    let bytes = s.as_bytes();
    let mut drop = Vec::new();
    let mut in_string = false;
    let mut escape_next = false;
    let mut pending_comma: Option<usize> = None;

    for (i, &b) in bytes.iter().enumerate() {
        if in_string {
            if escape_next {
                escape_next = false;
            } else if b == b'\\' {
                escape_next = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b',' => {
                pending_comma = Some(i);
                continue;
            }
            b'}' | b']' => {
                if let Some(at) = pending_comma {
                    drop.push(at);
                }
            }
            b'"' => in_string = true,
            _ => {}
        }
        if !b.is_ascii_whitespace() {
            pending_comma = None;
        }
    }

    if drop.is_empty() {
        return;
    }
    let mut out = String::with_capacity(s.len());
    let mut from = 0;
    for at in drop {
        out.push_str(&s[from..at]);
        from = at + 1;
    }
    out.push_str(&s[from..]);
    *s = out;
}

/* ----------------------------
Normalization
---------------------------- */

fn normalize(obj: &Map<String, Value>) -> Result<SynthesisResult, ParseFailure> {
    let sources = normalize_sources(obj.get("sources"));
    if sources.len() < MIN_VALID_SOURCES {
        return Err(ParseFailure::InsufficientSources {
            valid: sources.len(),
        });
    }

    let article = normalize_article(obj.get("article")).ok_or(ParseFailure::MissingArticle)?;

    let mut summary_points = string_list(
        obj.get("summaryPoints"),
        MAX_SUMMARY_POINTS,
        MAX_POINT_CHARS,
    );
    if summary_points.is_empty() {
        summary_points.push(first_sentence(&article.base, MAX_POINT_CHARS));
    }

    let confidence_level = level_field(obj, &["confidenceLevel"]);
    let topic_hottness = level_field(obj, &["topicHottness", "topicHotness"]);
    let key_questions = string_list(
        obj.get("keyQuestions"),
        MAX_KEY_QUESTIONS,
        MAX_QUESTION_CHARS,
    );
    let disagreements = normalize_disagreements(obj.get("disagreements"));

    Ok(SynthesisResult {
        sources,
        article,
        summary_points,
        confidence_level,
        topic_hottness,
        key_questions,
        disagreements,
    })
}

fn normalize_sources(v: Option<&Value>) -> Vec<Source> {
    let Some(items) = v.and_then(Value::as_array) else {
        return Vec::new();
    };

    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for item in items {
        let Some(o) = item.as_object() else { continue };

        let Some(url) = text(o, &["url", "link"]) else {
            continue;
        };
        if url.chars().count() > MAX_URL_CHARS || !ABSOLUTE_URL.is_match(&url) {
            continue;
        }
        let Some(outlet) = text(o, &["outlet", "source"]) else {
            continue;
        };
        let Some(headline) = text(o, &["headline", "title"]) else {
            continue;
        };
        if !seen.insert(url.to_ascii_lowercase()) {
            continue;
        }

        let idx = out.len() + 1;
        out.push(Source {
            id: text(o, &["id"])
                .map(|s| clip(&s, MAX_ID_CHARS))
                .unwrap_or_else(|| format!("src-{idx}")),
            outlet: clip_line(&outlet, MAX_OUTLET_CHARS),
            kind: text(o, &["type"])
                .map(|s| clip_line(&s.to_ascii_lowercase(), MAX_TYPE_CHARS))
                .unwrap_or_else(|| "news".to_string()),
            url,
            headline: clip_line(&headline, MAX_HEADLINE_CHARS),
            published_at: text(o, &["publishedAt", "published_at", "date"])
                .and_then(|s| normalize_timestamp(&s)),
            analysis_note: text(o, &["analysisNote", "analysis", "note"])
                .map(|s| clip(&s, MAX_NOTE_CHARS))
                .unwrap_or_default(),
        });
        if out.len() == MAX_SOURCES {
            break;
        }
    }
    out
}

fn normalize_article(v: Option<&Value>) -> Option<Article> {
    let (base, eli5, phd) = match v? {
        Value::String(s) => (non_empty(s), None, None),
        Value::Object(o) => (
            text(o, &["base"]),
            text(o, &["eli5"]),
            text(o, &["phd"]),
        ),
        _ => return None,
    };
    let base = clip(&base?, MAX_ARTICLE_CHARS);
    Some(Article {
        eli5: eli5
            .map(|s| clip(&s, MAX_ARTICLE_CHARS))
            .unwrap_or_else(|| base.clone()),
        phd: phd.map(|s| clip(&s, MAX_ARTICLE_CHARS)),
        base,
    })
}

fn normalize_disagreements(v: Option<&Value>) -> Vec<Disagreement> {
    let Some(items) = v.and_then(Value::as_array) else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(Value::as_object)
        .filter_map(|o| {
            Some(Disagreement {
                point_of_contention: clip_line(
                    &text(o, &["pointOfContention", "point"])?,
                    MAX_DISAGREEMENT_CHARS,
                ),
                details: text(o, &["details"])
                    .map(|s| clip(&s, MAX_DISAGREEMENT_CHARS))
                    .unwrap_or_default(),
                likely_reason: text(o, &["likelyReason", "reason"])
                    .map(|s| clip(&s, MAX_DISAGREEMENT_CHARS))
                    .unwrap_or_default(),
            })
        })
        .take(MAX_DISAGREEMENTS)
        .collect()
}

fn level_field(o: &Map<String, Value>, keys: &[&str]) -> Level {
    text(o, keys)
        .and_then(|s| Level::parse(&s))
        .unwrap_or_default()
}

fn string_list(v: Option<&Value>, max_items: usize, max_chars: usize) -> Vec<String> {
    let Some(items) = v.and_then(Value::as_array) else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(Value::as_str)
        .filter_map(non_empty)
        .map(|s| clip_line(&s, max_chars))
        .take(max_items)
        .collect()
}

/// First non-empty string (or number) under any of `keys`, trimmed.
fn text(o: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| match o.get(*k)? {
        Value::String(s) => non_empty(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn non_empty(s: &str) -> Option<String> {
    let t = s.trim();
    (!t.is_empty()).then(|| t.to_string())
}

fn normalize_timestamp(s: &str) -> Option<String> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.to_rfc3339());
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .map(|d| format!("{}T00:00:00+00:00", d.format("%Y-%m-%d")))
}

fn clip(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((i, _)) => s[..i].trim_end().to_string(),
        None => s.to_string(),
    }
}

/// Single line, collapsed whitespace, at most `max` chars.
fn clip_line(s: &str, max: usize) -> String {
    let collapsed = s.split_whitespace().collect::<Vec<_>>().join(" ");
    clip(&collapsed, max)
}

fn first_sentence(body: &str, max: usize) -> String {
    let end = body
        .find(['.', '!', '?'])
        .map(|i| i + 1)
        .unwrap_or(body.len());
    clip_line(&body[..end], max)
}

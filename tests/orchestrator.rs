// tests/orchestrator.rs
//
// End-to-end orchestrator behaviour against scripted providers, on a paused
// clock so backoff timing is exact and the suite runs instantly.
//
// Covered:
// - retry bound (exactly 3 calls) and linear / rate-limited backoff timing
// - transient failure followed by success
// - fatal kinds stop after one call
// - cancellation before, during, and racing the reply; cancel during backoff
// - per-attempt timeout

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

mod helpers;

use helpers::{ScriptedProvider, Step};
use news_brief_synth::synth::orchestrator::{Orchestrator, RetryPolicy};
use news_brief_synth::synth::provider::{
    chat_completion_body, LlmProvider, Prompt, ProviderError, ProviderReply, ToolSpec,
};
use news_brief_synth::synth::{FailureKind, SynthesisRequest};

fn brief(n_sources: usize) -> String {
    let sources: Vec<_> = (1..=n_sources)
        .map(|i| {
            json!({
                "outlet": format!("Outlet {i}"),
                "url": format!("https://outlet{i}.example.org/a/{i}"),
                "headline": format!("Story {i}"),
            })
        })
        .collect();
    json!({
        "sources": sources,
        "article": { "base": "Talks resumed today. More soon." },
    })
    .to_string()
}

fn request() -> SynthesisRequest {
    SynthesisRequest::new("port labour dispute")
}

fn assert_elapsed(started: Instant, secs: u64) {
    let e = started.elapsed();
    assert!(
        e >= Duration::from_secs(secs) && e < Duration::from_secs(secs + 1),
        "elapsed {e:?}, expected ~{secs}s"
    );
}

fn orchestrator(p: &Arc<ScriptedProvider>) -> Orchestrator {
    Orchestrator::new(p.clone(), RetryPolicy::default())
}

#[tokio::test(start_paused = true)]
async fn always_transient_makes_exactly_three_calls() {
    let p = Arc::new(ScriptedProvider::new(vec![Step::reply(503, "upstream busy")]));
    let started = Instant::now();

    let err = orchestrator(&p)
        .synthesize(&request(), &CancellationToken::new())
        .await
        .expect_err("should exhaust retries");

    assert_eq!(err.kind, FailureKind::ProviderUnavailable);
    assert_eq!(err.message, FailureKind::ProviderUnavailable.user_message());
    assert_eq!(p.calls(), 3);
    // 1 * 2s + 2 * 2s
    assert_elapsed(started, 6);
}

#[tokio::test(start_paused = true)]
async fn rate_limited_waits_fixed_delay() {
    let p = Arc::new(ScriptedProvider::new(vec![Step::reply(429, "slow down")]));
    let started = Instant::now();

    let err = orchestrator(&p)
        .synthesize(&request(), &CancellationToken::new())
        .await
        .expect_err("rate limited throughout");

    assert_eq!(err.kind, FailureKind::RateLimited);
    assert_eq!(p.calls(), 3);
    assert_elapsed(started, 6);
}

#[tokio::test(start_paused = true)]
async fn transient_then_success() {
    let p = Arc::new(ScriptedProvider::new(vec![
        Step::error(ProviderError::Network("connection reset".into())),
        Step::content(&brief(3)),
    ]));

    let out = orchestrator(&p)
        .synthesize(&request(), &CancellationToken::new())
        .await
        .expect("second attempt succeeds");

    assert_eq!(out.sources.len(), 3);
    assert_eq!(p.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn fatal_kinds_are_not_retried() {
    let cases = vec![
        (Step::reply(401, "bad key"), FailureKind::ConfigError),
        (Step::content(&brief(1)), FailureKind::InsufficientSources),
        (Step::content(&brief(0)), FailureKind::NoSources),
        (
            Step::content("I'm sorry, I can't help with that."),
            FailureKind::ParseFailure,
        ),
        (
            Step::reply(200, chat_completion_body(r#"{"sources": [{"outlet": "A"#, "length")),
            FailureKind::TokenLimitExceeded,
        ),
        (
            Step::reply(
                400,
                json!({"error": {"code": "context_length_exceeded", "message": "too long"}})
                    .to_string(),
            ),
            FailureKind::TokenLimitExceeded,
        ),
    ];

    for (step, expected) in cases {
        let p = Arc::new(ScriptedProvider::new(vec![step]));
        let err = orchestrator(&p)
            .synthesize(&request(), &CancellationToken::new())
            .await
            .expect_err("fatal");
        assert_eq!(err.kind, expected);
        assert_eq!(p.calls(), 1, "{expected:?} must not retry");
    }
}

#[tokio::test(start_paused = true)]
async fn already_cancelled_never_calls_provider() {
    let p = Arc::new(ScriptedProvider::new(vec![Step::content(&brief(3))]));
    let token = CancellationToken::new();
    token.cancel();

    let err = orchestrator(&p)
        .synthesize(&request(), &token)
        .await
        .expect_err("cancelled");

    assert!(err.is_cancelled());
    assert_eq!(p.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn cancel_during_call_wins_over_pending_success() {
    let p = Arc::new(ScriptedProvider::new(vec![
        Step::content(&brief(3)).after(Duration::from_secs(10)),
    ]));
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        trigger.cancel();
    });
    let started = Instant::now();

    let err = orchestrator(&p)
        .synthesize(&request(), &token)
        .await
        .expect_err("cancelled");

    assert_eq!(err.kind, FailureKind::Cancelled);
    assert_eq!(p.calls(), 1);
    assert!(started.elapsed() < Duration::from_secs(10));
}

/// Answers successfully, but only after the caller's cancel has landed.
struct AnswersAfterCancel;

#[async_trait]
impl LlmProvider for AnswersAfterCancel {
    async fn invoke(
        &self,
        _prompt: &Prompt,
        _tools: &[ToolSpec],
        cancel: &CancellationToken,
    ) -> Result<ProviderReply, ProviderError> {
        cancel.cancel();
        Ok(ProviderReply::ok(chat_completion_body(&brief(3), "stop")))
    }

    fn name(&self) -> &'static str {
        "answers-after-cancel"
    }
}

#[tokio::test]
async fn late_reply_after_cancel_is_discarded() {
    let orch = Orchestrator::new(Arc::new(AnswersAfterCancel), RetryPolicy::default());
    let err = orch
        .synthesize(&request(), &CancellationToken::new())
        .await
        .expect_err("discarded");
    assert!(err.is_cancelled());
}

#[tokio::test(start_paused = true)]
async fn cancel_during_backoff() {
    let p = Arc::new(ScriptedProvider::new(vec![Step::reply(502, "bad gateway")]));
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        trigger.cancel();
    });

    let err = orchestrator(&p)
        .synthesize(&request(), &token)
        .await
        .expect_err("cancelled in backoff");

    assert!(err.is_cancelled());
    assert_eq!(p.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn slow_provider_times_out_per_attempt() {
    let p = Arc::new(ScriptedProvider::new(vec![
        Step::content(&brief(3)).after(Duration::from_secs(600)),
    ]));
    let policy = RetryPolicy {
        attempt_timeout: Duration::from_secs(5),
        ..RetryPolicy::default()
    };
    let started = Instant::now();

    let err = Orchestrator::new(p.clone(), policy)
        .synthesize(&request(), &CancellationToken::new())
        .await
        .expect_err("timeouts");

    assert_eq!(err.kind, FailureKind::Timeout);
    assert_eq!(p.calls(), 3);
    // three 5s attempts plus 2s and 4s of backoff
    assert_elapsed(started, 21);
}

// src/synth/orchestrator.rs
//! Request orchestrator: drives one logical synthesis through at most
//! [`MAX_ATTEMPTS`] provider calls.
//!
//! The retry loop is an explicit state machine. [`transition`] is the single,
//! pure transition function; [`Orchestrator::synthesize`] only performs the
//! side effects each state asks for (call the provider, sleep, return).
//!
//! Cancellation is observed before each call, during the call (the token is
//! passed to the provider and raced against it), right after the call returns
//! (late results are discarded), and during backoff.

use std::time::{Duration, Instant};

use metrics::{counter, histogram};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::synth::classify::classify;
use crate::synth::failure::{FailureKind, SynthesisError};
use crate::synth::prompt::{build_prompt, tools_for};
use crate::synth::provider::{DynProvider, Prompt, ProviderError, ToolSpec};
use crate::synth::types::{SynthesisRequest, SynthesisResult};
use crate::telemetry::anon_hash;

/// One initial attempt plus two retries.
pub const MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Retry `n` waits `n * backoff_step`.
    pub backoff_step: Duration,
    pub rate_limited_delay: Duration,
    /// Per-call ceiling, independent of caller cancellation.
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS,
            backoff_step: Duration::from_secs(2),
            rate_limited_delay: Duration::from_secs(3),
            attempt_timeout: Duration::from_secs(90),
        }
    }
}

impl RetryPolicy {
    /// Only these kinds can change outcome on a fresh call.
    pub fn is_transient(kind: FailureKind) -> bool {
        matches!(
            kind,
            FailureKind::RateLimited | FailureKind::ProviderUnavailable | FailureKind::Timeout
        )
    }

    /// Wait before the attempt following `attempt` (1-based).
    pub fn delay_for(&self, kind: FailureKind, attempt: u32) -> Duration {
        match kind {
            FailureKind::RateLimited => self.rate_limited_delay,
            _ => self.backoff_step.saturating_mul(attempt),
        }
    }

    pub fn outcome_for(&self, kind: FailureKind, attempt: u32) -> AttemptOutcome {
        if kind == FailureKind::Cancelled {
            AttemptOutcome::Cancelled
        } else if Self::is_transient(kind) {
            AttemptOutcome::RetryableFailure(kind, self.delay_for(kind, attempt))
        } else {
            AttemptOutcome::FatalFailure(kind)
        }
    }
}

/// Result of one attempt; consumed immediately by the state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    Success(SynthesisResult),
    RetryableFailure(FailureKind, Duration),
    FatalFailure(FailureKind),
    Cancelled,
}

#[derive(Debug, Clone, PartialEq)]
pub enum State {
    Idle,
    Attempting {
        attempt: u32,
    },
    /// `attempt` is the attempt that just failed.
    Retrying {
        attempt: u32,
        kind: FailureKind,
        delay: Duration,
    },
    Succeeded(SynthesisResult),
    Failed(FailureKind),
    Cancelled,
}

impl State {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            State::Succeeded(_) | State::Failed(_) | State::Cancelled
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Start,
    Attempt(AttemptOutcome),
    BackoffElapsed,
    CancelObserved,
}

pub fn transition(state: State, event: Event, policy: &RetryPolicy) -> State {
    use State::*;
    match (state, event) {
        (s, _) if s.is_terminal() => s,
        (_, Event::CancelObserved) => Cancelled,

        (Idle, Event::Start) => Attempting { attempt: 1 },

        (Attempting { .. }, Event::Attempt(AttemptOutcome::Success(r))) => Succeeded(r),
        (Attempting { .. }, Event::Attempt(AttemptOutcome::Cancelled)) => Cancelled,
        (Attempting { .. }, Event::Attempt(AttemptOutcome::FatalFailure(kind))) => Failed(kind),
        (Attempting { attempt }, Event::Attempt(AttemptOutcome::RetryableFailure(kind, delay))) => {
            if attempt < policy.max_attempts {
                Retrying {
                    attempt,
                    kind,
                    delay,
                }
            } else {
                Failed(kind)
            }
        }

        (Retrying { attempt, .. }, Event::BackoffElapsed) => Attempting {
            attempt: attempt + 1,
        },

        (s, e) => {
            warn!(target: "synth", state = ?s, event = ?e, "invalid orchestrator transition");
            Failed(FailureKind::Unknown)
        }
    }
}

/// Owns the provider handle and retry policy; cheap to share behind an `Arc`.
pub struct Orchestrator {
    provider: DynProvider,
    policy: RetryPolicy,
}

impl Orchestrator {
    pub fn new(provider: DynProvider, policy: RetryPolicy) -> Self {
        Self { provider, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    /// One logical call in, exactly one terminal outcome out.
    pub async fn synthesize(
        &self,
        request: &SynthesisRequest,
        cancel: &CancellationToken,
    ) -> Result<SynthesisResult, SynthesisError> {
        let started = Instant::now();
        let id = anon_hash(&request.topic);
        let prompt = build_prompt(request);
        let tools = tools_for(request);

        let mut state = transition(State::Idle, Event::Start, &self.policy);
        let outcome = loop {
            state = match state {
                State::Attempting { attempt } => {
                    let event = if cancel.is_cancelled() {
                        Event::CancelObserved
                    } else {
                        Event::Attempt(self.attempt(&prompt, &tools, attempt, cancel).await)
                    };
                    transition(State::Attempting { attempt }, event, &self.policy)
                }
                State::Retrying {
                    attempt,
                    kind,
                    delay,
                } => {
                    info!(
                        target: "synth",
                        %id, attempt, kind = kind.as_str(), delay_ms = delay.as_millis() as u64,
                        "retrying after transient failure"
                    );
                    let event = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => Event::CancelObserved,
                        _ = tokio::time::sleep(delay) => Event::BackoffElapsed,
                    };
                    let from = State::Retrying {
                        attempt,
                        kind,
                        delay,
                    };
                    transition(from, event, &self.policy)
                }
                State::Idle => transition(State::Idle, Event::Start, &self.policy),
                State::Succeeded(result) => break Ok(result),
                State::Failed(kind) => break Err(SynthesisError::from(kind)),
                State::Cancelled => break Err(SynthesisError::from(FailureKind::Cancelled)),
            };
        };

        let label = match &outcome {
            Ok(_) => "succeeded",
            Err(e) if e.is_cancelled() => "cancelled",
            Err(_) => "failed",
        };
        counter!("synth_outcomes_total", "outcome" => label).increment(1);
        histogram!("synth_duration_ms").record(started.elapsed().as_millis() as f64);
        match &outcome {
            Ok(r) => info!(target: "synth", %id, sources = r.sources.len(), "synthesis succeeded"),
            Err(e) => info!(target: "synth", %id, outcome = label, kind = e.kind.as_str(), "synthesis ended"),
        }
        outcome
    }

    async fn attempt(
        &self,
        prompt: &Prompt,
        tools: &[ToolSpec],
        attempt: u32,
        cancel: &CancellationToken,
    ) -> AttemptOutcome {
        counter!("synth_attempts_total").increment(1);

        let call = tokio::time::timeout(
            self.policy.attempt_timeout,
            self.provider.invoke(prompt, tools, cancel),
        );
        let exchange = tokio::select! {
            biased;
            _ = cancel.cancelled() => return AttemptOutcome::Cancelled,
            r = call => r.unwrap_or(Err(ProviderError::Timeout)),
        };

        // A reply that lands after cancellation is dropped unread.
        if cancel.is_cancelled() {
            return AttemptOutcome::Cancelled;
        }
        classify(exchange, &self.policy, attempt)
    }
}

//! Shared test doubles for the integration suites.
//!
//! - Step: one scripted provider answer, optionally delayed
//! - ScriptedProvider: replays a script of Steps in order

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use news_brief_synth::synth::provider::{
    chat_completion_body, LlmProvider, Prompt, ProviderError, ProviderReply, ToolSpec,
};

/// One scripted answer: wait `delay` (cancellable), then yield `result`.
#[derive(Debug, Clone)]
pub struct Step {
    pub delay: Duration,
    pub result: Result<ProviderReply, ProviderError>,
}

impl Step {
    pub fn reply(status: u16, body: impl Into<String>) -> Self {
        Self {
            delay: Duration::ZERO,
            result: Ok(ProviderReply {
                status,
                body: body.into(),
            }),
        }
    }

    /// 200 with `content` wrapped in a chat completion envelope.
    pub fn content(content: &str) -> Self {
        Self::reply(200, chat_completion_body(content, "stop"))
    }

    pub fn error(e: ProviderError) -> Self {
        Self {
            delay: Duration::ZERO,
            result: Err(e),
        }
    }

    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// Replays a fixed script; the last step repeats once the script runs out.
pub struct ScriptedProvider {
    steps: Mutex<VecDeque<Step>>,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_step(&self) -> Option<Step> {
        let mut q = self.steps.lock().expect("script lock");
        if q.len() > 1 {
            q.pop_front()
        } else {
            q.front().cloned()
        }
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    async fn invoke(
        &self,
        _prompt: &Prompt,
        _tools: &[ToolSpec],
        cancel: &CancellationToken,
    ) -> Result<ProviderReply, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let step = self.next_step().expect("non-empty script");
        if !step.delay.is_zero() {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
                _ = tokio::time::sleep(step.delay) => {}
            }
        }
        step.result
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

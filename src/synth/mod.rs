// src/synth/mod.rs
//! Resilient synthesis pipeline: recovery parser, provider surface,
//! classification, orchestrator state machine and per-caller sessions.

pub mod classify;
pub mod failure;
pub mod orchestrator;
pub mod parser;
pub mod prompt;
pub mod provider;
pub mod service;
pub mod sessions;
pub mod types;

pub use failure::{FailureKind, SynthesisError};
pub use orchestrator::{AttemptOutcome, Orchestrator, RetryPolicy};
pub use parser::{parse, ParseFailure};
pub use provider::{DynProvider, LlmProvider, MockProvider, ProviderError, ProviderReply};
pub use service::SynthesisService;
pub use sessions::CallerSessions;
pub use types::{Level, Source, SynthesisRequest, SynthesisResult};

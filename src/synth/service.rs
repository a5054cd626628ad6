// src/synth/service.rs
use std::sync::Arc;

use crate::synth::failure::SynthesisError;
use crate::synth::orchestrator::Orchestrator;
use crate::synth::sessions::CallerSessions;
use crate::synth::types::{SynthesisRequest, SynthesisResult};

/// Orchestrator plus per-caller supersede semantics; what the HTTP layer holds.
#[derive(Clone)]
pub struct SynthesisService {
    orchestrator: Arc<Orchestrator>,
    sessions: Arc<CallerSessions>,
}

impl SynthesisService {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
            sessions: CallerSessions::new(),
        }
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub fn sessions(&self) -> &Arc<CallerSessions> {
        &self.sessions
    }

    /// Runs `request` as the caller's only live operation. A newer call for
    /// the same caller, an explicit cancel, or dropping this future all end
    /// it as `Cancelled`.
    pub async fn synthesize_for(
        &self,
        caller: &str,
        request: &SynthesisRequest,
    ) -> Result<SynthesisResult, SynthesisError> {
        let ticket = self.sessions.begin(caller);
        self.orchestrator.synthesize(request, ticket.token()).await
    }

    pub fn cancel(&self, caller: &str) -> bool {
        self.sessions.cancel(caller)
    }
}

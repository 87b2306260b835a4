//! Main orchestrator - implements the routing state machine
//!
//! START → CLASSIFYING → DISPATCHED(Finance | Operations | Risk) → DONE
//!
//! Any classifier or specialist failure ends the run in FAILED. There are no
//! retries and at most one specialist runs per request.

use crate::classifier::RequestClassifier;
use crate::config::Settings;
use crate::engine::GenerationEngine;
use crate::error::OrchestrationError;
use crate::models::{Destination, Message};
use crate::specialists::{FinanceSpecialist, OnDemandSpecialist, Specialist};
use crate::state::{Conversation, RunPhase, RunState};
use crate::tools::create_default_registry;
use crate::Result;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// One incoming request
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub query: String,
    pub user_id: Option<Uuid>,
    pub uploaded_file: Option<PathBuf>,
}

impl RunRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            user_id: None,
            uploaded_file: None,
        }
    }

    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.uploaded_file = Some(path.into());
        self
    }

    pub fn with_user(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }
}

/// A run that ended in `Failed`, with the state it reached
#[derive(Debug, Error)]
#[error("{error}")]
pub struct RunFailure {
    pub state: RunState,
    #[source]
    pub error: OrchestrationError,
}

impl RunFailure {
    pub fn agent_used(&self) -> &'static str {
        self.state.agent_used()
    }
}

pub struct Orchestrator {
    classifier: RequestClassifier,
    finance: FinanceSpecialist,
    operations: OnDemandSpecialist,
    risk: OnDemandSpecialist,
}

impl Orchestrator {
    pub fn new(
        classifier: RequestClassifier,
        finance: FinanceSpecialist,
        operations: OnDemandSpecialist,
        risk: OnDemandSpecialist,
    ) -> Self {
        Self {
            classifier,
            finance,
            operations,
            risk,
        }
    }

    /// Wire the classifier and every specialist to one engine, with each
    /// specialist's tools taken from the configured tool sets.
    pub fn from_settings(settings: &Settings, engine: Arc<dyn GenerationEngine>) -> Result<Self> {
        let registry = create_default_registry(settings);
        let timeout = settings.engine_timeout();
        let tools = &settings.tool_sets;

        let classifier = RequestClassifier::new(engine.clone(), timeout)
            .with_keyword_fast_path(settings.keyword_fast_path);

        let finance = FinanceSpecialist::new(
            engine.clone(),
            registry.subset(tools.for_destination(Destination::Finance))?,
            timeout,
        );
        let operations = OnDemandSpecialist::operations(
            engine.clone(),
            registry.subset(tools.for_destination(Destination::Operations))?,
            timeout,
        );
        let risk = OnDemandSpecialist::risk(
            engine,
            registry.subset(tools.for_destination(Destination::Risk))?,
            timeout,
        );

        info!(
            finance_tools = ?tools.finance,
            operations_tools = ?tools.operations,
            risk_tools = ?tools.risk,
            "Orchestrator initialized"
        );

        Ok(Self::new(classifier, finance, operations, risk))
    }

    /// Fixed total mapping from destination to handler
    fn specialist(&self, destination: Destination) -> &dyn Specialist {
        match destination {
            Destination::Finance => &self.finance,
            Destination::Operations => &self.operations,
            Destination::Risk => &self.risk,
        }
    }

    /// Run one request through the state machine
    pub async fn run(&self, request: RunRequest) -> std::result::Result<RunState, RunFailure> {
        let start_time = Instant::now();
        let mut state = RunState::new(
            Conversation::seeded(Message::user(request.query)),
            request.uploaded_file,
        );

        info!(
            run_id = %state.run_id(),
            user_id = ?request.user_id,
            has_file = state.uploaded_file().is_some(),
            "Orchestrator: starting run"
        );

        match self.drive(&mut state).await {
            Ok(()) => {
                info!(
                    run_id = %state.run_id(),
                    agent_used = state.agent_used(),
                    elapsed_ms = start_time.elapsed().as_millis() as u64,
                    "Run complete"
                );
                Ok(state)
            }
            Err(error) => {
                if let Err(e) = state.advance(RunPhase::Failed) {
                    warn!(run_id = %state.run_id(), error = %e, "Could not mark run as failed");
                }
                state.note(format!("FAILED: {}", error.kind().as_str()));

                warn!(
                    run_id = %state.run_id(),
                    agent_used = state.agent_used(),
                    kind = error.kind().as_str(),
                    error = %error,
                    elapsed_ms = start_time.elapsed().as_millis() as u64,
                    "Run failed"
                );
                Err(RunFailure { state, error })
            }
        }
    }

    async fn drive(&self, state: &mut RunState) -> Result<()> {
        // === CLASSIFY ===
        state.advance(RunPhase::Classifying)?;
        let destination = self.classifier.classify(state.conversation()).await?;

        // === DISPATCH ===
        state.set_destination(destination)?;
        state.advance(RunPhase::Dispatched(destination))?;

        let specialist = self.specialist(destination);
        debug!(
            destination = %destination,
            strategy = ?specialist.file_strategy(),
            "Dispatching to specialist"
        );

        let reply = specialist
            .respond(state.conversation(), state.uploaded_file())
            .await?;

        // === COMPLETE ===
        state.append(reply.message);
        if let Some(payload) = reply.payload {
            state.attach_payload(payload);
        }
        state.advance(RunPhase::Done)
    }
}

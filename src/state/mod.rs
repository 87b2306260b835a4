//! Run state
//!
//! Created once per request, owned by the orchestrator, discarded when the
//! run ends. Nothing here outlives a run.

use crate::engine::Turn;
use crate::error::OrchestrationError;
use crate::models::{Destination, Message, MessageRole};
use crate::Result;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Sentinel reported when a run never reached dispatch
pub const UNKNOWN_AGENT: &str = "Unknown";

/// Append-only conversation log, oldest first
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seeded(first: Message) -> Self {
        Self {
            messages: vec![first],
        }
    }

    pub fn append(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn latest_user_message(&self) -> Option<&Message> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::User && !m.content.trim().is_empty())
    }

    /// The log as engine turns
    pub fn turns(&self) -> Vec<Turn> {
        self.messages.iter().cloned().map(Turn::Message).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Start,
    Classifying,
    Dispatched(Destination),
    Done,
    Failed,
}

impl RunPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunPhase::Done | RunPhase::Failed)
    }

    fn can_advance_to(&self, next: &RunPhase) -> bool {
        match (self, next) {
            (RunPhase::Start, RunPhase::Classifying) => true,
            (RunPhase::Classifying, RunPhase::Dispatched(_)) => true,
            (RunPhase::Dispatched(_), RunPhase::Done) => true,
            (current, RunPhase::Failed) => !current.is_terminal(),
            _ => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunState {
    run_id: Uuid,
    started_at: DateTime<Utc>,
    conversation: Conversation,
    next_destination: Option<Destination>,
    uploaded_file: Option<PathBuf>,
    result_payload: Option<serde_json::Value>,
    phase: RunPhase,
    trace: Vec<String>,
}

impl RunState {
    pub fn new(conversation: Conversation, uploaded_file: Option<PathBuf>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            conversation,
            next_destination: None,
            uploaded_file,
            result_payload: None,
            phase: RunPhase::Start,
            trace: vec!["START: run created".to_string()],
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn next_destination(&self) -> Option<Destination> {
        self.next_destination
    }

    pub fn uploaded_file(&self) -> Option<&Path> {
        self.uploaded_file.as_deref()
    }

    pub fn result_payload(&self) -> Option<&serde_json::Value> {
        self.result_payload.as_ref()
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn trace(&self) -> &[String] {
        &self.trace
    }

    /// Destination label, or the "Unknown" sentinel before dispatch
    pub fn agent_used(&self) -> &'static str {
        self.next_destination
            .map(|d| d.label())
            .unwrap_or(UNKNOWN_AGENT)
    }

    /// Content of the last message; a structured payload stands in for an empty reply.
    pub fn answer(&self) -> String {
        let content = self
            .conversation
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_default();

        match &self.result_payload {
            Some(payload) if content.trim().is_empty() => payload.to_string(),
            _ => content,
        }
    }

    pub(crate) fn advance(&mut self, next: RunPhase) -> Result<()> {
        if !self.phase.can_advance_to(&next) {
            return Err(OrchestrationError::State(format!(
                "invalid run transition {:?} -> {:?}",
                self.phase, next
            )));
        }

        self.trace.push(format!("{:?} -> {:?}", self.phase, next));
        self.phase = next;
        Ok(())
    }

    /// Records the classification; written once per run.
    pub(crate) fn set_destination(&mut self, destination: Destination) -> Result<()> {
        if let Some(existing) = self.next_destination {
            return Err(OrchestrationError::State(format!(
                "destination already set to {}",
                existing
            )));
        }
        self.next_destination = Some(destination);
        Ok(())
    }

    pub(crate) fn append(&mut self, message: Message) {
        self.conversation.append(message);
    }

    pub(crate) fn attach_payload(&mut self, payload: serde_json::Value) {
        self.result_payload = Some(payload);
    }

    pub(crate) fn note(&mut self, entry: impl Into<String>) {
        self.trace.push(entry.into());
    }
}

//! Request Classifier
//!
//! Maps the conversation to exactly one specialist:
//! - Finance: money, tax, invoices, budget
//! - Operations: stock, items, shipping, vendors
//! - Risk: risk, anomalies, fraud, alerts
//!
//! The engine is forced to answer with one of the three labels. It never
//! answers the user's question here.

use crate::engine::{EngineRequest, GenerationEngine, OutputConstraint};
use crate::error::OrchestrationError;
use crate::models::Destination;
use crate::state::Conversation;
use crate::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const ROUTING_INSTRUCTION: &str = r#"You are the Main Orchestrator for the ERP Intelligence Layer.
Your job is to route the user's request to the correct specialist.

- If the user asks about money, tax, invoices, or budget -> Finance_Agent
- If the user asks about stock, items, shipping, or vendors -> Operations_Agent
- If the user asks about risk, anomalies, fraud, or alerts -> Risk_Agent

Do not try to answer the question yourself. Just route it.
Reply with exactly one of: Finance_Agent, Operations_Agent, Risk_Agent."#;

/// Static keyword stems
const FINANCE_KEYWORDS: &[&str] = &[
    "money", "tax", "invoice", "budget", "payment", "cash", "expense", "revenue",
];

const OPERATIONS_KEYWORDS: &[&str] = &[
    "stock", "item", "ship", "vendor", "inventory", "warehouse", "supplier", "delivery",
];

const RISK_KEYWORDS: &[&str] = &[
    "risk", "anomal", "fraud", "alert", "suspicious", "flag", "compliance",
];

fn keywords(destination: Destination) -> &'static [&'static str] {
    match destination {
        Destination::Finance => FINANCE_KEYWORDS,
        Destination::Operations => OPERATIONS_KEYWORDS,
        Destination::Risk => RISK_KEYWORDS,
    }
}

/// The single destination whose keywords appear in `text`, if no other
/// destination competes.
pub fn keyword_destination(text: &str) -> Option<Destination> {
    let lowered = text.to_lowercase();

    let mut hits = Destination::ALL
        .into_iter()
        .filter(|d| keywords(*d).iter().any(|kw| lowered.contains(kw)));

    match (hits.next(), hits.next()) {
        (Some(only), None) => Some(only),
        _ => None,
    }
}

pub struct RequestClassifier {
    engine: Arc<dyn GenerationEngine>,
    timeout: Duration,
    keyword_fast_path: bool,
}

impl RequestClassifier {
    pub fn new(engine: Arc<dyn GenerationEngine>, timeout: Duration) -> Self {
        Self {
            engine,
            timeout,
            keyword_fast_path: false,
        }
    }

    /// Route unambiguous keyword matches without calling the engine.
    pub fn with_keyword_fast_path(mut self, enabled: bool) -> Self {
        self.keyword_fast_path = enabled;
        self
    }

    pub async fn classify(&self, conversation: &Conversation) -> Result<Destination> {
        let latest = conversation.latest_user_message().ok_or_else(|| {
            OrchestrationError::Validation(
                "conversation must contain at least one user message".to_string(),
            )
        })?;

        let hint = keyword_destination(&latest.content);

        if self.keyword_fast_path {
            if let Some(destination) = hint {
                info!(destination = %destination, "Routed by keyword");
                return Ok(destination);
            }
        }

        let request = EngineRequest {
            system_instruction: ROUTING_INSTRUCTION.to_string(),
            turns: conversation.turns(),
            tools: Vec::new(),
            output: OutputConstraint::OneOf(Destination::labels()),
        };

        debug!(engine = self.engine.name(), "Classifying request");

        let reply = tokio::time::timeout(self.timeout, self.engine.complete(&request))
            .await
            .map_err(|_| OrchestrationError::Timeout {
                stage: "classification",
                after: self.timeout,
            })?
            .map_err(|e| OrchestrationError::from_engine("classification", self.timeout, e))?;

        if !reply.tool_calls.is_empty() {
            return Err(OrchestrationError::Classification(
                "engine requested tools instead of choosing a destination".to_string(),
            ));
        }

        let raw = reply.text.unwrap_or_default();
        let destination = Destination::from_label(&raw).ok_or_else(|| {
            OrchestrationError::Classification(format!(
                "engine returned '{}', expected one of {}",
                raw.trim(),
                Destination::labels().join(", ")
            ))
        })?;

        if let Some(expected) = hint.filter(|h| *h != destination) {
            warn!(
                chosen = %destination,
                keyword_hint = %expected,
                "Engine routing disagrees with keyword hint"
            );
        }

        info!(destination = %destination, "Request classified");
        Ok(destination)
    }
}

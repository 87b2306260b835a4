//! Specialist handlers
//!
//! Each specialist turns the conversation (plus an optional uploaded file)
//! into exactly one assistant message. Two file strategies exist and stay
//! separate: Finance pre-fetches file content into its instruction, while
//! Operations and Risk only mention the file and let the engine request it
//! through the `read_file` tool.

use crate::engine::{EngineRequest, GenerationEngine, OutputConstraint, Turn};
use crate::error::OrchestrationError;
use crate::models::{Destination, Message, ToolCall, ToolInput, ToolOutput};
use crate::state::Conversation;
use crate::tools::ToolRegistry;
use crate::Result;
use async_trait::async_trait;
use std::future::Future;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub mod finance;
pub mod on_demand;

pub use finance::FinanceSpecialist;
pub use on_demand::OnDemandSpecialist;

/// Engine turns allowed per reply, tool calls included
pub const MAX_TOOL_ROUNDS: usize = 5;

/// How a specialist brings uploaded file content into its generation call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStrategy {
    /// Read the file up front and embed it in the instruction
    Prefetch,
    /// Tell the engine where the file is; it calls `read_file` if it wants it
    OnDemand,
}

#[derive(Debug, Clone)]
pub struct SpecialistReply {
    pub message: Message,
    pub payload: Option<serde_json::Value>,
}

/// Trait for a specialist handler
#[async_trait]
pub trait Specialist: Send + Sync {
    fn destination(&self) -> Destination;

    fn file_strategy(&self) -> FileStrategy;

    async fn respond(
        &self,
        conversation: &Conversation,
        uploaded_file: Option<&Path>,
    ) -> Result<SpecialistReply>;
}

/// A tool call made while producing a reply, with what it returned
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    pub call: ToolCall,
    pub output: ToolOutput,
}

pub(crate) struct LoopOutcome {
    pub text: String,
    pub invocations: Vec<ToolInvocation>,
}

/// Runs engine turns until the engine answers in text. Tool sub-steps stay
/// internal; only the final text becomes a conversation entry.
pub(crate) async fn run_tool_loop(
    engine: &dyn GenerationEngine,
    system_instruction: &str,
    conversation: &Conversation,
    tools: &ToolRegistry,
    budget: Duration,
) -> Result<LoopOutcome> {
    let specs = tools.specs();
    let mut turns = conversation.turns();
    let mut invocations = Vec::new();

    for round in 1..=MAX_TOOL_ROUNDS {
        let request = EngineRequest {
            system_instruction: system_instruction.to_string(),
            turns: turns.clone(),
            tools: specs.clone(),
            output: OutputConstraint::FreeText,
        };

        let reply = engine
            .complete(&request)
            .await
            .map_err(|e| OrchestrationError::from_engine("generation", budget, e))?;

        if reply.tool_calls.is_empty() {
            debug!(round, tool_calls = invocations.len(), "Engine produced final reply");
            return Ok(LoopOutcome {
                text: reply.text.unwrap_or_default(),
                invocations,
            });
        }

        for call in reply.tool_calls {
            let output = execute_tool(tools, &call).await;

            turns.push(Turn::ToolCall(call.clone()));
            turns.push(Turn::ToolResult {
                name: call.name.clone(),
                content: output.text.clone(),
            });
            invocations.push(ToolInvocation { call, output });
        }
    }

    Err(OrchestrationError::Generation(format!(
        "engine was still requesting tools after {} rounds",
        MAX_TOOL_ROUNDS
    )))
}

/// Tool failures become text for the engine to explain, never run failures.
async fn execute_tool(tools: &ToolRegistry, call: &ToolCall) -> ToolOutput {
    let Some(tool) = tools.get(&call.name) else {
        warn!(tool_name = %call.name, "Engine requested unavailable tool");
        return ToolOutput {
            text: format!("Error: tool '{}' is not available", call.name),
            data: None,
        };
    };

    let start = Instant::now();
    let input = ToolInput::from(call.clone());

    match tool.execute(&input).await {
        Ok(output) => {
            info!(
                tool_name = %call.name,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Tool executed"
            );
            output
        }
        Err(e) => {
            warn!(tool_name = %call.name, error = %e, "Tool execution failed");
            ToolOutput {
                text: format!("Error: {}", e),
                data: None,
            }
        }
    }
}

/// Applies the generation time budget to a whole reply
pub(crate) async fn within_budget<T, F>(budget: Duration, work: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::time::timeout(budget, work)
        .await
        .map_err(|_| OrchestrationError::Timeout {
            stage: "generation",
            after: budget,
        })?
}

/// Exactly one assistant message, never an empty one without a payload
pub(crate) fn finish(text: String, payload: Option<serde_json::Value>) -> Result<SpecialistReply> {
    if text.trim().is_empty() && payload.is_none() {
        return Err(OrchestrationError::Generation(
            "engine returned an empty reply".to_string(),
        ));
    }

    Ok(SpecialistReply {
        message: Message::assistant(text),
        payload,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineError, EngineReply, ScriptedEngine};
    use crate::models::MessageRole;
    use crate::tools::{ReadFileTool, READ_FILE_TOOL};
    use serde_json::json;
    use std::sync::Arc;

    const BUDGET: Duration = Duration::from_secs(2);

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(ReadFileTool::new()));
        registry
    }

    #[tokio::test]
    async fn test_loop_feeds_tool_results_back() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("stock.csv");
        std::fs::write(&path, "sku,qty\nA-1,3\n").unwrap();

        let engine = ScriptedEngine::with_replies(vec![
            Ok(EngineReply::tool_call(READ_FILE_TOOL, json!({ "file_path": path }))),
            Ok(EngineReply::text("You have 3 units of A-1.")),
        ]);
        let conversation = Conversation::seeded(Message::user("How much stock?"));

        let outcome = run_tool_loop(&engine, "ops", &conversation, &registry(), BUDGET)
            .await
            .unwrap();

        assert_eq!(outcome.text, "You have 3 units of A-1.");
        assert_eq!(outcome.invocations.len(), 1);

        let second = &engine.requests()[1];
        assert_eq!(second.turns.len(), 3);
        assert_eq!(
            second.turns[2],
            Turn::ToolResult {
                name: READ_FILE_TOOL.to_string(),
                content: "sku,qty\nA-1,3\n".to_string(),
            }
        );
        // The caller's conversation is untouched
        assert_eq!(conversation.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_tool_is_narrated() {
        let engine = ScriptedEngine::with_replies(vec![
            Ok(EngineReply::tool_call("web_search", json!({ "query": "x" }))),
            Ok(EngineReply::text("I cannot search the web.")),
        ]);
        let conversation = Conversation::seeded(Message::user("search"));

        let outcome = run_tool_loop(&engine, "ops", &conversation, &registry(), BUDGET)
            .await
            .unwrap();

        assert_eq!(
            outcome.invocations[0].output.text,
            "Error: tool 'web_search' is not available"
        );
    }

    #[tokio::test]
    async fn test_endless_tool_calls_fail() {
        let engine = ScriptedEngine::with_replies(
            (0..MAX_TOOL_ROUNDS)
                .map(|_| Ok(EngineReply::tool_call(READ_FILE_TOOL, json!({ "file_path": "/x" })))),
        );
        let conversation = Conversation::seeded(Message::user("loop"));

        let result = run_tool_loop(&engine, "ops", &conversation, &registry(), BUDGET).await;

        assert!(matches!(result, Err(OrchestrationError::Generation(_))));
        assert_eq!(engine.requests().len(), MAX_TOOL_ROUNDS);
    }

    #[tokio::test]
    async fn test_engine_timeout_keeps_its_kind() {
        let engine = ScriptedEngine::with_replies(vec![Err(EngineError::TimedOut(
            "operation timed out".into(),
        ))]);
        let conversation = Conversation::seeded(Message::user("stock?"));

        let result = run_tool_loop(&engine, "ops", &conversation, &registry(), BUDGET).await;

        assert!(matches!(
            result,
            Err(OrchestrationError::Timeout {
                stage: "generation",
                ..
            })
        ));
    }

    #[test]
    fn test_finish_rules() {
        let reply = finish("hello".into(), None).unwrap();
        assert_eq!(reply.message.role, MessageRole::Assistant);

        assert!(finish("  ".into(), None).is_err());
        assert!(finish(String::new(), Some(json!({ "invoices": [] }))).is_ok());
    }
}

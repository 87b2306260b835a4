//! Operations and Risk specialists
//!
//! Neither reads the uploaded file itself. The instruction names the file's
//! path and the engine decides whether to call `read_file`.

use super::{finish, run_tool_loop, within_budget, FileStrategy, Specialist, SpecialistReply};
use crate::engine::GenerationEngine;
use crate::models::Destination;
use crate::state::Conversation;
use crate::tools::{ToolRegistry, READ_FILE_TOOL};
use crate::Result;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub const OPERATIONS_INSTRUCTION: &str = r#"You are the Operations Agent for the ERP Intelligence Layer.
Your job is to answer the user's request about stock, items, shipping, or vendors.
Base your answer on the uploaded file when one is available."#;

pub const RISK_INSTRUCTION: &str = r#"You are the Risk Agent for the ERP Intelligence Layer.
Your job is to review the user's request for risk, anomalies, fraud, or alerts.
Point out each suspicious item you find and say why it stands out."#;

pub struct OnDemandSpecialist {
    destination: Destination,
    instruction: &'static str,
    engine: Arc<dyn GenerationEngine>,
    tools: ToolRegistry,
    timeout: Duration,
}

impl OnDemandSpecialist {
    pub fn operations(
        engine: Arc<dyn GenerationEngine>,
        tools: ToolRegistry,
        timeout: Duration,
    ) -> Self {
        Self {
            destination: Destination::Operations,
            instruction: OPERATIONS_INSTRUCTION,
            engine,
            tools,
            timeout,
        }
    }

    pub fn risk(engine: Arc<dyn GenerationEngine>, tools: ToolRegistry, timeout: Duration) -> Self {
        Self {
            destination: Destination::Risk,
            instruction: RISK_INSTRUCTION,
            engine,
            tools,
            timeout,
        }
    }

    fn file_section(&self, uploaded_file: Option<&Path>) -> String {
        match uploaded_file {
            None => "No file is available for this request. Answer from the conversation alone."
                .to_string(),
            Some(path) if self.tools.get(READ_FILE_TOOL).is_some() => format!(
                "An uploaded file is available at path: {}\n\
                 Call the {} tool with this exact path if you need its content.",
                path.display(),
                READ_FILE_TOOL
            ),
            Some(path) => format!(
                "An uploaded file exists at path: {}, but you cannot read it. \
                 Tell the user its content was not examined.",
                path.display()
            ),
        }
    }

    async fn reply(
        &self,
        conversation: &Conversation,
        uploaded_file: Option<&Path>,
    ) -> Result<SpecialistReply> {
        let system_instruction =
            format!("{}\n\n{}", self.instruction, self.file_section(uploaded_file));

        debug!(destination = %self.destination, tools = ?self.tools.list(), "Specialist replying");

        let outcome = run_tool_loop(
            self.engine.as_ref(),
            &system_instruction,
            conversation,
            &self.tools,
            self.timeout,
        )
        .await?;

        finish(outcome.text, None)
    }
}

#[async_trait]
impl Specialist for OnDemandSpecialist {
    fn destination(&self) -> Destination {
        self.destination
    }

    fn file_strategy(&self) -> FileStrategy {
        FileStrategy::OnDemand
    }

    async fn respond(
        &self,
        conversation: &Conversation,
        uploaded_file: Option<&Path>,
    ) -> Result<SpecialistReply> {
        within_budget(self.timeout, self.reply(conversation, uploaded_file)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineReply, ScriptedEngine, Turn};
    use crate::error::OrchestrationError;
    use crate::models::Message;
    use crate::tools::ReadFileTool;
    use serde_json::json;
    use tempfile::TempDir;

    fn read_file_tools(staging: &Path) -> ToolRegistry {
        let mut tools = ToolRegistry::new();
        tools.register(Arc::new(ReadFileTool::confined_to(staging)));
        tools
    }

    #[tokio::test]
    async fn test_operations_reads_file_only_on_request() {
        let staging = TempDir::new().unwrap();
        let upload = staging.path().join("shipment.csv");
        std::fs::write(&upload, "sku,qty,eta\nBOLT-9,400,2024-05-02\n").unwrap();

        let engine = ScriptedEngine::with_replies(vec![
            Ok(EngineReply::tool_call(READ_FILE_TOOL, json!({ "file_path": upload }))),
            Ok(EngineReply::text("The shipment holds 400 BOLT-9 arriving 2024-05-02.")),
        ]);
        let ops = OnDemandSpecialist::operations(
            Arc::new(engine.clone()),
            read_file_tools(staging.path()),
            Duration::from_secs(2),
        );

        let reply = ops
            .respond(
                &Conversation::seeded(Message::user("What's in this shipment file?")),
                Some(upload.as_path()),
            )
            .await
            .unwrap();

        assert!(reply.message.content.contains("400 BOLT-9"));
        assert!(reply.payload.is_none());

        let requests = engine.requests();
        // The path is offered, the content is not
        assert!(requests[0]
            .system_instruction
            .contains(&upload.display().to_string()));
        assert!(!requests[0].system_instruction.contains("BOLT-9"));
        assert!(matches!(
            &requests[1].turns[2],
            Turn::ToolResult { content, .. } if content.contains("BOLT-9")
        ));
    }

    #[tokio::test]
    async fn test_risk_without_file_answers_from_text() {
        let engine = ScriptedEngine::with_replies(vec![Ok(EngineReply::text(
            "Two payments to the same vendor on one day look suspicious.",
        ))]);
        let risk = OnDemandSpecialist::risk(
            Arc::new(engine.clone()),
            ToolRegistry::new(),
            Duration::from_secs(2),
        );

        assert_eq!(risk.destination(), Destination::Risk);
        assert_eq!(risk.file_strategy(), FileStrategy::OnDemand);

        let reply = risk
            .respond(
                &Conversation::seeded(Message::user("Flag any suspicious transactions")),
                None,
            )
            .await
            .unwrap();

        assert!(reply.message.content.contains("suspicious"));
        let requests = engine.requests();
        assert!(requests[0].system_instruction.starts_with(RISK_INSTRUCTION));
        assert!(requests[0].system_instruction.contains("No file is available"));
        assert!(requests[0].tools.is_empty());
    }

    #[tokio::test]
    async fn test_missing_file_is_reported_by_tool() {
        let staging = TempDir::new().unwrap();
        let gone = staging.path().join("gone.csv");

        let engine = ScriptedEngine::with_replies(vec![
            Ok(EngineReply::tool_call(READ_FILE_TOOL, json!({ "file_path": gone }))),
            Ok(EngineReply::text("I could not find that file.")),
        ]);
        let ops = OnDemandSpecialist::operations(
            Arc::new(engine.clone()),
            read_file_tools(staging.path()),
            Duration::from_secs(2),
        );

        let reply = ops
            .respond(&Conversation::seeded(Message::user("Read the stock file")), Some(gone.as_path()))
            .await
            .unwrap();

        assert_eq!(reply.message.content, "I could not find that file.");
        assert_eq!(
            engine.requests()[1].turns[2],
            Turn::ToolResult {
                name: READ_FILE_TOOL.to_string(),
                content: "File not found".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_empty_reply_is_generation_error() {
        let engine = ScriptedEngine::with_replies(vec![Ok(EngineReply::text("   "))]);
        let ops = OnDemandSpecialist::operations(
            Arc::new(engine),
            ToolRegistry::new(),
            Duration::from_secs(2),
        );

        let result = ops
            .respond(&Conversation::seeded(Message::user("stock?")), None)
            .await;

        assert!(matches!(result, Err(OrchestrationError::Generation(_))));
    }

    #[tokio::test]
    async fn test_slow_engine_times_out() {
        let engine = ScriptedEngine::with_replies(vec![Ok(EngineReply::text("late"))])
            .with_delay(Duration::from_millis(500));
        let risk = OnDemandSpecialist::risk(
            Arc::new(engine),
            ToolRegistry::new(),
            Duration::from_millis(20),
        );

        let result = risk
            .respond(&Conversation::seeded(Message::user("Any fraud alerts?")), None)
            .await;

        assert!(matches!(
            result,
            Err(OrchestrationError::Timeout {
                stage: "generation",
                ..
            })
        ));
    }
}

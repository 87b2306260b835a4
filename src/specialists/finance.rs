//! Finance specialist
//!
//! Reads the uploaded file before calling the engine and embeds it in the
//! instruction. Invoice records fetched through the tool are attached to the
//! reply as a structured payload.

use super::{finish, run_tool_loop, within_budget, FileStrategy, Specialist, SpecialistReply};
use crate::engine::GenerationEngine;
use crate::lookup::{self, LookupSignal};
use crate::models::Destination;
use crate::state::Conversation;
use crate::tools::{ToolRegistry, OPEN_INVOICES_TOOL};
use crate::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub const FINANCE_INSTRUCTION: &str = r#"You are the Finance Agent for the ERP Intelligence Layer.
Your job is to answer the user's request about money, tax, invoices, or budget.
Use the get_open_invoices tool when the question depends on unpaid or overdue invoices.
Be concise and quote amounts exactly as they appear in the data."#;

pub struct FinanceSpecialist {
    engine: Arc<dyn GenerationEngine>,
    tools: ToolRegistry,
    timeout: Duration,
}

impl FinanceSpecialist {
    pub fn new(engine: Arc<dyn GenerationEngine>, tools: ToolRegistry, timeout: Duration) -> Self {
        Self {
            engine,
            tools,
            timeout,
        }
    }

    async fn file_section(uploaded_file: Option<&Path>) -> String {
        let Some(path) = uploaded_file else {
            return "No file was uploaded with this request. If the user refers to a file, \
                    tell them no file was uploaded."
                .to_string();
        };

        match lookup::read_file_content(path).await {
            LookupSignal::Content(content) => {
                info!(path = %path.display(), bytes = content.len(), "Pre-fetched uploaded file");
                format!("Content of the uploaded file:\n{}", content)
            }
            other => {
                warn!(path = %path.display(), signal = %other, "Uploaded file could not be read");
                format!(
                    "The uploaded file could not be read ({}). Tell the user the file could \
                     not be read, then answer from the invoice data where possible.",
                    other
                )
            }
        }
    }

    async fn reply(
        &self,
        conversation: &Conversation,
        uploaded_file: Option<&Path>,
    ) -> Result<SpecialistReply> {
        let system_instruction = format!(
            "{}\n\n{}",
            FINANCE_INSTRUCTION,
            Self::file_section(uploaded_file).await
        );

        let outcome = run_tool_loop(
            self.engine.as_ref(),
            &system_instruction,
            conversation,
            &self.tools,
            self.timeout,
        )
        .await?;

        let invoices: Vec<Value> = outcome
            .invocations
            .iter()
            .filter(|i| i.call.name == OPEN_INVOICES_TOOL)
            .filter_map(|i| i.output.data.as_ref())
            .filter_map(|data| data.as_array())
            .flatten()
            .cloned()
            .collect();

        let payload = (!invoices.is_empty()).then(|| json!({ "invoices": invoices }));

        finish(outcome.text, payload)
    }
}

#[async_trait]
impl Specialist for FinanceSpecialist {
    fn destination(&self) -> Destination {
        Destination::Finance
    }

    fn file_strategy(&self) -> FileStrategy {
        FileStrategy::Prefetch
    }

    async fn respond(
        &self,
        conversation: &Conversation,
        uploaded_file: Option<&Path>,
    ) -> Result<SpecialistReply> {
        within_budget(self.timeout, self.reply(conversation, uploaded_file)).await
    }
}

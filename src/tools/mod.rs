//! Tool trait and registry
//!
//! Tools wrap the lookup functions so the engine can call them. Their output
//! is always text, lookup failures included.

use crate::config::Settings;
use crate::engine::ToolSpec;
use crate::error::OrchestrationError;
use crate::lookup::{self, LookupSignal};
use crate::models::{ToolInput, ToolOutput};
use crate::Result;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;

pub const OPEN_INVOICES_TOOL: &str = "get_open_invoices";
pub const READ_FILE_TOOL: &str = "read_file";

/// Trait for a single tool
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    /// JSON schema of the arguments object
    fn parameters(&self) -> Value;
    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput>;

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters(),
        }
    }
}

/// Tool registry for looking up and executing tools
#[derive(Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Declarations in name order, ready for an engine request
    pub fn specs(&self) -> Vec<ToolSpec> {
        self.list()
            .into_iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| tool.spec())
            .collect()
    }

    /// A registry holding only the named tools
    pub fn subset(&self, names: &[String]) -> Result<ToolRegistry> {
        let mut subset = ToolRegistry::new();
        for name in names {
            let tool = self
                .get(name)
                .ok_or_else(|| OrchestrationError::ToolNotFound(name.clone()))?;
            subset.register(tool);
        }
        Ok(subset)
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn ensure_object_parameters(input: &ToolInput) -> Result<()> {
    if input.parameters.is_object() || input.parameters.is_null() {
        Ok(())
    } else {
        Err(OrchestrationError::InvalidToolInput(
            "tool arguments must be a JSON object".to_string(),
        ))
    }
}

/// Fetches unpaid or overdue invoices from the reference dataset
pub struct OpenInvoicesTool {
    dataset: PathBuf,
}

impl OpenInvoicesTool {
    pub fn new(dataset: impl Into<PathBuf>) -> Self {
        Self {
            dataset: dataset.into(),
        }
    }
}

#[async_trait::async_trait]
impl Tool for OpenInvoicesTool {
    fn name(&self) -> &'static str {
        OPEN_INVOICES_TOOL
    }

    fn description(&self) -> &'static str {
        "Fetches a list of unpaid or overdue invoices. Useful for checking debts, \
         cash flow obligations, or vendor status. Optionally filters by vendor name."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "vendor_name": {
                    "type": "string",
                    "description": "Case-insensitive part of the vendor name to filter by"
                }
            }
        })
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        ensure_object_parameters(input)?;

        let vendor = input
            .parameters
            .get("vendor_name")
            .and_then(|v| v.as_str());

        let signal = lookup::fetch_invoices(&self.dataset, vendor).await;
        let data = signal
            .records()
            .map(serde_json::to_value)
            .transpose()?;

        Ok(ToolOutput {
            text: signal.to_string(),
            data,
        })
    }
}

/// Reads an uploaded file, optionally confined to the staging directory
pub struct ReadFileTool {
    staging_dir: Option<PathBuf>,
}

impl ReadFileTool {
    pub fn new() -> Self {
        Self { staging_dir: None }
    }

    pub fn confined_to(staging_dir: impl Into<PathBuf>) -> Self {
        Self {
            staging_dir: Some(staging_dir.into()),
        }
    }

    async fn permitted(&self, path: &Path) -> std::result::Result<(), LookupSignal> {
        let Some(root) = &self.staging_dir else {
            return Ok(());
        };

        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Err(LookupSignal::FileNotFound);
        }

        let root = tokio::fs::canonicalize(root).await.map_err(|e| {
            warn!(root = %root.display(), error = %e, "Upload staging directory unavailable");
            LookupSignal::Failed(format!(
                "Error processing file: upload staging directory unavailable ({})",
                e
            ))
        })?;
        let target = tokio::fs::canonicalize(path)
            .await
            .map_err(|e| LookupSignal::Failed(format!("Error processing file: {}", e)))?;

        if target.starts_with(&root) {
            Ok(())
        } else {
            warn!(path = %path.display(), "Refusing to read file outside staging directory");
            Err(LookupSignal::Failed(
                "Error processing file: path is outside the upload staging directory".to_string(),
            ))
        }
    }
}

impl Default for ReadFileTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &'static str {
        READ_FILE_TOOL
    }

    fn description(&self) -> &'static str {
        "Reads the content of an uploaded file (CSV, JSON or plain text) given its path."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "Path of the uploaded file"
                }
            },
            "required": ["file_path"]
        })
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        ensure_object_parameters(input)?;

        let path = input
            .parameters
            .get("file_path")
            .and_then(|v| v.as_str())
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| {
                OrchestrationError::InvalidToolInput("Expected 'file_path' in arguments".to_string())
            })?;
        let path = Path::new(path.trim());

        let signal = match self.permitted(path).await {
            Ok(()) => lookup::read_file_content(path).await,
            Err(signal) => signal,
        };

        Ok(ToolOutput {
            text: signal.to_string(),
            data: None,
        })
    }
}

/// Registry with every lookup tool, wired from settings
pub fn create_default_registry(settings: &Settings) -> ToolRegistry {
    let mut registry = ToolRegistry::new();

    registry.register(Arc::new(OpenInvoicesTool::new(settings.invoices_path.clone())));
    registry.register(Arc::new(ReadFileTool::confined_to(settings.upload_dir.clone())));

    registry
}

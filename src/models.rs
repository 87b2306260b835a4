//! Core data models for the router

use serde::{Deserialize, Serialize};
use std::fmt;

//
// ================= Destination =================
//

/// The closed set of specialists a request can be routed to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Destination {
    #[serde(rename = "Finance_Agent")]
    Finance,
    #[serde(rename = "Operations_Agent")]
    Operations,
    #[serde(rename = "Risk_Agent")]
    Risk,
}

impl Destination {
    pub const ALL: [Destination; 3] = [
        Destination::Finance,
        Destination::Operations,
        Destination::Risk,
    ];

    /// Label used on the wire and in the engine's constrained output.
    pub fn label(&self) -> &'static str {
        match self {
            Destination::Finance => "Finance_Agent",
            Destination::Operations => "Operations_Agent",
            Destination::Risk => "Risk_Agent",
        }
    }

    pub fn labels() -> Vec<String> {
        Self::ALL.iter().map(|d| d.label().to_string()).collect()
    }

    /// Accepts the wire label or the bare name, ignoring case, quotes and whitespace.
    pub fn from_label(raw: &str) -> Option<Destination> {
        let cleaned = raw.trim().trim_matches(|c| c == '"' || c == '\'').trim();
        let lowered = cleaned.to_lowercase();
        let name = lowered.strip_suffix("_agent").unwrap_or(&lowered);

        match name {
            "finance" => Some(Destination::Finance),
            "operations" => Some(Destination::Operations),
            "risk" => Some(Destination::Risk),
            _ => None,
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

//
// ================= Messages =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }
}

//
// ================= Reference Dataset =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InvoiceRecord {
    pub vendor: String,
    pub amount: f64,
    pub status: String,
    pub due_date: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

//
// ================= Tool I/O =================
//

/// A tool invocation requested by the engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub name: String,
    pub arguments: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInput {
    pub tool_name: String,
    pub parameters: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutput {
    /// Text handed back to the engine, lookup signals included.
    pub text: String,
    /// Structured data when the tool produced any.
    pub data: Option<serde_json::Value>,
}

impl From<ToolCall> for ToolInput {
    fn from(call: ToolCall) -> Self {
        Self {
            tool_name: call.name,
            parameters: call.arguments,
        }
    }
}

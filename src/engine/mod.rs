//! Text-generation engine boundary
//!
//! The router treats the engine as a black box that either writes free text,
//! picks one label from a closed set, or asks for tool calls.

use crate::models::{Message, ToolCall};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;

/// Declaration of a tool the engine may call
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON schema of the arguments object
    pub parameters: serde_json::Value,
}

/// One entry of the transcript sent to the engine
#[derive(Debug, Clone, PartialEq)]
pub enum Turn {
    Message(Message),
    ToolCall(ToolCall),
    ToolResult { name: String, content: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum OutputConstraint {
    FreeText,
    /// The reply text must be exactly one of these labels
    OneOf(Vec<String>),
}

#[derive(Debug, Clone)]
pub struct EngineRequest {
    pub system_instruction: String,
    pub turns: Vec<Turn>,
    pub tools: Vec<ToolSpec>,
    pub output: OutputConstraint,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineReply {
    pub text: Option<String>,
    pub tool_calls: Vec<ToolCall>,
}

impl EngineReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            tool_calls: Vec::new(),
        }
    }

    pub fn tool_call(name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            text: None,
            tool_calls: vec![ToolCall {
                name: name.into(),
                arguments,
            }],
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum EngineError {
    #[error("Engine not configured: {0}")]
    NotConfigured(String),
    #[error("Engine unreachable: {0}")]
    Unreachable(String),
    /// The engine transport gave up waiting for a reply
    #[error("Engine timed out: {0}")]
    TimedOut(String),
    #[error("Engine returned {status}: {body}")]
    Api { status: u16, body: String },
    #[error("Invalid engine response: {0}")]
    InvalidResponse(String),
}

/// Trait for the external generation engine
#[async_trait]
pub trait GenerationEngine: Send + Sync {
    fn name(&self) -> &str;

    async fn complete(&self, request: &EngineRequest) -> Result<EngineReply, EngineError>;
}

/// Replays canned replies in order and records every request.
/// Keeps the router testable without a live engine.
#[derive(Clone, Default)]
pub struct ScriptedEngine {
    replies: Arc<Mutex<VecDeque<Result<EngineReply, EngineError>>>>,
    requests: Arc<Mutex<Vec<EngineRequest>>>,
    delay: Option<Duration>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_replies<I>(replies: I) -> Self
    where
        I: IntoIterator<Item = Result<EngineReply, EngineError>>,
    {
        let engine = Self::new();
        if let Ok(mut queue) = engine.replies.lock() {
            queue.extend(replies);
        }
        engine
    }

    /// Sleep before answering, to exercise time budgets.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn push(&self, reply: Result<EngineReply, EngineError>) {
        if let Ok(mut queue) = self.replies.lock() {
            queue.push_back(reply);
        }
    }

    pub fn requests(&self) -> Vec<EngineRequest> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl GenerationEngine for ScriptedEngine {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &EngineRequest) -> Result<EngineReply, EngineError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = self
            .replies
            .lock()
            .ok()
            .and_then(|mut queue| queue.pop_front());

        next.unwrap_or_else(|| {
            Err(EngineError::Unreachable(
                "scripted engine has no replies left".to_string(),
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> EngineRequest {
        EngineRequest {
            system_instruction: "route".to_string(),
            turns: vec![Turn::Message(Message::user("hello"))],
            tools: vec![],
            output: OutputConstraint::FreeText,
        }
    }

    #[tokio::test]
    async fn test_scripted_engine_replays_in_order() {
        let engine = ScriptedEngine::with_replies(vec![
            Ok(EngineReply::text("first")),
            Ok(EngineReply::text("second")),
        ]);

        let first = engine.complete(&request()).await.unwrap();
        let second = engine.complete(&request()).await.unwrap();
        let exhausted = engine.complete(&request()).await;

        assert_eq!(first.text.as_deref(), Some("first"));
        assert_eq!(second.text.as_deref(), Some("second"));
        assert!(matches!(exhausted, Err(EngineError::Unreachable(_))));
        assert_eq!(engine.requests().len(), 3);
    }
}

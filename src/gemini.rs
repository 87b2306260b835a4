//! Gemini API client
//!
//! Production `GenerationEngine`. Uses a long-lived reqwest::Client for connection pooling.

use crate::config::Settings;
use crate::engine::{
    EngineError, EngineReply, EngineRequest, GenerationEngine, OutputConstraint, ToolSpec, Turn,
};
use crate::models::{MessageRole, ToolCall};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info};

/// Reusable Gemini client (connection-pooled)
pub struct GeminiClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(
        api_key: String,
        model: String,
        base_url: String,
        timeout: Duration,
    ) -> Result<Self, EngineError> {
        if api_key.trim().is_empty() {
            return Err(EngineError::NotConfigured(
                "GEMINI_API_KEY not configured".to_string(),
            ));
        }

        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .timeout(timeout)
            .build()
            .map_err(|e| EngineError::NotConfigured(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key,
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, EngineError> {
        Self::new(
            settings.gemini_api_key.clone(),
            settings.model_name.clone(),
            settings.gemini_base_url.clone(),
            settings.engine_timeout(),
        )
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }
}

#[async_trait]
impl GenerationEngine for GeminiClient {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn complete(&self, request: &EngineRequest) -> Result<EngineReply, EngineError> {
        let body = build_request(request);

        debug!(
            model = %self.model,
            turns = request.turns.len(),
            tools = request.tools.len(),
            "Calling Gemini API"
        );

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!("Gemini API request failed: {}", e);
                if e.is_timeout() {
                    EngineError::TimedOut(format!("Gemini API error: {}", e))
                } else {
                    EngineError::Unreachable(format!("Gemini API error: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!(status = status.as_u16(), "Gemini API error response: {}", error_text);
            return Err(EngineError::Api {
                status: status.as_u16(),
                body: error_text,
            });
        }

        let gemini_response: GeminiResponse = response.json().await.map_err(|e| {
            error!("Failed to parse Gemini response: {}", e);
            EngineError::InvalidResponse(format!("Gemini parse error: {}", e))
        })?;

        let reply = parse_reply(gemini_response)?;

        info!(
            has_text = reply.text.is_some(),
            tool_calls = reply.tool_calls.len(),
            "Gemini response received"
        );

        Ok(reply)
    }
}

/// Translate an engine request into the Gemini wire format
fn build_request(request: &EngineRequest) -> GeminiRequest {
    let mut system_text = request.system_instruction.clone();
    let mut contents: Vec<Content> = Vec::with_capacity(request.turns.len());

    for turn in &request.turns {
        match turn {
            // Gemini has no system role inside contents
            Turn::Message(message) if message.role == MessageRole::System => {
                system_text.push_str("\n\n");
                system_text.push_str(&message.content);
            }
            Turn::Message(message) => {
                let role = if message.role == MessageRole::Assistant {
                    "model"
                } else {
                    "user"
                };
                contents.push(Content {
                    role: Some(role.to_string()),
                    parts: vec![Part::text(&message.content)],
                });
            }
            Turn::ToolCall(call) => contents.push(Content {
                role: Some("model".to_string()),
                parts: vec![Part {
                    function_call: Some(FunctionCall {
                        name: call.name.clone(),
                        args: call.arguments.clone(),
                    }),
                    ..Part::default()
                }],
            }),
            Turn::ToolResult { name, content } => contents.push(Content {
                role: Some("user".to_string()),
                parts: vec![Part {
                    function_response: Some(FunctionResponse {
                        name: name.clone(),
                        response: serde_json::json!({ "content": content }),
                    }),
                    ..Part::default()
                }],
            }),
        }
    }

    let (temperature, response_mime_type, response_schema) = match &request.output {
        OutputConstraint::FreeText => (0.3, None, None),
        OutputConstraint::OneOf(labels) => (
            0.0,
            Some("text/x.enum".to_string()),
            Some(serde_json::json!({ "type": "STRING", "enum": labels })),
        ),
    };

    let tools = if request.tools.is_empty() {
        None
    } else {
        Some(vec![ToolDeclarations {
            function_declarations: request.tools.iter().map(declaration).collect(),
        }])
    };

    GeminiRequest {
        contents,
        system_instruction: Content {
            role: None,
            parts: vec![Part::text(&system_text)],
        },
        tools,
        generation_config: GenerationConfig {
            temperature,
            top_p: 0.9,
            top_k: 40,
            max_output_tokens: 2048,
            response_mime_type,
            response_schema,
        },
    }
}

fn declaration(spec: &ToolSpec) -> FunctionDeclaration {
    FunctionDeclaration {
        name: spec.name.clone(),
        description: spec.description.clone(),
        parameters: spec.parameters.clone(),
    }
}

fn parse_reply(response: GeminiResponse) -> Result<EngineReply, EngineError> {
    let candidate = response.candidates.into_iter().next().ok_or_else(|| {
        let reason = response
            .prompt_feedback
            .and_then(|f| f.block_reason)
            .unwrap_or_else(|| "no candidates".to_string());
        EngineError::InvalidResponse(format!("No response from Gemini API ({})", reason))
    })?;

    let mut text = String::new();
    let mut tool_calls = Vec::new();

    for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
        if let Some(call) = part.function_call {
            tool_calls.push(ToolCall {
                name: call.name,
                arguments: call.args,
            });
        } else if let Some(chunk) = part.text {
            text.push_str(&chunk);
        }
    }

    if text.is_empty() && tool_calls.is_empty() {
        return Err(EngineError::InvalidResponse(format!(
            "Empty response from Gemini (finish reason: {})",
            candidate.finish_reason.as_deref().unwrap_or("unknown")
        )));
    }

    Ok(EngineReply {
        text: if text.is_empty() { None } else { Some(text) },
        tool_calls,
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<Content>,
    system_instruction: Content,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ToolDeclarations>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_call: Option<FunctionCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_response: Option<FunctionResponse>,
}

impl Part {
    fn text(text: &str) -> Self {
        Self {
            text: Some(text.to_string()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct FunctionCall {
    name: String,
    #[serde(default)]
    args: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct FunctionResponse {
    name: String,
    response: serde_json::Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ToolDeclarations {
    function_declarations: Vec<FunctionDeclaration>,
}

#[derive(Debug, Serialize)]
struct FunctionDeclaration {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: i32,
    max_output_tokens: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_schema: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Message;

    #[test]
    fn test_enum_request_serialization() {
        let request = EngineRequest {
            system_instruction: "Route it.".to_string(),
            turns: vec![
                Turn::Message(Message::system("Extra rule")),
                Turn::Message(Message::user("Show me unpaid invoices")),
            ],
            tools: vec![],
            output: OutputConstraint::OneOf(vec!["Finance_Agent".into(), "Risk_Agent".into()]),
        };

        let json = serde_json::to_value(build_request(&request)).unwrap();

        assert_eq!(json["contents"].as_array().unwrap().len(), 1);
        assert_eq!(json["contents"][0]["role"], "user");
        assert_eq!(json["generationConfig"]["responseMimeType"], "text/x.enum");
        assert_eq!(json["generationConfig"]["responseSchema"]["enum"][1], "Risk_Agent");
        assert_eq!(json["generationConfig"]["temperature"], 0.0);
        assert!(json["systemInstruction"]["parts"][0]["text"]
            .as_str()
            .unwrap()
            .ends_with("Extra rule"));
        assert!(json.get("tools").is_none());
    }

    #[test]
    fn test_tool_turns_serialization() {
        let request = EngineRequest {
            system_instruction: "Operations".to_string(),
            turns: vec![
                Turn::Message(Message::user("What's in this shipment file?")),
                Turn::ToolCall(ToolCall {
                    name: "read_file".into(),
                    arguments: serde_json::json!({ "file_path": "/tmp/a.csv" }),
                }),
                Turn::ToolResult {
                    name: "read_file".into(),
                    content: "sku,qty".into(),
                },
            ],
            tools: vec![ToolSpec {
                name: "read_file".into(),
                description: "Read a file".into(),
                parameters: serde_json::json!({ "type": "object" }),
            }],
            output: OutputConstraint::FreeText,
        };

        let json = serde_json::to_value(build_request(&request)).unwrap();

        assert_eq!(json["contents"][1]["role"], "model");
        assert_eq!(json["contents"][1]["parts"][0]["functionCall"]["name"], "read_file");
        assert_eq!(
            json["contents"][2]["parts"][0]["functionResponse"]["response"]["content"],
            "sku,qty"
        );
        assert_eq!(json["tools"][0]["functionDeclarations"][0]["name"], "read_file");
        assert!(json["generationConfig"].get("responseMimeType").is_none());
    }

    #[test]
    fn test_parse_reply_variants() {
        let with_call: GeminiResponse = serde_json::from_value(serde_json::json!({
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [{ "functionCall": { "name": "get_open_invoices", "args": { "vendor_name": "Acme" } } }]
                },
                "finishReason": "STOP"
            }]
        }))
        .unwrap();
        let reply = parse_reply(with_call).unwrap();
        assert_eq!(reply.text, None);
        assert_eq!(reply.tool_calls[0].arguments["vendor_name"], "Acme");

        let blocked: GeminiResponse = serde_json::from_value(serde_json::json!({
            "promptFeedback": { "blockReason": "SAFETY" }
        }))
        .unwrap();
        let err = parse_reply(blocked).unwrap_err();
        assert!(err.to_string().contains("SAFETY"));
    }

    #[test]
    fn test_missing_key_is_rejected() {
        let result = GeminiClient::new(
            String::new(),
            "gemini-2.5-flash".into(),
            "http://localhost".into(),
            Duration::from_secs(1),
        );
        assert!(matches!(result, Err(EngineError::NotConfigured(_))));
    }
}

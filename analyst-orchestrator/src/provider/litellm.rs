//! OpenAI-compatible provider (LiteLLM proxy, OpenAI, and anything speaking
//! `/chat/completions`)
//!
//! Configuration:
//! - base_url: LiteLLM proxy URL (default: http://localhost:4000)
//! - api_key: LITELLM_MASTER_KEY or LITELLM_API_KEY
//! - model: Model name as configured in LiteLLM (e.g., "gemini-pro", "coding-best")
//!
//! This is the backend that supports function calling, which the workflow
//! uses in `tool_call` execution mode.

use super::{
    HealthStatus, LlmProvider, LlmRequest, LlmResponse, ProviderError, TokenUsage, ToolCall,
};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

pub(crate) const DEFAULT_BASE_URL: &str = "http://localhost:4000";

/// OpenAI-compatible chat completions provider
pub struct LiteLLMProvider {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    name: String,
}

impl LiteLLMProvider {
    /// Create a new LiteLLM provider with default URL (http://localhost:4000)
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self::with_base_url(DEFAULT_BASE_URL, api_key, model)
    }

    /// Create with a custom base URL
    pub fn with_base_url(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(600))
                .build()
                .expect("Failed to create HTTP client"),
            base_url,
            api_key: api_key.into(),
            model: model.into(),
            name: "litellm".to_string(),
        }
    }

    /// Override the name used in logs
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ChatTool>,
    stream: bool,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct ChatTool {
    #[serde(rename = "type")]
    kind: &'static str,
    function: ChatFunction,
}

#[derive(Serialize)]
struct ChatFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ChatToolCall>,
}

#[derive(Deserialize)]
struct ChatToolCall {
    id: Option<String>,
    function: ChatFunctionCall,
}

#[derive(Deserialize)]
struct ChatFunctionCall {
    name: String,
    /// JSON-encoded arguments object
    #[serde(default)]
    arguments: String,
}

#[derive(Deserialize)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

fn convert_tool_call(call: ChatToolCall) -> ToolCall {
    // Arguments that are not valid JSON are kept as a raw string
    let arguments = serde_json::from_str(&call.function.arguments)
        .unwrap_or(serde_json::Value::String(call.function.arguments));
    ToolCall {
        id: call.id,
        name: call.function.name,
        arguments,
    }
}

#[async_trait]
impl LlmProvider for LiteLLMProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);

        let messages = vec![
            ChatMessage {
                role: "system".to_string(),
                content: request.system.clone(),
            },
            ChatMessage {
                role: "user".to_string(),
                content: request.prompt.clone(),
            },
        ];

        let tools = request
            .tools
            .iter()
            .map(|t| ChatTool {
                kind: "function",
                function: ChatFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters.clone(),
                },
            })
            .collect();

        let chat_request = ChatRequest {
            model: self.model.clone(),
            messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            tools,
            stream: false,
        };

        let start = Instant::now();

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&chat_request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::ProviderError(format!(
                "HTTP {}: {}",
                status, body
            )));
        }

        let chat_response: ChatResponse = response.json().await?;
        let duration_ms = start.elapsed().as_millis() as u64;

        let (content, tool_calls) = match chat_response.choices.into_iter().next() {
            Some(choice) => (
                choice.message.content.unwrap_or_default(),
                choice
                    .message
                    .tool_calls
                    .into_iter()
                    .map(convert_tool_call)
                    .collect(),
            ),
            None => (String::new(), Vec::new()),
        };

        let usage = chat_response.usage.map(|u| TokenUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        });

        Ok(LlmResponse {
            content,
            tool_calls,
            usage,
            duration_ms: Some(duration_ms),
        })
    }

    async fn health_check(&self) -> HealthStatus {
        let url = format!("{}/models", self.base_url);
        let start = Instant::now();

        match self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await
        {
            Ok(response) => {
                let latency = start.elapsed().as_millis() as u64;
                if response.status().is_success() {
                    HealthStatus {
                        healthy: true,
                        latency_ms: Some(latency),
                        error: None,
                    }
                } else {
                    HealthStatus {
                        healthy: false,
                        latency_ms: Some(latency),
                        error: Some(format!("HTTP {}", response.status())),
                    }
                }
            }
            Err(e) => HealthStatus {
                healthy: false,
                latency_ms: None,
                error: Some(e.to_string()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tool_call_arguments() {
        let body = r#"{
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": "execute_python_code", "arguments": "{\"code\": \"print(2)\"}"}
                    }]
                }
            }],
            "usage": {"prompt_tokens": 3, "completion_tokens": 4, "total_tokens": 7}
        }"#;
        let parsed: ChatResponse = serde_json::from_str(body).unwrap();
        let choice = parsed.choices.into_iter().next().unwrap();
        assert!(choice.message.content.is_none());

        let call = convert_tool_call(choice.message.tool_calls.into_iter().next().unwrap());
        assert_eq!(call.id.as_deref(), Some("call_1"));
        assert_eq!(call.arguments["code"], "print(2)");
    }

    #[test]
    fn test_malformed_arguments_are_kept_raw() {
        let call = convert_tool_call(ChatToolCall {
            id: None,
            function: ChatFunctionCall {
                name: "execute_python_code".to_string(),
                arguments: "print(3)".to_string(),
            },
        });
        assert_eq!(call.arguments, serde_json::Value::String("print(3)".to_string()));
    }

    #[test]
    fn test_trailing_slash_trimmed() {
        let provider = LiteLLMProvider::with_base_url("http://proxy:4000/", "key", "coding-best");
        assert_eq!(provider.base_url, "http://proxy:4000");
        assert_eq!(provider.name(), "litellm");
    }
}

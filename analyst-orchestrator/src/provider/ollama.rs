//! Ollama LLM provider implementation

use super::{
    HealthStatus, LlmProvider, LlmRequest, LlmResponse, ProviderError, TokenUsage, ToolCall,
};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

pub(crate) const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Ollama provider for local or remote Ollama servers
pub struct OllamaProvider {
    client: Client,
    base_url: String,
    model: String,
    name: String,
}

impl OllamaProvider {
    /// Create a new Ollama provider
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let model = model.into();
        let name = format!("ollama:{}", model);

        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(600))
                .build()
                .expect("Failed to create HTTP client"),
            base_url,
            model,
            name,
        }
    }
}

/// Ollama chat API request format
#[derive(Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<OllamaTool>,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaMessage {
    role: &'static str,
    content: String,
}

#[derive(Serialize)]
struct OllamaTool {
    #[serde(rename = "type")]
    kind: &'static str,
    function: OllamaFunction,
}

#[derive(Serialize)]
struct OllamaFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Serialize)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

/// Ollama chat API response format
#[derive(Deserialize)]
struct OllamaChatResponse {
    message: OllamaResponseMessage,
    #[serde(default)]
    eval_count: Option<u32>,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    total_duration: Option<u64>,
}

#[derive(Deserialize)]
struct OllamaResponseMessage {
    #[serde(default)]
    content: String,
    #[serde(default)]
    tool_calls: Vec<OllamaToolCall>,
}

#[derive(Deserialize)]
struct OllamaToolCall {
    function: OllamaFunctionCall,
}

#[derive(Deserialize)]
struct OllamaFunctionCall {
    name: String,
    #[serde(default)]
    arguments: serde_json::Value,
}

/// Ollama tags response (for health check)
#[derive(Deserialize)]
struct OllamaTagsResponse {
    models: Vec<OllamaModel>,
}

#[derive(Deserialize)]
struct OllamaModel {
    name: String,
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, ProviderError> {
        let url = format!("{}/api/chat", self.base_url);

        let tools = request
            .tools
            .iter()
            .map(|t| OllamaTool {
                kind: "function",
                function: OllamaFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters.clone(),
                },
            })
            .collect();

        let ollama_request = OllamaChatRequest {
            model: self.model.clone(),
            messages: vec![
                OllamaMessage {
                    role: "system",
                    content: request.system.clone(),
                },
                OllamaMessage {
                    role: "user",
                    content: request.prompt.clone(),
                },
            ],
            stream: false,
            tools,
            options: OllamaOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            },
        };

        let start = Instant::now();

        let response = self
            .client
            .post(&url)
            .json(&ollama_request)
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

        let ollama_response: OllamaChatResponse = response.json().await?;

        // Use Ollama's reported duration (nanoseconds) or fall back to our measurement
        let duration_ms = ollama_response
            .total_duration
            .map(|ns| ns / 1_000_000)
            .unwrap_or_else(|| start.elapsed().as_millis() as u64);

        let usage = match (ollama_response.prompt_eval_count, ollama_response.eval_count) {
            (Some(prompt), Some(completion)) => Some(TokenUsage {
                prompt_tokens: prompt,
                completion_tokens: completion,
                total_tokens: prompt + completion,
            }),
            _ => None,
        };

        let tool_calls = ollama_response
            .message
            .tool_calls
            .into_iter()
            .map(|c| ToolCall {
                id: None,
                name: c.function.name,
                arguments: c.function.arguments,
            })
            .collect();

        Ok(LlmResponse {
            content: ollama_response.message.content,
            tool_calls,
            usage,
            duration_ms: Some(duration_ms),
        })
    }

    async fn health_check(&self) -> HealthStatus {
        let url = format!("{}/api/tags", self.base_url);
        let start = Instant::now();

        let response = match self.client.get(&url).send().await {
            Ok(response) => response,
            Err(e) => {
                return HealthStatus {
                    healthy: false,
                    latency_ms: None,
                    error: Some(e.to_string()),
                };
            }
        };

        if !response.status().is_success() {
            return HealthStatus {
                healthy: false,
                latency_ms: None,
                error: Some(format!("HTTP {}", response.status())),
            };
        }

        let latency = start.elapsed().as_millis() as u64;

        // Check if our model is pulled
        match response.json::<OllamaTagsResponse>().await {
            Ok(tags)
                if !tags
                    .models
                    .iter()
                    .any(|m| m.name == self.model || m.name.starts_with(&self.model)) =>
            {
                HealthStatus {
                    healthy: false,
                    latency_ms: Some(latency),
                    error: Some(format!("Model {} not found", self.model)),
                }
            }
            _ => HealthStatus {
                healthy: true,
                latency_ms: Some(latency),
                error: None,
            },
        }
    }
}

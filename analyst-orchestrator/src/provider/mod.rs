//! LLM Provider abstraction and implementations

mod gemini;
mod litellm;
mod ollama;

pub use gemini::GeminiProvider;
pub use litellm::LiteLLMProvider;
pub use ollama::OllamaProvider;

use crate::ProviderConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur when interacting with an LLM provider
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("JSON serialization/deserialization failed: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Provider returned error: {0}")]
    ProviderError(String),

    #[error("Timed out after {0} seconds waiting for the model")]
    Timeout(u64),

    #[error("Unknown provider type: {0}")]
    UnknownProvider(String),

    #[error("Missing API key for {0}")]
    MissingApiKey(String),
}

/// A callable tool offered to the model
#[derive(Debug, Clone, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON schema of the arguments object
    pub parameters: serde_json::Value,
}

/// A tool invocation requested by the model
#[derive(Debug, Clone, Deserialize)]
pub struct ToolCall {
    /// Provider-assigned call id, when the provider has one
    pub id: Option<String>,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// Request to send to an LLM
#[derive(Debug, Clone, Serialize)]
pub struct LlmRequest {
    /// System prompt
    pub system: String,

    /// User message/prompt
    pub prompt: String,

    /// Temperature (0.0 - 1.0)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Maximum tokens to generate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Tools the model may call instead of answering in text
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolSpec>,
}

impl LlmRequest {
    pub fn new(system: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            prompt: prompt.into(),
            temperature: None,
            max_tokens: None,
            tools: Vec::new(),
        }
    }

    pub fn with_temperature(mut self, temp: f32) -> Self {
        self.temperature = Some(temp);
        self
    }

    pub fn with_max_tokens(mut self, tokens: u32) -> Self {
        self.max_tokens = Some(tokens);
        self
    }

    pub fn with_tool(mut self, tool: ToolSpec) -> Self {
        self.tools.push(tool);
        self
    }
}

/// Response from an LLM
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LlmResponse {
    /// The generated text
    pub content: String,

    /// Tool calls requested by the model (empty for plain text answers)
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,

    /// Token usage statistics
    pub usage: Option<TokenUsage>,

    /// Time taken for generation (ms)
    pub duration_ms: Option<u64>,
}

impl LlmResponse {
    /// A plain text response
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }
}

/// Token usage statistics
#[derive(Debug, Clone, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Health status of a provider
#[derive(Debug, Clone)]
pub struct HealthStatus {
    pub healthy: bool,
    pub latency_ms: Option<u64>,
    pub error: Option<String>,
}

/// Trait for LLM providers
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Get the provider name for logging/identification
    fn name(&self) -> &str;

    /// Get the model being used
    fn model(&self) -> &str;

    /// Send a completion request to the LLM
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, ProviderError>;

    /// Check if the provider is healthy
    async fn health_check(&self) -> HealthStatus;
}

/// Run a completion with a hard upper bound on wall-clock time
pub async fn complete_with_timeout(
    provider: &dyn LlmProvider,
    request: &LlmRequest,
    timeout: Duration,
) -> Result<LlmResponse, ProviderError> {
    match tokio::time::timeout(timeout, provider.complete(request)).await {
        Ok(result) => result,
        Err(_) => Err(ProviderError::Timeout(timeout.as_secs())),
    }
}

/// Build a provider from configuration, reading API keys from the
/// environment when the config leaves them out
pub fn build_provider(config: &ProviderConfig) -> Result<Arc<dyn LlmProvider>, ProviderError> {
    let provider: Arc<dyn LlmProvider> = match config.provider_type.to_lowercase().as_str() {
        "ollama" => {
            let base_url = config
                .base_url
                .clone()
                .unwrap_or_else(|| ollama::DEFAULT_BASE_URL.to_string());
            Arc::new(OllamaProvider::new(base_url, &config.model))
        }
        "litellm" => {
            let api_key = config
                .api_key
                .clone()
                .or_else(|| std::env::var("LITELLM_MASTER_KEY").ok())
                .or_else(|| std::env::var("LITELLM_API_KEY").ok())
                .unwrap_or_default();
            let base_url = config
                .base_url
                .clone()
                .unwrap_or_else(|| litellm::DEFAULT_BASE_URL.to_string());
            Arc::new(LiteLLMProvider::with_base_url(base_url, api_key, &config.model))
        }
        "openai" => {
            let api_key = config
                .api_key
                .clone()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok())
                .ok_or_else(|| ProviderError::MissingApiKey("openai".to_string()))?;
            let base_url = config
                .base_url
                .clone()
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string());
            Arc::new(
                LiteLLMProvider::with_base_url(base_url, api_key, &config.model).with_name("openai"),
            )
        }
        "gemini" => {
            let api_key = config
                .api_key
                .clone()
                .or_else(|| std::env::var("GEMINI_API_KEY").ok())
                .or_else(|| std::env::var("GOOGLE_API_KEY").ok())
                .ok_or_else(|| ProviderError::MissingApiKey("gemini".to_string()))?;
            let mut provider = GeminiProvider::new(api_key, &config.model);
            if let Some(base_url) = &config.base_url {
                provider = provider.with_base_url(base_url);
            }
            Arc::new(provider)
        }
        other => return Err(ProviderError::UnknownProvider(other.to_string())),
    };

    Ok(provider)
}

//! Shared fixtures: a scripted model and a shell-backed workflow

#![allow(dead_code)]

use analyst::provider::{HealthStatus, ProviderError, ToolCall};
use analyst::sandbox::TOOL_NAME;
use analyst::{
    LlmProvider, LlmRequest, LlmResponse, MemoryArtifactStore, SandboxExecutor, Workflow,
    WorkflowConfig,
};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const INITIAL_SCRIPT: &str = "/virtual/scripts/summary.sh";
pub const CLEANED_SCRIPT: &str = "/virtual/scripts/summary_cleaned.sh";
pub const INPUT_CSV: &str = "/virtual/data/raw.csv";
pub const OUTPUT_DIR: &str = "/virtual/out";

/// One canned model reply
#[derive(Debug, Clone)]
pub enum Reply {
    Text(String),
    Fail(String),
    /// Call a tool with the given code
    Tool { name: String, code: String },
    /// Call the sandbox tool with the code block found in the prompt
    EchoCode,
}

pub fn text(s: &str) -> Reply {
    Reply::Text(s.to_string())
}

pub fn fail(s: &str) -> Reply {
    Reply::Fail(s.to_string())
}

/// Replays replies in order and records every request
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<LlmRequest>>,
}

impl ScriptedProvider {
    pub fn new(replies: impl IntoIterator<Item = Reply>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn remaining(&self) -> usize {
        self.replies.lock().unwrap().len()
    }
}

fn code_block(prompt: &str) -> String {
    let start = prompt
        .find("```python\n")
        .map(|i| i + "```python\n".len())
        .unwrap_or(0);
    let end = prompt[start..]
        .find("\n```")
        .map(|i| start + i)
        .unwrap_or(prompt.len());
    prompt[start..end].to_string()
}

fn tool_call(name: &str, code: String) -> LlmResponse {
    LlmResponse {
        tool_calls: vec![ToolCall {
            id: Some("call_0".to_string()),
            name: name.to_string(),
            arguments: serde_json::json!({ "code": code }),
        }],
        ..Default::default()
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        "scripted-model"
    }

    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, ProviderError> {
        self.requests.lock().unwrap().push(request.clone());
        let reply = self.replies.lock().unwrap().pop_front();
        match reply {
            Some(Reply::Text(s)) => Ok(LlmResponse::text(s)),
            Some(Reply::Fail(s)) => Err(ProviderError::ProviderError(s)),
            Some(Reply::Tool { name, code }) => Ok(tool_call(&name, code)),
            Some(Reply::EchoCode) => Ok(tool_call(TOOL_NAME, code_block(&request.prompt))),
            None => Err(ProviderError::ProviderError("script exhausted".to_string())),
        }
    }

    async fn health_check(&self) -> HealthStatus {
        HealthStatus {
            healthy: true,
            latency_ms: None,
            error: None,
        }
    }
}

pub fn config() -> WorkflowConfig {
    WorkflowConfig::new(
        INITIAL_SCRIPT,
        CLEANED_SCRIPT,
        INPUT_CSV,
        OUTPUT_DIR,
        analyst::ProviderConfig {
            provider_type: "scripted".to_string(),
            base_url: None,
            model: "scripted-model".to_string(),
            api_key: None,
        },
    )
}

/// Store with both summary scripts registered
pub fn store() -> Arc<MemoryArtifactStore> {
    Arc::new(
        MemoryArtifactStore::new()
            .with_script(INITIAL_SCRIPT, "echo 'rows: 3'")
            .with_script(CLEANED_SCRIPT, "echo 'cleaned rows: 2'"),
    )
}

/// `/bin/sh` stands in for the Python interpreter
pub fn shell(timeout: Duration) -> SandboxExecutor {
    SandboxExecutor::with_interpreter("/bin/sh", timeout)
}

pub fn workflow(
    config: WorkflowConfig,
    provider: &Arc<ScriptedProvider>,
    store: &Arc<MemoryArtifactStore>,
) -> Workflow {
    workflow_with_timeout(config, provider, store, Duration::from_secs(10))
}

pub fn workflow_with_timeout(
    config: WorkflowConfig,
    provider: &Arc<ScriptedProvider>,
    store: &Arc<MemoryArtifactStore>,
    timeout: Duration,
) -> Workflow {
    Workflow::new(config, provider.clone(), shell(timeout), store.clone())
}

/// Plan and code replies for analysis, visualisation and trends, all succeeding
pub fn downstream_replies() -> Vec<Reply> {
    vec![
        text("1. Count rows per category"),
        text("```sh\necho 'analysis done'\n```"),
        text("1. Histogram of amount"),
        text("echo 'plots saved'"),
        text("1. Rolling average of amount"),
        text("echo 'trends found'"),
    ]
}

/// Every reply of a run where each generated script succeeds first time
pub fn happy_replies() -> Vec<Reply> {
    let mut replies = vec![text("1. Drop duplicate rows"), text("echo 'cleaned'")];
    replies.extend(downstream_replies());
    replies
}

//! Analyst Orchestrator - self-healing data-analysis pipelines driven by an LLM
//!
//! This crate provides:
//! - LLM provider backends (Ollama, OpenAI-compatible/LiteLLM, Gemini)
//! - A subprocess sandbox that runs generated Python scripts with a hard timeout
//! - A pluggable outcome classifier for unstructured process output
//! - A bounded repair loop that rewrites failing scripts from their diagnostics
//! - The workflow state machine: summarize, clean, analyse, visualise, find trends

pub mod artifacts;
pub mod classify;
pub mod planner;
pub mod provider;
pub mod repair;
pub mod sandbox;
pub mod stage;
pub mod state;
pub mod templates;
pub mod workflow;

pub use artifacts::{ArtifactStore, FsArtifactStore, MemoryArtifactStore};
pub use classify::{Classification, ClassifierPolicy, KeywordHeuristic, StrictPolicy};
pub use provider::{LlmProvider, LlmRequest, LlmResponse};
pub use sandbox::{ExecutionOutcome, SandboxExecutor};
pub use stage::{Stage, Step};
pub use state::WorkflowState;
pub use workflow::{Node, RunReport, Workflow, WorkflowError};

use serde::Deserialize;
use std::path::PathBuf;

/// Configuration for a workflow run
#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowConfig {
    /// Script that prints a summary of the raw dataset
    pub initial_script_path: PathBuf,

    /// Script that prints a summary of the cleaned dataset
    pub cleaned_summary_script_path: PathBuf,

    /// The raw input dataset
    pub input_csv_path: PathBuf,

    /// Directory receiving plans, code, logs, plots and the cleaned dataset
    pub output_dir: PathBuf,

    /// Repair budget per step
    #[serde(default = "default_max_rewrite_attempts")]
    pub max_rewrite_attempts: u32,

    /// Diagnostic text embedded in a repair request is cut to this many chars
    #[serde(default = "default_diagnostic_limit")]
    pub diagnostic_limit: usize,

    /// Leading chars of output scanned by the keyword heuristic
    #[serde(default = "default_keyword_window")]
    pub keyword_window: usize,

    /// Upper bound on a single model call
    #[serde(default = "default_model_timeout_secs")]
    pub model_timeout_secs: u64,

    /// Sampling temperature for plan, code and repair calls
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// How scripts reach the sandbox
    #[serde(default)]
    pub execution_mode: ExecutionMode,

    /// Which classifier decides success vs failure
    #[serde(default)]
    pub classifier: ClassifierKind,

    /// Sandbox configuration
    #[serde(default)]
    pub executor: ExecutorConfig,

    /// Model provider configuration
    pub provider: ProviderConfig,
}

fn default_max_rewrite_attempts() -> u32 { 4 }
fn default_diagnostic_limit() -> usize { 2000 }
fn default_keyword_window() -> usize { 3000 }
fn default_model_timeout_secs() -> u64 { 600 }
fn default_temperature() -> f32 { 0.3 }

impl WorkflowConfig {
    /// Build a config with default tuning for the given paths
    pub fn new(
        initial_script_path: impl Into<PathBuf>,
        cleaned_summary_script_path: impl Into<PathBuf>,
        input_csv_path: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
        provider: ProviderConfig,
    ) -> Self {
        Self {
            initial_script_path: initial_script_path.into(),
            cleaned_summary_script_path: cleaned_summary_script_path.into(),
            input_csv_path: input_csv_path.into(),
            output_dir: output_dir.into(),
            max_rewrite_attempts: default_max_rewrite_attempts(),
            diagnostic_limit: default_diagnostic_limit(),
            keyword_window: default_keyword_window(),
            model_timeout_secs: default_model_timeout_secs(),
            temperature: default_temperature(),
            execution_mode: ExecutionMode::default(),
            classifier: ClassifierKind::default(),
            executor: ExecutorConfig::default(),
            provider,
        }
    }

    /// Parse a TOML document
    pub fn from_toml(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }
}

/// How the workflow hands code to the sandbox
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// The workflow calls the sandbox itself
    #[default]
    Direct,
    /// The model is asked to call the `execute_python_code` tool with the code
    ToolCall,
}

impl std::str::FromStr for ExecutionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "direct" => Ok(ExecutionMode::Direct),
            "tool_call" | "tool-call" | "tool" => Ok(ExecutionMode::ToolCall),
            other => Err(format!("unknown execution mode '{}'", other)),
        }
    }
}

/// Classifier selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassifierKind {
    /// Failure sentinel, then keyword sniffing over the leading window
    #[default]
    Keyword,
    /// Failure sentinel and exit code only
    Strict,
}

/// Configuration for the subprocess sandbox
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutorConfig {
    /// Interpreter binary (None = auto-detect python3/python on PATH)
    #[serde(default)]
    pub interpreter: Option<PathBuf>,

    /// Wall-clock limit per execution in seconds
    #[serde(default = "default_exec_timeout_secs")]
    pub timeout_secs: u64,

    /// Directory for temporary script files (None = system temp dir)
    #[serde(default)]
    pub scratch_dir: Option<PathBuf>,
}

fn default_exec_timeout_secs() -> u64 { 300 }

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            interpreter: None,
            timeout_secs: default_exec_timeout_secs(),
            scratch_dir: None,
        }
    }
}

/// Configuration for the LLM provider
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    /// Provider type: "ollama", "litellm", "openai", "gemini"
    pub provider_type: String,

    /// Base URL for the provider (None = provider default)
    #[serde(default)]
    pub base_url: Option<String>,

    /// Model name
    pub model: String,

    /// Optional API key (falls back to the provider's environment variable)
    #[serde(default)]
    pub api_key: Option<String>,
}

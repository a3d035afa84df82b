//! The sandbox exposed as a model-callable function

use super::{ExecutionOutcome, SandboxExecutor};
use crate::provider::ToolSpec;
use serde_json::{Value, json};
use tracing::debug;

/// Name the model uses to invoke the sandbox
pub const TOOL_NAME: &str = "execute_python_code";

/// Adapter that lets a model call the sandbox with a `code` argument
pub struct SandboxTool<'a> {
    executor: &'a SandboxExecutor,
}

impl<'a> SandboxTool<'a> {
    pub fn new(executor: &'a SandboxExecutor) -> Self {
        Self { executor }
    }

    /// Function declaration offered to the model
    pub fn spec() -> ToolSpec {
        ToolSpec {
            name: TOOL_NAME.to_string(),
            description: "Executes a Python script in a fresh interpreter process and returns \
                          its standard output, or a message starting with 'Execution Error:' \
                          when it fails."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "code": {
                        "type": "string",
                        "description": "The complete Python script to execute"
                    }
                },
                "required": ["code"]
            }),
        }
    }

    /// Run the `code` argument of a tool call. A missing argument runs nothing.
    pub async fn call(&self, arguments: &Value) -> ExecutionOutcome {
        let code = match arguments {
            Value::Object(map) => map.get("code").and_then(Value::as_str).unwrap_or_default(),
            // Some providers hand back the raw argument string
            Value::String(raw) => raw.as_str(),
            _ => "",
        };
        debug!(code_len = code.len(), "Tool call received");
        self.executor.execute(code).await
    }
}

//! Stage planning and code generation

use crate::provider::{LlmProvider, LlmRequest, complete_with_timeout};
use crate::sandbox::{clean_code, success_payload};
use crate::stage::Stage;
use crate::templates::{self, GENERIC_SUMMARY, PathContext};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors from planning or generation. Neither is retried.
#[derive(Error, Debug)]
pub enum PlannerError {
    #[error("Failed to generate {stage} plan: {message}")]
    Planning { stage: Stage, message: String },

    #[error("Failed to generate code for {stage}: {message}")]
    Generation { stage: Stage, message: String },
}

/// Dataset context for a planning call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanContext {
    /// Label for where the summary came from
    pub source: &'static str,
    pub summary: String,
    /// Already planned visualisations (trends only)
    pub visualisation_plan: String,
}

/// Pick the summary a stage plans from.
///
/// Cleaning reads the initial summary transcript. Later stages read the
/// cleaned summary, falling back to the last raw output. With nothing at all
/// the generic instruction is used.
pub fn plan_context(
    stage: Stage,
    tool_output: &str,
    cleaned_summary: &str,
    visualisation_plan: &str,
) -> PlanContext {
    let (source, summary) = match stage {
        Stage::Cleaning => ("Initial Data Summary", success_payload(tool_output)),
        _ if !cleaned_summary.trim().is_empty() => {
            ("Cleaned Data Summary", cleaned_summary.to_string())
        }
        _ => ("Previous Step Output (Fallback)", tool_output.to_string()),
    };

    let summary = if summary.trim().is_empty() {
        warn!(stage = %stage, source, "No summary available, planning from a generic instruction");
        GENERIC_SUMMARY.to_string()
    } else {
        summary
    };

    PlanContext {
        source,
        summary,
        visualisation_plan: visualisation_plan.to_string(),
    }
}

/// Plans a stage and turns plans into scripts
pub struct Planner {
    provider: Arc<dyn LlmProvider>,
    temperature: f32,
    timeout: Duration,
}

impl Planner {
    pub fn new(provider: Arc<dyn LlmProvider>, temperature: f32, timeout: Duration) -> Self {
        Self {
            provider,
            temperature,
            timeout,
        }
    }

    /// Ask the model for a plan document
    pub async fn plan(
        &self,
        stage: Stage,
        paths: &PathContext,
        context: &PlanContext,
    ) -> Result<String, PlannerError> {
        info!(stage = %stage, source = context.source, "Generating plan");

        let prompt = templates::plan_prompt(
            stage,
            paths,
            context.source,
            &context.summary,
            &context.visualisation_plan,
        );
        let request = LlmRequest::new(prompt.system, prompt.user).with_temperature(self.temperature);

        let response = complete_with_timeout(self.provider.as_ref(), &request, self.timeout)
            .await
            .map_err(|e| PlannerError::Planning {
                stage,
                message: e.to_string(),
            })?;

        debug!(
            stage = %stage,
            plan_len = response.content.len(),
            duration_ms = ?response.duration_ms,
            tokens = ?response.usage.as_ref().map(|u| u.total_tokens),
            "Plan received"
        );
        Ok(response.content)
    }

    /// Ask the model for a script implementing `plan` inside the stage skeleton
    pub async fn generate(
        &self,
        stage: Stage,
        paths: &PathContext,
        plan: &str,
    ) -> Result<String, PlannerError> {
        if plan.trim().is_empty() {
            return Err(PlannerError::Generation {
                stage,
                message: format!("{} plan not found", stage),
            });
        }

        info!(stage = %stage, "Generating code");

        let prompt = templates::generation_prompt(stage, paths, plan);
        let request = LlmRequest::new(prompt.system, prompt.user).with_temperature(self.temperature);

        let response = complete_with_timeout(self.provider.as_ref(), &request, self.timeout)
            .await
            .map_err(|e| PlannerError::Generation {
                stage,
                message: e.to_string(),
            })?;

        let code = clean_code(&response.content);
        if code.is_empty() {
            return Err(PlannerError::Generation {
                stage,
                message: "model returned no code".to_string(),
            });
        }

        debug!(stage = %stage, code_len = code.len(), "Code received");
        Ok(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{HealthStatus, LlmResponse, ProviderError};
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::Mutex;

    struct FixedProvider {
        reply: Result<String, String>,
        prompts: Mutex<Vec<LlmRequest>>,
    }

    impl FixedProvider {
        fn ok(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(reply.to_string()),
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn failing(message: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Err(message.to_string()),
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl LlmProvider for FixedProvider {
        fn name(&self) -> &str {
            "fixed"
        }

        fn model(&self) -> &str {
            "fixed"
        }

        async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, ProviderError> {
            self.prompts.lock().unwrap().push(request.clone());
            match &self.reply {
                Ok(text) => Ok(LlmResponse::text(text.clone())),
                Err(message) => Err(ProviderError::ProviderError(message.clone())),
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

    fn paths() -> PathContext {
        PathContext::new(Path::new("/data/raw.csv"), Path::new("/data/out"))
    }

    #[test]
    fn test_cleaning_context_strips_success_sentinel() {
        let ctx = plan_context(
            Stage::Cleaning,
            "Execution successful. Output:\ncolumns: a, b\n",
            "",
            "",
        );
        assert_eq!(ctx.source, "Initial Data Summary");
        assert_eq!(ctx.summary, "columns: a, b");
    }

    #[test]
    fn test_later_stages_prefer_cleaned_summary() {
        let ctx = plan_context(Stage::Analysis, "last output", "cleaned: 10 rows", "");
        assert_eq!(ctx.source, "Cleaned Data Summary");
        assert_eq!(ctx.summary, "cleaned: 10 rows");

        let fallback = plan_context(Stage::Visualisation, "last output", "", "");
        assert_eq!(fallback.source, "Previous Step Output (Fallback)");
        assert_eq!(fallback.summary, "last output");
    }

    #[test]
    fn test_generic_summary_when_nothing_available() {
        let ctx = plan_context(Stage::Trends, "", "  ", "1. histogram");
        assert_eq!(ctx.summary, GENERIC_SUMMARY);
        assert_eq!(ctx.visualisation_plan, "1. histogram");
    }

    #[tokio::test]
    async fn test_plan_returns_model_text() {
        let provider = FixedProvider::ok("1. Drop duplicate rows");
        let planner = Planner::new(provider.clone(), 0.3, Duration::from_secs(5));
        let ctx = plan_context(Stage::Cleaning, "Execution successful. Output:\nrows", "", "");

        let plan = planner.plan(Stage::Cleaning, &paths(), &ctx).await.unwrap();
        assert_eq!(plan, "1. Drop duplicate rows");

        let prompts = provider.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert_eq!(prompts[0].temperature, Some(0.3));
        assert!(prompts[0].prompt.contains("Initial Data Summary"));
    }

    #[tokio::test]
    async fn test_plan_failure_maps_to_planning_error() {
        let planner = Planner::new(FixedProvider::failing("quota"), 0.3, Duration::from_secs(5));
        let ctx = plan_context(Stage::Analysis, "x", "y", "");
        let err = planner.plan(Stage::Analysis, &paths(), &ctx).await.unwrap_err();
        assert!(matches!(err, PlannerError::Planning { stage: Stage::Analysis, .. }));
        assert!(err.to_string().contains("quota"));
    }

    #[tokio::test]
    async fn test_generate_strips_fences() {
        let provider = FixedProvider::ok("```python\nimport pandas as pd\n```");
        let planner = Planner::new(provider, 0.3, Duration::from_secs(5));
        let code = planner
            .generate(Stage::Analysis, &paths(), "1. count rows")
            .await
            .unwrap();
        assert_eq!(code, "import pandas as pd");
    }

    #[tokio::test]
    async fn test_generate_requires_plan_and_code() {
        let provider = FixedProvider::ok("```python\n```");
        let planner = Planner::new(provider.clone(), 0.3, Duration::from_secs(5));

        let missing = planner.generate(Stage::Trends, &paths(), "  ").await;
        assert!(matches!(missing, Err(PlannerError::Generation { .. })));
        assert!(provider.prompts.lock().unwrap().is_empty());

        let empty = planner.generate(Stage::Trends, &paths(), "1. heatmap").await;
        assert!(matches!(empty, Err(PlannerError::Generation { .. })));
    }
}

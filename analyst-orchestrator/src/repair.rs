//! Code repair from captured diagnostics

use crate::provider::{LlmProvider, LlmRequest, ProviderError, complete_with_timeout};
use crate::sandbox::clean_code;
use crate::stage::Step;
use crate::templates::{self, PathContext, truncate_diagnostic};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Why a repair produced nothing usable
#[derive(Error, Debug)]
pub enum RepairError {
    #[error("Model invocation failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("Model returned no code")]
    EmptyResponse,
}

/// Result of one repair attempt
#[derive(Debug)]
pub enum RepairOutcome {
    /// New code, different from the failing code
    Repaired(String),
    /// The model returned the failing code unchanged
    NoChange,
    Failed(RepairError),
}

/// Rewrites failing scripts with the model
pub struct Repairer {
    provider: Arc<dyn LlmProvider>,
    temperature: f32,
    timeout: Duration,
    diagnostic_limit: usize,
}

impl Repairer {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        temperature: f32,
        timeout: Duration,
        diagnostic_limit: usize,
    ) -> Self {
        Self {
            provider,
            temperature,
            timeout,
            diagnostic_limit,
        }
    }

    pub async fn repair(
        &self,
        step: Step,
        paths: &PathContext,
        failing_code: &str,
        diagnostic: &str,
    ) -> RepairOutcome {
        let diagnostic = truncate_diagnostic(diagnostic, self.diagnostic_limit);
        debug!(step = %step, diagnostic = %diagnostic, "Requesting repair");

        let prompt = templates::repair_prompt(step, paths, failing_code, &diagnostic);
        let request = LlmRequest::new(prompt.system, prompt.user).with_temperature(self.temperature);

        let response =
            match complete_with_timeout(self.provider.as_ref(), &request, self.timeout).await {
                Ok(response) => response,
                Err(e) => {
                    warn!(step = %step, error = %e, "Repair call failed");
                    return RepairOutcome::Failed(e.into());
                }
            };

        let repaired = clean_code(&response.content);
        if repaired.is_empty() {
            warn!(step = %step, "Model returned no repaired code");
            return RepairOutcome::Failed(RepairError::EmptyResponse);
        }
        if repaired == clean_code(failing_code) {
            info!(step = %step, "Model returned the same code");
            return RepairOutcome::NoChange;
        }

        info!(step = %step, code_len = repaired.len(), "Code rewritten");
        RepairOutcome::Repaired(repaired)
    }
}

//! The workflow state machine
//!
//! ```text
//! init -> initial_summary -> plan_cleaning -> generate_cleaning_code -> execute_cleaning
//!      -> load_cleaned_summary_script -> execute_cleaned_summary
//!      -> plan_analysis -> generate_analysis_code -> execute_analysis
//!      -> plan_visualisation -> generate_visualisation_code -> execute_visualisation
//!      -> plan_trends -> generate_trends_code -> execute_trends -> END
//! ```
//!
//! Every execute node may detour through `repair`, which always returns to the
//! same execute node. Transitions are strictly sequential.

use crate::artifacts::ArtifactStore;
use crate::classify::{self, Classification, ClassifierPolicy};
use crate::planner::{PlanContext, Planner, PlannerError, plan_context};
use crate::provider::{LlmProvider, LlmRequest, complete_with_timeout};
use crate::repair::{RepairOutcome, Repairer};
use crate::sandbox::{FAILURE_SENTINEL, SandboxExecutor, SandboxTool, TOOL_NAME, success_payload};
use crate::stage::{Stage, Step};
use crate::state::WorkflowState;
use crate::templates;
use crate::{ExecutionMode, WorkflowConfig};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Diagnostic for an execution attempted with no code
pub const NO_CODE_MESSAGE: &str = "No code provided for execution.";

/// Why a run stopped before completing
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("Bootstrap failed: {0}")]
    Bootstrap(String),

    #[error("Script not found or empty: {path:?}")]
    MissingScript { path: PathBuf },

    #[error("Planning failed for {stage}: {message}")]
    Planning { stage: Stage, message: String },

    #[error("Code generation failed for {stage}: {message}")]
    Generation { stage: Stage, message: String },

    #[error("Repair budget exhausted at {step} after {attempts} attempts")]
    RepairExhausted { step: Step, attempts: u32 },
}

impl From<PlannerError> for WorkflowError {
    fn from(err: PlannerError) -> Self {
        match err {
            PlannerError::Planning { stage, message } => WorkflowError::Planning { stage, message },
            PlannerError::Generation { stage, message } => {
                WorkflowError::Generation { stage, message }
            }
        }
    }
}

/// A state of the machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Node {
    Init,
    Execute(Step),
    Repair,
    Plan(Stage),
    Generate(Stage),
    LoadCleanedSummaryScript,
    End,
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Init => f.write_str("init"),
            Node::Execute(step) => f.write_str(step.name()),
            Node::Repair => f.write_str("repair"),
            Node::Plan(stage) => write!(f, "plan_{}", stage),
            Node::Generate(stage) => write!(f, "generate_{}_code", stage),
            Node::LoadCleanedSummaryScript => f.write_str("load_cleaned_summary_script"),
            Node::End => f.write_str("END"),
        }
    }
}

/// Outcome of a full run
#[derive(Debug, Clone)]
pub struct RunReport {
    /// The trends step succeeded
    pub completed: bool,
    pub final_step: Step,
    pub stop_reason: Option<WorkflowError>,
    pub iterations: u32,
    /// Every node entered, in order, ending with `END`
    pub visited: Vec<Node>,
    pub state: WorkflowState,
}

/// Drives one dataset through summarize, clean, analyse, visualise and trends
pub struct Workflow {
    config: WorkflowConfig,
    provider: Arc<dyn LlmProvider>,
    executor: SandboxExecutor,
    store: Arc<dyn ArtifactStore>,
    classifier: Box<dyn ClassifierPolicy>,
    planner: Planner,
    repairer: Repairer,
    model_timeout: Duration,
}

impl Workflow {
    pub fn new(
        config: WorkflowConfig,
        provider: Arc<dyn LlmProvider>,
        executor: SandboxExecutor,
        store: Arc<dyn ArtifactStore>,
    ) -> Self {
        let model_timeout = Duration::from_secs(config.model_timeout_secs);
        let classifier = classify::policy_for(config.classifier, config.keyword_window);
        let planner = Planner::new(provider.clone(), config.temperature, model_timeout);
        let repairer = Repairer::new(
            provider.clone(),
            config.temperature,
            model_timeout,
            config.diagnostic_limit,
        );

        Self {
            config,
            provider,
            executor,
            store,
            classifier,
            planner,
            repairer,
            model_timeout,
        }
    }

    /// Replace the configured classifier
    pub fn with_classifier(mut self, classifier: Box<dyn ClassifierPolicy>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    /// Run from `init` to `END`
    pub async fn run(&self) -> RunReport {
        let mut state = WorkflowState::new(&self.config);
        let mut visited = Vec::new();
        let mut node = Node::Init;

        info!(
            provider = self.provider.name(),
            classifier = self.classifier.name(),
            mode = ?self.config.execution_mode,
            "Starting workflow"
        );

        while node != Node::End {
            visited.push(node);
            node = self.step(node, &mut state).await;
        }
        visited.push(Node::End);

        let completed = !state.stop_execution;
        if completed {
            info!(iterations = state.iterations, "Workflow completed");
        } else {
            error!(
                step = %state.current_step,
                reason = ?state.stop_reason,
                "Workflow stopped"
            );
        }

        RunReport {
            completed,
            final_step: state.current_step,
            stop_reason: state.stop_reason.clone(),
            iterations: state.iterations,
            visited,
            state,
        }
    }

    /// Perform one transition and return the next node
    pub async fn step(&self, node: Node, state: &mut WorkflowState) -> Node {
        if node != Node::Init && state.stop_execution {
            debug!(node = %node, "Stop flag set");
            return Node::End;
        }

        match node {
            Node::Init => self.init(state),
            Node::Execute(_) => {
                self.execute(state).await;
                self.route(state)
            }
            Node::Repair => {
                self.repair(state).await;
                Node::Execute(state.current_step)
            }
            Node::Plan(stage) => self.plan(stage, state).await,
            Node::Generate(stage) => self.generate(stage, state).await,
            Node::LoadCleanedSummaryScript => self.load_cleaned_summary_script(state),
            Node::End => Node::End,
        }
    }

    fn init(&self, state: &mut WorkflowState) -> Node {
        *state = WorkflowState::new(&self.config);

        if let Err(e) = state.resolve_paths() {
            error!(error = %e, "Cannot resolve configured paths");
            state.stop(WorkflowError::Bootstrap(format!("cannot resolve paths: {}", e)));
            return Node::End;
        }

        if let Err(e) = self.store.prepare() {
            error!(output_dir = ?state.output_dir, error = %e, "Cannot create output directory");
            state.stop(WorkflowError::Bootstrap(e.to_string()));
            return Node::End;
        }

        let path = state.initial_script_path.clone();
        match self.store.load_script(&path) {
            Ok(code) if !code.trim().is_empty() => {
                state.enter_step(Step::InitialSummary, code);
            }
            other => {
                if let Err(e) = other {
                    error!(path = ?path, error = %e, "Cannot read initial script");
                }
                state.stop(WorkflowError::MissingScript { path });
                return Node::End;
            }
        }

        info!(
            input = ?state.input_csv_path,
            output_dir = ?state.output_dir,
            "State initialized"
        );
        Node::Execute(Step::InitialSummary)
    }

    async fn execute(&self, state: &mut WorkflowState) {
        let step = state.current_step;
        state.iterations += 1;
        info!(
            step = %step,
            iteration = state.iterations,
            description = %state.code_description,
            "Executing code"
        );

        if state.current_code.trim().is_empty() {
            warn!(step = %step, "No code to execute");
            state.tool_output = NO_CODE_MESSAGE.to_string();
            state.record_failure(NO_CODE_MESSAGE);
            return;
        }

        let (raw_output, exit_code) = match self.config.execution_mode {
            ExecutionMode::Direct => {
                let outcome = self.executor.execute(&state.current_code).await;
                (outcome.render(), outcome.exit_code())
            }
            ExecutionMode::ToolCall => self.execute_via_tool(state).await,
        };
        state.tool_output = raw_output;

        match self.classifier.classify(&state.tool_output, exit_code) {
            Classification::Success(output) => {
                info!(step = %step, "Execution successful");
                state.record_success();

                if let Err(e) = self.store.write(step.log_file(), &output) {
                    warn!(file = step.log_file(), error = %e, "Could not save execution log");
                }

                match step {
                    Step::Cleaning => {
                        if state.switch_to_cleaned_input() {
                            info!(input = ?state.input_csv_path, "Later steps read the cleaned dataset");
                        }
                    }
                    Step::CleanedSummary => {
                        state.cleaned_summary_content = success_payload(&state.tool_output);
                    }
                    _ => {}
                }
            }
            Classification::Failure(diagnostic) => {
                warn!(
                    step = %step,
                    diagnostic = %diagnostic.chars().take(300).collect::<String>(),
                    "Execution failed"
                );
                state.record_failure(diagnostic);
            }
        }
    }

    /// Hand the code to the model and run whatever it passes to the sandbox tool
    async fn execute_via_tool(&self, state: &WorkflowState) -> (String, Option<i32>) {
        let prompt = templates::execution_prompt(
            state.current_step,
            &state.paths(),
            &state.current_code,
            TOOL_NAME,
        );
        let request = LlmRequest::new(prompt.system, prompt.user)
            .with_temperature(0.0)
            .with_tool(SandboxTool::spec());

        let response =
            match complete_with_timeout(self.provider.as_ref(), &request, self.model_timeout).await
            {
                Ok(response) => response,
                Err(e) => {
                    return (
                        format!("{} LLM or Tool Invocation Error: {}", FAILURE_SENTINEL, e),
                        None,
                    );
                }
            };

        let Some(first) = response.tool_calls.first() else {
            warn!("Model did not return a tool call");
            return (
                format!(
                    "{} Model failed to invoke the {} tool.",
                    FAILURE_SENTINEL, TOOL_NAME
                ),
                None,
            );
        };

        match response
            .tool_calls
            .iter()
            .find(|call| call.name.eq_ignore_ascii_case(TOOL_NAME))
        {
            Some(call) => {
                debug!(call_id = ?call.id, "Tool call received");
                let outcome = SandboxTool::new(&self.executor).call(&call.arguments).await;
                (outcome.render(), outcome.exit_code())
            }
            None => {
                warn!(tool = %first.name, "Model invoked an unexpected tool");
                (
                    format!(
                        "{} Model invoked tool '{}' instead of '{}'.",
                        FAILURE_SENTINEL, first.name, TOOL_NAME
                    ),
                    None,
                )
            }
        }
    }

    fn route(&self, state: &mut WorkflowState) -> Node {
        let step = state.current_step;
        if state.stop_execution {
            return Node::End;
        }

        if state.execution_error {
            if state.can_repair() {
                debug!(
                    step = %step,
                    attempt = state.rewrite_attempts + 1,
                    max = state.max_rewrite_attempts,
                    "Routing to repair"
                );
                return Node::Repair;
            }
            error!(step = %step, attempts = state.rewrite_attempts, "Max rewrite attempts reached");
            state.stop(WorkflowError::RepairExhausted {
                step,
                attempts: state.rewrite_attempts,
            });
            return Node::End;
        }

        match step {
            Step::InitialSummary => Node::Plan(Stage::Cleaning),
            Step::Cleaning => Node::LoadCleanedSummaryScript,
            Step::CleanedSummary => Node::Plan(Stage::Analysis),
            Step::Analysis => Node::Plan(Stage::Visualisation),
            Step::Visualisation => Node::Plan(Stage::Trends),
            Step::Trends => Node::End,
        }
    }

    async fn repair(&self, state: &mut WorkflowState) {
        let step = state.current_step;
        state.rewrite_attempts += 1;
        info!(
            step = %step,
            attempt = state.rewrite_attempts,
            max = state.max_rewrite_attempts,
            "Rewriting code"
        );

        let outcome = self
            .repairer
            .repair(
                step,
                &state.paths(),
                &state.current_code,
                &state.error_message,
            )
            .await;

        match outcome {
            RepairOutcome::Repaired(code) => {
                if let Some(file) = step.code_file()
                    && let Err(e) = self.store.write(file, &code)
                {
                    warn!(file, error = %e, "Could not save repaired code");
                }
                state.apply_repair(code);
            }
            RepairOutcome::NoChange => {}
            RepairOutcome::Failed(e) => {
                warn!(step = %step, error = %e, "Repair produced no code");
            }
        }
    }

    async fn plan(&self, stage: Stage, state: &mut WorkflowState) -> Node {
        let context: PlanContext = plan_context(
            stage,
            &state.tool_output,
            &state.cleaned_summary_content,
            &state.visualisation_plan,
        );

        match self.planner.plan(stage, &state.paths(), &context).await {
            Ok(plan) => {
                if let Err(e) = self.store.write(stage.plan_file(), &plan) {
                    warn!(file = stage.plan_file(), error = %e, "Could not save plan");
                }
                state.set_plan(stage, plan);
                Node::Generate(stage)
            }
            Err(e) => {
                error!(stage = %stage, error = %e, "Planning failed");
                state.stop(e.into());
                Node::End
            }
        }
    }

    async fn generate(&self, stage: Stage, state: &mut WorkflowState) -> Node {
        let plan = state.plan(stage).to_string();

        match self.planner.generate(stage, &state.paths(), &plan).await {
            Ok(code) => {
                if let Err(e) = self.store.write(stage.code_file(), &code) {
                    warn!(file = stage.code_file(), error = %e, "Could not save generated code");
                }
                state.enter_step(stage.step(), code);
                Node::Execute(stage.step())
            }
            Err(e) => {
                error!(stage = %stage, error = %e, "Code generation failed");
                state.stop(e.into());
                Node::End
            }
        }
    }

    fn load_cleaned_summary_script(&self, state: &mut WorkflowState) -> Node {
        let path = state.cleaned_summary_script_path.clone();
        match self.store.load_script(&path) {
            Ok(code) if !code.trim().is_empty() => {
                info!(input = ?state.input_csv_path, "Loaded cleaned summary script");
                state.enter_step(Step::CleanedSummary, code);
                Node::Execute(Step::CleanedSummary)
            }
            other => {
                if let Err(e) = other {
                    error!(path = ?path, error = %e, "Cannot read cleaned summary script");
                }
                state.stop(WorkflowError::MissingScript { path });
                Node::End
            }
        }
    }
}

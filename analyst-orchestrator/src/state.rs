//! The mutable record threaded through every workflow transition

use crate::WorkflowConfig;
use crate::stage::{CLEANED_CSV_FILE, Stage, Step};
use crate::templates::PathContext;
use crate::workflow::WorkflowError;
use std::path::PathBuf;

/// State of one workflow run. Created per run, never persisted.
#[derive(Debug, Clone)]
pub struct WorkflowState {
    // Fixed after init
    pub initial_script_path: PathBuf,
    pub cleaned_summary_script_path: PathBuf,
    pub output_dir: PathBuf,

    /// Dataset read by the next script; switches to the cleaned dataset once
    pub input_csv_path: PathBuf,
    input_switched: bool,

    pub current_step: Step,
    pub current_code: String,
    pub code_description: String,

    pub cleaning_plan: String,
    pub analysis_plan: String,
    pub visualisation_plan: String,
    pub trends_plan: String,

    /// Summary of the cleaned dataset, captured from its summary script
    pub cleaned_summary_content: String,

    /// Raw transcript of the last execution
    pub tool_output: String,
    pub execution_error: bool,
    pub error_message: String,

    /// Executions across the whole run
    pub iterations: u32,
    /// Repairs within the current step
    pub rewrite_attempts: u32,
    pub max_rewrite_attempts: u32,

    pub stop_execution: bool,
    pub stop_reason: Option<WorkflowError>,
}

impl WorkflowState {
    pub fn new(config: &WorkflowConfig) -> Self {
        Self {
            initial_script_path: config.initial_script_path.clone(),
            cleaned_summary_script_path: config.cleaned_summary_script_path.clone(),
            output_dir: config.output_dir.clone(),
            input_csv_path: config.input_csv_path.clone(),
            input_switched: false,
            current_step: Step::InitialSummary,
            current_code: String::new(),
            code_description: Step::InitialSummary.description().to_string(),
            cleaning_plan: String::new(),
            analysis_plan: String::new(),
            visualisation_plan: String::new(),
            trends_plan: String::new(),
            cleaned_summary_content: String::new(),
            tool_output: String::new(),
            execution_error: false,
            error_message: String::new(),
            iterations: 0,
            rewrite_attempts: 0,
            max_rewrite_attempts: config.max_rewrite_attempts,
            stop_execution: false,
            stop_reason: None,
        }
    }

    /// Make every configured path absolute
    pub fn resolve_paths(&mut self) -> std::io::Result<()> {
        self.initial_script_path = std::path::absolute(&self.initial_script_path)?;
        self.cleaned_summary_script_path = std::path::absolute(&self.cleaned_summary_script_path)?;
        self.input_csv_path = std::path::absolute(&self.input_csv_path)?;
        self.output_dir = std::path::absolute(&self.output_dir)?;
        Ok(())
    }

    /// Move the cursor to a new step with fresh code and a fresh repair budget
    pub fn enter_step(&mut self, step: Step, code: impl Into<String>) {
        self.current_step = step;
        self.current_code = code.into();
        self.code_description = step.description().to_string();
        self.rewrite_attempts = 0;
        self.execution_error = false;
        self.error_message.clear();
    }

    pub fn plan(&self, stage: Stage) -> &str {
        match stage {
            Stage::Cleaning => &self.cleaning_plan,
            Stage::Analysis => &self.analysis_plan,
            Stage::Visualisation => &self.visualisation_plan,
            Stage::Trends => &self.trends_plan,
        }
    }

    pub fn set_plan(&mut self, stage: Stage, plan: String) {
        match stage {
            Stage::Cleaning => self.cleaning_plan = plan,
            Stage::Analysis => self.analysis_plan = plan,
            Stage::Visualisation => self.visualisation_plan = plan,
            Stage::Trends => self.trends_plan = plan,
        }
    }

    pub fn record_failure(&mut self, diagnostic: impl Into<String>) {
        self.execution_error = true;
        self.error_message = diagnostic.into();
    }

    pub fn record_success(&mut self) {
        self.execution_error = false;
        self.error_message.clear();
    }

    /// Install repaired code. Errors are cleared until the next execution says otherwise.
    pub fn apply_repair(&mut self, code: String) {
        self.current_code = code;
        self.record_success();
    }

    /// Whether another repair is allowed for the current step
    pub fn can_repair(&self) -> bool {
        self.rewrite_attempts < self.max_rewrite_attempts
    }

    /// Set the termination flag. The first reason wins.
    pub fn stop(&mut self, reason: WorkflowError) {
        self.stop_execution = true;
        if self.stop_reason.is_none() {
            self.stop_reason = Some(reason);
        }
    }

    /// Point later steps at the cleaned dataset. Returns false if already done.
    pub fn switch_to_cleaned_input(&mut self) -> bool {
        if self.input_switched {
            return false;
        }
        self.input_csv_path = self.output_dir.join(CLEANED_CSV_FILE);
        self.input_switched = true;
        true
    }

    /// Absolute paths for prompts and skeletons
    pub fn paths(&self) -> PathContext {
        PathContext::new(&self.input_csv_path, &self.output_dir)
    }
}

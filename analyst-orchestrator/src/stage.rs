//! Pipeline stages and executable steps

use std::fmt;

/// Cleaned dataset written by the cleaning step
pub const CLEANED_CSV_FILE: &str = "data_processed.csv";

/// Plot directory for the visualisation stage
pub const PLOT_DIR: &str = "saved_plots";

/// Plot directory for the trends stage
pub const TREND_PLOT_DIR: &str = "trend_plots";

/// A planned stage: the model writes a plan, then a script implementing it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Cleaning,
    Analysis,
    Visualisation,
    Trends,
}

impl Stage {
    pub const ALL: [Stage; 4] = [
        Stage::Cleaning,
        Stage::Analysis,
        Stage::Visualisation,
        Stage::Trends,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Stage::Cleaning => "cleaning",
            Stage::Analysis => "analysis",
            Stage::Visualisation => "visualisation",
            Stage::Trends => "trends",
        }
    }

    pub fn plan_file(self) -> &'static str {
        match self {
            Stage::Cleaning => "cleaning_plan.md",
            Stage::Analysis => "analysis_plan.md",
            Stage::Visualisation => "visualisation_plan.md",
            Stage::Trends => "trends_plan.md",
        }
    }

    pub fn code_file(self) -> &'static str {
        match self {
            Stage::Cleaning => "cleaning_code.py",
            Stage::Analysis => "analysis_code.py",
            Stage::Visualisation => "visualisation_code.py",
            Stage::Trends => "trends_code.py",
        }
    }

    /// Maximum number of plan items, if bounded
    pub fn plan_limit(self) -> Option<usize> {
        match self {
            Stage::Cleaning => None,
            Stage::Analysis => Some(10),
            Stage::Visualisation | Stage::Trends => Some(6),
        }
    }

    /// The step that executes this stage's generated script
    pub fn step(self) -> Step {
        match self {
            Stage::Cleaning => Step::Cleaning,
            Stage::Analysis => Step::Analysis,
            Stage::Visualisation => Step::Visualisation,
            Stage::Trends => Step::Trends,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Something the workflow executes in the sandbox
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    /// Fixed script summarizing the raw dataset
    InitialSummary,
    Cleaning,
    /// Fixed script summarizing the cleaned dataset
    CleanedSummary,
    Analysis,
    Visualisation,
    Trends,
}

impl Step {
    /// The planned stage behind this step; None for the fixed summary scripts
    pub fn stage(self) -> Option<Stage> {
        match self {
            Step::InitialSummary | Step::CleanedSummary => None,
            Step::Cleaning => Some(Stage::Cleaning),
            Step::Analysis => Some(Stage::Analysis),
            Step::Visualisation => Some(Stage::Visualisation),
            Step::Trends => Some(Stage::Trends),
        }
    }

    /// Transcript written when the step succeeds
    pub fn log_file(self) -> &'static str {
        match self {
            Step::InitialSummary => "initial_summary_output.md",
            Step::Cleaning => "cleaning_execution_log.md",
            Step::CleanedSummary => "cleaned_summary_output.md",
            Step::Analysis => "analysis_output.md",
            Step::Visualisation => "visualisation_log.md",
            Step::Trends => "trends_log.md",
        }
    }

    /// Where repaired code is persisted. The summary scripts are read-only.
    pub fn code_file(self) -> Option<&'static str> {
        self.stage().map(Stage::code_file)
    }

    /// Human-readable label used in prompts and logs
    pub fn description(self) -> &'static str {
        match self {
            Step::InitialSummary => "Generate initial data summary",
            Step::Cleaning => "Data cleaning script based on plan",
            Step::CleanedSummary => "Generate summary of cleaned data",
            Step::Analysis => "Data analysis script based on plan",
            Step::Visualisation => "Data visualisation script based on plan",
            Step::Trends => "Trends and patterns identification script based on plan",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Step::InitialSummary => "initial_summary",
            Step::Cleaning => "execute_cleaning",
            Step::CleanedSummary => "execute_cleaned_summary",
            Step::Analysis => "execute_analysis",
            Step::Visualisation => "execute_visualisation",
            Step::Trends => "execute_trends",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_stage_step_roundtrip() {
        for stage in Stage::ALL {
            assert_eq!(stage.step().stage(), Some(stage));
            assert_eq!(stage.step().code_file(), Some(stage.code_file()));
        }
    }

    #[test]
    fn test_summary_steps_are_not_persisted() {
        assert_eq!(Step::InitialSummary.code_file(), None);
        assert_eq!(Step::CleanedSummary.code_file(), None);
    }

    #[test]
    fn test_filenames_are_distinct() {
        let steps = [
            Step::InitialSummary,
            Step::Cleaning,
            Step::CleanedSummary,
            Step::Analysis,
            Step::Visualisation,
            Step::Trends,
        ];
        let logs: HashSet<_> = steps.iter().map(|s| s.log_file()).collect();
        assert_eq!(logs.len(), steps.len());

        let plans: HashSet<_> = Stage::ALL.iter().map(|s| s.plan_file()).collect();
        assert_eq!(plans.len(), 4);
    }

    #[test]
    fn test_plan_limits() {
        assert_eq!(Stage::Cleaning.plan_limit(), None);
        assert_eq!(Stage::Analysis.plan_limit(), Some(10));
        assert_eq!(Stage::Trends.plan_limit(), Some(6));
        assert_eq!(Step::Visualisation.to_string(), "execute_visualisation");
    }
}

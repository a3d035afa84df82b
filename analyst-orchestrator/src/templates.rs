//! Fixed prompt templates and code skeletons
//!
//! Skeletons carry `__NAME__` placeholders filled with absolute paths. Every
//! skeleton has one outer guarded region whose handlers end the script with a
//! distinct status: 1 input missing, 2 input empty, 3 anything else, 4 a
//! required library missing. Their normal path prints nothing the keyword
//! classifier would flag.

use crate::stage::{CLEANED_CSV_FILE, PLOT_DIR, Stage, Step, TREND_PLOT_DIR};
use std::path::Path;

/// Substituted when no dataset summary is available for planning
pub const GENERIC_SUMMARY: &str = "No dataset summary was provided. Please generate a generic plan \
                                   based on common data analysis tasks.";

/// Marker appended to a diagnostic cut for length
pub const TRUNCATION_MARKER: &str = "... (truncated)";

/// A system/user prompt pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

/// Absolute paths the generated code must use
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathContext {
    /// Dataset the next script reads (raw before cleaning, cleaned after)
    pub input_csv: String,
    pub output_dir: String,
    pub cleaned_csv: String,
    pub plot_dir: String,
    pub trend_plot_dir: String,
}

fn slashed(path: &Path) -> String {
    path.display().to_string().replace('\\', "/")
}

impl PathContext {
    pub fn new(input_csv: &Path, output_dir: &Path) -> Self {
        Self {
            input_csv: slashed(input_csv),
            output_dir: slashed(output_dir),
            cleaned_csv: slashed(&output_dir.join(CLEANED_CSV_FILE)),
            plot_dir: slashed(&output_dir.join(PLOT_DIR)),
            trend_plot_dir: slashed(&output_dir.join(TREND_PLOT_DIR)),
        }
    }
}

/// Cut a diagnostic to `limit` characters, marking the cut
pub fn truncate_diagnostic(diagnostic: &str, limit: usize) -> String {
    match diagnostic.char_indices().nth(limit) {
        Some((byte_idx, _)) => format!("{}{}", &diagnostic[..byte_idx], TRUNCATION_MARKER),
        None => diagnostic.to_string(),
    }
}

fn fill(template: &str, values: &[(&str, &str)]) -> String {
    values
        .iter()
        .fold(template.to_string(), |acc, (key, value)| acc.replace(key, value))
}

// ---------------------------------------------------------------------------
// Planning
// ---------------------------------------------------------------------------

const CLEANING_PLAN_SYSTEM: &str = r#"You are a meticulous data analyst writing a detailed, step-by-step data cleaning plan from the summary of an uncleaned dataset. The goal is to prepare the data for analysis and visualisation.

Dataset context (absolute paths):
- Uncleaned input data: '__INPUT_CSV__'
- Cleaned output data: '__CLEANED_CSV__'

Based on the summary, cover:
1. Datatypes: columns with the wrong type and the type they should have.
2. Missing values: a concrete strategy per affected column, with a short rationale.
3. Duplicates: how duplicate rows are handled.
4. Outliers: whether and how to treat them, or state that no treatment is needed.
5. Consistency: fixes for inconsistent text such as casing or stray whitespace.
6. Minimal feature engineering, only where obvious.

Output format:
- Output only the plan, as markdown with numbered points and bold labels.
- Mention column names explicitly.
- Do not include Python code.
- Do not use '#' headings."#;

const ANALYSIS_PLAN_SYSTEM: &str = r#"You are an insightful data analyst writing up to __LIMIT__ actionable analysis questions for a Python script, based on the summary of a cleaned dataset.

Dataset context (absolute paths):
- Cleaned input data: '__CLEANED_CSV__'

Goals: reveal insights, patterns and relationships with pandas (aggregation, filtering, value counts, correlations). For each question, explain how the reader should interpret the result.

Guidance for the code written later:
- Keep output concise; print at most the first 10 rows of large results.
- Print a bold markdown heading before each result.
- Format tables with tabulate.

Output format:
- Output only the numbered questions, as markdown.
- At most __LIMIT__ questions.
- No Python code.
- No visualisations and no data cleaning."#;

const VISUALISATION_PLAN_SYSTEM: &str = r#"You are a data visualisation expert proposing up to __LIMIT__ impactful Plotly visualisations, based on the summary of a cleaned dataset.

Dataset context (absolute paths):
- Cleaned input data: '__CLEANED_CSV__'
- Plot output directory: '__PLOT_DIR__'

Goals: illustrate key distributions, relationships and comparisons with suitable Plotly chart types. Each plot should explain on the figure itself how to read it.

For every plot give the columns, chart type, any aggregation, a title and an HTML output filename. The code will save plots as HTML under the plot output directory and must create it with os.makedirs(..., exist_ok=True).

Output format:
- Output only the numbered blueprint, as markdown.
- At most __LIMIT__ plots.
- No Python code.
- No data cleaning and no non-visual analysis."#;

const TRENDS_PLAN_SYSTEM: &str = r#"You are a data scientist identifying up to __LIMIT__ key trends or patterns worth investigating with Plotly, based on the summary of a cleaned dataset and a list of visualisations that are already planned. Aim for insights the planned plots do not already show.

Dataset context (absolute paths):
- Cleaned input data: '__CLEANED_CSV__'
- Trend plot output directory: '__TREND_PLOT_DIR__'

Goals: time trends, multi-variable correlations, segment behaviour, anomalies. Suggest concrete analyses or plots such as rolling averages, heatmaps or scatter matrices. Each plot should explain on the figure itself how to read it.

For every trend give the columns, analysis or chart type, a title and an HTML output filename. The code must create the trend plot directory with os.makedirs(..., exist_ok=True).

Do not repeat anything listed under 'Already Planned Visualizations'.

Output format:
- Output only the numbered blueprint, as markdown.
- At most __LIMIT__ trends.
- No Python code.
- No data cleaning."#;

/// Planning prompt for a stage.
///
/// `visualisation_plan` is only read for the trends stage.
pub fn plan_prompt(
    stage: Stage,
    paths: &PathContext,
    summary_source: &str,
    summary: &str,
    visualisation_plan: &str,
) -> Prompt {
    let system = match stage {
        Stage::Cleaning => CLEANING_PLAN_SYSTEM,
        Stage::Analysis => ANALYSIS_PLAN_SYSTEM,
        Stage::Visualisation => VISUALISATION_PLAN_SYSTEM,
        Stage::Trends => TRENDS_PLAN_SYSTEM,
    };
    let limit = stage.plan_limit().map(|n| n.to_string()).unwrap_or_default();
    let system = fill(
        system,
        &[
            ("__INPUT_CSV__", paths.input_csv.as_str()),
            ("__CLEANED_CSV__", paths.cleaned_csv.as_str()),
            ("__PLOT_DIR__", paths.plot_dir.as_str()),
            ("__TREND_PLOT_DIR__", paths.trend_plot_dir.as_str()),
            ("__LIMIT__", limit.as_str()),
        ],
    );

    let heading = match stage {
        Stage::Cleaning => "Data Cleaning Plan",
        Stage::Analysis => "Data Analysis Plan",
        Stage::Visualisation => "Visualization Plan",
        Stage::Trends => "Trends & Patterns Plan",
    };

    let mut user = format!("**{}:**\n```\n{}\n```\n\n", summary_source, summary);
    if stage == Stage::Trends {
        let planned = if visualisation_plan.trim().is_empty() {
            "None"
        } else {
            visualisation_plan
        };
        user.push_str(&format!(
            "**Already Planned Visualizations (Do NOT repeat):**\n{}\n\n",
            planned
        ));
    }
    user.push_str(&format!("**Generate the {}:**", heading));

    Prompt { system, user }
}

// ---------------------------------------------------------------------------
// Code generation
// ---------------------------------------------------------------------------

const CLEANING_SKELETON: &str = r#"import os
import re
import sys

import pandas as pd

INPUT_CSV = r"__INPUT_CSV__"
OUTPUT_CSV = r"__CLEANED_CSV__"
OUTPUT_DIR = r"__OUTPUT_DIR__"

print("**Starting data cleaning**")
print(f"Input file: {INPUT_CSV}")
print(f"Output file: {OUTPUT_CSV}")

try:
    os.makedirs(OUTPUT_DIR, exist_ok=True)

    df = pd.read_csv(INPUT_CSV)
    print(f"Loaded {INPUT_CSV}. Initial shape: {df.shape}")

    # === BEGIN PLAN STEPS ===
    # Implement every cleaning step of the plan here.
    # === END PLAN STEPS ===

    df.to_csv(OUTPUT_CSV, index=False, encoding="utf-8")
    print(f"**Cleaned data saved to {OUTPUT_CSV}**")
    print(f"Cleaned data shape: {df.shape}")
except FileNotFoundError:
    print(f"FATAL: input file not found: {INPUT_CSV}", file=sys.stderr)
    sys.exit(1)
except pd.errors.EmptyDataError:
    print(f"FATAL: input file is empty: {INPUT_CSV}", file=sys.stderr)
    sys.exit(2)
except Exception as e:
    print(f"FATAL: data cleaning stopped: {e!r}", file=sys.stderr)
    sys.exit(3)

print("**Finished data cleaning**")
"#;

const ANALYSIS_SKELETON: &str = r#"import os
import sys

import pandas as pd

INPUT_CSV = r"__INPUT_CSV__"

pd.set_option("display.max_columns", None)
pd.set_option("display.width", 1000)
pd.set_option("display.max_rows", 100)

print("**Starting data analysis**")
print(f"Input file: {INPUT_CSV}")

try:
    from tabulate import tabulate

    df = pd.read_csv(INPUT_CSV)
    print(f"Loaded {INPUT_CSV}. Shape: {df.shape}")

    # === BEGIN PLAN STEPS ===
    # Implement every analysis question of the plan here.
    # === END PLAN STEPS ===
except FileNotFoundError:
    print(f"FATAL: input file not found: {INPUT_CSV}", file=sys.stderr)
    sys.exit(1)
except pd.errors.EmptyDataError:
    print(f"FATAL: input file is empty: {INPUT_CSV}", file=sys.stderr)
    sys.exit(2)
except ImportError as e:
    print(f"FATAL: required library missing: {e!r}", file=sys.stderr)
    sys.exit(4)
except Exception as e:
    print(f"FATAL: data analysis stopped: {e!r}", file=sys.stderr)
    sys.exit(3)

print("**Finished data analysis**")
"#;

const PLOTTING_SKELETON: &str = r#"import os
import sys

import pandas as pd

INPUT_CSV = r"__INPUT_CSV__"
PLOT_DIR = r"__PLOT_DIR__"

print("**Starting __TITLE__**")
print(f"Input file: {INPUT_CSV}")
print(f"Plot directory: {PLOT_DIR}")

try:
    import matplotlib.pyplot as plt
    import plotly.express as px
    import plotly.graph_objects as go

    os.makedirs(PLOT_DIR, exist_ok=True)

    df = pd.read_csv(INPUT_CSV)
    print(f"Loaded {INPUT_CSV}. Shape: {df.shape}")

    # === BEGIN PLAN STEPS ===
    # Implement every item of the plan here. Save each figure as HTML under PLOT_DIR.
    # === END PLAN STEPS ===
except FileNotFoundError:
    print(f"FATAL: input file not found: {INPUT_CSV}", file=sys.stderr)
    sys.exit(1)
except pd.errors.EmptyDataError:
    print(f"FATAL: input file is empty: {INPUT_CSV}", file=sys.stderr)
    sys.exit(2)
except ImportError as e:
    print(f"FATAL: required library missing: {e!r}", file=sys.stderr)
    sys.exit(4)
except Exception as e:
    print(f"FATAL: __TITLE__ stopped: {e!r}", file=sys.stderr)
    sys.exit(3)

print("**Finished __TITLE__**")
"#;

/// The fixed skeleton for a stage with its paths filled in
pub fn code_skeleton(stage: Stage, paths: &PathContext) -> String {
    match stage {
        Stage::Cleaning => fill(
            CLEANING_SKELETON,
            &[
                ("__INPUT_CSV__", paths.input_csv.as_str()),
                ("__CLEANED_CSV__", paths.cleaned_csv.as_str()),
                ("__OUTPUT_DIR__", paths.output_dir.as_str()),
            ],
        ),
        Stage::Analysis => fill(ANALYSIS_SKELETON, &[("__INPUT_CSV__", paths.input_csv.as_str())]),
        Stage::Visualisation => fill(
            PLOTTING_SKELETON,
            &[
                ("__INPUT_CSV__", paths.input_csv.as_str()),
                ("__PLOT_DIR__", paths.plot_dir.as_str()),
                ("__TITLE__", "data visualisation"),
            ],
        ),
        Stage::Trends => fill(
            PLOTTING_SKELETON,
            &[
                ("__INPUT_CSV__", paths.input_csv.as_str()),
                ("__PLOT_DIR__", paths.trend_plot_dir.as_str()),
                ("__TITLE__", "trend investigation"),
            ],
        ),
    }
}

const GENERATION_SYSTEM: &str = r#"You are an expert Python developer for data tasks using pandas and Plotly.
You will be given a plan (__DESCRIPTION__) and must write a complete, executable Python script that implements it.

Rules:
- Use the absolute paths defined in the base structure for every file operation.
- Implement each plan step inside the region between '=== BEGIN PLAN STEPS ===' and '=== END PLAN STEPS ==='.
- Keep the outer try block and its handlers unchanged.
- Wrap each individual step in its own try/except and print failures to stdout as print(f"Error in section X: {repr(e)}"), then continue with the next step.
- Create output directories with os.makedirs(..., exist_ok=True) before writing into them.
- Follow the output requirements of the plan.

Base structure:
```python
__SKELETON__
```

Return only the complete Python script. No markdown fences. No explanations outside code comments."#;

/// Code-generation prompt for a stage, embedding its skeleton
pub fn generation_prompt(stage: Stage, paths: &PathContext, plan: &str) -> Prompt {
    let skeleton = code_skeleton(stage, paths);
    let system = fill(
        GENERATION_SYSTEM,
        &[
            ("__DESCRIPTION__", stage.step().description()),
            ("__SKELETON__", skeleton.trim_end()),
        ],
    );
    let user = format!(
        "**Plan to Implement:**\n```markdown\n{}\n```\n\n**Generate the Python code:**",
        plan
    );
    Prompt { system, user }
}

// ---------------------------------------------------------------------------
// Repair
// ---------------------------------------------------------------------------

/// Stage-specific fix guidance; empty for the summary scripts
pub fn repair_guidance(step: Step, paths: &PathContext) -> String {
    match step {
        Step::Cleaning => format!(
            "Data cleaning instructions:\n\
             - Read the input CSV from the absolute path '{}'.\n\
             - Save the cleaned data to the absolute path '{}'.\n\
             - Check dtype conversions and missing-value handling carefully; wrap each step in try/except.\n\
             - Import os when os.path or os.makedirs is used.",
            paths.input_csv, paths.cleaned_csv
        ),
        Step::Analysis => format!(
            "Data analysis instructions:\n\
             - Read the cleaned CSV from the absolute path '{}' (normally '{}').\n\
             - Import tabulate and print large tables with .head(10).\n\
             - Check groupby, value_counts and aggregations; wrap each analysis in try/except.",
            paths.input_csv, paths.cleaned_csv
        ),
        Step::Visualisation | Step::Trends => {
            let plot_dir = if step == Step::Trends {
                &paths.trend_plot_dir
            } else {
                &paths.plot_dir
            };
            format!(
                "Plotting instructions:\n\
                 - Save plots to the absolute directory '{dir}' and create it first with os.makedirs('{dir}', exist_ok=True).\n\
                 - Save Plotly figures with fig.write_html(os.path.join('{dir}', 'name.html')), matplotlib with plt.savefig(os.path.join('{dir}', 'name.png')).\n\
                 - If a plot cannot be fixed, comment it out with a note explaining why.\n\
                 - Check data preparation (types, NaNs) before plotting; wrap each plot in try/except.\n\
                 - Import plotly.express, plotly.graph_objects and matplotlib.pyplot as needed.",
                dir = plot_dir
            )
        }
        Step::InitialSummary | Step::CleanedSummary => String::new(),
    }
}

const REPAIR_SYSTEM: &str = r#"You are an expert Python debugger for data analysis scripts running in a standard Python environment.
Analyze the code and the error message, fix the code, and return only the complete corrected script.

Code description: __DESCRIPTION__
Input CSV absolute path: '__INPUT_CSV__'
Output directory absolute path: '__OUTPUT_DIR__'
(Cleaned data goes to '__CLEANED_CSV__', visualisation plots to '__PLOT_DIR__', trend plots to '__TREND_PLOT_DIR__')

Debugging rules:
- Use the absolute paths above for all reads and writes.
- Create directories with os.makedirs(..., exist_ok=True) before saving into them.
- Make sure every library used is imported; look for ImportError or ModuleNotFoundError in the message.
- Wrap individual file operations, analysis steps and plots in try/except and print failures to stdout as print(f"Error in section X: {repr(e)}").
- Address the specific error reported.
- If a section cannot be fixed, comment it out with a note.
- Mark significant fixes with a short comment.
- Keep the original purpose of the code.

__GUIDANCE__

Return only the complete corrected Python code. No markdown fences. No explanations outside code comments."#;

/// Repair prompt for a failing script. `diagnostic` is expected to be truncated already.
pub fn repair_prompt(step: Step, paths: &PathContext, code: &str, diagnostic: &str) -> Prompt {
    let guidance = repair_guidance(step, paths);
    let system = fill(
        REPAIR_SYSTEM,
        &[
            ("__DESCRIPTION__", step.description()),
            ("__INPUT_CSV__", paths.input_csv.as_str()),
            ("__OUTPUT_DIR__", paths.output_dir.as_str()),
            ("__CLEANED_CSV__", paths.cleaned_csv.as_str()),
            ("__PLOT_DIR__", paths.plot_dir.as_str()),
            ("__TREND_PLOT_DIR__", paths.trend_plot_dir.as_str()),
            ("__GUIDANCE__", guidance.as_str()),
        ],
    );
    let user = format!(
        "**Original Code:**\n```python\n{}\n```\n\n**Error Message (from stderr/subprocess):**\n{}\n\n**Correct the code:**",
        code, diagnostic
    );
    Prompt { system, user }
}

// ---------------------------------------------------------------------------
// Tool-call execution
// ---------------------------------------------------------------------------

/// Prompt asking the model to run `code` through the sandbox tool unchanged
pub fn execution_prompt(step: Step, paths: &PathContext, code: &str, tool_name: &str) -> Prompt {
    let system = format!(
        "Your task is to execute the given Python code using the '{tool}' tool.\n\
         The code performs: {description}.\n\
         It already embeds these absolute paths:\n\
         - Input CSV: '{input}'\n\
         - Output directory: '{output}'\n\
         Execute the code exactly as provided. Do not modify it. Call the '{tool}' tool with the code.",
        tool = tool_name,
        description = step.description(),
        input = paths.input_csv,
        output = paths.output_dir,
    );
    let user = format!(
        "Use the {} tool to execute this Python code:\n```python\n{}\n```",
        tool_name, code
    );
    Prompt { system, user }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::FAILURE_KEYWORDS;
    use std::path::PathBuf;

    fn paths() -> PathContext {
        PathContext::new(
            &PathBuf::from("/data/raw.csv"),
            &PathBuf::from("/data/output"),
        )
    }

    #[test]
    fn test_path_context() {
        let p = paths();
        assert_eq!(p.cleaned_csv, "/data/output/data_processed.csv");
        assert_eq!(p.plot_dir, "/data/output/saved_plots");
        assert_eq!(p.trend_plot_dir, "/data/output/trend_plots");
    }

    #[test]
    fn test_truncate_diagnostic() {
        assert_eq!(truncate_diagnostic("short", 2000), "short");
        let long = "x".repeat(2500);
        let cut = truncate_diagnostic(&long, 2000);
        assert_eq!(cut.len(), 2000 + TRUNCATION_MARKER.len());
        assert!(cut.ends_with("... (truncated)"));
        // Exactly at the limit is not cut
        assert_eq!(truncate_diagnostic(&"y".repeat(2000), 2000).len(), 2000);
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let cut = truncate_diagnostic("ééééé", 2);
        assert_eq!(cut, "éé... (truncated)");
    }

    #[test]
    fn test_skeletons_are_fully_filled() {
        let p = paths();
        for stage in Stage::ALL {
            let skeleton = code_skeleton(stage, &p);
            assert!(!skeleton.contains("__"), "{} skeleton has a placeholder left", stage);
            assert!(skeleton.contains("=== BEGIN PLAN STEPS ==="));
            assert!(skeleton.contains("sys.exit(1)"));
            assert!(skeleton.contains("sys.exit(2)"));
            assert!(skeleton.contains("sys.exit(3)"));
            assert!(skeleton.contains(&format!("r\"{}\"", p.input_csv)));
        }
        assert!(code_skeleton(Stage::Trends, &p).contains("/data/output/trend_plots"));
        assert!(code_skeleton(Stage::Visualisation, &p).contains("sys.exit(4)"));
    }

    #[test]
    fn test_skeleton_success_path_is_keyword_free() {
        let p = paths();
        for stage in Stage::ALL {
            let skeleton = code_skeleton(stage, &p);
            for line in skeleton.lines().filter(|l| l.trim_start().starts_with("print(")) {
                if line.contains("file=sys.stderr") {
                    continue;
                }
                let lower = line.to_lowercase();
                for keyword in FAILURE_KEYWORDS {
                    assert!(!lower.contains(keyword), "{}: {}", stage, line);
                }
            }
        }
    }

    #[test]
    fn test_trends_prompt_lists_planned_visualisations() {
        let p = paths();
        let prompt = plan_prompt(Stage::Trends, &p, "Cleaned Data Summary", "cols: a, b", "1. histogram of a");
        assert!(prompt
            .user
            .contains("**Already Planned Visualizations (Do NOT repeat):**\n1. histogram of a"));
        assert!(prompt.system.contains("/data/output/trend_plots"));

        let analysis = plan_prompt(Stage::Analysis, &p, "Cleaned Data Summary", "cols", "ignored");
        assert!(!analysis.user.contains("Already Planned"));
        assert!(analysis.system.contains("up to 10"));
    }

    #[test]
    fn test_plan_limits_are_filled_per_stage() {
        let p = paths();
        for stage in Stage::ALL {
            let prompt = plan_prompt(stage, &p, "Cleaned Data Summary", "cols", "");
            assert!(!prompt.system.contains("__"), "{} plan prompt has a placeholder left", stage);
            if let Some(limit) = stage.plan_limit() {
                assert!(prompt.system.contains(&format!("At most {} ", limit)));
            }
        }
        let plots = plan_prompt(Stage::Visualisation, &p, "Cleaned Data Summary", "cols", "");
        assert!(plots.system.contains("up to 6 impactful"));
    }

    #[test]
    fn test_section_failures_are_printed_to_stdout() {
        // Only stdout of a zero-exit script reaches the keyword classifier
        let p = paths();
        let generation = generation_prompt(Stage::Analysis, &p, "1. Count rows");
        let repair = repair_prompt(Step::Analysis, &p, "print(x)", "NameError: x");
        for system in [&generation.system, &repair.system] {
            assert!(system.contains("print failures to stdout"));
            assert!(system.contains("Error in section X"));
            assert!(!system.contains("report problems on stderr"));
        }
    }

    #[test]
    fn test_cleaning_prompt_uses_raw_input_path() {
        let prompt = plan_prompt(Stage::Cleaning, &paths(), "Initial Data Summary", "rows: 3", "");
        assert!(prompt.system.contains("'/data/raw.csv'"));
        assert!(prompt.user.starts_with("**Initial Data Summary:**"));
    }

    #[test]
    fn test_repair_guidance_per_step() {
        let p = paths();
        assert!(repair_guidance(Step::Cleaning, &p).starts_with("Data cleaning"));
        assert!(repair_guidance(Step::Analysis, &p).starts_with("Data analysis"));
        assert!(repair_guidance(Step::Visualisation, &p).contains("/data/output/saved_plots"));
        assert!(repair_guidance(Step::Trends, &p).contains("/data/output/trend_plots"));
        assert!(repair_guidance(Step::InitialSummary, &p).is_empty());
    }

    #[test]
    fn test_repair_prompt_contains_code_and_diagnostic() {
        let prompt = repair_prompt(Step::Analysis, &paths(), "print(x)", "NameError: x");
        assert!(prompt.user.contains("print(x)"));
        assert!(prompt.user.contains("NameError: x"));
        assert!(prompt.system.contains("Data analysis script based on plan"));
        assert!(!prompt.system.contains("__"));
    }
}

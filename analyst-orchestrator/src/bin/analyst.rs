//! Analyst CLI - run the self-healing data analysis workflow
//!
//! Usage:
//!   analyst run --config analyst.toml [--output-dir <dir>] [--max-rewrites <n>] [--mode direct|tool_call] [-v]
//!   analyst check --config analyst.toml

use analyst::provider::build_provider;
use analyst::{
    ExecutionMode, FsArtifactStore, Node, RunReport, SandboxExecutor, Workflow, WorkflowConfig,
};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "analyst", version, about = "Plan, generate, execute and self-heal data analysis scripts")]
struct Cli {
    /// Show debug logs
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the full workflow
    Run {
        /// Workflow configuration file
        #[arg(short, long, default_value = "analyst.toml")]
        config: PathBuf,

        /// Override the output directory
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Override the repair budget per step
        #[arg(long)]
        max_rewrites: Option<u32>,

        /// Override the execution mode (direct, tool_call)
        #[arg(long)]
        mode: Option<ExecutionMode>,
    },

    /// Check the provider and the sandbox interpreter
    Check {
        /// Workflow configuration file
        #[arg(short, long, default_value = "analyst.toml")]
        config: PathBuf,
    },
}

fn load_config(path: &Path) -> Result<WorkflowConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    WorkflowConfig::from_toml(&contents)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

fn init_logging(verbose: bool) {
    let default = if verbose { "analyst=debug" } else { "analyst=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Run {
            config,
            output_dir,
            max_rewrites,
            mode,
        } => {
            let mut config = load_config(&config)?;
            if let Some(dir) = output_dir {
                config.output_dir = dir;
            }
            if let Some(n) = max_rewrites {
                config.max_rewrite_attempts = n;
            }
            if let Some(mode) = mode {
                config.execution_mode = mode;
            }
            run(config).await
        }
        Command::Check { config } => check(load_config(&config)?).await,
    }
}

async fn run(config: WorkflowConfig) -> Result<ExitCode> {
    let provider = build_provider(&config.provider).context("Failed to build provider")?;
    let executor =
        SandboxExecutor::new(&config.executor).context("Failed to set up the sandbox")?;
    let store = Arc::new(FsArtifactStore::new(&config.output_dir));

    eprintln!();
    eprintln!("{}", "Analyst - self-healing data analysis".bold());
    eprintln!("{} {}", "Input:".dimmed(), config.input_csv_path.display());
    eprintln!("{} {}", "Output:".dimmed(), config.output_dir.display());
    eprintln!(
        "{} {} ({})",
        "Model:".dimmed(),
        provider.model(),
        provider.name()
    );
    eprintln!();

    info!(config = ?config.provider.provider_type, "Provider ready");
    let workflow = Workflow::new(config, provider, executor, store);
    let report = workflow.run().await;
    print_report(&report);

    Ok(if report.completed {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn print_report(report: &RunReport) {
    let path: Vec<String> = report
        .visited
        .iter()
        .map(|node| match node {
            Node::Repair => node.to_string().yellow().to_string(),
            Node::End => node.to_string().bold().to_string(),
            _ => node.to_string(),
        })
        .collect();

    eprintln!();
    eprintln!("{} {}", "Path:".dimmed(), path.join(" -> "));
    eprintln!("{} {}", "Executions:".dimmed(), report.iterations);
    eprintln!("{} {}", "Final step:".dimmed(), report.final_step);

    if report.completed {
        eprintln!("{}", "All steps completed successfully.".green().bold());
        eprintln!(
            "{} {}",
            "Artifacts:".dimmed(),
            report.state.output_dir.display()
        );
    } else {
        let reason = report
            .stop_reason
            .as_ref()
            .map(|r| r.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        eprintln!("{} {}", "Stopped:".red().bold(), reason);
        if !report.state.error_message.is_empty() {
            let excerpt: String = report.state.error_message.chars().take(500).collect();
            eprintln!("{} {}", "Last error:".dimmed(), excerpt);
        }
    }
}

async fn check(config: WorkflowConfig) -> Result<ExitCode> {
    let provider = build_provider(&config.provider).context("Failed to build provider")?;
    let health = provider.health_check().await;

    if health.healthy {
        eprintln!(
            "{} {} ({} ms)",
            "Provider OK:".green(),
            provider.name(),
            health.latency_ms.unwrap_or_default()
        );
    } else {
        eprintln!(
            "{} {}: {}",
            "Provider unavailable:".red(),
            provider.name(),
            health.error.unwrap_or_default()
        );
    }

    let sandbox = match SandboxExecutor::new(&config.executor) {
        Ok(executor) => {
            eprintln!(
                "{} {} (timeout {}s)",
                "Interpreter:".green(),
                executor.interpreter().display(),
                executor.timeout().as_secs()
            );
            true
        }
        Err(e) => {
            eprintln!("{} {}", "Interpreter:".red(), e);
            false
        }
    };

    Ok(if health.healthy && sandbox {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

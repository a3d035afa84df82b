//! Executions routed through the model's tool call

#![cfg(unix)]

mod common;

use analyst::sandbox::TOOL_NAME;
use analyst::stage::{Stage, Step};
use analyst::{ExecutionMode, Node, WorkflowState};
use common::*;

fn tool_config() -> analyst::WorkflowConfig {
    let mut config = config();
    config.execution_mode = ExecutionMode::ToolCall;
    config
}

#[tokio::test]
async fn test_tool_mode_full_run() {
    // Every execution is a model turn that calls the tool with the code it was shown
    let provider = ScriptedProvider::new(vec![
        Reply::EchoCode,
        text("1. Drop duplicate rows"),
        text("echo 'cleaned'"),
        Reply::EchoCode,
        Reply::EchoCode,
        text("1. Count rows"),
        text("echo 'analysis done'"),
        Reply::EchoCode,
        text("1. Histogram"),
        text("echo 'plots saved'"),
        Reply::EchoCode,
        text("1. Rolling mean"),
        text("echo 'trends found'"),
        Reply::EchoCode,
    ]);
    let store = store();
    let report = workflow(tool_config(), &provider, &store).run().await;

    assert!(report.completed, "stopped: {:?}", report.stop_reason);
    assert_eq!(report.iterations, 6);
    assert_eq!(
        store.get("trends_log.md").as_deref(),
        Some("Execution successful. Output:\ntrends found\n")
    );

    let first = &provider.requests()[0];
    assert_eq!(first.tools.len(), 1);
    assert_eq!(first.tools[0].name, TOOL_NAME);
    assert!(first.prompt.contains("echo 'rows: 3'"));
}

async fn first_execution(replies: Vec<Reply>) -> (Node, WorkflowState, std::sync::Arc<ScriptedProvider>) {
    let provider = ScriptedProvider::new(replies);
    let store = store();
    let workflow = workflow(tool_config(), &provider, &store);

    let mut state = WorkflowState::new(workflow.config());
    let node = workflow.step(Node::Init, &mut state).await;
    assert_eq!(node, Node::Execute(Step::InitialSummary));
    let next = workflow.step(node, &mut state).await;
    (next, state, provider)
}

#[tokio::test]
async fn test_missing_tool_call_is_repairable_failure() {
    let (next, state, _) = first_execution(vec![text("Sure, the output is rows: 3")]).await;

    assert_eq!(next, Node::Repair);
    assert!(state.execution_error);
    assert_eq!(
        state.error_message,
        "Model failed to invoke the execute_python_code tool."
    );
    assert_eq!(state.iterations, 1);
}

#[tokio::test]
async fn test_unexpected_tool_is_failure() {
    let (next, state, _) = first_execution(vec![Reply::Tool {
        name: "delete_everything".to_string(),
        code: "rm -rf /".to_string(),
    }])
    .await;

    assert_eq!(next, Node::Repair);
    assert!(state.error_message.contains("delete_everything"));
}

#[tokio::test]
async fn test_model_error_during_execution_is_failure() {
    let (next, state, _) = first_execution(vec![fail("connection reset")]).await;

    assert_eq!(next, Node::Repair);
    assert!(state
        .error_message
        .starts_with("LLM or Tool Invocation Error:"));
    assert!(state.error_message.contains("connection reset"));
}

#[tokio::test]
async fn test_tool_call_output_is_classified() {
    let (next, state, _) = first_execution(vec![Reply::Tool {
        name: "EXECUTE_PYTHON_CODE".to_string(),
        code: "echo 'rows: 9'".to_string(),
    }])
    .await;

    assert_eq!(next, Node::Plan(Stage::Cleaning));
    assert_eq!(state.tool_output, "Execution successful. Output:\nrows: 9\n");
}

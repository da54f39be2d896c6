//! State-based eligibility stage.

mod common;

use std::sync::Arc;

use common::{around, call, exec, stage, ScriptedTool};
use toolgate_core::{EligibilityMiddleware, EligibilityTable, GateError, RunState};

fn table() -> EligibilityTable {
    EligibilityTable::new()
        .allow(RunState::Explore, ["read_file", "search"])
        .allow(RunState::Act, ["read_file", "write_file"])
}

#[tokio::test]
async fn tool_outside_its_states_is_refused() {
    let handler = around(vec![stage(EligibilityMiddleware::new(table()))]);
    let write = ScriptedTool::new("write_file").shared();

    let err = call(&handler, &mut exec(&write, "run-1", RunState::Explore, "{}"))
        .await
        .unwrap_err();
    match err {
        GateError::ToolNotAllowed { tool, state } => {
            assert_eq!(tool, "write_file");
            assert_eq!(state, RunState::Explore);
        }
        other => panic!("expected ToolNotAllowed, got {other:?}"),
    }
    assert_eq!(write.calls(), 0);

    call(&handler, &mut exec(&write, "run-1", RunState::Act, "{}"))
        .await
        .unwrap();
    assert_eq!(write.calls(), 1);
}

#[tokio::test]
async fn states_without_entries_allow_nothing() {
    let handler = around(vec![stage(EligibilityMiddleware::new(table()))]);
    let read = ScriptedTool::read_only("read_file").shared();

    for state in [RunState::Intake, RunState::Done, RunState::Failed] {
        assert!(call(&handler, &mut exec(&read, "run-1", state, "{}"))
            .await
            .is_err());
    }
    assert_eq!(read.calls(), 0);
}

#[tokio::test]
async fn unrestricted_stage_admits_everything() {
    let handler = around(vec![stage(EligibilityMiddleware::unrestricted())]);
    let tool = ScriptedTool::new("anything").shared();
    for state in RunState::ALL {
        call(&handler, &mut exec(&tool, "run-1", state, "{}"))
            .await
            .unwrap();
    }
    assert_eq!(tool.calls(), RunState::ALL.len());
}

#[tokio::test]
async fn shared_table_serves_several_pipelines() {
    let shared = Arc::new(table());
    let first = around(vec![stage(EligibilityMiddleware::with_shared_table(
        shared.clone(),
    ))]);
    let second = around(vec![stage(EligibilityMiddleware::with_shared_table(shared))]);
    let search = ScriptedTool::read_only("search").shared();

    call(&first, &mut exec(&search, "run-1", RunState::Explore, "{}"))
        .await
        .unwrap();
    assert!(call(&second, &mut exec(&search, "run-2", RunState::Act, "{}"))
        .await
        .is_err());
}

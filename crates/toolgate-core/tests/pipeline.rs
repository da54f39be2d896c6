//! Pipelines assembled from configuration.

mod common;

use std::sync::Arc;

use common::{call, exec, ScriptedTool};
use toolgate_core::{
    Budget, BudgetView, GateError, GateMetrics, MemoryBudget, MemoryRecorder, PipelineBuilder,
    PipelineConfig, RateLimitMode, RateLimitScope, RunState, StaticApprover,
};

const CONFIG: &str = r#"
timeout_ms = 30000

[rate_limit]
rate = 100.0
burst = 50
scope = "per_run_tool"

[budget]
name = "tool_calls"

[budget.limits]
tool_calls = 3

[eligibility]
explore = ["read_file", "search"]
act = ["read_file", "write_file", "deploy"]

[caching]
ttl_secs = 60
"#;

fn parse(text: &str) -> PipelineConfig {
    toml::from_str(text).unwrap()
}

#[test]
fn toml_config_fills_defaults() {
    let config = parse(CONFIG);
    assert!(config.logging);
    assert!(!config.tracing);
    assert!(config.approval.is_some());
    assert!(config.validation.is_some());

    let rl = config.rate_limit.as_ref().unwrap();
    assert_eq!(rl.scope, RateLimitScope::PerRunTool);
    assert_eq!(rl.mode, RateLimitMode::Reject);
    assert_eq!(config.budget.as_ref().unwrap().limits["tool_calls"], 3);
    assert_eq!(config.caching.as_ref().unwrap().ttl_secs, Some(60));
    assert!(config
        .eligibility
        .as_ref()
        .unwrap()
        .is_allowed(RunState::Explore, "search"));
}

#[test]
fn unknown_scope_in_config_defaults_to_global() {
    let config = parse(
        r#"
        [rate_limit]
        scope = "per_galaxy"
        "#,
    );
    assert_eq!(config.rate_limit.unwrap().scope, RateLimitScope::Global);
}

#[test]
fn stage_count_follows_config() {
    // logging, validation, approval, dry-run
    let minimal = PipelineBuilder::new(PipelineConfig::default()).build().unwrap();
    assert_eq!(minimal.len(), 4);

    // + eligibility, rate limit, budget, caching, timeout, metrics
    let full = PipelineBuilder::new(parse(CONFIG))
        .metrics(GateMetrics::shared())
        .build()
        .unwrap();
    assert_eq!(full.len(), 10);
}

#[test]
fn invalid_config_is_rejected_at_build() {
    let config = parse(
        r#"
        [rate_limit]
        rate = 0.0
        "#,
    );
    let err = PipelineBuilder::new(config).build().unwrap_err();
    assert_eq!(err.kind(), "other");
    assert!(err.to_string().contains("rate must be positive"));
}

#[tokio::test]
async fn configured_pipeline_enforces_policies_in_order() {
    let budget = Arc::new(MemoryBudget::new().with_limit("tool_calls", 3));
    let handler = PipelineBuilder::new(parse(CONFIG))
        .budget(budget.clone())
        .handler()
        .unwrap();

    let search = ScriptedTool::read_only("search").shared();
    let write = ScriptedTool::new("write_file").shared();

    // validation runs before eligibility
    let err = call(&handler, &mut exec(&write, "run-1", RunState::Explore, "{oops"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "invalid_input");

    // eligibility runs before budget: a refused call costs nothing
    let err = call(&handler, &mut exec(&write, "run-1", RunState::Explore, "{}"))
        .await
        .unwrap_err();
    assert!(matches!(err, GateError::ToolNotAllowed { state: RunState::Explore, .. }));
    assert_eq!(budget.remaining("tool_calls"), 3);

    call(&handler, &mut exec(&search, "run-1", RunState::Explore, "{}"))
        .await
        .unwrap();
    let hit = call(&handler, &mut exec(&search, "run-1", RunState::Explore, "{}"))
        .await
        .unwrap();
    assert!(hit.cached);
    call(&handler, &mut exec(&write, "run-1", RunState::Act, "{}"))
        .await
        .unwrap();
    assert_eq!(budget.remaining("tool_calls"), 0);

    let err = call(&handler, &mut exec(&search, "run-1", RunState::Explore, "{}"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "budget_exceeded");
    assert_eq!(search.calls(), 1);
    assert_eq!(write.calls(), 1);
}

#[tokio::test]
async fn approval_fails_closed_by_default() {
    let handler = PipelineBuilder::new(PipelineConfig::default())
        .handler()
        .unwrap();
    let deploy = ScriptedTool::destructive("deploy").shared();

    let err = call(&handler, &mut exec(&deploy, "run-1", RunState::Act, "{}"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "approval_required");

    let approved = PipelineBuilder::new(PipelineConfig::default())
        .approver(Arc::new(StaticApprover::allow_all()))
        .handler()
        .unwrap();
    call(&approved, &mut exec(&deploy, "run-1", RunState::Act, "{}"))
        .await
        .unwrap();
    assert_eq!(deploy.calls(), 1);
}

#[tokio::test]
async fn simulation_from_config_records_blocked_calls() {
    let config = parse(
        r#"
        [simulation]
        allow_read_only = true

        [mocks]
        notify = { sent = true }
        "#,
    );
    let recorder = Arc::new(MemoryRecorder::new());
    let handler = PipelineBuilder::new(config)
        .approver(Arc::new(StaticApprover::allow_all()))
        .recorder(recorder.clone())
        .handler()
        .unwrap();

    let deploy = ScriptedTool::destructive("deploy").shared();
    let notify = ScriptedTool::new("notify").shared();
    let status = ScriptedTool::read_only("status").shared();

    let out = call(&handler, &mut exec(&deploy, "run-1", RunState::Act, "{}"))
        .await
        .unwrap();
    assert_eq!(out.output_json().unwrap()["dry_run"], true);
    let mocked = call(&handler, &mut exec(&notify, "run-1", RunState::Act, "{}"))
        .await
        .unwrap();
    assert_eq!(mocked.output_json().unwrap()["sent"], true);
    call(&handler, &mut exec(&status, "run-1", RunState::Act, "{}"))
        .await
        .unwrap();

    assert_eq!(deploy.calls() + notify.calls(), 0);
    assert_eq!(status.calls(), 1);
    let summary = recorder.summary();
    assert_eq!(summary.total, 2);
    assert_eq!(summary.mocked, 1);
}

#[tokio::test]
async fn per_call_dry_run_works_without_global_flag() {
    let handler = PipelineBuilder::new(PipelineConfig::default())
        .handler()
        .unwrap();
    let write = ScriptedTool::new("write_file").shared();

    let mut flagged = exec(&write, "run-1", RunState::Act, "{}").with_dry_run(true);
    let out = call(&handler, &mut flagged).await.unwrap();
    assert_eq!(out.output_json().unwrap()["reason"], "dry run");
    assert_eq!(write.calls(), 0);
}

#[tokio::test]
async fn injected_metrics_observe_denials() {
    let metrics = GateMetrics::shared();
    let config = parse(
        r#"
        [rate_limit]
        rate = 0.001
        burst = 1
        "#,
    );
    let handler = PipelineBuilder::new(config)
        .metrics(metrics.clone())
        .handler()
        .unwrap();
    let search = ScriptedTool::read_only("search").shared();

    call(&handler, &mut exec(&search, "run-1", RunState::Explore, "{}"))
        .await
        .unwrap();
    let err = call(&handler, &mut exec(&search, "run-1", RunState::Explore, "{}"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "rate_limit_exceeded");

    assert_eq!(metrics.calls(), 2);
    assert_eq!(metrics.denied(), 1);
    assert_eq!(metrics.errors_of_kind("rate_limit_exceeded"), 1);
}

#[test]
fn injected_budget_is_shared_not_copied() {
    let budget = Arc::new(MemoryBudget::new().with_limit("tool_calls", 2));
    let builder = PipelineBuilder::new(parse(CONFIG)).budget(budget.clone());
    assert!(builder.config().budget.is_some());
    builder.build().unwrap();

    assert!(budget.try_consume("tool_calls", 2));
    assert!(!budget.can_consume("tool_calls", 1));
}

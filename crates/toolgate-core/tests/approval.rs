//! Approval gate against static and channel-backed approvers.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{around, call, exec, stage, ScriptedTool};
use toolgate_core::{
    Annotations, ApprovalConfig, ApprovalMiddleware, CallContext, ChannelApprover, GateError,
    Handler, RiskLevel, RunState, StaticApprover,
};

fn critical(name: &str) -> ScriptedTool {
    ScriptedTool::new(name).annotated(Annotations {
        risk_level: RiskLevel::Critical,
        ..Annotations::default()
    })
}

#[tokio::test]
async fn ungated_tools_pass_without_approver() {
    let handler = around(vec![stage(ApprovalMiddleware::fail_closed())]);
    let reader = ScriptedTool::read_only("read_file").shared();
    let medium = ScriptedTool::new("lint")
        .annotated(Annotations {
            risk_level: RiskLevel::Medium,
            ..Annotations::default()
        })
        .shared();

    call(&handler, &mut exec(&reader, "run-1", RunState::Act, "{}"))
        .await
        .unwrap();
    call(&handler, &mut exec(&medium, "run-1", RunState::Act, "{}"))
        .await
        .unwrap();
    assert_eq!(reader.calls() + medium.calls(), 2);
}

#[tokio::test]
async fn gated_tool_without_approver_fails_closed() {
    let handler = around(vec![stage(ApprovalMiddleware::fail_closed())]);
    let deploy = ScriptedTool::destructive("deploy").shared();
    let wipe = critical("wipe").shared();

    let err = call(&handler, &mut exec(&deploy, "run-1", RunState::Act, "{}"))
        .await
        .unwrap_err();
    assert!(matches!(err, GateError::ApprovalRequired { ref tool } if tool == "deploy"));
    assert!(call(&handler, &mut exec(&wipe, "run-1", RunState::Act, "{}"))
        .await
        .is_err());
    assert_eq!(deploy.calls() + wipe.calls(), 0);
}

#[tokio::test]
async fn static_approvers_allow_or_deny() {
    let deploy = ScriptedTool::destructive("deploy").shared();

    let allow = around(vec![stage(ApprovalMiddleware::new(Arc::new(
        StaticApprover::allow_all(),
    )))]);
    call(&allow, &mut exec(&deploy, "run-1", RunState::Act, "{}"))
        .await
        .unwrap();

    let deny = around(vec![stage(ApprovalMiddleware::new(Arc::new(
        StaticApprover::deny_all("change freeze"),
    )))]);
    let err = call(&deny, &mut exec(&deploy, "run-1", RunState::Act, "{}"))
        .await
        .unwrap_err();
    match err {
        GateError::ApprovalDenied { tool, reason } => {
            assert_eq!(tool, "deploy");
            assert_eq!(reason, "change freeze");
        }
        other => panic!("expected ApprovalDenied, got {other:?}"),
    }
    assert_eq!(deploy.calls(), 1);
}

#[tokio::test]
async fn channel_reviewer_sees_request_and_approves() {
    let (approver, mut queue) = ChannelApprover::new(4);
    let handler = around(vec![stage(ApprovalMiddleware::new(Arc::new(approver)))]);
    let deploy = ScriptedTool::destructive("deploy").shared();

    let reviewer = tokio::spawn(async move {
        let pending = queue.recv().await.unwrap();
        let request = pending.request.clone();
        assert!(pending.approve("oncall"));
        request
    });

    let mut call_exec =
        exec(&deploy, "run-7", RunState::Act, r#"{"env":"prod"}"#).with_reason("release 1.2");
    call(&handler, &mut call_exec).await.unwrap();

    let request = reviewer.await.unwrap();
    assert_eq!(request.run_id, "run-7");
    assert_eq!(request.tool_name, "deploy");
    assert_eq!(request.input_text(), r#"{"env":"prod"}"#);
    assert_eq!(request.reason, "release 1.2");
    assert_eq!(request.risk_level, RiskLevel::High);
    assert_eq!(deploy.calls(), 1);
}

#[tokio::test]
async fn channel_reviewer_denies() {
    let (approver, mut queue) = ChannelApprover::new(1);
    let handler = around(vec![stage(ApprovalMiddleware::new(Arc::new(approver)))]);
    let deploy = ScriptedTool::destructive("deploy").shared();

    tokio::spawn(async move {
        let pending = queue.recv().await.unwrap();
        pending.deny("security", "needs a ticket");
    });

    let err = call(&handler, &mut exec(&deploy, "run-1", RunState::Act, "{}"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "approval_denied");
    assert!(err.to_string().contains("needs a ticket"));
    assert_eq!(deploy.calls(), 0);
}

#[tokio::test]
async fn approver_errors_are_wrapped() {
    let (approver, queue) = ChannelApprover::new(1);
    drop(queue);
    let handler = around(vec![stage(ApprovalMiddleware::new(Arc::new(approver)))]);
    let deploy = ScriptedTool::destructive("deploy").shared();

    let err = call(&handler, &mut exec(&deploy, "run-1", RunState::Act, "{}"))
        .await
        .unwrap_err();
    assert!(matches!(err, GateError::ApprovalFailed { .. }));
    assert!(err.to_string().contains("approval queue is closed"));
    assert!(!err.is_denial());
}

#[tokio::test]
async fn dropped_request_is_an_approver_error() {
    let (approver, mut queue) = ChannelApprover::new(1);
    let handler = around(vec![stage(ApprovalMiddleware::new(Arc::new(approver)))]);
    let deploy = ScriptedTool::destructive("deploy").shared();

    tokio::spawn(async move {
        let pending = queue.recv().await.unwrap();
        drop(pending);
    });

    let err = call(&handler, &mut exec(&deploy, "run-1", RunState::Act, "{}"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "approval_failed");
    assert!(err.to_string().contains("dropped without an answer"));
}

#[tokio::test(start_paused = true)]
async fn configured_timeout_bounds_the_wait() {
    let (approver, _queue) = ChannelApprover::new(1);
    let handler = around(vec![stage(ApprovalMiddleware::from_config(
        Some(Arc::new(approver)),
        &ApprovalConfig {
            timeout_ms: Some(5_000),
        },
    ))]);
    let deploy = ScriptedTool::destructive("deploy").shared();

    let started = tokio::time::Instant::now();
    let err = call(&handler, &mut exec(&deploy, "run-1", RunState::Act, "{}"))
        .await
        .unwrap_err();
    assert!(matches!(err, GateError::DeadlineExceeded { ref operation } if operation.contains("deploy")));
    assert!(started.elapsed() >= Duration::from_secs(5));
    assert_eq!(deploy.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn call_deadline_bounds_the_wait() {
    let (approver, _queue) = ChannelApprover::new(1);
    let handler = around(vec![stage(
        ApprovalMiddleware::new(Arc::new(approver)).with_timeout(Duration::from_secs(3600)),
    )]);
    let deploy = ScriptedTool::destructive("deploy").shared();

    let ctx = CallContext::background().with_timeout(Duration::from_secs(2));
    let err = handler
        .call(&ctx, &mut exec(&deploy, "run-1", RunState::Act, "{}"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "deadline_exceeded");
}

#[tokio::test]
async fn cancellation_abandons_the_wait() {
    let (approver, _queue) = ChannelApprover::new(1);
    let handler = around(vec![stage(ApprovalMiddleware::new(Arc::new(approver)))]);
    let deploy = ScriptedTool::destructive("deploy").shared();

    let ctx = CallContext::background();
    let waiter = {
        let ctx = ctx.clone();
        let handler = handler.clone();
        let deploy = deploy.clone();
        tokio::spawn(async move {
            let mut pending = exec(&deploy, "run-1", RunState::Act, "{}");
            handler.call(&ctx, &mut pending).await
        })
    };
    tokio::task::yield_now().await;
    ctx.cancel();

    let err = waiter.await.unwrap().unwrap_err();
    assert!(matches!(err, GateError::Cancelled { .. }));
    assert_eq!(deploy.calls(), 0);
}

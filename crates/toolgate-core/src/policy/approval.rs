//! Human-in-the-loop approval gate.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::approver::{ApprovalRequest, Approver};
use crate::context::{CallContext, ExecutionContext, Interrupt};
use crate::error::{GateError, GateResult};
use crate::handler::{Middleware, Next};
use crate::tool::ToolResult;

/// Approval stage settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApprovalConfig {
    /// Upper bound on how long to wait for a verdict, on top of the call's
    /// own deadline.
    pub timeout_ms: Option<u64>,
}

impl ApprovalConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

/// Holds back calls to tools that require approval until an [`Approver`]
/// accepts them.
///
/// Tools whose annotations do not require approval pass straight through.
/// Without an approver every gated call fails with
/// [`GateError::ApprovalRequired`].
#[derive(Clone, Default)]
pub struct ApprovalMiddleware {
    approver: Option<Arc<dyn Approver>>,
    timeout: Option<Duration>,
}

impl ApprovalMiddleware {
    pub fn new(approver: Arc<dyn Approver>) -> Self {
        Self {
            approver: Some(approver),
            timeout: None,
        }
    }

    /// Stage with no approver: every gated call is refused.
    pub fn fail_closed() -> Self {
        Self::default()
    }

    pub fn from_config(approver: Option<Arc<dyn Approver>>, config: &ApprovalConfig) -> Self {
        Self {
            approver,
            timeout: config.timeout(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl std::fmt::Debug for ApprovalMiddleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApprovalMiddleware")
            .field("has_approver", &self.approver.is_some())
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[async_trait]
impl Middleware for ApprovalMiddleware {
    async fn handle(
        &self,
        ctx: &CallContext,
        exec: &mut ExecutionContext,
        next: Next<'_>,
    ) -> GateResult<ToolResult> {
        if !exec.tool().annotations().requires_approval() {
            return next.run(ctx, exec).await;
        }

        let tool = exec.tool_name().to_string();
        let Some(approver) = &self.approver else {
            return Err(GateError::ApprovalRequired { tool });
        };

        let request = ApprovalRequest::from_exec(exec);
        tracing::info!(
            event = "approval.requested",
            request_id = %request.id,
            run_id = %request.run_id,
            tool = %tool,
            risk = %request.risk_level,
        );

        let bounded = match self.timeout {
            Some(limit) => ctx.with_timeout(limit),
            None => ctx.clone(),
        };
        let response = match bounded.guard(approver.approve(&request)).await {
            Ok(Ok(response)) => response,
            Ok(Err(source)) => return Err(GateError::ApprovalFailed { tool, source }),
            Err(Interrupt::Cancelled) => {
                return Err(GateError::Cancelled {
                    operation: format!("approval for tool '{tool}'"),
                })
            }
            Err(Interrupt::DeadlineExceeded) => {
                return Err(GateError::DeadlineExceeded {
                    operation: format!("approval for tool '{tool}'"),
                })
            }
        };

        tracing::info!(
            event = "approval.decided",
            request_id = %request.id,
            tool = %tool,
            approved = response.approved,
            approver = response.approver.as_deref().unwrap_or("unknown"),
        );
        if !response.approved {
            return Err(GateError::ApprovalDenied {
                tool,
                reason: response.reason,
            });
        }
        next.run(ctx, exec).await
    }
}

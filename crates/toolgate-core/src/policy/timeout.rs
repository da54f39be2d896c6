//! Per-call time limit.

use std::time::Duration;

use async_trait::async_trait;

use crate::context::{CallContext, ExecutionContext, Interrupt};
use crate::error::{GateError, GateResult};
use crate::handler::{Middleware, Next};
use crate::tool::ToolResult;

/// Fails the call with [`GateError::Timeout`] if the rest of the chain does
/// not finish within `limit`.
///
/// Downstream stages see a child context carrying the tighter deadline. A
/// cancellation of the caller's context is reported as
/// [`GateError::Cancelled`]; a caller deadline that is earlier than `limit`
/// as [`GateError::DeadlineExceeded`].
#[derive(Debug, Clone, Copy)]
pub struct TimeoutMiddleware {
    limit: Duration,
}

impl TimeoutMiddleware {
    pub fn new(limit: Duration) -> Self {
        Self { limit }
    }

    pub fn from_millis(ms: u64) -> Self {
        Self::new(Duration::from_millis(ms))
    }

    pub fn limit(&self) -> Duration {
        self.limit
    }
}

#[async_trait]
impl Middleware for TimeoutMiddleware {
    async fn handle(
        &self,
        ctx: &CallContext,
        exec: &mut ExecutionContext,
        next: Next<'_>,
    ) -> GateResult<ToolResult> {
        let own_deadline = tokio::time::Instant::now() + self.limit;
        let child = ctx.with_deadline(own_deadline);
        let tool = exec.tool_name().to_string();

        match child.guard(next.run(&child, exec)).await {
            Ok(result) => result,
            Err(Interrupt::Cancelled) => Err(GateError::Cancelled {
                operation: format!("call to tool '{tool}'"),
            }),
            Err(Interrupt::DeadlineExceeded) if child.deadline() == Some(own_deadline) => {
                Err(GateError::Timeout {
                    tool,
                    limit_ms: u64::try_from(self.limit.as_millis()).unwrap_or(u64::MAX),
                })
            }
            Err(Interrupt::DeadlineExceeded) => Err(GateError::DeadlineExceeded {
                operation: format!("call to tool '{tool}'"),
            }),
        }
    }
}

//! Structured observability stages for tool calls.
//!
//! This module provides:
//! - [`LoggingMiddleware`]: lifecycle events `tool.call.started`,
//!   `tool.call.finished` and `tool.call.failed`
//! - [`TracingMiddleware`]: a `toolgate.call` span around the rest of the chain
//!
//! Events are emitted through `tracing`; install a subscriber with
//! [`crate::telemetry::init_tracing`] in binaries.

use std::time::Instant;

use async_trait::async_trait;
use tracing::{info, warn, Instrument};

use crate::context::{CallContext, ExecutionContext};
use crate::error::GateResult;
use crate::handler::{Middleware, Next};
use crate::tool::ToolResult;

/// Emit event: a call entered the pipeline.
pub fn emit_call_started(exec: &ExecutionContext) {
    info!(
        event = "tool.call.started",
        run_id = %exec.run_id(),
        tool = %exec.tool_name(),
        state = %exec.current_state,
        dry_run = exec.dry_run,
    );
}

/// Emit event: a call completed.
pub fn emit_call_finished(exec: &ExecutionContext, result: &ToolResult, elapsed_ms: u64) {
    info!(
        event = "tool.call.finished",
        run_id = %exec.run_id(),
        tool = %exec.tool_name(),
        state = %exec.current_state,
        duration_ms = elapsed_ms,
        cached = result.cached,
        tool_error = result.error.as_deref().unwrap_or(""),
    );
}

/// Emit event: a call was refused or failed (warning level).
pub fn emit_call_failed(exec: &ExecutionContext, error: &crate::error::GateError, elapsed_ms: u64) {
    warn!(
        event = "tool.call.failed",
        run_id = %exec.run_id(),
        tool = %exec.tool_name(),
        state = %exec.current_state,
        duration_ms = elapsed_ms,
        kind = error.kind(),
        denied = error.is_denial(),
        error = %error,
    );
}

/// Logs the start and outcome of every call.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingMiddleware;

#[async_trait]
impl Middleware for LoggingMiddleware {
    async fn handle(
        &self,
        ctx: &CallContext,
        exec: &mut ExecutionContext,
        next: Next<'_>,
    ) -> GateResult<ToolResult> {
        emit_call_started(exec);
        let started = Instant::now();
        let result = next.run(ctx, exec).await;
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        match &result {
            Ok(out) => emit_call_finished(exec, out, elapsed_ms),
            Err(err) => emit_call_failed(exec, err, elapsed_ms),
        }
        result
    }
}

/// Runs the rest of the chain inside a `toolgate.call` span tagged with the
/// run id, tool and state.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingMiddleware;

#[async_trait]
impl Middleware for TracingMiddleware {
    async fn handle(
        &self,
        ctx: &CallContext,
        exec: &mut ExecutionContext,
        next: Next<'_>,
    ) -> GateResult<ToolResult> {
        let span = tracing::info_span!(
            "toolgate.call",
            run_id = %exec.run_id(),
            tool = %exec.tool_name(),
            state = %exec.current_state,
        );
        next.run(ctx, exec).instrument(span).await
    }
}

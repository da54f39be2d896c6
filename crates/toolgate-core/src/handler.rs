//! Handler and middleware composition.
//!
//! A [`Handler`] turns a call into a [`ToolResult`]. A [`Middleware`] is a
//! stage that receives the call together with [`Next`], the remainder of the
//! chain, and decides whether and how to continue. A stage that returns
//! without running `next` short-circuits everything behind it.
//!
//! [`Chain`] composes stages so that `Chain::new([a, b, c]).wrap(h)` runs
//! `a`, `b`, `c`, then `h`, then unwinds back through `c`, `b`, `a`.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use crate::context::{CallContext, ExecutionContext, RunState};
use crate::error::GateResult;
use crate::tool::ToolResult;

/// Shared handle to a handler.
pub type BoxHandler = Arc<dyn Handler>;

/// Shared handle to a middleware stage.
pub type BoxMiddleware = Arc<dyn Middleware>;

/// Terminal or composed call handler.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn call(&self, ctx: &CallContext, exec: &mut ExecutionContext)
        -> GateResult<ToolResult>;
}

/// One stage of the admission pipeline.
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn handle(
        &self,
        ctx: &CallContext,
        exec: &mut ExecutionContext,
        next: Next<'_>,
    ) -> GateResult<ToolResult>;
}

/// The remainder of a chain, as seen from inside a stage.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    stages: &'a [BoxMiddleware],
    endpoint: &'a dyn Handler,
}

impl<'a> Next<'a> {
    pub fn new(stages: &'a [BoxMiddleware], endpoint: &'a dyn Handler) -> Self {
        Self { stages, endpoint }
    }

    /// Run the remaining stages and then the endpoint.
    pub async fn run(
        self,
        ctx: &CallContext,
        exec: &mut ExecutionContext,
    ) -> GateResult<ToolResult> {
        match self.stages.split_first() {
            Some((stage, rest)) => {
                stage
                    .handle(ctx, exec, Next::new(rest, self.endpoint))
                    .await
            }
            None => self.endpoint.call(ctx, exec).await,
        }
    }
}

#[async_trait]
impl<'a> Handler for Next<'a> {
    async fn call(
        &self,
        ctx: &CallContext,
        exec: &mut ExecutionContext,
    ) -> GateResult<ToolResult> {
        self.run(ctx, exec).await
    }
}

/// Ordered, immutable composition of middleware stages.
///
/// A chain is itself a [`Middleware`], so chains nest.
#[derive(Clone, Default)]
pub struct Chain {
    stages: Vec<BoxMiddleware>,
}

impl Chain {
    pub fn new(stages: impl IntoIterator<Item = BoxMiddleware>) -> Self {
        Self {
            stages: stages.into_iter().collect(),
        }
    }

    /// Chain with no stages: wrapping a handler returns it unchanged.
    pub fn identity() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Compose the chain around `endpoint`.
    pub fn wrap(&self, endpoint: BoxHandler) -> BoxHandler {
        if self.stages.is_empty() {
            return endpoint;
        }
        Arc::new(Chained {
            stages: self.stages.clone(),
            endpoint,
        })
    }
}

#[async_trait]
impl Middleware for Chain {
    async fn handle(
        &self,
        ctx: &CallContext,
        exec: &mut ExecutionContext,
        next: Next<'_>,
    ) -> GateResult<ToolResult> {
        Next::new(&self.stages, &next).run(ctx, exec).await
    }
}

struct Chained {
    stages: Vec<BoxMiddleware>,
    endpoint: BoxHandler,
}

#[async_trait]
impl Handler for Chained {
    async fn call(
        &self,
        ctx: &CallContext,
        exec: &mut ExecutionContext,
    ) -> GateResult<ToolResult> {
        Next::new(&self.stages, self.endpoint.as_ref())
            .run(ctx, exec)
            .await
    }
}

/// Wrap a single handler in a single stage.
pub fn wrap(middleware: BoxMiddleware, endpoint: BoxHandler) -> BoxHandler {
    Chain::new([middleware]).wrap(endpoint)
}

// ---------------------------------------------------------------------------
// Endpoints
// ---------------------------------------------------------------------------

/// Innermost handler: executes the context's tool and stamps its duration.
#[derive(Debug, Clone, Copy, Default)]
pub struct ToolHandler;

#[async_trait]
impl Handler for ToolHandler {
    async fn call(
        &self,
        ctx: &CallContext,
        exec: &mut ExecutionContext,
    ) -> GateResult<ToolResult> {
        let tool = Arc::clone(exec.tool());
        let started = Instant::now();
        let mut result = tool.execute(ctx, &exec.input).await?;
        result.duration = started.elapsed();
        Ok(result)
    }
}

/// Owned snapshot of a call, handed to closure handlers.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub ctx: CallContext,
    pub run_id: String,
    pub tool: String,
    pub state: RunState,
    pub input: Vec<u8>,
}

/// Handler backed by an async closure.
pub struct FnHandler<F> {
    f: F,
}

/// Adapt an async closure into a [`Handler`].
pub fn handler_fn<F, Fut>(f: F) -> BoxHandler
where
    F: Fn(Invocation) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = GateResult<ToolResult>> + Send + 'static,
{
    Arc::new(FnHandler { f })
}

#[async_trait]
impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(Invocation) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = GateResult<ToolResult>> + Send + 'static,
{
    async fn call(
        &self,
        ctx: &CallContext,
        exec: &mut ExecutionContext,
    ) -> GateResult<ToolResult> {
        let invocation = Invocation {
            ctx: ctx.clone(),
            run_id: exec.run_id().to_string(),
            tool: exec.tool_name().to_string(),
            state: exec.current_state,
            input: exec.input.clone(),
        };
        (self.f)(invocation).await
    }
}

//! Shared test doubles for the integration tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use toolgate_core::{
    Annotations, BoxHandler, BoxMiddleware, CallContext, Chain, ExecutionContext, GateError,
    GateResult, Handler, JsonFieldSchema, Middleware, Next, RunState, Schema, Tool, ToolHandler,
    ToolResult,
};

/// What a [`ScriptedTool`] does when executed.
#[derive(Debug, Clone)]
pub enum Script {
    /// Echo the input back.
    Echo,
    /// Return fixed output.
    Output(Vec<u8>),
    /// Complete, but embed a tool-level error in the result.
    EmbeddedError(String),
    /// Fail with `GateError::Tool`.
    Fail(String),
}

/// Tool double that counts executions and follows a script.
pub struct ScriptedTool {
    name: String,
    annotations: Annotations,
    script: Script,
    delay: Option<Duration>,
    input_schema: JsonFieldSchema,
    output_schema: JsonFieldSchema,
    calls: AtomicUsize,
}

impl ScriptedTool {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            annotations: Annotations::default(),
            script: Script::Echo,
            delay: None,
            input_schema: JsonFieldSchema::default(),
            output_schema: JsonFieldSchema::default(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn read_only(name: &str) -> Self {
        Self::new(name).annotated(Annotations::read_only())
    }

    pub fn destructive(name: &str) -> Self {
        Self::new(name).annotated(Annotations::destructive())
    }

    pub fn annotated(mut self, annotations: Annotations) -> Self {
        self.annotations = annotations;
        self
    }

    pub fn script(mut self, script: Script) -> Self {
        self.script = script;
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn input_schema(mut self, schema: JsonFieldSchema) -> Self {
        self.input_schema = schema;
        self
    }

    pub fn output_schema(mut self, schema: JsonFieldSchema) -> Self {
        self.output_schema = schema;
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Tool for ScriptedTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn annotations(&self) -> Annotations {
        self.annotations
    }

    fn input_schema(&self) -> &dyn Schema {
        &self.input_schema
    }

    fn output_schema(&self) -> &dyn Schema {
        &self.output_schema
    }

    async fn execute(&self, _ctx: &CallContext, input: &[u8]) -> GateResult<ToolResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.script {
            Script::Echo => Ok(ToolResult::new(input.to_vec())),
            Script::Output(bytes) => Ok(ToolResult::new(bytes.clone())),
            Script::EmbeddedError(msg) => Ok(ToolResult::new("{}").with_error(msg.clone())),
            Script::Fail(msg) => Err(GateError::Tool {
                tool: self.name.clone(),
                message: msg.clone(),
            }),
        }
    }
}

pub fn exec(
    tool: &Arc<ScriptedTool>,
    run_id: &str,
    state: RunState,
    input: &str,
) -> ExecutionContext {
    ExecutionContext::new(run_id, state, tool.clone(), input.as_bytes().to_vec())
}

pub async fn call(handler: &BoxHandler, exec: &mut ExecutionContext) -> GateResult<ToolResult> {
    handler.call(&CallContext::background(), exec).await
}

pub fn endpoint() -> BoxHandler {
    Arc::new(ToolHandler)
}

pub fn stage(middleware: impl Middleware + 'static) -> BoxMiddleware {
    Arc::new(middleware)
}

/// The given stages wrapped around the tool endpoint.
pub fn around(stages: Vec<BoxMiddleware>) -> BoxHandler {
    Chain::new(stages).wrap(endpoint())
}

/// Shared, ordered log of stage activity.
#[derive(Clone, Default)]
pub struct Trail(Arc<Mutex<Vec<String>>>);

impl Trail {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

/// Stage that records when it is entered and left.
pub struct Probe {
    pub name: &'static str,
    pub trail: Trail,
}

#[async_trait]
impl Middleware for Probe {
    async fn handle(
        &self,
        ctx: &CallContext,
        exec: &mut ExecutionContext,
        next: Next<'_>,
    ) -> GateResult<ToolResult> {
        self.trail.push(format!("{}-before", self.name));
        let result = next.run(ctx, exec).await;
        self.trail.push(format!("{}-after", self.name));
        result
    }
}

/// Stage that answers every call itself.
pub struct ShortCircuit {
    pub trail: Trail,
}

#[async_trait]
impl Middleware for ShortCircuit {
    async fn handle(
        &self,
        _ctx: &CallContext,
        _exec: &mut ExecutionContext,
        _next: Next<'_>,
    ) -> GateResult<ToolResult> {
        self.trail.push("short-circuit");
        Ok(ToolResult::new("short"))
    }
}

/// Endpoint that records that it ran, then executes the tool.
pub struct RecordingEndpoint {
    pub trail: Trail,
}

#[async_trait]
impl Handler for RecordingEndpoint {
    async fn call(&self, ctx: &CallContext, exec: &mut ExecutionContext) -> GateResult<ToolResult> {
        self.trail.push("handler");
        ToolHandler.call(ctx, exec).await
    }
}

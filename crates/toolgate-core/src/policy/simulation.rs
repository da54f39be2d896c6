//! Side-effect interception: simulation, dry-run and mocks.
//!
//! Blocked calls never reach the inner handler. Instead the stage returns,
//! in order of preference, a mock configured for the tool, the configured
//! default result, or a placeholder of the form
//! `{"dry_run": true, "tool": "...", "reason": "..."}`.
//! Each interception can be logged to a [`Recorder`].

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::context::{CallContext, ExecutionContext};
use crate::error::GateResult;
use crate::handler::{Middleware, Next};
use crate::recorder::{InterceptedOperation, Recorder};
use crate::tool::{Annotations, ToolResult};

/// Simulation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Let read-only tools run for real.
    pub allow_read_only: bool,
    /// Let idempotent tools run for real.
    pub allow_idempotent: bool,
    /// Log intercepted calls to the recorder, if one is attached.
    pub record: bool,
    /// Canned JSON outputs keyed by tool name.
    pub mocks: BTreeMap<String, Value>,
    /// Output for blocked tools without a mock.
    pub default_result: Option<Value>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            allow_read_only: true,
            allow_idempotent: false,
            record: true,
            mocks: BTreeMap::new(),
            default_result: None,
        }
    }
}

/// Outcome of the simulation decision table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimulationDecision {
    Execute,
    Block(String),
}

impl SimulationConfig {
    /// Decide whether a tool with these annotations may run for real.
    ///
    /// Destructive tools are always blocked, even when they are also
    /// idempotent.
    pub fn decide(&self, annotations: &Annotations) -> SimulationDecision {
        use SimulationDecision::{Block, Execute};
        if annotations.destructive {
            return Block("destructive tool blocked in simulation".into());
        }
        if annotations.read_only && self.allow_read_only {
            return Execute;
        }
        if annotations.idempotent && self.allow_idempotent {
            return Execute;
        }
        if annotations.read_only {
            return Block("read-only execution disabled in simulation".into());
        }
        Block("tool with side effects blocked in simulation".into())
    }
}

#[derive(Clone, Default)]
struct Interceptor {
    mocks: HashMap<String, ToolResult>,
    default_result: Option<ToolResult>,
    recorder: Option<Arc<dyn Recorder>>,
}

impl Interceptor {
    fn from_config(config: &SimulationConfig) -> Self {
        Self {
            mocks: config
                .mocks
                .iter()
                .map(|(tool, value)| (tool.clone(), ToolResult::json(value)))
                .collect(),
            default_result: config.default_result.as_ref().map(ToolResult::json),
            recorder: None,
        }
    }

    fn mock(&self, tool: &str) -> Option<ToolResult> {
        self.mocks.get(tool).cloned()
    }

    fn intercept(&self, exec: &ExecutionContext, reason: &str) -> ToolResult {
        let mock = self.mock(exec.tool_name());
        let mocked = mock.is_some();
        if let Some(recorder) = &self.recorder {
            recorder.record(InterceptedOperation::from_exec(exec, reason, mocked));
        }
        tracing::info!(
            event = "simulation.intercepted",
            run_id = %exec.run_id(),
            tool = %exec.tool_name(),
            reason = %reason,
            mocked = mocked,
        );
        mock.or_else(|| self.default_result.clone())
            .unwrap_or_else(|| placeholder(exec.tool_name(), reason))
    }
}

/// Synthesized output for a blocked call with no mock or default.
pub fn placeholder(tool: &str, reason: &str) -> ToolResult {
    ToolResult::json(&json!({
        "dry_run": true,
        "tool": tool,
        "reason": reason,
    }))
}

// ---------------------------------------------------------------------------
// SimulationMiddleware
// ---------------------------------------------------------------------------

/// Runs only the calls the decision table allows; intercepts the rest.
#[derive(Clone)]
pub struct SimulationMiddleware {
    config: SimulationConfig,
    interceptor: Interceptor,
}

impl SimulationMiddleware {
    pub fn new(config: SimulationConfig) -> Self {
        let interceptor = Interceptor::from_config(&config);
        Self {
            config,
            interceptor,
        }
    }

    /// Builder: log intercepted calls to `recorder` (if `record` is set).
    pub fn with_recorder(mut self, recorder: Arc<dyn Recorder>) -> Self {
        if self.config.record {
            self.interceptor.recorder = Some(recorder);
        }
        self
    }

    pub fn with_mock(mut self, tool: impl Into<String>, result: ToolResult) -> Self {
        self.interceptor.mocks.insert(tool.into(), result);
        self
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }
}

#[async_trait]
impl Middleware for SimulationMiddleware {
    async fn handle(
        &self,
        ctx: &CallContext,
        exec: &mut ExecutionContext,
        next: Next<'_>,
    ) -> GateResult<ToolResult> {
        match self.config.decide(&exec.tool().annotations()) {
            SimulationDecision::Execute => next.run(ctx, exec).await,
            SimulationDecision::Block(reason) => Ok(self.interceptor.intercept(exec, &reason)),
        }
    }
}

// ---------------------------------------------------------------------------
// DryRunMiddleware
// ---------------------------------------------------------------------------

/// Intercepts every non-read-only call while dry-run is on, either globally
/// or for a call whose context sets `dry_run`.
#[derive(Clone, Default)]
pub struct DryRunMiddleware {
    enabled: bool,
    interceptor: Interceptor,
}

impl DryRunMiddleware {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            interceptor: Interceptor::default(),
        }
    }

    /// Reuses the mocks and default result of a simulation config.
    pub fn from_config(enabled: bool, config: &SimulationConfig) -> Self {
        Self {
            enabled,
            interceptor: Interceptor::from_config(config),
        }
    }

    pub fn with_recorder(mut self, recorder: Arc<dyn Recorder>) -> Self {
        self.interceptor.recorder = Some(recorder);
        self
    }

    pub fn with_mock(mut self, tool: impl Into<String>, result: ToolResult) -> Self {
        self.interceptor.mocks.insert(tool.into(), result);
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

#[async_trait]
impl Middleware for DryRunMiddleware {
    async fn handle(
        &self,
        ctx: &CallContext,
        exec: &mut ExecutionContext,
        next: Next<'_>,
    ) -> GateResult<ToolResult> {
        if !(self.enabled || exec.dry_run) || exec.tool().annotations().read_only {
            return next.run(ctx, exec).await;
        }
        Ok(self.interceptor.intercept(exec, "dry run"))
    }
}

// ---------------------------------------------------------------------------
// MockMiddleware
// ---------------------------------------------------------------------------

/// Answers calls to mocked tools with their canned result, whatever their
/// annotations; every other tool passes through.
#[derive(Clone, Default)]
pub struct MockMiddleware {
    interceptor: Interceptor,
}

impl MockMiddleware {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_mocks(mocks: &BTreeMap<String, Value>) -> Self {
        Self {
            interceptor: Interceptor::from_config(&SimulationConfig {
                mocks: mocks.clone(),
                ..SimulationConfig::default()
            }),
        }
    }

    pub fn with_mock(mut self, tool: impl Into<String>, result: ToolResult) -> Self {
        self.interceptor.mocks.insert(tool.into(), result);
        self
    }

    pub fn with_recorder(mut self, recorder: Arc<dyn Recorder>) -> Self {
        self.interceptor.recorder = Some(recorder);
        self
    }

    pub fn is_mocked(&self, tool: &str) -> bool {
        self.interceptor.mocks.contains_key(tool)
    }
}

#[async_trait]
impl Middleware for MockMiddleware {
    async fn handle(
        &self,
        ctx: &CallContext,
        exec: &mut ExecutionContext,
        next: Next<'_>,
    ) -> GateResult<ToolResult> {
        if self.is_mocked(exec.tool_name()) {
            return Ok(self.interceptor.intercept(exec, "mocked"));
        }
        next.run(ctx, exec).await
    }
}

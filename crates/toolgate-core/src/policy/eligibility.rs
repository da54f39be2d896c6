//! State-based tool eligibility.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::context::{CallContext, ExecutionContext, RunState};
use crate::error::{GateError, GateResult};
use crate::handler::{Middleware, Next};
use crate::tool::ToolResult;

/// Which tools may be called in which run state.
///
/// Serializes as a map from state name to tool names:
///
/// ```toml
/// [eligibility]
/// explore = ["read_file", "search"]
/// act = ["read_file", "write_file"]
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EligibilityTable {
    states: HashMap<RunState, HashSet<String>>,
}

impl EligibilityTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: permit `tools` in `state`.
    pub fn allow<I, S>(mut self, state: RunState, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.insert(state, tools);
        self
    }

    pub fn insert<I, S>(&mut self, state: RunState, tools: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.states
            .entry(state)
            .or_default()
            .extend(tools.into_iter().map(Into::into));
    }

    /// Permit `tool` in every state.
    pub fn allow_everywhere(mut self, tool: &str) -> Self {
        for state in RunState::ALL {
            self.insert(state, [tool]);
        }
        self
    }

    pub fn is_allowed(&self, state: RunState, tool: &str) -> bool {
        self.states
            .get(&state)
            .is_some_and(|tools| tools.contains(tool))
    }

    /// Tools permitted in `state`, sorted.
    pub fn tools_for(&self, state: RunState) -> Vec<&str> {
        let mut tools: Vec<&str> = self
            .states
            .get(&state)
            .map(|set| set.iter().map(String::as_str).collect())
            .unwrap_or_default();
        tools.sort_unstable();
        tools
    }
}

/// Rejects tools that are not permitted in the run's current state.
///
/// With no table configured every call passes through.
#[derive(Debug, Clone, Default)]
pub struct EligibilityMiddleware {
    table: Option<Arc<EligibilityTable>>,
}

impl EligibilityMiddleware {
    pub fn new(table: EligibilityTable) -> Self {
        Self {
            table: Some(Arc::new(table)),
        }
    }

    /// Stage that admits everything.
    pub fn unrestricted() -> Self {
        Self::default()
    }

    pub fn with_shared_table(table: Arc<EligibilityTable>) -> Self {
        Self { table: Some(table) }
    }
}

#[async_trait]
impl Middleware for EligibilityMiddleware {
    async fn handle(
        &self,
        ctx: &CallContext,
        exec: &mut ExecutionContext,
        next: Next<'_>,
    ) -> GateResult<ToolResult> {
        if let Some(table) = &self.table {
            if !table.is_allowed(exec.current_state, exec.tool_name()) {
                tracing::debug!(
                    event = "eligibility.denied",
                    run_id = %exec.run_id(),
                    tool = %exec.tool_name(),
                    state = %exec.current_state,
                );
                return Err(GateError::ToolNotAllowed {
                    tool: exec.tool_name().to_string(),
                    state: exec.current_state,
                });
            }
        }
        next.run(ctx, exec).await
    }
}

//! Resource budget accounting.
//!
//! [`BudgetMiddleware`] charges an owning [`Budget`]: it reserves the units
//! atomically before the call and refunds them if the call fails or its
//! future is dropped, so only successful calls are paid for and concurrent
//! calls can never jointly overdraw a counter. [`BudgetCheckMiddleware`] only reads the
//! [`BudgetView`](toolgate_state::BudgetView) attached to the call.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use toolgate_state::{Budget, MemoryBudget};

use crate::context::{CallContext, ExecutionContext};
use crate::error::{GateError, GateResult};
use crate::handler::{Middleware, Next};
use crate::tool::ToolResult;

/// Counter charged when none is configured.
pub const DEFAULT_BUDGET_NAME: &str = "tool_calls";

/// Budget stage settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetConfig {
    /// Counter charged per call.
    pub name: String,
    /// Units charged per call.
    pub amount: u64,
    /// Limits for an in-memory budget, used when no budget is injected.
    pub limits: BTreeMap<String, u64>,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_BUDGET_NAME.to_string(),
            amount: 1,
            limits: BTreeMap::new(),
        }
    }
}

impl BudgetConfig {
    /// In-memory budget holding the configured limits.
    pub fn memory_budget(&self) -> MemoryBudget {
        self.limits
            .iter()
            .fold(MemoryBudget::new(), |budget, (name, limit)| {
                budget.with_limit(name.clone(), *limit)
            })
    }
}

/// Charges `amount` units of `name` for every successful call.
#[derive(Clone)]
pub struct BudgetMiddleware {
    budget: Arc<dyn Budget>,
    name: String,
    amount: u64,
}

impl BudgetMiddleware {
    pub fn new(budget: Arc<dyn Budget>, name: impl Into<String>, amount: u64) -> Self {
        Self {
            budget,
            name: name.into(),
            amount,
        }
    }

    pub fn from_config(budget: Arc<dyn Budget>, config: &BudgetConfig) -> Self {
        Self::new(budget, config.name.clone(), config.amount)
    }

    pub fn budget(&self) -> &Arc<dyn Budget> {
        &self.budget
    }
}

impl std::fmt::Debug for BudgetMiddleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BudgetMiddleware")
            .field("name", &self.name)
            .field("amount", &self.amount)
            .finish()
    }
}

#[async_trait]
impl Middleware for BudgetMiddleware {
    async fn handle(
        &self,
        ctx: &CallContext,
        exec: &mut ExecutionContext,
        next: Next<'_>,
    ) -> GateResult<ToolResult> {
        if !self.budget.try_consume(&self.name, self.amount) {
            return Err(GateError::BudgetExceeded {
                tool: exec.tool_name().to_string(),
                budget: self.name.clone(),
                requested: self.amount,
                remaining: self.budget.remaining(&self.name),
            });
        }

        let mut reservation = Reservation::new(self, exec.tool_name().to_string());
        let result = next.run(ctx, exec).await;
        match &result {
            Ok(_) => reservation.commit(),
            Err(err) => reservation.error = Some(err.kind()),
        }
        result
    }
}

/// Units held by an in-flight call, refunded on drop unless committed.
///
/// Dropping covers both error returns and a future abandoned mid-call.
struct Reservation<'a> {
    stage: &'a BudgetMiddleware,
    tool: String,
    error: Option<&'static str>,
    committed: bool,
}

impl<'a> Reservation<'a> {
    fn new(stage: &'a BudgetMiddleware, tool: String) -> Self {
        Self {
            stage,
            tool,
            error: None,
            committed: false,
        }
    }

    fn commit(&mut self) {
        self.committed = true;
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        self.stage.budget.refund(&self.stage.name, self.stage.amount);
        tracing::debug!(
            event = "budget.refunded",
            budget = %self.stage.name,
            amount = self.stage.amount,
            tool = %self.tool,
            error = self.error.unwrap_or("abandoned"),
        );
    }
}

/// Denies calls the attached budget view cannot cover; charges nothing.
///
/// Calls without a view on their [`ExecutionContext`] pass through.
#[derive(Debug, Clone)]
pub struct BudgetCheckMiddleware {
    name: String,
    amount: u64,
}

impl BudgetCheckMiddleware {
    pub fn new(name: impl Into<String>, amount: u64) -> Self {
        Self {
            name: name.into(),
            amount,
        }
    }
}

impl Default for BudgetCheckMiddleware {
    fn default() -> Self {
        Self::new(DEFAULT_BUDGET_NAME, 1)
    }
}

#[async_trait]
impl Middleware for BudgetCheckMiddleware {
    async fn handle(
        &self,
        ctx: &CallContext,
        exec: &mut ExecutionContext,
        next: Next<'_>,
    ) -> GateResult<ToolResult> {
        if let Some(view) = &exec.budget {
            if !view.can_consume(&self.name, self.amount) {
                return Err(GateError::BudgetExceeded {
                    tool: exec.tool_name().to_string(),
                    budget: self.name.clone(),
                    requested: self.amount,
                    remaining: view.remaining(&self.name),
                });
            }
        }
        next.run(ctx, exec).await
    }
}

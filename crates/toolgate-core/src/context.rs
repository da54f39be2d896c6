//! Per-call context types.
//!
//! - [`CallContext`] carries cancellation and deadline for one call attempt.
//!   Every stage that can suspend (approval, rate-limit waits, store I/O)
//!   races its work against it through [`CallContext::guard`].
//! - [`ExecutionContext`] is the mutable record that flows through the
//!   middleware chain: run identity, current run state, the tool, its input
//!   and shared per-run variables.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Notify;
use tokio::time::Instant;

use toolgate_state::BudgetView;

use crate::tool::Tool;

// ---------------------------------------------------------------------------
// RunState
// ---------------------------------------------------------------------------

/// Phase of the agent run that issued the call.
///
/// Owned by the orchestrator; stages read it but never transition it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Intake,
    Explore,
    Decide,
    Act,
    Validate,
    Done,
    Failed,
}

impl RunState {
    pub const ALL: [RunState; 7] = [
        RunState::Intake,
        RunState::Explore,
        RunState::Decide,
        RunState::Act,
        RunState::Validate,
        RunState::Done,
        RunState::Failed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Intake => "intake",
            Self::Explore => "explore",
            Self::Decide => "decide",
            Self::Act => "act",
            Self::Validate => "validate",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    /// Whether the run has finished.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// CallContext
// ---------------------------------------------------------------------------

/// Why a guarded future did not complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    Cancelled,
    DeadlineExceeded,
}

#[derive(Debug, Default)]
struct CancelSignal {
    cancelled: AtomicBool,
    notify: Notify,
}

/// Cancellation and deadline for one call attempt.
///
/// Clones share the cancellation signal; [`CallContext::with_timeout`] and
/// [`CallContext::with_deadline`] derive a child that also inherits it but
/// may carry a tighter deadline.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    signal: Arc<CancelSignal>,
    deadline: Option<Instant>,
}

impl CallContext {
    /// A context that is never cancelled and has no deadline.
    pub fn background() -> Self {
        Self::default()
    }

    /// Derive a child whose deadline is at most `timeout` from now.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Derive a child whose deadline is at most `deadline`.
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(existing) if existing <= deadline => existing,
            _ => deadline,
        };
        Self {
            signal: Arc::clone(&self.signal),
            deadline: Some(deadline),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Cancel this context and every clone or child of it.
    pub fn cancel(&self) {
        self.signal.cancelled.store(true, Ordering::SeqCst);
        self.signal.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.signal.cancelled.load(Ordering::SeqCst)
    }

    /// Whether the deadline has already passed.
    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Non-blocking check, for use before starting work.
    pub fn check(&self) -> Result<(), Interrupt> {
        if self.is_cancelled() {
            Err(Interrupt::Cancelled)
        } else if self.is_expired() {
            Err(Interrupt::DeadlineExceeded)
        } else {
            Ok(())
        }
    }

    /// Resolves once [`CallContext::cancel`] has been called.
    pub async fn cancelled(&self) {
        loop {
            // Register before checking the flag so a concurrent cancel()
            // between the check and the await is not lost.
            let notified = self.signal.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }

    /// Resolves once the deadline passes; never resolves without one.
    pub async fn expired(&self) {
        match self.deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => std::future::pending::<()>().await,
        }
    }

    /// Run `fut` to completion unless the context is cancelled or its
    /// deadline passes first.
    pub async fn guard<F: Future>(&self, fut: F) -> Result<F::Output, Interrupt> {
        self.check()?;
        tokio::select! {
            biased;
            _ = self.cancelled() => Err(Interrupt::Cancelled),
            _ = self.expired() => Err(Interrupt::DeadlineExceeded),
            out = fut => Ok(out),
        }
    }
}

// ---------------------------------------------------------------------------
// Vars
// ---------------------------------------------------------------------------

/// Shared, lock-guarded variables visible to every stage of every call that
/// holds a clone.
#[derive(Debug, Clone, Default)]
pub struct Vars {
    inner: Arc<RwLock<HashMap<String, Value>>>,
}

impl Vars {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    /// Insert a value, returning the previous one.
    pub fn set(&self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.inner
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.into(), value)
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.inner
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(key)
    }

    /// Copy of every variable.
    pub fn snapshot(&self) -> HashMap<String, Value> {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

// ---------------------------------------------------------------------------
// ExecutionContext
// ---------------------------------------------------------------------------

/// Mutable per-call record passed by `&mut` through the middleware chain.
///
/// `run_id` and `tool` are fixed at construction; stages may annotate
/// `reason`, read `vars`, or flip `dry_run` for downstream stages.
pub struct ExecutionContext {
    run_id: String,
    tool: Arc<dyn Tool>,
    pub current_state: RunState,
    pub input: Vec<u8>,
    pub reason: String,
    pub budget: Option<Arc<dyn BudgetView>>,
    pub vars: Vars,
    pub dry_run: bool,
}

impl ExecutionContext {
    pub fn new(
        run_id: impl Into<String>,
        state: RunState,
        tool: Arc<dyn Tool>,
        input: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            tool,
            current_state: state,
            input: input.into(),
            reason: String::new(),
            budget: None,
            vars: Vars::new(),
            dry_run: false,
        }
    }

    /// Builder: attach the agent's stated reason for the call.
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    /// Builder: attach a read-only budget view.
    pub fn with_budget(mut self, budget: Arc<dyn BudgetView>) -> Self {
        self.budget = Some(budget);
        self
    }

    /// Builder: share a run's variables with this call.
    pub fn with_vars(mut self, vars: Vars) -> Self {
        self.vars = vars;
        self
    }

    /// Builder: request dry-run handling for this call only.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn tool(&self) -> &Arc<dyn Tool> {
        &self.tool
    }

    pub fn tool_name(&self) -> &str {
        self.tool.name()
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("run_id", &self.run_id)
            .field("tool", &self.tool.name())
            .field("current_state", &self.current_state)
            .field("input_len", &self.input.len())
            .field("reason", &self.reason)
            .field("has_budget", &self.budget.is_some())
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

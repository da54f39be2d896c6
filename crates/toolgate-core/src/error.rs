//! Error taxonomy for the admission pipeline.

use crate::context::RunState;

/// Errors produced by the admission pipeline.
///
/// Policy stages short-circuit with one of the typed variants; errors raised by
/// the tool itself pass through as [`GateError::Tool`] or [`GateError::Other`].
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    #[error("tool '{tool}' is not allowed in state {state}")]
    ToolNotAllowed { tool: String, state: RunState },

    #[error("budget '{budget}' exceeded for tool '{tool}': requested {requested}, remaining {remaining}")]
    BudgetExceeded {
        tool: String,
        budget: String,
        requested: u64,
        remaining: u64,
    },

    #[error("rate limit exceeded for key '{key}': {reason}")]
    RateLimitExceeded { key: String, reason: String },

    #[error("approval required for tool '{tool}' but no approver is configured")]
    ApprovalRequired { tool: String },

    #[error("approval denied for tool '{tool}': {reason}")]
    ApprovalDenied { tool: String, reason: String },

    #[error("approval request for tool '{tool}' failed: {source}")]
    ApprovalFailed {
        tool: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("invalid input for tool '{tool}': {reason}")]
    InvalidInput { tool: String, reason: String },

    #[error("invalid output from tool '{tool}': {reason}")]
    InvalidOutput { tool: String, reason: String },

    #[error("tool '{tool}' timed out after {limit_ms}ms")]
    Timeout { tool: String, limit_ms: u64 },

    #[error("{operation} cancelled")]
    Cancelled { operation: String },

    #[error("{operation} deadline exceeded")]
    DeadlineExceeded { operation: String },

    #[error("tool '{tool}' failed: {message}")]
    Tool { tool: String, message: String },

    #[error("storage error: {0}")]
    Storage(#[from] toolgate_state::StorageError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl GateError {
    /// Stable snake_case label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ToolNotAllowed { .. } => "tool_not_allowed",
            Self::BudgetExceeded { .. } => "budget_exceeded",
            Self::RateLimitExceeded { .. } => "rate_limit_exceeded",
            Self::ApprovalRequired { .. } => "approval_required",
            Self::ApprovalDenied { .. } => "approval_denied",
            Self::ApprovalFailed { .. } => "approval_failed",
            Self::InvalidInput { .. } => "invalid_input",
            Self::InvalidOutput { .. } => "invalid_output",
            Self::Timeout { .. } => "timeout",
            Self::Cancelled { .. } => "cancelled",
            Self::DeadlineExceeded { .. } => "deadline_exceeded",
            Self::Tool { .. } => "tool",
            Self::Storage(_) => "storage",
            Self::Serialization(_) => "serialization",
            Self::Other(_) => "other",
        }
    }

    /// Whether a policy stage refused admission (as opposed to the call
    /// failing after it was admitted).
    pub fn is_denial(&self) -> bool {
        matches!(
            self,
            Self::ToolNotAllowed { .. }
                | Self::BudgetExceeded { .. }
                | Self::RateLimitExceeded { .. }
                | Self::ApprovalRequired { .. }
                | Self::ApprovalDenied { .. }
                | Self::InvalidInput { .. }
        )
    }
}

/// Result type for pipeline operations.
pub type GateResult<T> = std::result::Result<T, GateError>;

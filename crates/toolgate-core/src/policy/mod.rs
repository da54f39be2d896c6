//! Admission-control stages.
//!
//! Every stage is a [`Middleware`](crate::handler::Middleware) that depends
//! only on the [`ExecutionContext`](crate::context::ExecutionContext) and at
//! most one injected collaborator. A stage either refuses the call with a
//! typed [`GateError`](crate::error::GateError) without running the rest of
//! the chain, or passes the downstream result through unchanged. Only the
//! simulation stages substitute a synthetic result.

pub mod approval;
pub mod budget;
pub mod caching;
pub mod eligibility;
pub mod rate_limit;
pub mod simulation;
pub mod timeout;
pub mod validation;

pub use approval::{ApprovalConfig, ApprovalMiddleware};
pub use budget::{BudgetCheckMiddleware, BudgetConfig, BudgetMiddleware, DEFAULT_BUDGET_NAME};
pub use caching::{cache_key, CachingConfig, CachingMiddleware};
pub use eligibility::{EligibilityMiddleware, EligibilityTable};
pub use rate_limit::{
    AdaptiveConfig, AdaptiveRateLimit, PerToolRateLimit, PerToolRateLimitConfig, RateLimitConfig,
    RateLimitMiddleware, RateLimitMode, RateLimitScope,
};
pub use simulation::{
    placeholder, DryRunMiddleware, MockMiddleware, SimulationConfig, SimulationDecision,
    SimulationMiddleware,
};
pub use timeout::TimeoutMiddleware;
pub use validation::{check_payload, ValidationConfig, ValidationMiddleware};

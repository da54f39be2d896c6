//! Toolgate Core Library
//!
//! Admission-control pipeline for tool calls made by autonomous agents.
//! Every call flows through an ordered chain of [`Middleware`] stages
//! (eligibility, rate limiting, budget, approval, simulation, caching and
//! friends) before the tool itself runs.
//!
//! ```ignore
//! let handler = PipelineBuilder::new(config)
//!     .budget(budget)
//!     .approver(approver)
//!     .handler()?;
//! let mut exec = ExecutionContext::new("run-1", RunState::Act, tool, input);
//! let result = handler.call(&CallContext::background(), &mut exec).await?;
//! ```

pub mod approver;
pub mod config;
pub mod context;
pub mod error;
pub mod handler;
pub mod limiter;
pub mod metrics;
pub mod obs;
pub mod pipeline;
pub mod policy;
pub mod recorder;
pub mod registry;
pub mod telemetry;
pub mod tool;

pub use approver::{
    ApprovalRequest, ApprovalResponse, Approver, ChannelApprover, PendingApproval, StaticApprover,
};
pub use config::PipelineConfig;
pub use context::{CallContext, ExecutionContext, Interrupt, RunState, Vars};
pub use error::{GateError, GateResult};
pub use handler::{
    handler_fn, wrap, BoxHandler, BoxMiddleware, Chain, Handler, Invocation, Middleware, Next,
    ToolHandler,
};
pub use limiter::{RateLimiter, TokenBucketLimiter};
pub use metrics::{GateMetrics, MetricsMiddleware, MetricsSnapshot};
pub use obs::{LoggingMiddleware, TracingMiddleware};
pub use pipeline::PipelineBuilder;
pub use policy::{
    cache_key, AdaptiveConfig, AdaptiveRateLimit, ApprovalConfig, ApprovalMiddleware,
    BudgetCheckMiddleware, BudgetConfig, BudgetMiddleware, CachingConfig, CachingMiddleware,
    DryRunMiddleware, EligibilityMiddleware, EligibilityTable, MockMiddleware, PerToolRateLimit,
    PerToolRateLimitConfig, RateLimitConfig, RateLimitMiddleware, RateLimitMode, RateLimitScope,
    SimulationConfig, SimulationDecision, SimulationMiddleware, TimeoutMiddleware,
    ValidationConfig, ValidationMiddleware,
};
pub use recorder::{InterceptedOperation, MemoryRecorder, Recorder, RecorderSummary};
pub use registry::Registry;
pub use telemetry::{default_directives, init_tracing, LogFormat};
pub use tool::{Annotations, JsonFieldSchema, RiskLevel, Schema, Tool, ToolResult};

pub use toolgate_state::{
    Budget, BudgetUsage, BudgetView, Cache, MemoryBudget, MemoryCache, StorageError,
};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

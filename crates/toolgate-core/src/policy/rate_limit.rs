//! Rate-limit stages over the token-bucket [`RateLimiter`].
//!
//! - [`RateLimitMiddleware`]: one limiter, bucket chosen by [`RateLimitScope`].
//! - [`PerToolRateLimit`]: dedicated limits for named tools plus a fallback.
//! - [`AdaptiveRateLimit`]: AIMD-style rate that backs off on failures and
//!   recovers on success.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::context::{CallContext, ExecutionContext};
use crate::error::{GateError, GateResult};
use crate::handler::{Middleware, Next};
use crate::limiter::{RateLimiter, TokenBucketLimiter};
use crate::tool::ToolResult;

// ---------------------------------------------------------------------------
// Scope & mode
// ---------------------------------------------------------------------------

/// How calls are grouped into buckets.
///
/// Parses from `"global"`, `"per_run"`, `"per_tool"` or `"per_run_tool"`;
/// anything else falls back to [`RateLimitScope::Global`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RateLimitScope {
    #[default]
    Global,
    PerRun,
    PerTool,
    PerRunTool,
}

impl RateLimitScope {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Global => "global",
            Self::PerRun => "per_run",
            Self::PerTool => "per_tool",
            Self::PerRunTool => "per_run_tool",
        }
    }

    /// Bucket key for a call.
    pub fn key(self, exec: &ExecutionContext) -> String {
        match self {
            Self::Global => "global".to_string(),
            Self::PerRun => exec.run_id().to_string(),
            Self::PerTool => exec.tool_name().to_string(),
            Self::PerRunTool => format!("{}:{}", exec.run_id(), exec.tool_name()),
        }
    }
}

impl FromStr for RateLimitScope {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "per_run" | "run" => Self::PerRun,
            "per_tool" | "tool" => Self::PerTool,
            "per_run_tool" | "run_tool" => Self::PerRunTool,
            _ => Self::Global,
        })
    }
}

impl From<String> for RateLimitScope {
    fn from(s: String) -> Self {
        s.parse().unwrap_or_default()
    }
}

impl From<RateLimitScope> for String {
    fn from(scope: RateLimitScope) -> Self {
        scope.as_str().to_string()
    }
}

impl fmt::Display for RateLimitScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to do when a bucket is empty.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitMode {
    /// Deny immediately with [`GateError::RateLimitExceeded`].
    #[default]
    Reject,
    /// Block until a token frees up or the call context gives up.
    Wait,
}

/// Token-bucket settings for one rate-limit stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Tokens added per second.
    pub rate: f64,
    /// Bucket capacity.
    pub burst: u32,
    pub scope: RateLimitScope,
    pub mode: RateLimitMode,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            rate: 10.0,
            burst: 10,
            scope: RateLimitScope::Global,
            mode: RateLimitMode::Reject,
        }
    }
}

impl RateLimitConfig {
    pub fn limiter(&self) -> TokenBucketLimiter {
        TokenBucketLimiter::new(self.rate, self.burst)
    }
}

async fn admit(
    limiter: &dyn RateLimiter,
    mode: RateLimitMode,
    ctx: &CallContext,
    key: &str,
) -> GateResult<()> {
    match mode {
        RateLimitMode::Reject if limiter.allow(key) => Ok(()),
        RateLimitMode::Reject => Err(GateError::RateLimitExceeded {
            key: key.to_string(),
            reason: "no tokens available".into(),
        }),
        RateLimitMode::Wait => limiter.wait(ctx, key).await,
    }
}

// ---------------------------------------------------------------------------
// RateLimitMiddleware
// ---------------------------------------------------------------------------

/// Admits calls through one shared limiter.
#[derive(Clone)]
pub struct RateLimitMiddleware {
    limiter: Arc<dyn RateLimiter>,
    scope: RateLimitScope,
    mode: RateLimitMode,
}

impl RateLimitMiddleware {
    pub fn new(limiter: Arc<dyn RateLimiter>, scope: RateLimitScope, mode: RateLimitMode) -> Self {
        Self {
            limiter,
            scope,
            mode,
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(Arc::new(config.limiter()), config.scope, config.mode)
    }

    pub fn scope(&self) -> RateLimitScope {
        self.scope
    }

    pub fn mode(&self) -> RateLimitMode {
        self.mode
    }
}

impl fmt::Debug for RateLimitMiddleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimitMiddleware")
            .field("scope", &self.scope)
            .field("mode", &self.mode)
            .finish()
    }
}

#[async_trait]
impl Middleware for RateLimitMiddleware {
    async fn handle(
        &self,
        ctx: &CallContext,
        exec: &mut ExecutionContext,
        next: Next<'_>,
    ) -> GateResult<ToolResult> {
        let key = self.scope.key(exec);
        if let Err(err) = admit(self.limiter.as_ref(), self.mode, ctx, &key).await {
            tracing::debug!(
                event = "rate_limit.denied",
                run_id = %exec.run_id(),
                tool = %exec.tool_name(),
                key = %key,
            );
            return Err(err);
        }
        next.run(ctx, exec).await
    }
}

// ---------------------------------------------------------------------------
// PerToolRateLimit
// ---------------------------------------------------------------------------

/// Rate-limit settings keyed by tool name, with an optional fallback.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerToolRateLimitConfig {
    pub tools: BTreeMap<String, RateLimitConfig>,
    pub default: Option<RateLimitConfig>,
}

/// Dedicated limiter per configured tool; other tools share the default
/// limiter or pass through if there is none.
#[derive(Debug, Clone, Default)]
pub struct PerToolRateLimit {
    tools: HashMap<String, RateLimitMiddleware>,
    default: Option<RateLimitMiddleware>,
}

impl PerToolRateLimit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &PerToolRateLimitConfig) -> Self {
        let tools = config
            .tools
            .iter()
            .map(|(tool, cfg)| (tool.clone(), RateLimitMiddleware::from_config(cfg)))
            .collect();
        Self {
            tools,
            default: config.default.as_ref().map(RateLimitMiddleware::from_config),
        }
    }

    /// Builder: dedicated limit for `tool`.
    pub fn with_tool(mut self, tool: impl Into<String>, stage: RateLimitMiddleware) -> Self {
        self.tools.insert(tool.into(), stage);
        self
    }

    /// Builder: limit shared by every tool without a dedicated one.
    pub fn with_default(mut self, stage: RateLimitMiddleware) -> Self {
        self.default = Some(stage);
        self
    }

    pub fn is_limited(&self, tool: &str) -> bool {
        self.tools.contains_key(tool) || self.default.is_some()
    }
}

#[async_trait]
impl Middleware for PerToolRateLimit {
    async fn handle(
        &self,
        ctx: &CallContext,
        exec: &mut ExecutionContext,
        next: Next<'_>,
    ) -> GateResult<ToolResult> {
        let stage = self
            .tools
            .get(exec.tool_name())
            .or(self.default.as_ref());
        match stage {
            Some(stage) => stage.handle(ctx, exec, next).await,
            None => next.run(ctx, exec).await,
        }
    }
}

// ---------------------------------------------------------------------------
// AdaptiveRateLimit
// ---------------------------------------------------------------------------

/// Settings for [`AdaptiveRateLimit`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptiveConfig {
    pub initial_rate: f64,
    pub min_rate: f64,
    pub max_rate: f64,
    pub burst: u32,
    /// Multiplier applied to the rate after a failed call (below 1).
    pub throttle_factor: f64,
    /// Multiplier applied to the rate after a successful call (above 1).
    pub recovery_factor: f64,
    pub throttle_on_error: bool,
    pub scope: RateLimitScope,
    pub mode: RateLimitMode,
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            initial_rate: 10.0,
            min_rate: 1.0,
            max_rate: 100.0,
            burst: 10,
            throttle_factor: 0.5,
            recovery_factor: 1.1,
            throttle_on_error: true,
            scope: RateLimitScope::Global,
            mode: RateLimitMode::Reject,
        }
    }
}

/// Rate limit whose refill rate follows downstream health.
///
/// Failures multiply the rate by `throttle_factor` (not below `min_rate`);
/// successes multiply it by `recovery_factor` (not above `max_rate`). The
/// limiter is retuned in place so banked tokens survive each adjustment.
#[derive(Debug)]
pub struct AdaptiveRateLimit {
    limiter: Arc<TokenBucketLimiter>,
    rate: Mutex<f64>,
    config: AdaptiveConfig,
}

impl AdaptiveRateLimit {
    pub fn new(config: AdaptiveConfig) -> Self {
        let ceiling = config.max_rate.max(config.min_rate);
        let initial = config.initial_rate.clamp(config.min_rate, ceiling);
        Self {
            limiter: Arc::new(TokenBucketLimiter::new(initial, config.burst)),
            rate: Mutex::new(initial),
            config,
        }
    }

    /// Current refill rate in tokens per second.
    pub fn current_rate(&self) -> f64 {
        *self.rate.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn limiter(&self) -> &Arc<TokenBucketLimiter> {
        &self.limiter
    }

    fn adjust(&self, failed: bool) {
        let mut rate = self.rate.lock().unwrap_or_else(|e| e.into_inner());
        let previous = *rate;
        *rate = if failed {
            (previous * self.config.throttle_factor).max(self.config.min_rate)
        } else {
            (previous * self.config.recovery_factor).min(self.config.max_rate)
        };
        if (*rate - previous).abs() > f64::EPSILON {
            self.limiter.set_rate(*rate);
            tracing::debug!(
                event = "rate_limit.adjusted",
                from = previous,
                to = *rate,
                failed = failed,
            );
        }
    }
}

#[async_trait]
impl Middleware for AdaptiveRateLimit {
    async fn handle(
        &self,
        ctx: &CallContext,
        exec: &mut ExecutionContext,
        next: Next<'_>,
    ) -> GateResult<ToolResult> {
        let key = self.config.scope.key(exec);
        admit(self.limiter.as_ref(), self.config.mode, ctx, &key).await?;

        let result = next.run(ctx, exec).await;
        match &result {
            Err(_) if self.config.throttle_on_error => self.adjust(true),
            Err(_) => {}
            Ok(_) => self.adjust(false),
        }
        result
    }
}

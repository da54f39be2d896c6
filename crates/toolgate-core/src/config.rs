//! Pipeline configuration.
//!
//! [`PipelineConfig`] aggregates the settings of every stage. Each optional
//! section switches its stage on; omitted sections leave the stage out.
//! Loading the text is the caller's job: the struct deserializes from JSON,
//! TOML or any other serde format.
//!
//! ```toml
//! timeout_ms = 30000
//!
//! [rate_limit]
//! rate = 5.0
//! burst = 10
//! scope = "per_run_tool"
//!
//! [budget.limits]
//! tool_calls = 100
//!
//! [eligibility]
//! explore = ["read_file", "search"]
//! act = ["read_file", "write_file"]
//! ```

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{bail, ensure};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::GateResult;
use crate::policy::{
    AdaptiveConfig, ApprovalConfig, BudgetConfig, CachingConfig, EligibilityTable,
    PerToolRateLimitConfig, RateLimitConfig, SimulationConfig, ValidationConfig,
};

/// Settings for a whole pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Emit lifecycle log events for every call.
    pub logging: bool,
    /// Wrap every call in a `toolgate.call` span.
    pub tracing: bool,
    pub validation: Option<ValidationConfig>,
    pub eligibility: Option<EligibilityTable>,
    pub rate_limit: Option<RateLimitConfig>,
    pub per_tool_rate_limit: Option<PerToolRateLimitConfig>,
    pub adaptive_rate_limit: Option<AdaptiveConfig>,
    pub budget: Option<BudgetConfig>,
    /// On by default so that tools requiring approval fail closed.
    pub approval: Option<ApprovalConfig>,
    /// Canned results answered before any simulation decision.
    pub mocks: BTreeMap<String, Value>,
    pub simulation: Option<SimulationConfig>,
    /// Intercept every non-read-only call.
    pub dry_run: bool,
    pub caching: Option<CachingConfig>,
    pub timeout_ms: Option<u64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            logging: true,
            tracing: false,
            validation: Some(ValidationConfig::default()),
            eligibility: None,
            rate_limit: None,
            per_tool_rate_limit: None,
            adaptive_rate_limit: None,
            budget: None,
            approval: Some(ApprovalConfig::default()),
            mocks: BTreeMap::new(),
            simulation: None,
            dry_run: false,
            caching: None,
            timeout_ms: None,
        }
    }
}

impl PipelineConfig {
    /// Parse a JSON document.
    pub fn from_json(text: &str) -> GateResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// Reject settings that would make a stage misbehave.
    pub fn validate(&self) -> anyhow::Result<()> {
        if let Some(rl) = &self.rate_limit {
            check_bucket("rate_limit", rl)?;
        }
        if let Some(per_tool) = &self.per_tool_rate_limit {
            for (tool, rl) in &per_tool.tools {
                check_bucket(&format!("per_tool_rate_limit.tools.{tool}"), rl)?;
            }
            if let Some(rl) = &per_tool.default {
                check_bucket("per_tool_rate_limit.default", rl)?;
            }
        }
        if let Some(adaptive) = &self.adaptive_rate_limit {
            ensure!(
                adaptive.min_rate > 0.0 && adaptive.min_rate <= adaptive.max_rate,
                "adaptive_rate_limit: need 0 < min_rate <= max_rate, got {} and {}",
                adaptive.min_rate,
                adaptive.max_rate
            );
            ensure!(
                adaptive.throttle_factor > 0.0 && adaptive.throttle_factor <= 1.0,
                "adaptive_rate_limit: throttle_factor must be in (0, 1], got {}",
                adaptive.throttle_factor
            );
            ensure!(
                adaptive.recovery_factor >= 1.0,
                "adaptive_rate_limit: recovery_factor must be >= 1, got {}",
                adaptive.recovery_factor
            );
            ensure!(adaptive.burst > 0, "adaptive_rate_limit: burst must be positive");
        }
        if let Some(budget) = &self.budget {
            ensure!(
                !budget.name.trim().is_empty(),
                "budget: counter name must not be blank"
            );
        }
        if self.timeout_ms == Some(0) {
            bail!("timeout_ms must be positive");
        }
        Ok(())
    }
}

fn check_bucket(section: &str, config: &RateLimitConfig) -> anyhow::Result<()> {
    ensure!(
        config.rate.is_finite() && config.rate > 0.0,
        "{section}: rate must be positive, got {}",
        config.rate
    );
    ensure!(config.burst > 0, "{section}: burst must be positive");
    Ok(())
}

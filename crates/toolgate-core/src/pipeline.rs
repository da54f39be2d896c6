//! Assembles a [`Registry`] from a [`PipelineConfig`] and injected
//! collaborators.
//!
//! Stages are registered in a fixed order:
//!
//! 1. logging / tracing
//! 2. metrics
//! 3. validation
//! 4. eligibility
//! 5. rate limit (global, per-tool, adaptive)
//! 6. budget
//! 7. approval
//! 8. mocks, simulation, dry-run
//! 9. caching
//! 10. timeout

use std::sync::Arc;

use toolgate_state::{Budget, Cache, MemoryCache};

use crate::approver::Approver;
use crate::config::PipelineConfig;
use crate::error::{GateError, GateResult};
use crate::handler::{BoxHandler, ToolHandler};
use crate::limiter::RateLimiter;
use crate::metrics::{GateMetrics, MetricsMiddleware};
use crate::obs::{LoggingMiddleware, TracingMiddleware};
use crate::policy::{
    AdaptiveRateLimit, ApprovalMiddleware, BudgetMiddleware, CachingMiddleware,
    DryRunMiddleware, EligibilityMiddleware, MockMiddleware, PerToolRateLimit,
    RateLimitMiddleware, SimulationMiddleware, TimeoutMiddleware,
    ValidationMiddleware,
};
use crate::recorder::Recorder;
use crate::registry::Registry;

/// Builder for a configured pipeline.
///
/// Collaborators not injected are replaced by in-memory defaults where one
/// exists (budget, cache). Approval has no default: without an approver,
/// tools that require approval are refused.
#[derive(Default)]
pub struct PipelineBuilder {
    config: PipelineConfig,
    budget: Option<Arc<dyn Budget>>,
    cache: Option<Arc<dyn Cache>>,
    approver: Option<Arc<dyn Approver>>,
    recorder: Option<Arc<dyn Recorder>>,
    metrics: Option<Arc<GateMetrics>>,
    rate_limiter: Option<Arc<dyn RateLimiter>>,
}

impl PipelineBuilder {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn budget(mut self, budget: Arc<dyn Budget>) -> Self {
        self.budget = Some(budget);
        self
    }

    pub fn cache(mut self, cache: Arc<dyn Cache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn approver(mut self, approver: Arc<dyn Approver>) -> Self {
        self.approver = Some(approver);
        self
    }

    pub fn recorder(mut self, recorder: Arc<dyn Recorder>) -> Self {
        self.recorder = Some(recorder);
        self
    }

    /// Count calls into `metrics`. Without this no metrics stage is added.
    pub fn metrics(mut self, metrics: Arc<GateMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Use `limiter` for the `rate_limit` section instead of a fresh token
    /// bucket built from its rate and burst.
    pub fn rate_limiter(mut self, limiter: Arc<dyn RateLimiter>) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Validate the configuration and register the stages.
    pub fn build(self) -> GateResult<Registry> {
        self.config.validate().map_err(GateError::Other)?;
        let config = &self.config;
        let registry = Registry::new();

        if config.logging {
            registry.register(LoggingMiddleware);
        }
        if config.tracing {
            registry.register(TracingMiddleware);
        }
        if let Some(metrics) = &self.metrics {
            registry.register(MetricsMiddleware::new(Arc::clone(metrics)));
        }
        if let Some(validation) = config.validation {
            registry.register(ValidationMiddleware::new(validation));
        }
        if let Some(table) = &config.eligibility {
            registry.register(EligibilityMiddleware::new(table.clone()));
        }

        if let Some(rl) = &config.rate_limit {
            let stage = match &self.rate_limiter {
                Some(limiter) => RateLimitMiddleware::new(Arc::clone(limiter), rl.scope, rl.mode),
                None => RateLimitMiddleware::from_config(rl),
            };
            registry.register(stage);
        }
        if let Some(per_tool) = &config.per_tool_rate_limit {
            registry.register(PerToolRateLimit::from_config(per_tool));
        }
        if let Some(adaptive) = &config.adaptive_rate_limit {
            registry.register(AdaptiveRateLimit::new(adaptive.clone()));
        }

        if let Some(budget_config) = &config.budget {
            let budget: Arc<dyn Budget> = match &self.budget {
                Some(budget) => Arc::clone(budget),
                None => Arc::new(budget_config.memory_budget()),
            };
            registry.register(BudgetMiddleware::from_config(budget, budget_config));
        }
        if let Some(approval) = &config.approval {
            registry.register(ApprovalMiddleware::from_config(
                self.approver.clone(),
                approval,
            ));
        }

        if !config.mocks.is_empty() {
            let mut stage = MockMiddleware::from_mocks(&config.mocks);
            if let Some(recorder) = &self.recorder {
                stage = stage.with_recorder(Arc::clone(recorder));
            }
            registry.register(stage);
        }
        if let Some(simulation) = &config.simulation {
            let mut stage = SimulationMiddleware::new(simulation.clone());
            if let Some(recorder) = &self.recorder {
                stage = stage.with_recorder(Arc::clone(recorder));
            }
            registry.register(stage);
        }
        // Always present so the per-call dry-run flag is honoured.
        let simulation = config.simulation.clone().unwrap_or_default();
        let mut dry_run = DryRunMiddleware::from_config(config.dry_run, &simulation);
        if let Some(recorder) = &self.recorder {
            dry_run = dry_run.with_recorder(Arc::clone(recorder));
        }
        registry.register(dry_run);

        if let Some(caching) = &config.caching {
            let cache: Arc<dyn Cache> = match &self.cache {
                Some(cache) => Arc::clone(cache),
                None => Arc::new(MemoryCache::new()),
            };
            registry.register(CachingMiddleware::from_config(cache, caching));
        }
        if let Some(limit) = config.timeout() {
            registry.register(TimeoutMiddleware::new(limit));
        }

        tracing::debug!(event = "pipeline.built", stages = registry.len());
        Ok(registry)
    }

    /// Build the stages around the standard [`ToolHandler`].
    pub fn handler(self) -> GateResult<BoxHandler> {
        let registry = self.build()?;
        Ok(registry.handler(Arc::new(ToolHandler)))
    }
}

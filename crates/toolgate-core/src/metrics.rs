//! Atomic counters for tool-call observability.
//!
//! Counters are incremented silently by [`MetricsMiddleware`]. Call
//! [`GateMetrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. at the end of a run), or
//! [`GateMetrics::snapshot`] to read them programmatically.
//!
//! There is no global instance: share one `Arc<GateMetrics>` between the
//! middleware and whoever reports on it.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::context::{CallContext, ExecutionContext};
use crate::error::{GateError, GateResult};
use crate::handler::{Middleware, Next};
use crate::tool::ToolResult;

/// Lightweight counters; the per-kind error map is the only locked part.
#[derive(Debug, Default)]
pub struct GateMetrics {
    calls: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    denied: AtomicU64,
    cache_hits: AtomicU64,
    errors_by_kind: Mutex<BTreeMap<&'static str, u64>>,
}

/// Point-in-time copy of [`GateMetrics`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub calls: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub denied: u64,
    pub cache_hits: u64,
    pub errors_by_kind: BTreeMap<String, u64>,
}

impl GateMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn inc_calls(&self) {
        self.calls.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "calls", "counter incremented");
    }

    fn record_success(&self, result: &ToolResult) {
        self.succeeded.fetch_add(1, Ordering::Relaxed);
        if result.cached {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
        }
        tracing::trace!(metric = "succeeded", cached = result.cached, "counter incremented");
    }

    fn record_error(&self, err: &GateError) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        if err.is_denial() {
            self.denied.fetch_add(1, Ordering::Relaxed);
        }
        *self
            .errors_by_kind
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(err.kind())
            .or_default() += 1;
        tracing::trace!(metric = "failed", kind = err.kind(), "counter incremented");
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    pub fn succeeded(&self) -> u64 {
        self.succeeded.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn denied(&self) -> u64 {
        self.denied.load(Ordering::Relaxed)
    }

    pub fn cache_hits(&self) -> u64 {
        self.cache_hits.load(Ordering::Relaxed)
    }

    /// Failures recorded for one [`GateError::kind`] label.
    pub fn errors_of_kind(&self, kind: &str) -> u64 {
        self.errors_by_kind
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(kind)
            .copied()
            .unwrap_or(0)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            calls: self.calls(),
            succeeded: self.succeeded(),
            failed: self.failed(),
            denied: self.denied(),
            cache_hits: self.cache_hits(),
            errors_by_kind: self
                .errors_by_kind
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .iter()
                .map(|(kind, n)| ((*kind).to_string(), *n))
                .collect(),
        }
    }

    /// Emit all current counter values as a single `info!` event.
    ///
    /// Call this at natural boundaries (end of a run, shutdown) rather than
    /// on every call.
    pub fn flush(&self) {
        let snapshot = self.snapshot();
        tracing::info!(
            metric = "flush",
            calls = snapshot.calls,
            succeeded = snapshot.succeeded,
            failed = snapshot.failed,
            denied = snapshot.denied,
            cache_hits = snapshot.cache_hits,
            errors_by_kind = ?snapshot.errors_by_kind,
        );
    }

    /// Reset all counters to zero.
    pub fn reset(&self) {
        self.calls.store(0, Ordering::Relaxed);
        self.succeeded.store(0, Ordering::Relaxed);
        self.failed.store(0, Ordering::Relaxed);
        self.denied.store(0, Ordering::Relaxed);
        self.cache_hits.store(0, Ordering::Relaxed);
        self.errors_by_kind
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}

/// Counts every call and its outcome into a shared [`GateMetrics`].
#[derive(Debug, Clone)]
pub struct MetricsMiddleware {
    metrics: Arc<GateMetrics>,
}

impl MetricsMiddleware {
    pub fn new(metrics: Arc<GateMetrics>) -> Self {
        Self { metrics }
    }

    pub fn metrics(&self) -> &Arc<GateMetrics> {
        &self.metrics
    }
}

#[async_trait]
impl Middleware for MetricsMiddleware {
    async fn handle(
        &self,
        ctx: &CallContext,
        exec: &mut ExecutionContext,
        next: Next<'_>,
    ) -> GateResult<ToolResult> {
        self.metrics.inc_calls();
        let result = next.run(ctx, exec).await;
        match &result {
            Ok(out) => self.metrics.record_success(out),
            Err(err) => self.metrics.record_error(err),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RunState;

    #[test]
    fn counters_track_outcomes() {
        let m = GateMetrics::new();
        m.inc_calls();
        m.inc_calls();
        m.inc_calls();
        m.record_success(&ToolResult::new("{}"));
        m.record_success(&ToolResult {
            cached: true,
            ..ToolResult::default()
        });
        m.record_error(&GateError::ToolNotAllowed {
            tool: "rm".into(),
            state: RunState::Explore,
        });

        assert_eq!(m.calls(), 3);
        assert_eq!(m.succeeded(), 2);
        assert_eq!(m.cache_hits(), 1);
        assert_eq!(m.failed(), 1);
        assert_eq!(m.denied(), 1);
        assert_eq!(m.errors_of_kind("tool_not_allowed"), 1);
    }

    #[test]
    fn tool_failures_are_not_denials() {
        let m = GateMetrics::new();
        m.record_error(&GateError::Tool {
            tool: "fetch".into(),
            message: "connection reset".into(),
        });
        assert_eq!(m.failed(), 1);
        assert_eq!(m.denied(), 0);
    }

    #[test]
    fn reset_zeroes_all() {
        let m = GateMetrics::new();
        m.inc_calls();
        m.record_error(&GateError::Timeout {
            tool: "slow".into(),
            limit_ms: 5,
        });
        m.reset();
        assert_eq!(m.snapshot(), MetricsSnapshot::default());
    }
}

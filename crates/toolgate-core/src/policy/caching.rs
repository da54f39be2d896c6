//! Content-addressed result caching for cacheable tools.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use toolgate_state::Cache;

use crate::context::{CallContext, ExecutionContext};
use crate::error::GateResult;
use crate::handler::{Middleware, Next};
use crate::tool::ToolResult;

/// Cache key for a call: SHA-256 of `tool ":" input`, hex-encoded.
pub fn cache_key(tool: &str, input: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(tool.as_bytes());
    hasher.update(b":");
    hasher.update(input);
    hex::encode(hasher.finalize())
}

/// Caching stage settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CachingConfig {
    /// Entry lifetime; `None` keeps entries until evicted by the store.
    pub ttl_secs: Option<u64>,
}

impl CachingConfig {
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl_secs.map(Duration::from_secs)
    }
}

/// Serves repeat calls to cacheable tools from a [`Cache`].
///
/// Only tools whose annotations are cacheable participate. Failed calls and
/// results carrying an embedded error are never stored. Store failures are
/// logged and treated as a miss, so a broken cache never fails a call.
#[derive(Clone)]
pub struct CachingMiddleware {
    cache: Arc<dyn Cache>,
    ttl: Option<Duration>,
}

impl CachingMiddleware {
    pub fn new(cache: Arc<dyn Cache>, ttl: Option<Duration>) -> Self {
        Self { cache, ttl }
    }

    pub fn from_config(cache: Arc<dyn Cache>, config: &CachingConfig) -> Self {
        Self::new(cache, config.ttl())
    }

    /// Drop the cached result for one `(tool, input)` pair.
    pub async fn invalidate(&self, tool: &str, input: &[u8]) -> GateResult<()> {
        self.cache.delete(&cache_key(tool, input)).await?;
        Ok(())
    }

    async fn lookup(&self, key: &str) -> Option<ToolResult> {
        let bytes = match self.cache.get(key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(err) => {
                tracing::warn!(event = "cache.read_failed", key = %key, error = %err);
                return None;
            }
        };
        match serde_json::from_slice::<ToolResult>(&bytes) {
            Ok(result) => Some(result),
            Err(err) => {
                tracing::warn!(event = "cache.corrupt_entry", key = %key, error = %err);
                if let Err(err) = self.cache.delete(key).await {
                    tracing::warn!(event = "cache.delete_failed", key = %key, error = %err);
                }
                None
            }
        }
    }

    async fn store(&self, key: &str, result: &ToolResult) {
        let bytes = match serde_json::to_vec(result) {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::warn!(event = "cache.encode_failed", key = %key, error = %err);
                return;
            }
        };
        if let Err(err) = self.cache.set(key, bytes, self.ttl).await {
            tracing::warn!(event = "cache.write_failed", key = %key, error = %err);
        }
    }
}

impl std::fmt::Debug for CachingMiddleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachingMiddleware")
            .field("ttl", &self.ttl)
            .finish()
    }
}

#[async_trait]
impl Middleware for CachingMiddleware {
    async fn handle(
        &self,
        ctx: &CallContext,
        exec: &mut ExecutionContext,
        next: Next<'_>,
    ) -> GateResult<ToolResult> {
        if !exec.tool().annotations().is_cacheable() {
            return next.run(ctx, exec).await;
        }

        let key = cache_key(exec.tool_name(), &exec.input);
        if let Some(mut hit) = self.lookup(&key).await {
            tracing::debug!(event = "cache.hit", tool = %exec.tool_name(), key = %key);
            hit.cached = true;
            return Ok(hit);
        }

        let result = next.run(ctx, exec).await?;
        if !result.is_error() {
            let mut stored = result.clone();
            stored.cached = false;
            self.store(&key, &stored).await;
        }
        Ok(result)
    }
}

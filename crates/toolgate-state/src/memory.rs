//! In-memory implementations of the collaborator traits
//!
//! Provides `MemoryCache` and `MemoryBudget`, which satisfy the trait
//! contracts without any external dependencies. Suitable for tests and for
//! single-process deployments where nothing needs to survive a restart.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::trace;

use crate::error::StorageError;
use crate::storage_traits::*;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

// ---------------------------------------------------------------------------
// MemoryCache
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct CacheEntry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }
}

/// In-memory cache backed by a `HashMap<key, entry>`.
///
/// Expired entries are dropped lazily on access. Expiry uses the tokio clock,
/// so paused-time tests can step past a TTL with `tokio::time::advance`.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        lock(&self.entries)
            .values()
            .filter(|e| e.is_live(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every expired entry, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = lock(&self.entries);
        let before = entries.len();
        entries.retain(|_, e| e.is_live(now));
        let purged = before - entries.len();
        if purged > 0 {
            trace!(purged, "purged expired cache entries");
        }
        purged
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        let now = Instant::now();
        let mut entries = lock(&self.entries);
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> StorageResult<()> {
        // A TTL past the clock's range never expires.
        let expires_at = ttl.and_then(|ttl| Instant::now().checked_add(ttl));
        lock(&self.entries).insert(key.to_string(), CacheEntry { value, expires_at });
        Ok(())
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        lock(&self.entries).remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let now = Instant::now();
        Ok(lock(&self.entries)
            .get(key)
            .is_some_and(|entry| entry.is_live(now)))
    }

    async fn clear(&self) -> StorageResult<()> {
        lock(&self.entries).clear();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryBudget
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
struct Counter {
    limit: u64,
    used: u64,
}

impl Counter {
    fn remaining(&self) -> u64 {
        self.limit.saturating_sub(self.used)
    }
}

/// In-memory budget with mutex-guarded counters.
///
/// Counters without a configured limit are unlimited: they always accept
/// consumption and report `u64::MAX` remaining.
#[derive(Debug, Default)]
pub struct MemoryBudget {
    counters: Mutex<HashMap<String, Counter>>,
}

impl MemoryBudget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: add a counter with the given limit.
    pub fn with_limit(self, name: impl Into<String>, limit: u64) -> Self {
        lock(&self.counters).insert(name.into(), Counter { limit, used: 0 });
        self
    }

    /// Set (or reset) a counter's limit. Usage already recorded is kept.
    pub fn set_limit(&self, name: &str, limit: u64) -> StorageResult<()> {
        if name.trim().is_empty() {
            return Err(StorageError::InvalidCounter {
                name: name.to_string(),
            });
        }
        let mut counters = lock(&self.counters);
        let counter = counters
            .entry(name.to_string())
            .or_insert(Counter { limit, used: 0 });
        counter.limit = limit;
        Ok(())
    }

    /// Usage snapshot for one counter, if it is limited.
    pub fn usage(&self, name: &str) -> Option<BudgetUsage> {
        lock(&self.counters).get(name).map(|c| BudgetUsage {
            name: name.to_string(),
            limit: c.limit,
            used: c.used,
        })
    }

    /// Usage snapshot for every limited counter, sorted by name.
    pub fn usages(&self) -> Vec<BudgetUsage> {
        let mut out: Vec<BudgetUsage> = lock(&self.counters)
            .iter()
            .map(|(name, c)| BudgetUsage {
                name: name.clone(),
                limit: c.limit,
                used: c.used,
            })
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }
}

impl BudgetView for MemoryBudget {
    fn can_consume(&self, name: &str, amount: u64) -> bool {
        lock(&self.counters)
            .get(name)
            .map_or(true, |c| c.remaining() >= amount)
    }

    fn remaining(&self, name: &str) -> u64 {
        lock(&self.counters)
            .get(name)
            .map_or(u64::MAX, Counter::remaining)
    }
}

impl Budget for MemoryBudget {
    fn try_consume(&self, name: &str, amount: u64) -> bool {
        let mut counters = lock(&self.counters);
        match counters.get_mut(name) {
            None => true,
            Some(c) if c.remaining() >= amount => {
                c.used += amount;
                true
            }
            Some(_) => false,
        }
    }

    fn consume(&self, name: &str, amount: u64) {
        if let Some(c) = lock(&self.counters).get_mut(name) {
            c.used = c.used.saturating_add(amount).min(c.limit);
        }
    }

    fn refund(&self, name: &str, amount: u64) {
        if let Some(c) = lock(&self.counters).get_mut(name) {
            c.used = c.used.saturating_sub(amount);
        }
    }
}

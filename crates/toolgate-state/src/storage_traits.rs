//! Collaborator trait definitions for Toolgate
//!
//! These traits define the storage abstractions the admission pipeline consumes:
//! - `Cache`: byte-valued key/value store with optional TTL
//! - `BudgetView`: read-only view over named resource counters
//! - `Budget`: owning budget that can also consume and refund
//!
//! `Cache` is async and backend-agnostic so it can front a networked store.
//! Budgets are synchronous: every operation must complete inside one critical
//! section so that concurrent callers can never overdraw a counter.
//! In-memory implementations live in the `memory` module.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

/// Key/value result cache.
///
/// Guarantees:
/// - `get` returns `Ok(None)` for absent or expired keys.
/// - `set` with a TTL makes the entry invisible once the TTL has elapsed.
/// - `delete` and `clear` are no-ops on absent keys.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Fetch the value stored under `key`, if present and unexpired.
    async fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Store `value` under `key`. `None` TTL means the entry never expires.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> StorageResult<()>;

    /// Remove a single entry.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Check whether a live entry exists without reading it.
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Remove every entry.
    async fn clear(&self) -> StorageResult<()>;
}

// ---------------------------------------------------------------------------
// Budget
// ---------------------------------------------------------------------------

/// Read-only view over named budget counters.
pub trait BudgetView: Send + Sync {
    /// Whether `amount` units of `name` are currently available.
    fn can_consume(&self, name: &str, amount: u64) -> bool;

    /// Units of `name` left. Unlimited counters report `u64::MAX`.
    fn remaining(&self, name: &str) -> u64;
}

/// Owning budget: a view that can also be charged.
///
/// Guarantees:
/// - A counter never goes below zero.
/// - `try_consume` is atomic with respect to every other call on the same
///   budget, so concurrent callers can never jointly exceed a limit.
pub trait Budget: BudgetView {
    /// Atomically check and charge `amount` units. Returns `false` (and
    /// charges nothing) if fewer than `amount` units remain.
    fn try_consume(&self, name: &str, amount: u64) -> bool;

    /// Charge `amount` units, saturating at zero.
    fn consume(&self, name: &str, amount: u64);

    /// Return previously charged units, never exceeding the configured limit.
    fn refund(&self, name: &str, amount: u64);
}

/// Point-in-time usage of one budget counter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetUsage {
    pub name: String,
    pub limit: u64,
    pub used: u64,
}

impl BudgetUsage {
    /// Units still available.
    pub fn remaining(&self) -> u64 {
        self.limit.saturating_sub(self.used)
    }
}

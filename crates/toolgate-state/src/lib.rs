//! Toolgate-State: collaborator storage for the Toolgate pipeline
//!
//! This crate defines the storage-facing collaborator interfaces that the
//! admission-control core consumes, together with in-memory backends.
//!
//! ## Layer 0 - Data/Persistence
//!
//! Focus: concurrency-safe counters and key/value storage. Networked or
//! embedded backends implement the same traits outside this workspace.
//!
//! ## Key Components
//!
//! - `Cache`: async key/value store with TTL (result caching)
//! - `Budget` / `BudgetView`: named resource counters
//! - `MemoryCache` / `MemoryBudget`: in-process implementations

mod error;
pub mod memory;
pub mod storage_traits;

pub use error::StorageError;
pub use memory::{MemoryBudget, MemoryCache};
pub use storage_traits::{Budget, BudgetUsage, BudgetView, Cache, StorageResult};

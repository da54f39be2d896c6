//! Mutable, shareable list of middleware stages.
//!
//! The orchestrator registers stages at startup (or while running) and takes
//! an immutable [`Chain`] snapshot whenever it builds a handler. Snapshots are
//! unaffected by later registrations.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::handler::{BoxHandler, BoxMiddleware, Chain, Middleware};

/// Ordered stage registry, safe to mutate from several threads.
#[derive(Default)]
pub struct Registry {
    stages: RwLock<Vec<BoxMiddleware>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<BoxMiddleware>> {
        self.stages.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<BoxMiddleware>> {
        self.stages.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Append a stage; it runs after every stage registered before it.
    pub fn register(&self, stage: impl Middleware + 'static) {
        self.write().push(Arc::new(stage));
    }

    /// Append an already-shared stage.
    pub fn register_arc(&self, stage: BoxMiddleware) {
        self.write().push(stage);
    }

    /// Append several stages in order.
    pub fn register_all(&self, stages: impl IntoIterator<Item = BoxMiddleware>) {
        self.write().extend(stages);
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn clear(&self) {
        self.write().clear();
    }

    /// Snapshot of the current stages as a chain. Identity when empty.
    pub fn chain(&self) -> Chain {
        Chain::new(self.read().iter().cloned())
    }

    /// Snapshot the current stages around `endpoint`.
    pub fn handler(&self, endpoint: BoxHandler) -> BoxHandler {
        self.chain().wrap(endpoint)
    }
}

impl Clone for Registry {
    /// Independent copy: registering on either side does not affect the other.
    fn clone(&self) -> Self {
        Self {
            stages: RwLock::new(self.read().clone()),
        }
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("stages", &self.len())
            .finish()
    }
}

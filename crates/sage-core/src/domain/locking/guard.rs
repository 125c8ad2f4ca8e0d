//! Lock guards for RAII-style lock management

use std::fmt;

use tokio::sync::OwnedMutexGuard;
use tracing::debug;

use super::types::LockScope;

/// Holds a keyed lock until dropped
pub struct LockGuard {
    scope: LockScope,
    _guard: OwnedMutexGuard<()>,
}

impl LockGuard {
    pub(crate) fn new(scope: LockScope, guard: OwnedMutexGuard<()>) -> Self {
        Self {
            scope,
            _guard: guard,
        }
    }

    /// The scope this guard holds
    pub fn scope(&self) -> &LockScope {
        &self.scope
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        debug!(lock_key = %self.scope, "Lock released");
    }
}

impl fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockGuard")
            .field("scope", &self.scope)
            .finish()
    }
}

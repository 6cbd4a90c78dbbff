//! Per-tree mutation gate
//!
//! Trees are independent aggregates, so there is no global lock: each tree
//! id gets its own async mutex, created on first use.

use dashmap::DashMap;
use ptree_model::TreeId;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

/// One in-flight mutation per tree id
#[derive(Debug, Default)]
pub struct MutationGate {
    locks: DashMap<TreeId, Arc<Mutex<()>>>,
}

impl MutationGate {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `id`
    ///
    /// The guard releases on drop. Different ids never contend.
    pub async fn lock(&self, id: &TreeId) -> OwnedMutexGuard<()> {
        // Clone the Arc out before awaiting so no shard lock is held across the await.
        let lock = Arc::clone(self.locks.entry(id.clone()).or_default().value());
        if lock.try_lock().is_err() {
            debug!(tree_id = %id, "waiting for in-flight mutation");
        }
        lock.lock_owned().await
    }

    /// Drop the entry for a tree that no longer exists
    pub fn forget(&self, id: &TreeId) {
        self.locks.remove(id);
    }

    /// Number of tree ids with a lock entry
    #[must_use]
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

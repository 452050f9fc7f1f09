//! Per-user async locks
//!
//! Credential checks, password changes and stamp validation for one user are
//! serialized; different users never contend.

use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use warden_types::UserId;

/// Idle time after which an unused lock is dropped
pub const DEFAULT_LOCK_IDLE: Duration = Duration::from_secs(600);

/// Registry of per-user mutexes
#[derive(Clone)]
pub struct UserLocks {
    locks: Cache<UserId, Arc<Mutex<()>>>,
}

impl UserLocks {
    pub fn new() -> Self {
        Self::with_idle_timeout(DEFAULT_LOCK_IDLE)
    }

    /// Locks unused for `idle` are evicted. A guard keeps its mutex alive, so
    /// `idle` must exceed the longest critical section.
    pub fn with_idle_timeout(idle: Duration) -> Self {
        Self {
            locks: Cache::builder().time_to_idle(idle).build(),
        }
    }

    /// Wait for exclusive access to `user_id`'s critical section
    pub async fn lock(&self, user_id: UserId) -> OwnedMutexGuard<()> {
        let mutex = self
            .locks
            .get_with(user_id, async { Arc::new(Mutex::new(())) })
            .await;
        mutex.lock_owned().await
    }

    /// Number of live lock entries (approximate, for diagnostics)
    pub fn len(&self) -> u64 {
        self.locks.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for UserLocks {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for UserLocks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserLocks")
            .field("entries", &self.locks.entry_count())
            .finish()
    }
}

//! Per-repository write locks
//!
//! Mutating operations against one repository directory (save, pull, checkout,
//! reset, delete, file writes, clone) take that directory's lock so they never
//! interleave. Different repositories never contend. Lock entries are
//! reference-counted and pruned once no guard or waiter holds them.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

#[derive(Clone, Default)]
pub struct RepoLocks {
    inner: Arc<Mutex<HashMap<PathBuf, Weak<AsyncMutex<()>>>>>,
}

/// Held for the duration of a mutating operation
#[must_use]
pub struct RepoGuard {
    _guard: OwnedMutexGuard<()>,
}

impl RepoLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `path`.
    pub async fn lock(&self, path: &Path) -> RepoGuard {
        let mutex = {
            let mut map = self.inner.lock();
            map.retain(|_, weak| weak.strong_count() > 0);
            match map.get(path).and_then(Weak::upgrade) {
                Some(existing) => existing,
                None => {
                    let fresh = Arc::new(AsyncMutex::new(()));
                    map.insert(path.to_path_buf(), Arc::downgrade(&fresh));
                    fresh
                }
            }
        };
        RepoGuard {
            _guard: mutex.lock_owned().await,
        }
    }

    /// Number of repositories with a live lock (held or awaited)
    #[cfg(test)]
    fn active(&self) -> usize {
        self.inner
            .lock()
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }
}

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio_util::task::TaskTracker;

use crate::config::Config;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub repo_locks: RepoLocks,
    /// Background pipeline runs, drained on shutdown.
    pub runs: TaskTracker,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
            repo_locks: RepoLocks::default(),
            runs: TaskTracker::new(),
        }
    }
}

/// One async mutex per repository name.
///
/// Runs for the same repository mutate the same working copy and deployment
/// target, so they queue on this lock; different repositories never contend.
#[derive(Clone, Default)]
pub struct RepoLocks {
    inner: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl RepoLocks {
    /// Wait until no other run holds `repo_name`, then hold it until the guard drops.
    pub async fn acquire(&self, repo_name: &str) -> OwnedMutexGuard<()> {
        // Clone the Arc out so the shard lock is released before awaiting.
        let lock = self
            .inner
            .entry(repo_name.to_owned())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }

    /// Whether a run for `repo_name` currently holds the lock.
    pub fn is_busy(&self, repo_name: &str) -> bool {
        self.inner
            .get(repo_name)
            .is_some_and(|lock| lock.try_lock().is_err())
    }
}

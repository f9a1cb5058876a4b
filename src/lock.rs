//! Short-lived, advisory leases keyed by leaderboard id.
//!
//! Acquisition is a single set-if-absent attempt, never a blocking wait. The ttl is the only
//! backstop against a holder that died without releasing.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::deadline::bounded;
use crate::error::{Dependency, RankResult};

#[async_trait]
pub trait LockManager: Send + Sync {
    /// Single attempt. `false` means somebody else holds the lease.
    async fn acquire(&self, key: &str, ttl: Duration) -> RankResult<bool>;

    /// Releasing a lease that is not held is a no-op.
    async fn release(&self, key: &str) -> RankResult<()>;

    async fn health_check(&self) -> RankResult<()>;
}

#[derive(Debug, Default)]
pub struct MemoryLockManager {
    leases: Mutex<HashMap<String, Instant>>,
}

impl MemoryLockManager {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LockManager for MemoryLockManager {
    async fn acquire(&self, key: &str, ttl: Duration) -> RankResult<bool> {
        let mut leases = self.leases.lock();
        let now = Instant::now();
        match leases.get(key) {
            Some(expires_at) if *expires_at > now => Ok(false),
            _ => {
                leases.insert(key.to_string(), now + ttl);
                Ok(true)
            }
        }
    }

    async fn release(&self, key: &str) -> RankResult<()> {
        self.leases.lock().remove(key);
        Ok(())
    }

    async fn health_check(&self) -> RankResult<()> {
        let _leases = self.leases.lock();
        Ok(())
    }
}

/// A held lease. Call `release` on every exit path; if the lease is dropped without it (panic,
/// cancelled future) the release is spawned on the current runtime.
pub struct LockLease {
    locks: Arc<dyn LockManager>,
    key: String,
    timeout: Duration,
    released: bool,
}

impl LockLease {
    /// `None` when the lease is held elsewhere.
    pub async fn try_acquire(
        locks: Arc<dyn LockManager>,
        key: &str,
        ttl: Duration,
        timeout: Duration,
    ) -> RankResult<Option<LockLease>> {
        let granted = bounded(Dependency::LockManager, timeout, locks.acquire(key, ttl)).await?;
        debug!(key, granted, "Lease acquisition attempted");
        Ok(granted.then(|| LockLease {
            locks,
            key: key.to_string(),
            timeout,
            released: false,
        }))
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Cancelling this future leaves the release to `Drop`.
    pub async fn release(mut self) {
        let result = bounded(
            Dependency::LockManager,
            self.timeout,
            self.locks.release(&self.key),
        )
        .await;
        self.released = true;
        if let Err(e) = result {
            // the ttl will reclaim it
            warn!(key = %self.key, error = %e, "Could not release lease");
        }
    }
}

impl Drop for LockLease {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let locks = self.locks.clone();
        let key = std::mem::take(&mut self.key);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = locks.release(&key).await {
                        warn!(key = %key, error = %e, "Could not release dropped lease");
                    }
                });
            }
            Err(_) => warn!(key = %key, "Lease dropped outside a runtime, left to expire"),
        }
    }
}

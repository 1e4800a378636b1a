use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::StoreError;

/// How often a blocked `acquire` re-checks the lock table.
const ACQUIRE_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Proof of lock ownership. Carries a fencing id so a holder whose TTL
/// expired cannot release a lock that has since been re-acquired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockToken {
    pub key: String,
    pub fencing: Uuid,
}

/// Mutual exclusion keyed by string, with a TTL that guarantees release on
/// holder failure.
#[async_trait]
pub trait DistributedLock: Send + Sync + 'static {
    /// Acquire `key` for at most `ttl`, waiting up to `timeout` for the
    /// current holder. `None` means the timeout elapsed; no lock is held.
    async fn acquire(
        &self,
        key: &str,
        ttl: Duration,
        timeout: Duration,
    ) -> Result<Option<LockToken>, StoreError>;

    /// Release the lock. Idempotent: releasing an expired or superseded
    /// token is a no-op.
    async fn release(&self, token: &LockToken) -> Result<(), StoreError>;
}

// ── In-memory implementation ──────────────────────────────────────────────────

#[derive(Debug)]
struct Held {
    fencing: Uuid,
    expires_at: Instant,
}

/// In-process [`DistributedLock`]. Single-node only; production deployments
/// inject a backend over a real coordination service.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLockService {
    inner: Arc<Mutex<HashMap<String, Held>>>,
}

impl InMemoryLockService {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DistributedLock for InMemoryLockService {
    async fn acquire(
        &self,
        key: &str,
        ttl: Duration,
        timeout: Duration,
    ) -> Result<Option<LockToken>, StoreError> {
        let deadline = Instant::now() + timeout;
        loop {
            {
                let mut table = self.inner.lock().await;
                let now = Instant::now();
                let held = table.get(key).map_or(false, |h| h.expires_at > now);
                if !held {
                    let fencing = Uuid::new_v4();
                    table.insert(
                        key.to_string(),
                        Held { fencing, expires_at: now + ttl },
                    );
                    return Ok(Some(LockToken { key: key.to_string(), fencing }));
                }
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(ACQUIRE_POLL_INTERVAL).await;
        }
    }

    async fn release(&self, token: &LockToken) -> Result<(), StoreError> {
        let mut table = self.inner.lock().await;
        if let Some(held) = table.get(&token.key) {
            if held.fencing == token.fencing {
                table.remove(&token.key);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquire_and_release() {
        let lock = InMemoryLockService::new();
        let token = lock
            .acquire("k", Duration::from_secs(5), Duration::from_millis(50))
            .await
            .unwrap()
            .expect("uncontended acquire must succeed");

        // Second acquire times out while held
        let second = lock
            .acquire("k", Duration::from_secs(5), Duration::from_millis(50))
            .await
            .unwrap();
        assert!(second.is_none());

        lock.release(&token).await.unwrap();
        let third = lock
            .acquire("k", Duration::from_secs(5), Duration::from_millis(50))
            .await
            .unwrap();
        assert!(third.is_some());
    }

    #[tokio::test]
    async fn ttl_expiry_frees_the_lock() {
        let lock = InMemoryLockService::new();
        let _token = lock
            .acquire("k", Duration::from_millis(20), Duration::from_millis(10))
            .await
            .unwrap()
            .unwrap();

        // TTL elapses without a release; the next acquire succeeds
        let second = lock
            .acquire("k", Duration::from_millis(100), Duration::from_millis(200))
            .await
            .unwrap();
        assert!(second.is_some(), "expired lock must be re-acquirable");
    }

    #[tokio::test]
    async fn stale_release_does_not_unlock_new_holder() {
        let lock = InMemoryLockService::new();
        let stale = lock
            .acquire("k", Duration::from_millis(10), Duration::from_millis(10))
            .await
            .unwrap()
            .unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        let fresh = lock
            .acquire("k", Duration::from_secs(5), Duration::from_millis(50))
            .await
            .unwrap()
            .unwrap();

        // The expired holder releases late; the fresh holder must keep the lock
        lock.release(&stale).await.unwrap();
        let contender = lock
            .acquire("k", Duration::from_secs(5), Duration::from_millis(30))
            .await
            .unwrap();
        assert!(contender.is_none(), "stale release must not free the lock");

        lock.release(&fresh).await.unwrap();
    }

    #[tokio::test]
    async fn distinct_keys_do_not_contend() {
        let lock = InMemoryLockService::new();
        let a = lock
            .acquire("a", Duration::from_secs(5), Duration::from_millis(10))
            .await
            .unwrap();
        let b = lock
            .acquire("b", Duration::from_secs(5), Duration::from_millis(10))
            .await
            .unwrap();
        assert!(a.is_some() && b.is_some());
    }
}

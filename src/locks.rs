use alloy_primitives::Address;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

type LockMap = DashMap<Address, Arc<Mutex<()>>>;

/// One async mutex per token address.
///
/// Holding the guard serialises the read-modify-write of that token's
/// balance map and token record; other tokens are not blocked. A token's
/// entry is dropped once its last guard is released with nobody waiting.
#[derive(Clone, Default)]
pub struct TokenLocks {
    inner: Arc<LockMap>,
}

impl TokenLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, token: Address) -> TokenGuard {
        let mutex = Arc::clone(self.inner.entry(token).or_default().value());
        let guard = mutex.lock_owned().await;
        TokenGuard {
            guard: Some(guard),
            token,
            locks: Arc::clone(&self.inner),
        }
    }

    /// Number of tokens currently locked or waited on.
    pub fn tracked(&self) -> usize {
        self.inner.len()
    }
}

pub struct TokenGuard {
    guard: Option<OwnedMutexGuard<()>>,
    token: Address,
    locks: Arc<LockMap>,
}

impl Drop for TokenGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Entry lookups clone the Arc under the same shard lock, so a count of
        // one here means no holder and no waiter.
        self.locks
            .remove_if(&self.token, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

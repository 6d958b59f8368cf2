//! Named exclusive locks shared by every worker of a site.
//!
//! Library exports hold `jellyfin_export:{site}:{library}` and deletions hold
//! `jellyfin_export:delete:{site}`, so two jobs never rewrite the same part of
//! the export view at once.

pub mod local;
#[cfg(feature = "database")]
pub mod redis;

use async_trait::async_trait;
use std::{future::Future, time::Duration};
use tracing::{debug, warn};

use crate::error::{ExportError, Result};

pub use local::InProcessLocks;
#[cfg(feature = "database")]
pub use self::redis::RedisLocks;

/// Lease on the library lock.
pub const LIBRARY_LOCK_TTL: Duration = Duration::from_secs(900);
/// Lease on the site-wide delete lock.
pub const DELETE_LOCK_TTL: Duration = Duration::from_secs(300);

const POLL_INTERVAL: Duration = Duration::from_millis(250);

pub fn library_lock_key(site: &str, library: &str) -> String {
    format!("jellyfin_export:{site}:{library}")
}

pub fn delete_lock_key(site: &str) -> String {
    format!("jellyfin_export:delete:{site}")
}

/// Proof of ownership handed out by [`LockProvider::try_acquire`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LockToken {
    pub key: String,
    pub token: String,
}

impl LockToken {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            token: uuid::Uuid::new_v4().to_string(),
        }
    }
}

#[async_trait]
pub trait LockProvider: Send + Sync {
    /// Take `key` for at most `ttl` unless someone else holds it.
    async fn try_acquire(
        &self,
        key: &str,
        ttl: Duration,
    ) -> Result<Option<LockToken>>;

    /// Release a lock; a token whose lease already expired is a no-op.
    async fn release(&self, token: &LockToken) -> Result<()>;
}

/// Poll until `key` is free, giving up after `wait`.
pub async fn acquire(
    provider: &dyn LockProvider,
    key: &str,
    ttl: Duration,
    wait: Duration,
) -> Result<LockToken> {
    let deadline = tokio::time::Instant::now() + wait;
    loop {
        if let Some(token) = provider.try_acquire(key, ttl).await? {
            debug!(target: "export::lock", key, "lock acquired");
            return Ok(token);
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(ExportError::LockUnavailable(format!(
                "{key} still held after {}s",
                wait.as_secs()
            )));
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Run `work` while holding `key`. The lock is released whatever the
/// outcome of `work`; the lease covers a crash in between.
pub async fn with_lock<T, F>(
    provider: &dyn LockProvider,
    key: &str,
    ttl: Duration,
    work: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let token = acquire(provider, key, ttl, ttl).await?;
    let outcome = work.await;
    if let Err(err) = provider.release(&token).await {
        warn!(target: "export::lock", key, error = %err, "lock release failed");
    }
    outcome
}

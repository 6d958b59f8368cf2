use async_trait::async_trait;
use redis::{Script, aio::ConnectionManager};
use std::{fmt, time::Duration};
use tracing::info;

use super::{LockProvider, LockToken};
use crate::error::{ExportError, Result};

/// Deletes the key only while it still carries our token.
const RELEASE_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
end
return 0
"#;

/// Locks shared by every worker talking to the same Redis.
#[derive(Clone)]
pub struct RedisLocks {
    conn: ConnectionManager,
    release: Script,
}

impl fmt::Debug for RedisLocks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisLocks")
            .field("connection", &"ConnectionManager")
            .finish()
    }
}

impl RedisLocks {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url).map_err(|e| {
            ExportError::LockUnavailable(format!(
                "Failed to create Redis client: {e}"
            ))
        })?;
        let conn = ConnectionManager::new(client).await.map_err(|e| {
            ExportError::LockUnavailable(format!("Failed to connect to Redis: {e}"))
        })?;

        info!("Connected to Redis for export locks");
        Ok(Self::new(conn))
    }

    pub fn new(conn: ConnectionManager) -> Self {
        Self {
            conn,
            release: Script::new(RELEASE_SCRIPT),
        }
    }
}

#[async_trait]
impl LockProvider for RedisLocks {
    async fn try_acquire(
        &self,
        key: &str,
        ttl: Duration,
    ) -> Result<Option<LockToken>> {
        let token = LockToken::new(key);
        let mut conn = self.conn.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(&token.token)
            .arg("NX")
            .arg("PX")
            .arg(ttl.as_millis() as u64)
            .query_async(&mut conn)
            .await?;

        Ok(reply.map(|_| token))
    }

    async fn release(&self, token: &LockToken) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: i64 = self
            .release
            .key(&token.key)
            .arg(&token.token)
            .invoke_async(&mut conn)
            .await?;
        Ok(())
    }
}

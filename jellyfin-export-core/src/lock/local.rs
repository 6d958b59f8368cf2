use async_trait::async_trait;
use std::{collections::HashMap, time::Duration};
use tokio::{sync::Mutex, time::Instant};

use super::{LockProvider, LockToken};
use crate::error::Result;

/// Lock table for single-process deployments and tests.
#[derive(Debug, Default)]
pub struct InProcessLocks {
    held: Mutex<HashMap<String, (String, Instant)>>,
}

impl InProcessLocks {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LockProvider for InProcessLocks {
    async fn try_acquire(
        &self,
        key: &str,
        ttl: Duration,
    ) -> Result<Option<LockToken>> {
        let mut held = self.held.lock().await;
        let now = Instant::now();
        if let Some((_, expires)) = held.get(key)
            && *expires > now
        {
            return Ok(None);
        }

        let token = LockToken::new(key);
        held.insert(key.to_string(), (token.token.clone(), now + ttl));
        Ok(Some(token))
    }

    async fn release(&self, token: &LockToken) -> Result<()> {
        let mut held = self.held.lock().await;
        if held
            .get(&token.key)
            .is_some_and(|(owner, _)| owner == &token.token)
        {
            held.remove(&token.key);
        }
        Ok(())
    }
}

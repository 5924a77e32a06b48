//! In-process TTL cache.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use repoquery_shared::Result;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::CacheStore;

/// Map-backed store. Expired entries are dropped when read and swept on
/// every write, so keys that are never read again do not accumulate.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries still held, including expired ones not yet swept.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some((value, expires_at)) if Instant::now() < *expires_at => Ok(Some(value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        entries.retain(|_, (_, expires_at)| now < *expires_at);
        entries.insert(
            key.to_string(),
            (value.to_string(), now + Duration::from_secs(ttl_secs)),
        );
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

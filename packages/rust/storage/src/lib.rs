//! Cache backing stores for retrieved repository content.
//!
//! Every store implements [`CacheStore`]: string values keyed by string, each
//! entry carrying its own TTL. Expiry is the only eviction mechanism; there is
//! no delete operation.
//!
//! Backends:
//! - [`NullCache`]: always misses, discards writes (caching disabled)
//! - [`MemoryCache`]: in-process map, shared by every request in the process
//! - [`SqlCache`]: libSQL database, local file or remote `libsql://` URL

mod memory;
mod migrations;
mod sql;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use repoquery_shared::Result;

pub use memory::MemoryCache;
pub use sql::SqlCache;

/// Key/value store with per-entry time-to-live.
///
/// Implementations must be safe to share between concurrent requests.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Read a live entry. Unset or expired keys yield `None`.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write (or overwrite) an entry that expires after `ttl_secs`.
    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()>;

    /// Short backend name for logs.
    fn backend(&self) -> &'static str;
}

/// Store used when no cache is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullCache;

#[async_trait]
impl CacheStore for NullCache {
    async fn get(&self, _key: &str) -> Result<Option<String>> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: &str, _ttl_secs: u64) -> Result<()> {
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "none"
    }
}

/// Open the store addressed by `url`.
///
/// - `None` ⇒ [`NullCache`]
/// - `memory:` / `memory://` ⇒ [`MemoryCache`]
/// - `libsql://…`, `https://…`, `http://…` ⇒ remote [`SqlCache`] using `auth_token`
/// - anything else ⇒ local [`SqlCache`] at that path (an optional `file:` prefix is stripped)
pub async fn open_cache(
    url: Option<&str>,
    auth_token: Option<String>,
) -> Result<Arc<dyn CacheStore>> {
    let Some(url) = url.map(str::trim).filter(|u| !u.is_empty()) else {
        tracing::info!("no cache configured, caching disabled");
        return Ok(Arc::new(NullCache));
    };

    let store: Arc<dyn CacheStore> = if url == "memory:" || url == "memory://" {
        Arc::new(MemoryCache::new())
    } else if ["libsql://", "https://", "http://"]
        .iter()
        .any(|scheme| url.starts_with(scheme))
    {
        Arc::new(SqlCache::open_remote(url, auth_token.unwrap_or_default()).await?)
    } else {
        let path = url.strip_prefix("file:").unwrap_or(url);
        Arc::new(SqlCache::open(Path::new(path)).await?)
    };

    tracing::info!(backend = store.backend(), "cache store opened");
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_cache_always_misses() {
        let cache = NullCache;
        cache.set("readme:o/r", "\"text\"", 3600).await.unwrap();
        assert!(cache.get("readme:o/r").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn open_cache_selects_backend() {
        assert_eq!(open_cache(None, None).await.unwrap().backend(), "none");
        assert_eq!(open_cache(Some("  "), None).await.unwrap().backend(), "none");
        assert_eq!(
            open_cache(Some("memory:"), None).await.unwrap().backend(),
            "memory"
        );

        let tmp = std::env::temp_dir().join(format!("rq_open_{}.db", uuid::Uuid::now_v7()));
        let url = format!("file:{}", tmp.display());
        let store = open_cache(Some(&url), None).await.unwrap();
        assert_eq!(store.backend(), "libsql");
        store.set("k", "v", 60).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
    }
}

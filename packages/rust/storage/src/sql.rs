//! libSQL-backed cache (local file or remote database).

use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use libsql::{Connection, Database, params};
use repoquery_shared::{RepoQueryError, Result};

use crate::CacheStore;
use crate::migrations;

/// Cache store wrapping a libSQL database.
///
/// Expiry is stored as a unix timestamp; reads filter on it, so an expired row
/// is never returned even before [`SqlCache::purge_expired`] removes it.
pub struct SqlCache {
    /// Held so the database outlives its connection.
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
}

impl SqlCache {
    /// Open or create a database at `path`.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| RepoQueryError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| RepoQueryError::Storage(e.to_string()))?;

        Self::from_database(db).await
    }

    /// Connect to a remote libSQL database.
    pub async fn open_remote(url: &str, auth_token: String) -> Result<Self> {
        let db = libsql::Builder::new_remote(url.to_string(), auth_token)
            .build()
            .await
            .map_err(|e| RepoQueryError::Storage(format!("{url}: {e}")))?;

        Self::from_database(db).await
    }

    async fn from_database(db: Database) -> Result<Self> {
        let conn = db
            .connect()
            .map_err(|e| RepoQueryError::Storage(e.to_string()))?;

        let cache = Self { db, conn };
        cache.run_migrations().await?;
        let purged = cache.purge_expired().await?;
        if purged > 0 {
            tracing::debug!(purged, "removed expired cache entries");
        }
        Ok(cache)
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    RepoQueryError::Storage(format!(
                        "migration v{} failed: {e}",
                        migration.version
                    ))
                })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Delete rows whose TTL has elapsed. Returns the number removed.
    pub async fn purge_expired(&self) -> Result<u64> {
        self.conn
            .execute(
                "DELETE FROM cache_entries WHERE expires_at <= ?1",
                params![Utc::now().timestamp()],
            )
            .await
            .map_err(|e| RepoQueryError::Storage(e.to_string()))
    }
}

#[async_trait]
impl CacheStore for SqlCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query(
                "SELECT value FROM cache_entries WHERE key = ?1 AND expires_at > ?2",
                params![key, Utc::now().timestamp()],
            )
            .await
            .map_err(|e| RepoQueryError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let value: String = row
                    .get(0)
                    .map_err(|e| RepoQueryError::Storage(e.to_string()))?;
                Ok(Some(value))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(RepoQueryError::Storage(e.to_string())),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        let now = Utc::now();
        let ttl = i64::try_from(ttl_secs).unwrap_or(i64::MAX);
        let expires_at = now.timestamp().saturating_add(ttl);
        self.conn
            .execute(
                "INSERT INTO cache_entries (key, value, expires_at, written_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(key) DO UPDATE SET
                   value = excluded.value,
                   expires_at = excluded.expires_at,
                   written_at = excluded.written_at",
                params![key, value, expires_at, now.to_rfc3339()],
            )
            .await
            .map_err(|e| RepoQueryError::Storage(e.to_string()))?;
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "libsql"
    }
}

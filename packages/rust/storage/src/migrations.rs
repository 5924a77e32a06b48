//! Schema for the libSQL cache store.
//!
//! [`SqlCache`](crate::SqlCache) applies every version above the one recorded
//! in `schema_migrations` when it opens the database.

/// One schema step, executed as a single batch.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// Ascending by `version`.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: cache_entries with per-entry expiry",
        sql: r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version   INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Serialized payloads keyed by "<namespace>:<owner>/<name>"
CREATE TABLE IF NOT EXISTS cache_entries (
    key        TEXT PRIMARY KEY,
    value      TEXT NOT NULL,
    expires_at INTEGER NOT NULL,
    written_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_cache_entries_expires_at ON cache_entries(expires_at);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}

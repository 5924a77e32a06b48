//! Core domain types shared by the client, cache, and pipeline crates.

use serde::{Deserialize, Serialize};

use crate::error::{RepoQueryError, Result};

/// Time-to-live applied to every cache entry, in seconds.
pub const DEFAULT_CACHE_TTL_SECS: u64 = 3600;

// ---------------------------------------------------------------------------
// RepoId
// ---------------------------------------------------------------------------

/// Repository identifier in `owner/name` form.
///
/// Used verbatim as a cache key suffix and as an upstream path segment, so no
/// normalisation happens beyond trimming surrounding whitespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RepoId(String);

impl RepoId {
    /// Build a repository identifier, rejecting empty input.
    pub fn new(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(RepoQueryError::validation("repository identifier is empty"));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// The identifier as passed to upstream services.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RepoId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for RepoId {
    type Err = RepoQueryError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::new(s)
    }
}

// ---------------------------------------------------------------------------
// CacheNamespace
// ---------------------------------------------------------------------------

/// Key namespaces, one per retriever operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheNamespace {
    Readme,
    Issues,
    Pulls,
    Mcp,
}

impl CacheNamespace {
    /// Namespace prefix as it appears in the key.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Readme => "readme",
            Self::Issues => "issues",
            Self::Pulls => "pulls",
            Self::Mcp => "mcp",
        }
    }

    /// Full cache key for `repo` in this namespace.
    pub fn key(&self, repo: &RepoId) -> String {
        format!("{}:{}", self.as_str(), repo)
    }
}

// ---------------------------------------------------------------------------
// ContextEntry
// ---------------------------------------------------------------------------

/// A heterogeneous record returned by the context service.
///
/// Any JSON value is accepted and kept verbatim, so cached and served entry
/// lists match the upstream body exactly. Only `type`, `content`, and `body`
/// are interpreted, and only when they are strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextEntry(serde_json::Value);

impl ContextEntry {
    /// Entry kind the retriever reads README text from.
    pub const README: &'static str = "readme";

    /// The entry's `type`, when it is a string.
    pub fn kind(&self) -> Option<&str> {
        self.str_field("type")
    }

    /// Whether this entry carries README text.
    pub fn is_readme(&self) -> bool {
        self.kind() == Some(Self::README)
    }

    /// Non-empty string `content`, falling back to non-empty string `body`.
    pub fn text(&self) -> Option<&str> {
        ["content", "body"]
            .into_iter()
            .filter_map(|field| self.str_field(field))
            .find(|s| !s.is_empty())
    }

    /// The entry as received.
    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }

    fn str_field(&self, field: &str) -> Option<&str> {
        self.0.get(field).and_then(serde_json::Value::as_str)
    }
}

impl From<serde_json::Value> for ContextEntry {
    fn from(value: serde_json::Value) -> Self {
        Self(value)
    }
}

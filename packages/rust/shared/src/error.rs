//! Error types for RepoQuery.
//!
//! Library crates use [`RepoQueryError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all RepoQuery operations.
///
/// The first six variants are the upstream taxonomy; their messages name the
/// upstream that failed so callers can surface them verbatim.
#[derive(Debug, thiserror::Error)]
pub enum RepoQueryError {
    /// Repository API rejected the bearer token (HTTP 401).
    #[error("repository API: unauthorized (invalid or missing GitHub token)")]
    Unauthorized,

    /// Repository API refused the request (HTTP 403).
    #[error("repository API: forbidden (rate limit exceeded or access denied)")]
    RateLimitedOrForbidden,

    /// Repository or resource does not exist (HTTP 404).
    #[error("repository API: not found (repository or resource does not exist)")]
    NotFound,

    /// Any other non-success HTTP status.
    #[error("repository API: upstream returned HTTP {status}")]
    Upstream { status: u16 },

    /// No response was received (connect failure, timeout, broken body).
    #[error("transport error: {0}")]
    Transport(String),

    /// Context service lookup failed for a reason other than 404.
    #[error("context service: {0}")]
    ContextService(String),

    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Cache backing store error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Malformed upstream payload or cached value.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Inbound request validation error.
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, RepoQueryError>;

impl RepoQueryError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Map a non-success HTTP status onto the upstream taxonomy.
    pub fn from_status(status: u16) -> Self {
        match status {
            401 => Self::Unauthorized,
            403 => Self::RateLimitedOrForbidden,
            404 => Self::NotFound,
            status => Self::Upstream { status },
        }
    }

    /// Whether this is the upstream 404 case.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }

    /// Failure reason without the upstream prefix, for re-wrapping under
    /// another upstream's name.
    pub fn upstream_reason(&self) -> String {
        match self {
            Self::Unauthorized => "unauthorized (HTTP 401)".into(),
            Self::RateLimitedOrForbidden => "forbidden or rate limited (HTTP 403)".into(),
            Self::NotFound => "not found (HTTP 404)".into(),
            Self::Upstream { status } => format!("HTTP {status}"),
            other => other.to_string(),
        }
    }
}

//! Shared types, error model, and configuration for RepoQuery.
//!
//! This crate is the foundation depended on by all other RepoQuery crates.
//! It provides:
//! - [`RepoQueryError`]: the unified error type
//! - Domain types ([`RepoId`], [`ContextEntry`], [`CacheNamespace`])
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CacheConfig, ContextServiceConfig, GithubConfig, ServerConfig, config_dir,
    config_file_path, init_config, load_config, load_config_from, resolve_token,
    secret_from_env,
};
pub use error::{RepoQueryError, Result};
pub use types::{CacheNamespace, ContextEntry, DEFAULT_CACHE_TTL_SECS, RepoId};

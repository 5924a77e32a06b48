//! Application configuration for RepoQuery.
//!
//! User config lives at `~/.repoquery/repoquery.toml`.
//! CLI flags override config file values, which override defaults.
//! Secrets are never stored in the file; it only names the env vars that
//! hold them.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{RepoQueryError, Result};
use crate::types::DEFAULT_CACHE_TTL_SECS;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "repoquery.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".repoquery";

// ---------------------------------------------------------------------------
// Config structs (matching repoquery.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Repository API settings.
    #[serde(default)]
    pub github: GithubConfig,

    /// Context service settings.
    #[serde(default)]
    pub context_service: ContextServiceConfig,

    /// Cache backing store.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Inbound HTTP server.
    #[serde(default)]
    pub server: ServerConfig,
}

/// `[github]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GithubConfig {
    /// Repository API base URL.
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Value of the `X-GitHub-Api-Version` header.
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Name of the env var holding the bearer token (never store the token itself).
    #[serde(default = "default_token_env")]
    pub token_env: String,

    /// Per-request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Page size for issue and pull-request listings.
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            api_version: default_api_version(),
            token_env: default_token_env(),
            timeout_secs: default_timeout_secs(),
            per_page: default_per_page(),
        }
    }
}

fn default_api_base() -> String {
    "https://api.github.com".into()
}
fn default_api_version() -> String {
    "2022-11-28".into()
}
fn default_token_env() -> String {
    "GITHUB_TOKEN".into()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_per_page() -> u32 {
    100
}

/// `[context_service]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextServiceConfig {
    /// Base URL; the repository identifier is appended as a path.
    #[serde(default = "default_context_base")]
    pub base_url: String,
}

impl Default for ContextServiceConfig {
    fn default() -> Self {
        Self {
            base_url: default_context_base(),
        }
    }
}

fn default_context_base() -> String {
    "https://context.github.com/github".into()
}

/// `[cache]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Backing store URL. Absent ⇒ caching disabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Name of the env var holding the remote store auth token.
    #[serde(default = "default_cache_token_env")]
    pub auth_token_env: String,

    /// Entry time-to-live.
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            url: None,
            auth_token_env: default_cache_token_env(),
            ttl_secs: default_ttl_secs(),
        }
    }
}

fn default_cache_token_env() -> String {
    "REPOQUERY_CACHE_TOKEN".into()
}
fn default_ttl_secs() -> u64 {
    DEFAULT_CACHE_TTL_SECS
}

/// `[server]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    8001
}

impl AppConfig {
    /// Check URLs and numeric limits before any client is built.
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("github.api_base", &self.github.api_base),
            ("context_service.base_url", &self.context_service.base_url),
        ] {
            url::Url::parse(value).map_err(|e| {
                RepoQueryError::config(format!("{field} is not a valid URL ({value}): {e}"))
            })?;
        }
        if self.github.timeout_secs == 0 {
            return Err(RepoQueryError::config("github.timeout_secs must be positive"));
        }
        if self.github.per_page == 0 || self.github.per_page > 100 {
            return Err(RepoQueryError::config(
                "github.per_page must be between 1 and 100",
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.repoquery/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| RepoQueryError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.repoquery/repoquery.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| RepoQueryError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| RepoQueryError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| RepoQueryError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| RepoQueryError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| RepoQueryError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read a secret from the env var named by `var_name`. Unset or empty ⇒ `None`.
pub fn secret_from_env(var_name: &str) -> Option<String> {
    match std::env::var(var_name) {
        Ok(val) if !val.trim().is_empty() => Some(val),
        _ => None,
    }
}

/// Resolve the Repository API token from the env var named in `[github]`.
pub fn resolve_token(config: &AppConfig) -> Option<String> {
    let token = secret_from_env(&config.github.token_env);
    if token.is_none() {
        tracing::debug!(
            var = %config.github.token_env,
            "no GitHub token set, using unauthenticated requests"
        );
    }
    token
}

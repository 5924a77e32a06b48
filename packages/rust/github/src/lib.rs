//! Clients for the two upstreams RepoQuery reads from.
//!
//! - The **Repository API** (GitHub REST): README, open issues, open pulls.
//!   Requests carry the GitHub media type, API version, and an optional
//!   bearer token.
//! - The **Context Service**: a lookup returning typed content entries for a
//!   repository. Requests carry no credentials.
//!
//! Both map non-success statuses onto [`RepoQueryError`] with
//! [`RepoQueryError::from_status`]; caching and fallback policy live in the
//! retriever, not here.

mod payload;

use std::time::Duration;

use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::{Client, Response};
use serde_json::Value;
use tracing::{debug, instrument};

use repoquery_shared::{AppConfig, ContextEntry, RepoId, RepoQueryError, Result};

use crate::payload::{ReadmePayload, into_records, normalize_context};

/// User-Agent string for upstream requests (GitHub rejects requests without one).
const USER_AGENT: &str = concat!("repoquery/", env!("CARGO_PKG_VERSION"));

/// GitHub REST media type.
const GITHUB_MEDIA_TYPE: &str = "application/vnd.github+json";

/// Header carrying the GitHub REST API version.
const API_VERSION_HEADER: &str = "X-GitHub-Api-Version";

// ---------------------------------------------------------------------------
// ClientOptions
// ---------------------------------------------------------------------------

/// Settings for [`GithubClient`].
#[derive(Clone)]
pub struct ClientOptions {
    /// Repository API base URL (no trailing slash needed).
    pub api_base: String,
    /// Context service base URL; the repo identifier is appended.
    pub context_base: String,
    /// `X-GitHub-Api-Version` value.
    pub api_version: String,
    /// Bearer token for the Repository API.
    pub token: Option<String>,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Page size for issue and pull listings.
    pub per_page: u32,
}

impl ClientOptions {
    /// Build options from the loaded config plus an externally resolved token.
    pub fn from_config(config: &AppConfig, token: Option<String>) -> Self {
        Self {
            api_base: config.github.api_base.clone(),
            context_base: config.context_service.base_url.clone(),
            api_version: config.github.api_version.clone(),
            token,
            timeout_secs: config.github.timeout_secs,
            per_page: config.github.per_page,
        }
    }
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self::from_config(&AppConfig::default(), None)
    }
}

// The token must never reach logs, including `{:?}` output.
impl std::fmt::Debug for ClientOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientOptions")
            .field("api_base", &self.api_base)
            .field("context_base", &self.context_base)
            .field("api_version", &self.api_version)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("timeout_secs", &self.timeout_secs)
            .field("per_page", &self.per_page)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// GithubClient
// ---------------------------------------------------------------------------

/// HTTP client for the Repository API and the Context Service.
///
/// Cheap to clone and safe to share between concurrent requests.
#[derive(Debug, Clone)]
pub struct GithubClient {
    api: Client,
    context: Client,
    api_base: String,
    context_base: String,
    per_page: u32,
}

impl GithubClient {
    /// Build both underlying HTTP clients.
    pub fn new(opts: &ClientOptions) -> Result<Self> {
        let timeout = Duration::from_secs(opts.timeout_secs);

        let api = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .default_headers(api_headers(opts)?)
            .build()
            .map_err(|e| RepoQueryError::config(format!("failed to build HTTP client: {e}")))?;

        let context = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| RepoQueryError::config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            api,
            context,
            api_base: opts.api_base.trim_end_matches('/').to_string(),
            context_base: opts.context_base.trim_end_matches('/').to_string(),
            per_page: opts.per_page,
        })
    }

    // -----------------------------------------------------------------------
    // Context Service
    // -----------------------------------------------------------------------

    /// `GET <context-base>/<repo>`, normalised to an entry list.
    ///
    /// A 404 surfaces as [`RepoQueryError::NotFound`]; treating it as an
    /// empty result is the caller's policy.
    #[instrument(skip_all, fields(repo = %repo))]
    pub async fn fetch_context(&self, repo: &RepoId) -> Result<Vec<ContextEntry>> {
        let url = format!("{}/{}", self.context_base, repo);
        let response = send(self.context.get(&url), &url).await?;
        let body = response
            .text()
            .await
            .map_err(|e| RepoQueryError::Transport(format!("{url}: failed to read body: {e}")))?;

        let entries = normalize_context(&body);
        debug!(entries = entries.len(), "context service responded");
        Ok(entries)
    }

    // -----------------------------------------------------------------------
    // Repository API
    // -----------------------------------------------------------------------

    /// `GET /repos/{repo}/readme`, base64-decoded to text.
    #[instrument(skip_all, fields(repo = %repo))]
    pub async fn fetch_readme(&self, repo: &RepoId) -> Result<String> {
        let url = format!("{}/repos/{}/readme", self.api_base, repo);
        let response = send(self.api.get(&url), &url).await?;
        let payload: ReadmePayload = read_json(response, &url).await?;
        payload.decode()
    }

    /// `GET /repos/{repo}/issues?state=open`.
    #[instrument(skip_all, fields(repo = %repo))]
    pub async fn fetch_issues(&self, repo: &RepoId) -> Result<Vec<Value>> {
        self.fetch_open_list(repo, "issues").await
    }

    /// `GET /repos/{repo}/pulls?state=open`.
    #[instrument(skip_all, fields(repo = %repo))]
    pub async fn fetch_pull_requests(&self, repo: &RepoId) -> Result<Vec<Value>> {
        self.fetch_open_list(repo, "pulls").await
    }

    async fn fetch_open_list(&self, repo: &RepoId, resource: &str) -> Result<Vec<Value>> {
        let url = format!("{}/repos/{}/{}", self.api_base, repo, resource);
        let request = self
            .api
            .get(&url)
            .query(&[("state", "open".to_string()), ("per_page", self.per_page.to_string())]);
        let response = send(request, &url).await?;
        let payload: Value = read_json(response, &url).await?;
        let records = into_records(payload, resource)?;
        debug!(resource, count = records.len(), "repository API responded");
        Ok(records)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Default headers for Repository API requests.
fn api_headers(opts: &ClientOptions) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static(GITHUB_MEDIA_TYPE));
    headers.insert(
        API_VERSION_HEADER,
        HeaderValue::from_str(&opts.api_version)
            .map_err(|e| RepoQueryError::config(format!("invalid API version header: {e}")))?,
    );

    if let Some(token) = opts.token.as_deref().filter(|t| !t.is_empty()) {
        let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|_| RepoQueryError::config("GitHub token contains invalid characters"))?;
        value.set_sensitive(true);
        headers.insert(AUTHORIZATION, value);
    }

    Ok(headers)
}

/// Send a request and map the outcome onto the error taxonomy.
async fn send(request: reqwest::RequestBuilder, url: &str) -> Result<Response> {
    let response = request
        .send()
        .await
        .map_err(|e| RepoQueryError::Transport(format!("{url}: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        debug!(%url, status = status.as_u16(), "upstream returned error status");
        return Err(RepoQueryError::from_status(status.as_u16()));
    }

    Ok(response)
}

/// Read a JSON body, separating malformed payloads from broken transports.
async fn read_json<T: serde::de::DeserializeOwned>(response: Response, url: &str) -> Result<T> {
    response.json::<T>().await.map_err(|e| {
        if e.is_decode() {
            RepoQueryError::parse(format!("{url}: {e}"))
        } else {
            RepoQueryError::Transport(format!("{url}: failed to read body: {e}"))
        }
    })
}

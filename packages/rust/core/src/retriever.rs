//! Cache-aside retrieval of repository content.
//!
//! Every operation reads its own key namespace first and only goes upstream
//! on a miss. Successful fetches are written back with the configured TTL;
//! failures are never cached, with one exception: a context service 404 is
//! cached as an empty entry list (see [`empty_when_not_found`]).

use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use repoquery_github::{ClientOptions, GithubClient};
use repoquery_shared::{
    AppConfig, CacheNamespace, ContextEntry, DEFAULT_CACHE_TTL_SECS, RepoId, RepoQueryError,
    Result, secret_from_env,
};
use repoquery_storage::{CacheStore, NullCache, open_cache};

// ---------------------------------------------------------------------------
// README fallback chain
// ---------------------------------------------------------------------------

/// Places README text can come from, tried in [`ReadmeSource::CHAIN`] order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadmeSource {
    ContextService,
    RepositoryApi,
}

/// What the chain does when a source fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OnFailure {
    /// Log and move on to the next source.
    Skip,
    /// Surface the error to the caller.
    Propagate,
}

impl ReadmeSource {
    const CHAIN: [ReadmeSource; 2] = [Self::ContextService, Self::RepositoryApi];

    fn name(self) -> &'static str {
        match self {
            Self::ContextService => "context_service",
            Self::RepositoryApi => "repository_api",
        }
    }

    fn on_failure(self) -> OnFailure {
        match self {
            Self::ContextService => OnFailure::Skip,
            Self::RepositoryApi => OnFailure::Propagate,
        }
    }
}

/// Negative-caching policy for the context service: a 404 means the service
/// has nothing for this repository, which is a result worth caching.
fn empty_when_not_found(result: Result<Vec<ContextEntry>>) -> Result<Vec<ContextEntry>> {
    match result {
        Err(e) if e.is_not_found() => {
            debug!("context service has no entries, caching empty result");
            Ok(Vec::new())
        }
        other => other,
    }
}

// ---------------------------------------------------------------------------
// Retriever
// ---------------------------------------------------------------------------

/// Cached access to README, issues, pull requests, and context entries.
///
/// Shared across requests behind an `Arc`. Concurrent misses on the same key
/// each fetch and each write back; the last write wins.
pub struct Retriever {
    client: GithubClient,
    cache: Arc<dyn CacheStore>,
    ttl_secs: u64,
}

impl Retriever {
    /// Build a retriever with the default one-hour TTL.
    pub fn new(client: GithubClient, cache: Arc<dyn CacheStore>) -> Self {
        Self {
            client,
            cache,
            ttl_secs: DEFAULT_CACHE_TTL_SECS,
        }
    }

    /// Build a retriever that never caches.
    pub fn uncached(client: GithubClient) -> Self {
        Self::new(client, Arc::new(NullCache))
    }

    /// Override the entry TTL.
    pub fn with_ttl(mut self, ttl_secs: u64) -> Self {
        self.ttl_secs = ttl_secs;
        self
    }

    /// Build the client and open the cache described by `config`.
    pub async fn from_config(config: &AppConfig, token: Option<String>) -> Result<Self> {
        config.validate()?;
        let client = GithubClient::new(&ClientOptions::from_config(config, token))?;
        let cache = open_cache(
            config.cache.url.as_deref(),
            secret_from_env(&config.cache.auth_token_env),
        )
        .await?;
        Ok(Self::new(client, cache).with_ttl(config.cache.ttl_secs))
    }

    /// Name of the cache backend in use.
    pub fn cache_backend(&self) -> &'static str {
        self.cache.backend()
    }

    // -----------------------------------------------------------------------
    // Operations
    // -----------------------------------------------------------------------

    /// Context service entries for `repo` (`mcp:<repo>`).
    ///
    /// A 404 yields an empty, cached list. Any other failure is reported as
    /// [`RepoQueryError::ContextService`] and not cached.
    #[instrument(skip_all, fields(repo = %repo))]
    pub async fn get_mcp_context(&self, repo: &RepoId) -> Result<Vec<ContextEntry>> {
        self.cached(CacheNamespace::Mcp.key(repo), || async {
            empty_when_not_found(self.client.fetch_context(repo).await)
                .map_err(|e| RepoQueryError::ContextService(e.upstream_reason()))
        })
        .await
    }

    /// README text for `repo` (`readme:<repo>`).
    ///
    /// Tries the context service first and silently falls back to the
    /// Repository API. Only the final text is cached under this key.
    #[instrument(skip_all, fields(repo = %repo))]
    pub async fn get_readme(&self, repo: &RepoId) -> Result<String> {
        self.cached(CacheNamespace::Readme.key(repo), || self.first_readme(repo))
            .await
    }

    /// Open issues for `repo` (`issues:<repo>`), records passed through verbatim.
    #[instrument(skip_all, fields(repo = %repo))]
    pub async fn get_issues(&self, repo: &RepoId) -> Result<Vec<Value>> {
        self.cached(CacheNamespace::Issues.key(repo), || {
            self.client.fetch_issues(repo)
        })
        .await
    }

    /// Open pull requests for `repo` (`pulls:<repo>`), records passed through verbatim.
    #[instrument(skip_all, fields(repo = %repo))]
    pub async fn get_pull_requests(&self, repo: &RepoId) -> Result<Vec<Value>> {
        self.cached(CacheNamespace::Pulls.key(repo), || {
            self.client.fetch_pull_requests(repo)
        })
        .await
    }

    // -----------------------------------------------------------------------
    // Fallback chain
    // -----------------------------------------------------------------------

    /// Walk [`ReadmeSource::CHAIN`]; the first source yielding text wins.
    async fn first_readme(&self, repo: &RepoId) -> Result<String> {
        for source in ReadmeSource::CHAIN {
            match self.readme_from(source, repo).await {
                Ok(Some(text)) => {
                    debug!(source = source.name(), "README resolved");
                    return Ok(text);
                }
                Ok(None) => debug!(source = source.name(), "source has no README"),
                Err(e) => match source.on_failure() {
                    OnFailure::Skip => {
                        warn!(source = source.name(), error = %e, "README source failed, falling back");
                    }
                    OnFailure::Propagate => return Err(e),
                },
            }
        }
        Err(RepoQueryError::NotFound)
    }

    async fn readme_from(&self, source: ReadmeSource, repo: &RepoId) -> Result<Option<String>> {
        match source {
            ReadmeSource::ContextService => {
                let entries = self.get_mcp_context(repo).await?;
                Ok(entries
                    .iter()
                    .find(|e| e.is_readme())
                    .and_then(ContextEntry::text)
                    .map(str::to_owned))
            }
            // Last in the chain: an empty README is still the answer.
            ReadmeSource::RepositoryApi => self.client.fetch_readme(repo).await.map(Some),
        }
    }

    // -----------------------------------------------------------------------
    // Cache-aside
    // -----------------------------------------------------------------------

    /// Return the cached value for `key`, or run `fetch` and cache its success.
    async fn cached<T, F, Fut>(&self, key: String, fetch: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if let Some(hit) = self.cache_read(&key).await {
            debug!(%key, "cache hit");
            return Ok(hit);
        }

        debug!(%key, "cache miss");
        let value = fetch().await?;
        self.cache_write(&key, &value).await;
        Ok(value)
    }

    /// Backend errors and undecodable values read as a miss.
    async fn cache_read<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.cache.get(key).await {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(%key, error = %e, "cache read failed, treating as miss");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(%key, error = %e, "cached value is malformed, treating as miss");
                None
            }
        }
    }

    /// Backend errors drop the write; the fetched value is still returned.
    async fn cache_write<T: Serialize>(&self, key: &str, value: &T) {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(%key, error = %e, "value not serializable, skipping cache write");
                return;
            }
        };

        if let Err(e) = self.cache.set(key, &raw, self.ttl_secs).await {
            warn!(%key, error = %e, "cache write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use repoquery_storage::MemoryCache;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const README_B64: &str = "IyBUZXN0IFJlcG8="; // "# Test Repo"

    fn client_for(server: &MockServer) -> GithubClient {
        let opts = ClientOptions {
            api_base: server.uri(),
            context_base: format!("{}/github", server.uri()),
            timeout_secs: 5,
            ..ClientOptions::default()
        };
        GithubClient::new(&opts).expect("build client")
    }

    fn retriever_for(server: &MockServer, cache: Arc<MemoryCache>) -> Retriever {
        Retriever::new(client_for(server), cache)
    }

    fn repo() -> RepoId {
        RepoId::new("openai/langchain").unwrap()
    }

    /// Base URL of a local port with no listener behind it.
    fn closed_port_uri() -> String {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let uri = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);
        uri
    }

    async fn mount_readme_api(server: &MockServer, expected_calls: u64) {
        Mock::given(method("GET"))
            .and(path("/repos/openai/langchain/readme"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "content": README_B64, "encoding": "base64" })),
            )
            .expect(expected_calls)
            .mount(server)
            .await;
    }

    async fn mount_context(server: &MockServer, response: ResponseTemplate, expected_calls: u64) {
        Mock::given(method("GET"))
            .and(path("/github/openai/langchain"))
            .respond_with(response)
            .expect(expected_calls)
            .mount(server)
            .await;
    }

    // -- cache-aside ---------------------------------------------------------

    #[tokio::test]
    async fn cache_hit_makes_no_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let cache = Arc::new(MemoryCache::new());
        cache
            .set("issues:openai/langchain", r#"[{"id":1,"title":"cached"}]"#, 60)
            .await
            .unwrap();
        cache
            .set("readme:openai/langchain", r##""# Cached""##, 60)
            .await
            .unwrap();
        cache
            .set("mcp:openai/langchain", "[]", 60)
            .await
            .unwrap();
        cache
            .set("pulls:openai/langchain", "[]", 60)
            .await
            .unwrap();

        let retriever = retriever_for(&server, cache);
        let issues = retriever.get_issues(&repo()).await.unwrap();
        assert_eq!(issues[0]["title"], "cached");
        assert_eq!(retriever.get_readme(&repo()).await.unwrap(), "# Cached");
        assert!(retriever.get_mcp_context(&repo()).await.unwrap().is_empty());
        assert!(retriever.get_pull_requests(&repo()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn miss_then_hit_within_ttl() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/openai/langchain/pulls"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!([{ "id": 1, "title": "Sample PR" }])),
            )
            .expect(1)
            .mount(&server)
            .await;

        let cache = Arc::new(MemoryCache::new());
        let retriever = retriever_for(&server, cache.clone());

        let first = retriever.get_pull_requests(&repo()).await.unwrap();
        let second = retriever.get_pull_requests(&repo()).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(second[0]["title"], "Sample PR");

        let raw = cache.get("pulls:openai/langchain").await.unwrap();
        assert!(raw.unwrap().contains("Sample PR"));
    }

    #[tokio::test]
    async fn refetches_after_ttl_expiry() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/openai/langchain/issues"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .expect(2)
            .mount(&server)
            .await;

        let retriever = retriever_for(&server, Arc::new(MemoryCache::new()));

        retriever.get_issues(&repo()).await.unwrap();
        retriever.get_issues(&repo()).await.unwrap();

        // Jump the clock past the TTL. Time is resumed before the next request
        // so the client's timeout keeps running on a live clock.
        tokio::time::pause();
        tokio::time::advance(Duration::from_secs(DEFAULT_CACHE_TTL_SECS + 1)).await;
        tokio::time::resume();

        retriever.get_issues(&repo()).await.unwrap();
    }

    #[tokio::test]
    async fn failures_are_not_cached() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/openai/langchain/issues"))
            .respond_with(ResponseTemplate::new(403))
            .expect(2)
            .mount(&server)
            .await;

        let cache = Arc::new(MemoryCache::new());
        let retriever = retriever_for(&server, cache.clone());

        for _ in 0..2 {
            let err = retriever.get_issues(&repo()).await.unwrap_err();
            assert!(matches!(err, RepoQueryError::RateLimitedOrForbidden));
        }
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn malformed_cached_value_is_a_miss() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/openai/langchain/issues"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([{"id": 2}])))
            .expect(1)
            .mount(&server)
            .await;

        let cache = Arc::new(MemoryCache::new());
        cache
            .set("issues:openai/langchain", "{not json", 60)
            .await
            .unwrap();

        let retriever = retriever_for(&server, cache);
        let issues = retriever.get_issues(&repo()).await.unwrap();
        assert_eq!(issues[0]["id"], 2);
    }

    #[tokio::test]
    async fn uncached_retriever_always_fetches() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/openai/langchain/issues"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .expect(2)
            .mount(&server)
            .await;

        let retriever = Retriever::uncached(client_for(&server));
        assert_eq!(retriever.cache_backend(), "none");
        retriever.get_issues(&repo()).await.unwrap();
        retriever.get_issues(&repo()).await.unwrap();
    }

    // -- context service -----------------------------------------------------

    #[tokio::test]
    async fn mcp_context_404_is_negatively_cached() {
        let server = MockServer::start().await;
        mount_context(&server, ResponseTemplate::new(404), 1).await;

        let cache = Arc::new(MemoryCache::new());
        let retriever = retriever_for(&server, cache.clone());

        assert!(retriever.get_mcp_context(&repo()).await.unwrap().is_empty());
        assert!(retriever.get_mcp_context(&repo()).await.unwrap().is_empty());
        assert_eq!(
            cache.get("mcp:openai/langchain").await.unwrap().as_deref(),
            Some("[]")
        );
    }

    #[tokio::test]
    async fn mcp_context_other_errors_are_context_service_errors() {
        let server = MockServer::start().await;
        mount_context(&server, ResponseTemplate::new(500), 2).await;

        let cache = Arc::new(MemoryCache::new());
        let retriever = retriever_for(&server, cache.clone());

        for _ in 0..2 {
            let err = retriever.get_mcp_context(&repo()).await.unwrap_err();
            assert!(matches!(err, RepoQueryError::ContextService(_)));
            assert_eq!(err.to_string(), "context service: HTTP 500");
        }
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn mcp_context_success_is_cached() {
        let server = MockServer::start().await;
        mount_context(
            &server,
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!([{ "type": "readme", "content": "# README from MCP" }])),
            1,
        )
        .await;

        let retriever = retriever_for(&server, Arc::new(MemoryCache::new()));
        let first = retriever.get_mcp_context(&repo()).await.unwrap();
        let second = retriever.get_mcp_context(&repo()).await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first, second);
        assert_eq!(second[0].kind(), Some("readme"));
    }

    // -- README fallback chain -----------------------------------------------

    #[tokio::test]
    async fn readme_from_context_skips_repository_api() {
        let server = MockServer::start().await;
        mount_context(
            &server,
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!([{ "type": "readme", "content": "# Test Repo" }])),
            1,
        )
        .await;
        mount_readme_api(&server, 0).await;

        let cache = Arc::new(MemoryCache::new());
        let retriever = retriever_for(&server, cache.clone());
        assert_eq!(retriever.get_readme(&repo()).await.unwrap(), "# Test Repo");

        // Both layers are cached independently.
        assert!(cache.get("readme:openai/langchain").await.unwrap().is_some());
        assert!(cache.get("mcp:openai/langchain").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn readme_uses_body_when_content_missing() {
        let server = MockServer::start().await;
        mount_context(
            &server,
            ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "entries": [{ "type": "issue", "content": "not this" },
                            { "type": "readme", "body": "# From body" }]
            })),
            1,
        )
        .await;
        mount_readme_api(&server, 0).await;

        let retriever = retriever_for(&server, Arc::new(MemoryCache::new()));
        assert_eq!(retriever.get_readme(&repo()).await.unwrap(), "# From body");
    }

    #[tokio::test]
    async fn readme_falls_back_on_context_network_failure() {
        let server = MockServer::start().await;
        mount_readme_api(&server, 1).await;

        let opts = ClientOptions {
            api_base: server.uri(),
            context_base: closed_port_uri(),
            timeout_secs: 5,
            ..ClientOptions::default()
        };
        let client = GithubClient::new(&opts).unwrap();
        let cache = Arc::new(MemoryCache::new());
        let retriever = Retriever::new(client, cache.clone());

        assert_eq!(retriever.get_readme(&repo()).await.unwrap(), "# Test Repo");
        assert!(cache.get("mcp:openai/langchain").await.unwrap().is_none());
        assert_eq!(
            cache.get("readme:openai/langchain").await.unwrap().as_deref(),
            Some(r##""# Test Repo""##)
        );
    }

    #[tokio::test]
    async fn readme_falls_back_when_context_has_no_readme() {
        let server = MockServer::start().await;
        mount_context(
            &server,
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!([{ "type": "readme", "content": "" }])),
            1,
        )
        .await;
        mount_readme_api(&server, 1).await;

        let retriever = retriever_for(&server, Arc::new(MemoryCache::new()));
        assert_eq!(retriever.get_readme(&repo()).await.unwrap(), "# Test Repo");
    }

    #[tokio::test]
    async fn readme_repository_api_errors_surface() {
        let server = MockServer::start().await;
        mount_context(&server, ResponseTemplate::new(404), 1).await;
        Mock::given(method("GET"))
            .and(path("/repos/openai/langchain/readme"))
            .respond_with(ResponseTemplate::new(401))
            .expect(2)
            .mount(&server)
            .await;

        let cache = Arc::new(MemoryCache::new());
        let retriever = retriever_for(&server, cache.clone());
        for _ in 0..2 {
            let err = retriever.get_readme(&repo()).await.unwrap_err();
            assert!(matches!(err, RepoQueryError::Unauthorized));
        }
        // The negative context result is cached, the failed README is not.
        assert!(cache.get("mcp:openai/langchain").await.unwrap().is_some());
        assert!(cache.get("readme:openai/langchain").await.unwrap().is_none());
    }

    // -- concurrency ---------------------------------------------------------

    #[tokio::test]
    async fn shared_across_tasks() {
        let server = MockServer::start().await;
        for name in ["a/one", "a/two"] {
            Mock::given(method("GET"))
                .and(path(format!("/repos/{name}/issues")))
                .respond_with(
                    ResponseTemplate::new(200).set_body_json(serde_json::json!([{ "repo": name }])),
                )
                .expect(1)
                .mount(&server)
                .await;
        }

        let retriever = Arc::new(retriever_for(&server, Arc::new(MemoryCache::new())));
        let handles: Vec<_> = ["a/one", "a/two"]
            .into_iter()
            .map(|name| {
                let retriever = retriever.clone();
                tokio::spawn(async move {
                    retriever
                        .get_issues(&RepoId::new(name).unwrap())
                        .await
                        .map(|issues| (name, issues))
                })
            })
            .collect();

        for handle in handles {
            let (name, issues) = handle.await.unwrap().unwrap();
            assert_eq!(issues[0]["repo"], name);
        }
    }

    #[tokio::test]
    async fn concurrent_misses_on_one_key_each_fetch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/openai/langchain/issues"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!([{ "number": 1 }]))
                    .set_delay(Duration::from_millis(200)),
            )
            .expect(2)
            .mount(&server)
            .await;

        let cache = Arc::new(MemoryCache::new());
        let retriever = Arc::new(retriever_for(&server, cache.clone()));
        let handles: Vec<_> = (0..2)
            .map(|_| {
                let retriever = retriever.clone();
                tokio::spawn(async move { retriever.get_issues(&repo()).await })
            })
            .collect();

        for handle in handles {
            let issues = handle.await.unwrap().unwrap();
            assert_eq!(issues[0]["number"], 1);
        }
        // Both writes landed on the same key; either one is the live value.
        assert!(cache.get("issues:openai/langchain").await.unwrap().is_some());
    }
}

//! Inbound HTTP surface: health, query, and direct content endpoints.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::{Value, json};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use repoquery_core::{Pipeline, QueryRequest, QueryResponse, SilentProgress, answer_query};
use repoquery_shared::{ContextEntry, RepoId, RepoQueryError};

/// Build the router over a shared pipeline.
pub(crate) fn router(pipeline: Pipeline) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/query", post(query))
        .route("/repos/:owner/:name/readme", get(readme))
        .route("/repos/:owner/:name/issues", get(issues))
        .route("/repos/:owner/:name/pulls", get(pulls))
        .route("/repos/:owner/:name/context", get(context))
        .layer(TraceLayer::new_for_http())
        .with_state(pipeline)
}

/// Bind `host:port` and serve until Ctrl-C.
pub(crate) async fn serve(pipeline: Pipeline, host: &str, port: u16) -> std::io::Result<()> {
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(
        %addr,
        cache = pipeline.retriever().cache_backend(),
        "listening"
    );

    axum::serve(listener, router(pipeline))
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_err() {
                warn!("failed to install Ctrl-C handler");
            }
        })
        .await
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// JSON error body `{"message": ...}` with its status.
#[derive(Debug)]
pub(crate) struct ApiError {
    status: StatusCode,
    message: String,
}

impl From<RepoQueryError> for ApiError {
    fn from(err: RepoQueryError) -> Self {
        let status = match &err {
            RepoQueryError::Validation { .. } => StatusCode::BAD_REQUEST,
            RepoQueryError::Unauthorized => StatusCode::UNAUTHORIZED,
            RepoQueryError::RateLimitedOrForbidden => StatusCode::FORBIDDEN,
            RepoQueryError::NotFound => StatusCode::NOT_FOUND,
            RepoQueryError::Upstream { .. }
            | RepoQueryError::Transport(_)
            | RepoQueryError::ContextService(_)
            | RepoQueryError::Parse { .. } => StatusCode::BAD_GATEWAY,
            RepoQueryError::Config { .. }
            | RepoQueryError::Storage(_)
            | RepoQueryError::Io { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let message = match err {
            RepoQueryError::Validation { message } => message,
            other => other.to_string(),
        };
        Self { status, message }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: rejection.body_text(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            warn!(status = %self.status, message = %self.message, "request failed");
        }
        (self.status, Json(json!({ "message": self.message }))).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn query(
    State(pipeline): State<Pipeline>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> ApiResult<QueryResponse> {
    let Json(request) = payload?;
    let response = answer_query(&pipeline, request, &SilentProgress).await?;
    Ok(Json(response))
}

#[derive(Serialize)]
struct ReadmeBody {
    content: String,
}

async fn readme(
    State(pipeline): State<Pipeline>,
    Path((owner, name)): Path<(String, String)>,
) -> ApiResult<ReadmeBody> {
    let repo = repo_id(&owner, &name)?;
    let content = pipeline.retriever().get_readme(&repo).await?;
    Ok(Json(ReadmeBody { content }))
}

async fn issues(
    State(pipeline): State<Pipeline>,
    Path((owner, name)): Path<(String, String)>,
) -> ApiResult<Vec<Value>> {
    let repo = repo_id(&owner, &name)?;
    Ok(Json(pipeline.retriever().get_issues(&repo).await?))
}

async fn pulls(
    State(pipeline): State<Pipeline>,
    Path((owner, name)): Path<(String, String)>,
) -> ApiResult<Vec<Value>> {
    let repo = repo_id(&owner, &name)?;
    Ok(Json(pipeline.retriever().get_pull_requests(&repo).await?))
}

async fn context(
    State(pipeline): State<Pipeline>,
    Path((owner, name)): Path<(String, String)>,
) -> ApiResult<Vec<ContextEntry>> {
    let repo = repo_id(&owner, &name)?;
    Ok(Json(pipeline.retriever().get_mcp_context(&repo).await?))
}

fn repo_id(owner: &str, name: &str) -> Result<RepoId, ApiError> {
    Ok(RepoId::new(format!("{owner}/{name}"))?)
}

//! Inbound query shapes and validation.
//!
//! Validation happens before the pipeline is touched, so a rejected request
//! never reaches the cache or the network.

use serde::{Deserialize, Serialize};

use repoquery_shared::{RepoId, RepoQueryError, Result};

use crate::pipeline::{Pipeline, PipelineState, ProgressReporter};

/// Message returned for a request missing either field.
pub const MISSING_FIELDS_MESSAGE: &str = "question and repo required";

/// Raw request body: `{question, repo}`, both optional until validated.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryRequest {
    #[serde(default)]
    pub question: Option<String>,
    #[serde(default)]
    pub repo: Option<String>,
}

/// A validated query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryInput {
    pub question: String,
    pub repo: RepoId,
}

impl QueryRequest {
    /// Reject missing or blank fields.
    pub fn validate(self) -> Result<QueryInput> {
        let question = self
            .question
            .filter(|q| !q.trim().is_empty())
            .ok_or_else(|| RepoQueryError::validation(MISSING_FIELDS_MESSAGE))?;
        let repo = self
            .repo
            .filter(|r| !r.trim().is_empty())
            .ok_or_else(|| RepoQueryError::validation(MISSING_FIELDS_MESSAGE))?;

        Ok(QueryInput {
            question,
            repo: RepoId::new(repo)?,
        })
    }
}

/// Response body: `{answer, steps, retrievedContent}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    pub answer: Option<String>,
    pub steps: Vec<String>,
    pub retrieved_content: String,
}

impl From<PipelineState> for QueryResponse {
    fn from(state: PipelineState) -> Self {
        Self {
            answer: state.answer,
            steps: state.steps,
            retrieved_content: state.retrieved_content.unwrap_or_default(),
        }
    }
}

/// Validate `request` and run it through `pipeline`.
pub async fn answer_query(
    pipeline: &Pipeline,
    request: QueryRequest,
    progress: &dyn ProgressReporter,
) -> Result<QueryResponse> {
    let input = request.validate()?;
    Ok(pipeline.run(input, progress).await.into())
}

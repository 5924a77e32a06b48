//! Stage bodies. Each reads the current state and returns a partial update.

use tracing::{debug, info, warn};

use crate::pipeline::{PipelineState, Stage, StateUpdate};
use crate::retriever::Retriever;

/// Fetch the README. Failure is logged and recorded as empty content.
pub(crate) async fn retrieve(state: &PipelineState, retriever: &Retriever) -> StateUpdate {
    let content = match retriever.get_readme(&state.repo).await {
        Ok(text) => {
            debug!(bytes = text.len(), "README retrieved");
            text
        }
        Err(e) => {
            warn!(repo = %state.repo, error = %e, "retrieval failed, continuing without content");
            String::new()
        }
    };

    StateUpdate::step(Stage::Retrieve).with_retrieved_content(content)
}

pub(crate) fn plan(_state: &PipelineState) -> StateUpdate {
    StateUpdate::step(Stage::Plan)
}

/// Produce the answer. Must run before [`log`].
pub(crate) fn summarize(state: &PipelineState) -> StateUpdate {
    StateUpdate::step(Stage::Summarize).with_answer(format!("Summary for {}", state.question))
}

/// Record run metadata. Nothing is persisted.
pub(crate) fn log(state: &PipelineState) -> StateUpdate {
    if state.answer.is_none() {
        warn!("logging stage reached without an answer");
    }
    info!(
        repo = %state.repo,
        steps = ?state.steps,
        retrieved_bytes = state.retrieved_content.as_deref().map_or(0, str::len),
        answered = state.answer.is_some(),
        "query handled"
    );
    StateUpdate::step(Stage::Log)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::QueryInput;
    use repoquery_shared::RepoId;

    fn state() -> PipelineState {
        PipelineState::new(QueryInput {
            question: "How do I build it?".into(),
            repo: RepoId::new("o/r").unwrap(),
        })
    }

    #[test]
    fn summarize_sets_answer_from_question() {
        let update = summarize(&state());
        assert_eq!(update.steps, ["summarising"]);
        assert_eq!(update.answer.as_deref(), Some("Summary for How do I build it?"));
        assert!(update.retrieved_content.is_none());
    }

    #[test]
    fn plan_and_log_only_record_steps() {
        assert_eq!(plan(&state()), StateUpdate::step(Stage::Plan));
        assert_eq!(log(&state()), StateUpdate::step(Stage::Log));
    }
}

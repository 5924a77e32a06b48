//! Sequential query pipeline: Retrieve → Plan → Summarize → Log → done.
//!
//! Stages never mutate the running state. Each one returns a [`StateUpdate`]
//! and the engine folds it in with [`PipelineState::apply`], which is the
//! only merge policy the pipeline has:
//! - `steps`: concatenated in order (append-only)
//! - every other field: overwritten when the update carries a value

use std::sync::Arc;
use std::time::Instant;

use tracing::{info, instrument};
use uuid::Uuid;

use repoquery_shared::RepoId;

use crate::query::QueryInput;
use crate::retriever::Retriever;
use crate::stages;

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Running state of one query, created per request and dropped after it.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineState {
    pub question: String,
    pub repo: RepoId,
    /// Names of the stages that have run, in order.
    pub steps: Vec<String>,
    pub answer: Option<String>,
    pub retrieved_content: Option<String>,
}

impl PipelineState {
    /// Fresh state with no steps recorded.
    pub fn new(input: QueryInput) -> Self {
        Self {
            question: input.question,
            repo: input.repo,
            steps: Vec::new(),
            answer: None,
            retrieved_content: None,
        }
    }

    /// Merge a stage's partial output into the state.
    #[must_use]
    pub fn apply(mut self, update: StateUpdate) -> Self {
        self.steps.extend(update.steps);
        if let Some(answer) = update.answer {
            self.answer = Some(answer);
        }
        if let Some(content) = update.retrieved_content {
            self.retrieved_content = Some(content);
        }
        self
    }
}

/// Partial state produced by a stage.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateUpdate {
    pub steps: Vec<String>,
    pub answer: Option<String>,
    pub retrieved_content: Option<String>,
}

impl StateUpdate {
    /// An update that only records `stage` as having run.
    pub fn step(stage: Stage) -> Self {
        Self {
            steps: vec![stage.step_name().to_string()],
            ..Self::default()
        }
    }

    pub fn with_answer(mut self, answer: impl Into<String>) -> Self {
        self.answer = Some(answer.into());
        self
    }

    pub fn with_retrieved_content(mut self, content: impl Into<String>) -> Self {
        self.retrieved_content = Some(content.into());
        self
    }
}

// ---------------------------------------------------------------------------
// Stages
// ---------------------------------------------------------------------------

/// Pipeline stages. `next()` returning `None` is the terminal `Done` state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Retrieve,
    Plan,
    Summarize,
    Log,
}

impl Stage {
    /// Entry point of every run.
    pub const FIRST: Stage = Stage::Retrieve;

    /// The stage that follows this one, or `None` once the run is done.
    pub fn next(self) -> Option<Stage> {
        match self {
            Self::Retrieve => Some(Self::Plan),
            Self::Plan => Some(Self::Summarize),
            Self::Summarize => Some(Self::Log),
            Self::Log => None,
        }
    }

    /// Name appended to `steps` when the stage runs.
    pub fn step_name(self) -> &'static str {
        match self {
            Self::Retrieve => "retrieving",
            Self::Plan => "planning",
            Self::Summarize => "summarising",
            Self::Log => "logging",
        }
    }
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called before a stage runs.
    fn stage(&self, stage: Stage);
    /// Called once the run reaches `Done`.
    fn done(&self, state: &PipelineState);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn stage(&self, _stage: Stage) {}
    fn done(&self, _state: &PipelineState) {}
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Runs queries through the stage sequence.
#[derive(Clone)]
pub struct Pipeline {
    retriever: Arc<Retriever>,
}

impl Pipeline {
    pub fn new(retriever: Arc<Retriever>) -> Self {
        Self { retriever }
    }

    /// The retriever the `Retrieve` stage reads through.
    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    /// Run every stage in order. Never fails: retrieval errors degrade to
    /// empty content and later stages are infallible.
    #[instrument(skip_all, fields(repo = %input.repo, run_id = %Uuid::now_v7()))]
    pub async fn run(&self, input: QueryInput, progress: &dyn ProgressReporter) -> PipelineState {
        let start = Instant::now();
        info!("starting pipeline run");

        let mut state = PipelineState::new(input);
        let mut next = Some(Stage::FIRST);

        while let Some(stage) = next {
            progress.stage(stage);
            let update = self.execute(stage, &state).await;
            state = state.apply(update);
            next = stage.next();
        }

        progress.done(&state);
        info!(
            steps = state.steps.len(),
            elapsed_ms = start.elapsed().as_millis(),
            "pipeline run complete"
        );
        state
    }

    async fn execute(&self, stage: Stage, state: &PipelineState) -> StateUpdate {
        match stage {
            Stage::Retrieve => stages::retrieve(state, &self.retriever).await,
            Stage::Plan => stages::plan(state),
            Stage::Summarize => stages::summarize(state),
            Stage::Log => stages::log(state),
        }
    }
}

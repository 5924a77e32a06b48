//! Retrieval and query pipeline for RepoQuery.
//!
//! This crate ties the upstream client and the cache store together into the
//! cache-aside [`Retriever`], and runs queries through the sequential
//! [`Pipeline`].

pub mod pipeline;
pub mod query;
pub mod retriever;
mod stages;

pub use pipeline::{Pipeline, PipelineState, ProgressReporter, SilentProgress, Stage, StateUpdate};
pub use query::{MISSING_FIELDS_MESSAGE, QueryInput, QueryRequest, QueryResponse, answer_query};
pub use retriever::Retriever;

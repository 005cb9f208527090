//! legal-copilot: staged legal document analysis with grounded Q&A
//!
//! A submitted document is segmented into passages and driven through a fixed
//! sequence of stages (indexing, summarization, clause explanation, risk analysis,
//! report assembly). Progress is streamed as ordered events, state survives restarts
//! in SQLite, and questions are answered only from the document's own passages.

pub mod agents;
pub mod config;
pub mod error;
pub mod generation;
pub mod index;
pub mod ingestion;
pub mod pipeline;
pub mod providers;
pub mod qa;
pub mod server;
pub mod storage;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::CopilotConfig;
pub use error::{Error, Result};
pub use pipeline::{Orchestrator, SubmitRequest, Submission};
pub use qa::RetrievalQa;
pub use types::{
    Answer, AskRequest, Document, Passage, PipelineState, ProgressEvent, Report, StageKind,
};

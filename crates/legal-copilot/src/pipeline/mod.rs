//! Per-document analysis pipeline
//!
//! The [`Orchestrator`] owns one state machine per document and drives it through the
//! fixed stage sequence in [`transitions`]. Progress is published through an
//! append-only [`EventLog`] that observers can replay from any sequence number.

mod events;
mod orchestrator;
mod retry;
pub mod transitions;

pub use events::EventLog;
pub use orchestrator::{
    Orchestrator, PipelineSnapshot, PipelineSummary, RecoveryStats, SubmitRequest, Submission,
    CANCELLED_REASON,
};
pub use retry::RetryPolicy;
pub use transitions::{transition_from, Transition, TRANSITIONS};

//! Progress events streamed to observers

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::report::Report;
use super::stage::{PipelineState, StageKind};

/// A state change notification; sequences are per document and start at 0
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub sequence: u64,
    pub document_id: Uuid,
    pub state: PipelineState,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub stage: Option<StageKind>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub digest: Option<String>,
    /// Present only on the Completed event
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub report: Option<Report>,
    /// Present only on the Failed event
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub reason: Option<String>,
    pub emitted_at: chrono::DateTime<chrono::Utc>,
}

impl ProgressEvent {
    /// Event for a state with no stage attached (Uploaded)
    pub fn state(document_id: Uuid, state: PipelineState) -> Self {
        Self {
            sequence: 0,
            document_id,
            state,
            stage: None,
            digest: None,
            report: None,
            reason: None,
            emitted_at: chrono::Utc::now(),
        }
    }

    /// Event for a completed stage
    pub fn stage_completed(
        document_id: Uuid,
        state: PipelineState,
        stage: StageKind,
        digest: String,
        report: Option<Report>,
    ) -> Self {
        Self {
            stage: Some(stage),
            digest: Some(digest),
            report,
            ..Self::state(document_id, state)
        }
    }

    /// Terminal failure event
    pub fn failed(document_id: Uuid, stage: Option<StageKind>, reason: String) -> Self {
        Self {
            stage,
            reason: Some(reason),
            ..Self::state(document_id, PipelineState::Failed)
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

//! The stage transition table

use crate::error::{Error, Result};
use crate::types::{PipelineState, StageKind, StageResult};

/// One row of the transition table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: PipelineState,
    pub stage: StageKind,
    pub to: PipelineState,
    /// Stage results that must already be recorded
    pub requires: &'static [StageKind],
}

pub const TRANSITIONS: [Transition; 5] = [
    Transition {
        from: PipelineState::Uploaded,
        stage: StageKind::Index,
        to: PipelineState::Parsed,
        requires: &[],
    },
    Transition {
        from: PipelineState::Parsed,
        stage: StageKind::Summarize,
        to: PipelineState::Summarized,
        requires: &[],
    },
    Transition {
        from: PipelineState::Summarized,
        stage: StageKind::ExplainClauses,
        to: PipelineState::ClausesExplained,
        requires: &[StageKind::Summarize],
    },
    Transition {
        from: PipelineState::ClausesExplained,
        stage: StageKind::AnalyzeRisk,
        to: PipelineState::RiskCalculated,
        requires: &[StageKind::Summarize, StageKind::ExplainClauses],
    },
    Transition {
        from: PipelineState::RiskCalculated,
        stage: StageKind::AssembleReport,
        to: PipelineState::Completed,
        requires: &[
            StageKind::Summarize,
            StageKind::ExplainClauses,
            StageKind::AnalyzeRisk,
        ],
    },
];

/// The transition leaving `state`; terminal states have none
pub fn transition_from(state: PipelineState) -> Option<&'static Transition> {
    TRANSITIONS.iter().find(|t| t.from == state)
}

impl Transition {
    /// Verify every required result is present and this stage has not run yet
    pub fn check(&self, results: &[StageResult]) -> Result<()> {
        if results.iter().any(|r| r.stage == self.stage) {
            return Err(Error::InvalidTransition(format!(
                "{} already has a recorded result",
                self.stage
            )));
        }
        if let Some(missing) = self
            .requires
            .iter()
            .find(|required| !results.iter().any(|r| r.stage == **required))
        {
            return Err(Error::InvalidTransition(format!(
                "{} requires a {} result",
                self.stage, missing
            )));
        }
        Ok(())
    }
}

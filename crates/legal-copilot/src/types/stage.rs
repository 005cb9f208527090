//! Pipeline states, stage identifiers, and stage results

use serde::{Deserialize, Serialize};
use std::fmt;

use super::report::Report;
use super::risk::RiskProfile;

/// Position of a document in the fixed stage-completion sequence
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Uploaded,
    Parsed,
    Summarized,
    ClausesExplained,
    RiskCalculated,
    Completed,
    Failed,
}

impl PipelineState {
    /// The next state on the success path, if any
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Uploaded => Some(Self::Parsed),
            Self::Parsed => Some(Self::Summarized),
            Self::Summarized => Some(Self::ClausesExplained),
            Self::ClausesExplained => Some(Self::RiskCalculated),
            Self::RiskCalculated => Some(Self::Completed),
            Self::Completed | Self::Failed => None,
        }
    }

    /// Completed and Failed are terminal
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether moving to `to` respects the strict ordering
    pub fn can_transition_to(self, to: Self) -> bool {
        if self.is_terminal() {
            return false;
        }
        to == Self::Failed || self.next() == Some(to)
    }

    /// The passage index exists from Parsed onward
    pub fn is_indexed(self) -> bool {
        matches!(
            self,
            Self::Parsed
                | Self::Summarized
                | Self::ClausesExplained
                | Self::RiskCalculated
                | Self::Completed
        )
    }

    /// Stable label used in events and storage
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Uploaded => "uploaded",
            Self::Parsed => "parsed",
            Self::Summarized => "summarized",
            Self::ClausesExplained => "clauses_explained",
            Self::RiskCalculated => "risk_calculated",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Parse a stored label
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "uploaded" => Some(Self::Uploaded),
            "parsed" => Some(Self::Parsed),
            "summarized" => Some(Self::Summarized),
            "clauses_explained" => Some(Self::ClausesExplained),
            "risk_calculated" => Some(Self::RiskCalculated),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pipeline stage identifier, in execution order
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Index,
    Summarize,
    ExplainClauses,
    AnalyzeRisk,
    AssembleReport,
}

impl StageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Index => "index",
            Self::Summarize => "summarize",
            Self::ExplainClauses => "explain_clauses",
            Self::AnalyzeRisk => "analyze_risk",
            Self::AssembleReport => "assemble_report",
        }
    }

    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "index" => Some(Self::Index),
            "summarize" => Some(Self::Summarize),
            "explain_clauses" => Some(Self::ExplainClauses),
            "analyze_risk" => Some(Self::AnalyzeRisk),
            "assemble_report" => Some(Self::AssembleReport),
            _ => None,
        }
    }

    /// Human-readable name for failure messages
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Index => "indexing",
            Self::Summarize => "summarization",
            Self::ExplainClauses => "clause explanation",
            Self::AnalyzeRisk => "risk analysis",
            Self::AssembleReport => "report assembly",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable output of one completed stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageResult {
    pub stage: StageKind,
    pub payload: StagePayload,
    pub recorded_at: chrono::DateTime<chrono::Utc>,
}

impl StageResult {
    pub fn new(stage: StageKind, payload: StagePayload) -> Self {
        Self {
            stage,
            payload,
            recorded_at: chrono::Utc::now(),
        }
    }
}

/// Structured payload produced by a stage
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StagePayload {
    Indexed(IndexSummary),
    Summary(DocumentSummary),
    Clauses(ClauseExplanations),
    Risk(RiskAssessment),
    Report(Report),
}

impl StagePayload {
    /// One-line digest carried by progress events
    pub fn digest(&self) -> String {
        match self {
            Self::Indexed(s) => format!(
                "Indexed {} passages ({} dimensions)",
                s.passage_count, s.dimensions
            ),
            Self::Summary(s) => {
                let first = s.summary.split_terminator(". ").next().unwrap_or("").trim();
                if first.is_empty() {
                    format!("Summary with {} key points", s.key_points.len())
                } else {
                    format!("{} ({} key points)", first.trim_end_matches('.'), s.key_points.len())
                }
            }
            Self::Clauses(c) => format!("Explained {} complex clauses", c.clauses.len()),
            Self::Risk(r) => format!(
                "Risk score {}/100 ({}), {} findings",
                r.profile.score,
                r.profile.category,
                r.profile.findings.len()
            ),
            Self::Report(r) => format!("Report assembled with {} sections", r.sections.len()),
        }
    }
}

/// Result of the indexing stage
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndexSummary {
    pub passage_count: usize,
    pub dimensions: usize,
}

/// Result of the summarizer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub summary: String,
    pub key_points: Vec<String>,
    pub detailed_explanation: String,
    #[serde(default)]
    pub unclear_points: Vec<String>,
}

/// Result of the clause explainer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClauseExplanations {
    #[serde(rename = "simplified_clauses")]
    pub clauses: Vec<ExplainedClause>,
}

/// A complex clause and its plain-language explanation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplainedClause {
    pub original_clause: String,
    pub simplified_explanation: String,
}

/// Result of the risk analyzer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub profile: RiskProfile,
    #[serde(default)]
    pub assumptions_or_uncertainties: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORDER: [PipelineState; 6] = [
        PipelineState::Uploaded,
        PipelineState::Parsed,
        PipelineState::Summarized,
        PipelineState::ClausesExplained,
        PipelineState::RiskCalculated,
        PipelineState::Completed,
    ];

    #[test]
    fn test_success_path_is_strictly_increasing() {
        for pair in ORDER.windows(2) {
            assert!(pair[0] < pair[1]);
            assert_eq!(pair[0].next(), Some(pair[1]));
            assert!(pair[0].can_transition_to(pair[1]));
        }
    }

    #[test]
    fn test_no_skips_or_revisits() {
        assert!(!PipelineState::Uploaded.can_transition_to(PipelineState::Summarized));
        assert!(!PipelineState::Summarized.can_transition_to(PipelineState::Parsed));
        assert!(!PipelineState::Parsed.can_transition_to(PipelineState::Parsed));
    }

    #[test]
    fn test_failed_reachable_from_non_terminal_only() {
        for state in &ORDER[..5] {
            assert!(state.can_transition_to(PipelineState::Failed));
        }
        assert!(!PipelineState::Completed.can_transition_to(PipelineState::Failed));
        assert!(!PipelineState::Failed.can_transition_to(PipelineState::Failed));
    }

    #[test]
    fn test_labels_round_trip() {
        for state in ORDER.iter().chain(std::iter::once(&PipelineState::Failed)) {
            assert_eq!(PipelineState::parse(state.as_str()), Some(*state));
        }
        for stage in [
            StageKind::Index,
            StageKind::Summarize,
            StageKind::ExplainClauses,
            StageKind::AnalyzeRisk,
            StageKind::AssembleReport,
        ] {
            assert_eq!(StageKind::parse(stage.as_str()), Some(stage));
        }
    }

    #[test]
    fn test_is_indexed() {
        assert!(!PipelineState::Uploaded.is_indexed());
        assert!(!PipelineState::Failed.is_indexed());
        assert!(PipelineState::Parsed.is_indexed());
        assert!(PipelineState::Completed.is_indexed());
    }
}

//! Core types for document analysis and Q&A

pub mod answer;
pub mod document;
pub mod event;
pub mod report;
pub mod risk;
pub mod stage;

pub use answer::{Answer, AskRequest, ChatTurn, INSUFFICIENT_INFORMATION_ANSWER};
pub use document::{Document, Passage};
pub use event::ProgressEvent;
pub use report::{Report, ReportSection, REPORT_HEADINGS};
pub use risk::{
    FindingCategory, Probability, RiskCategory, RiskFinding, RiskProfile, Severity,
};
pub use stage::{
    ClauseExplanations, DocumentSummary, ExplainedClause, IndexSummary, PipelineState,
    RiskAssessment, StageKind, StagePayload, StageResult,
};

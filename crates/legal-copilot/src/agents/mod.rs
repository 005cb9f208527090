//! Stage agents
//!
//! Each agent turns the document text and earlier stage results into exactly one
//! structured payload. Generative agents go through the injected [`LlmProvider`];
//! indexing goes through the [`PassageIndex`].

mod clause_explainer;
mod indexing;
mod report_assembler;
mod risk_analyzer;
mod summarizer;

pub use clause_explainer::ClauseExplainer;
pub use indexing::IndexingStage;
pub use report_assembler::ReportAssembler;
pub use risk_analyzer::RiskAnalyzer;
pub use summarizer::Summarizer;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::index::PassageIndex;
use crate::providers::LlmProvider;
use crate::storage::PipelineDb;
use crate::types::{
    ClauseExplanations, Document, DocumentSummary, RiskAssessment, StageKind, StagePayload,
    StageResult,
};

/// Input handed to a stage: the document and every result recorded so far
#[derive(Debug, Clone)]
pub struct AgentContext {
    pub document: Arc<Document>,
    pub results: Vec<StageResult>,
}

impl AgentContext {
    pub fn new(document: Arc<Document>, results: Vec<StageResult>) -> Self {
        Self { document, results }
    }

    fn payload(&self, stage: StageKind) -> Option<&StagePayload> {
        self.results
            .iter()
            .find(|r| r.stage == stage)
            .map(|r| &r.payload)
    }

    /// Summarizer output
    pub fn summary(&self) -> Result<&DocumentSummary> {
        match self.payload(StageKind::Summarize) {
            Some(StagePayload::Summary(s)) => Ok(s),
            _ => Err(missing(StageKind::Summarize)),
        }
    }

    /// Clause explainer output
    pub fn clauses(&self) -> Result<&ClauseExplanations> {
        match self.payload(StageKind::ExplainClauses) {
            Some(StagePayload::Clauses(c)) => Ok(c),
            _ => Err(missing(StageKind::ExplainClauses)),
        }
    }

    /// Risk analyzer output
    pub fn risk(&self) -> Result<&RiskAssessment> {
        match self.payload(StageKind::AnalyzeRisk) {
            Some(StagePayload::Risk(r)) => Ok(r),
            _ => Err(missing(StageKind::AnalyzeRisk)),
        }
    }
}

fn missing(stage: StageKind) -> Error {
    Error::internal(format!("required {} result is missing", stage))
}

/// A single pipeline stage
#[async_trait]
pub trait StageAgent: Send + Sync {
    /// Stage this agent executes
    fn stage(&self) -> StageKind;

    /// Produce the stage payload; may be called again after a transient failure
    async fn run(&self, ctx: &AgentContext) -> Result<StagePayload>;
}

/// The agent registered for each stage
#[derive(Clone)]
pub struct StageAgents {
    agents: HashMap<StageKind, Arc<dyn StageAgent>>,
}

impl StageAgents {
    /// Default agents backed by one LLM provider and the passage index
    pub fn new(llm: Arc<dyn LlmProvider>, index: Arc<PassageIndex>, db: Arc<PipelineDb>) -> Self {
        Self::empty()
            .with_agent(Arc::new(IndexingStage::new(index, db)))
            .with_agent(Arc::new(Summarizer::new(Arc::clone(&llm))))
            .with_agent(Arc::new(ClauseExplainer::new(Arc::clone(&llm))))
            .with_agent(Arc::new(RiskAnalyzer::new(Arc::clone(&llm))))
            .with_agent(Arc::new(ReportAssembler::new(llm)))
    }

    pub fn empty() -> Self {
        Self {
            agents: HashMap::new(),
        }
    }

    /// Register an agent, replacing any existing agent for the same stage
    pub fn with_agent(mut self, agent: Arc<dyn StageAgent>) -> Self {
        self.agents.insert(agent.stage(), agent);
        self
    }

    pub fn get(&self, stage: StageKind) -> Result<Arc<dyn StageAgent>> {
        self.agents
            .get(&stage)
            .cloned()
            .ok_or_else(|| Error::internal(format!("no agent registered for {}", stage)))
    }
}

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::generation::{parse_agent_json, PromptBuilder};
use crate::providers::LlmProvider;
use crate::types::{
    FindingCategory, Probability, RiskAssessment, RiskFinding, RiskProfile, Severity, StageKind,
    StagePayload,
};

use super::{AgentContext, StageAgent};

/// Identifies risks and computes the document's risk profile
///
/// Any score or level the model reports is ignored; the profile is always derived
/// from the findings' severities and probabilities.
pub struct RiskAnalyzer {
    llm: Arc<dyn LlmProvider>,
}

impl RiskAnalyzer {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }
}

#[derive(Deserialize)]
struct RiskReply {
    risks: Vec<RawFinding>,
    #[serde(default)]
    assumptions_or_uncertainties: Vec<String>,
}

#[derive(Deserialize)]
struct RawFinding {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    category: Option<String>,
    severity: String,
    #[serde(default)]
    probability: Option<String>,
    #[serde(default)]
    clause_reference: Option<String>,
    #[serde(default)]
    clause_excerpt: Option<String>,
    explanation: String,
    #[serde(default)]
    recommendation: Option<String>,
}

#[async_trait]
impl StageAgent for RiskAnalyzer {
    fn stage(&self) -> StageKind {
        StageKind::AnalyzeRisk
    }

    async fn run(&self, ctx: &AgentContext) -> Result<StagePayload> {
        let prompt =
            PromptBuilder::analyze_risk(&ctx.document.raw_text, ctx.summary()?, ctx.clauses()?);
        let reply = self.llm.generate_structured(&prompt).await?;

        let parsed: RiskReply = parse_agent_json(self.stage(), &reply)?;
        let findings = parsed
            .risks
            .into_iter()
            .enumerate()
            .map(|(i, raw)| to_finding(i, raw))
            .collect::<Result<Vec<_>>>()?;

        Ok(StagePayload::Risk(RiskAssessment {
            profile: RiskProfile::from_findings(findings),
            assumptions_or_uncertainties: parsed.assumptions_or_uncertainties,
        }))
    }
}

fn to_finding(position: usize, raw: RawFinding) -> Result<RiskFinding> {
    let severity = parse_severity(&raw.severity).ok_or_else(|| {
        Error::malformed(
            StageKind::AnalyzeRisk,
            format!("unknown severity '{}'", raw.severity),
        )
    })?;

    Ok(RiskFinding {
        id: raw
            .id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| format!("R{}", position + 1)),
        category: raw
            .category
            .as_deref()
            .map(parse_category)
            .unwrap_or_default(),
        severity,
        probability: raw
            .probability
            .as_deref()
            .map(parse_probability)
            .unwrap_or_default(),
        clause_reference: raw.clause_reference.filter(|r| !r.trim().is_empty()),
        clause_excerpt: raw.clause_excerpt.unwrap_or_default(),
        explanation: raw.explanation,
        recommendation: raw.recommendation.unwrap_or_default(),
    })
}

fn parse_severity(value: &str) -> Option<Severity> {
    match value.trim().to_lowercase().as_str() {
        "low" => Some(Severity::Low),
        "medium" | "moderate" => Some(Severity::Medium),
        "high" => Some(Severity::High),
        "critical" => Some(Severity::Critical),
        _ => None,
    }
}

fn parse_probability(value: &str) -> Probability {
    match value.trim().to_lowercase().as_str() {
        "low" => Probability::Low,
        "medium" | "moderate" => Probability::Medium,
        "high" => Probability::High,
        _ => Probability::Unknown,
    }
}

fn parse_category(value: &str) -> FindingCategory {
    match value.trim().to_lowercase().as_str() {
        "legal" => FindingCategory::Legal,
        "financial" => FindingCategory::Financial,
        "operational" => FindingCategory::Operational,
        "privacy" => FindingCategory::Privacy,
        "compliance" => FindingCategory::Compliance,
        _ => FindingCategory::Other,
    }
}

//! Shared fakes for unit tests

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::agents::AgentContext;
use crate::error::{Error, Result};
use crate::generation::prompt::{
    CLAUSE_EXPLAINER_ROLE, QA_ROLE, REPORT_ASSEMBLER_ROLE, RISK_ANALYST_ROLE, SUMMARIZER_ROLE,
};
use crate::ingestion::Segmenter;
use crate::providers::LlmProvider;
use crate::types::{
    ClauseExplanations, Document, DocumentSummary, ExplainedClause, FindingCategory,
    Probability, RiskAssessment, RiskFinding, RiskProfile, Severity, StageKind, StagePayload,
    StageResult,
};

pub const CONTRACT: &str = "This Agreement is made between Acme Corp and Beta LLC. \
    Either party may terminate this Agreement with thirty days written notice to the other party. \
    The Receiving Party shall keep all Confidential Information strictly confidential for five years. \
    Beta LLC shall pay all invoices within fifteen days of receipt. \
    Late payments accrue interest at two percent per month.";

pub const SUMMARY_REPLY: &str = r#"Here is the analysis:
```json
{"summary": "A services agreement between Acme Corp and Beta LLC. It covers termination and confidentiality.",
 "key_points": ["Either party may terminate on thirty days notice", "Confidentiality lasts five years"],
 "detailed_explanation": "The agreement can be ended by either side with notice.",
 "unclear_points": ["Governing law is not stated"]}
```"#;

pub const CLAUSES_REPLY: &str = r#"{"simplified_clauses": [
  {"original_clause": "Either party may terminate this Agreement with thirty days written notice to the other party.",
   "simplified_explanation": "Either side can end the contract by giving a month's notice in writing."},
  {"original_clause": "The Receiving Party shall keep all Confidential Information strictly confidential for five years.",
   "simplified_explanation": "Whoever receives secret information must keep it secret for five years."},
  {"original_clause": "Late payments accrue interest at two percent per month.",
   "simplified_explanation": "Paying late costs an extra two percent every month."}
]}"#;

pub const RISK_REPLY: &str = r#"{"risks": [
  {"id": "R1", "category": "Financial", "severity": "high", "probability": "medium",
   "clause_excerpt": "two percent per month", "explanation": "High late interest.",
   "recommendation": "Negotiate a lower late payment rate."}
], "assumptions_or_uncertainties": ["Currency is not specified"]}"#;

pub const REPORT_REPLY: &str = r#"{"recommendations": ["Confirm the governing law before signing."],
 "highlights": ["Thirty day termination right", "Two percent monthly late interest"]}"#;

pub const QA_REPLY: &str =
    "Yes. Either party may terminate the Agreement with thirty days written notice.";

/// Text-generation fake keyed by the role named in each prompt
///
/// Replies are matched on the first registered marker the prompt contains. Injected
/// failures can be narrowed to prompts that also contain a given needle, which lets a
/// test target one document's stage.
#[derive(Default)]
pub struct ScriptedLlm {
    replies: Vec<(String, String)>,
    transient_failures: Mutex<Vec<FailurePlan>>,
    delays: HashMap<String, Duration>,
    prompts: Mutex<Vec<(String, String)>>,
}

struct FailurePlan {
    marker: String,
    needle: Option<String>,
    remaining: u32,
}

impl ScriptedLlm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Well-formed replies for every stage and Q&A
    pub fn happy_path() -> Self {
        Self::new()
            .reply(SUMMARIZER_ROLE, SUMMARY_REPLY)
            .reply(CLAUSE_EXPLAINER_ROLE, CLAUSES_REPLY)
            .reply(RISK_ANALYST_ROLE, RISK_REPLY)
            .reply(REPORT_ASSEMBLER_ROLE, REPORT_REPLY)
            .reply(QA_ROLE, QA_REPLY)
    }

    pub fn reply(mut self, marker: &str, text: &str) -> Self {
        self.replies.retain(|(m, _)| m != marker);
        self.replies.push((marker.to_string(), text.to_string()));
        self
    }

    /// Fail the next `times` calls for `marker` with a transient error
    pub fn fail_transient(self, marker: &str, times: u32) -> Self {
        self.plan_failures(marker, None, times)
    }

    /// Fail the next `times` calls for `marker` whose prompt contains `needle`
    pub fn fail_transient_matching(self, marker: &str, needle: &str, times: u32) -> Self {
        self.plan_failures(marker, Some(needle), times)
    }

    fn plan_failures(self, marker: &str, needle: Option<&str>, times: u32) -> Self {
        self.transient_failures.lock().push(FailurePlan {
            marker: marker.to_string(),
            needle: needle.map(str::to_string),
            remaining: times,
        });
        self
    }

    /// Sleep before answering prompts for `marker`
    pub fn delay(mut self, marker: &str, duration: Duration) -> Self {
        self.delays.insert(marker.to_string(), duration);
        self
    }

    /// Number of calls seen for `marker`, failures included
    pub fn calls(&self, marker: &str) -> u32 {
        self.prompts.lock().iter().filter(|(m, _)| m == marker).count() as u32
    }

    /// Number of calls for `marker` whose prompt contained `needle`
    pub fn calls_matching(&self, marker: &str, needle: &str) -> u32 {
        self.prompts
            .lock()
            .iter()
            .filter(|(m, prompt)| m == marker && prompt.contains(needle))
            .count() as u32
    }

    fn marker_for(&self, prompt: &str) -> Option<&str> {
        self.replies
            .iter()
            .map(|(m, _)| m.as_str())
            .find(|m| prompt.contains(&format!("You are {}", m)))
    }

    fn take_failure(&self, marker: &str, prompt: &str) -> bool {
        let mut plans = self.transient_failures.lock();
        let plan = plans.iter_mut().find(|plan| {
            plan.remaining > 0
                && plan.marker == marker
                && plan.needle.as_deref().map_or(true, |n| prompt.contains(n))
        });
        match plan {
            Some(plan) => {
                plan.remaining -= 1;
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl LlmProvider for ScriptedLlm {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let marker = self
            .marker_for(prompt)
            .ok_or_else(|| Error::llm("no scripted reply for prompt"))?
            .to_string();

        self.prompts
            .lock()
            .push((marker.clone(), prompt.to_string()));

        if let Some(delay) = self.delays.get(&marker) {
            tokio::time::sleep(*delay).await;
        }

        if self.take_failure(&marker, prompt) {
            return Err(Error::transient(format!("{} unavailable (503)", marker)));
        }

        self.replies
            .iter()
            .find(|(m, _)| *m == marker)
            .map(|(_, r)| r.clone())
            .ok_or_else(|| Error::llm("no scripted reply for prompt"))
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    fn name(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        "scripted"
    }
}

/// Shared handle so a test can inspect call counts after handing the fake out
pub fn shared(llm: ScriptedLlm) -> (Arc<ScriptedLlm>, Arc<dyn LlmProvider>) {
    let llm = Arc::new(llm);
    let provider: Arc<dyn LlmProvider> = llm.clone();
    (llm, provider)
}

/// Segmented sample contract
pub fn sample_document() -> Document {
    let id = Uuid::new_v4();
    let passages = Segmenter::new(120, 0)
        .segment(id, CONTRACT)
        .unwrap_or_default();
    Document::new(id, "Services Agreement".to_string(), CONTRACT.to_string(), passages)
}

/// Context holding the first `completed` generative results (summary, clauses, risk)
pub fn analysis_context(completed: usize) -> AgentContext {
    let summary = DocumentSummary {
        summary: "A services agreement between Acme Corp and Beta LLC.".to_string(),
        key_points: vec![
            "Thirty day termination".to_string(),
            "Five year confidentiality".to_string(),
        ],
        detailed_explanation: "Either side can end the agreement.".to_string(),
        unclear_points: vec!["Governing law is not stated".to_string()],
    };
    let clauses = ClauseExplanations {
        clauses: vec![ExplainedClause {
            original_clause: "Late payments accrue interest at two percent per month.".to_string(),
            simplified_explanation: "Paying late costs two percent a month.".to_string(),
        }],
    };
    let risk = RiskAssessment {
        profile: RiskProfile::from_findings(vec![RiskFinding {
            id: "R1".to_string(),
            category: FindingCategory::Financial,
            severity: Severity::High,
            probability: Probability::Medium,
            clause_reference: Some("Payment".to_string()),
            clause_excerpt: "two percent per month".to_string(),
            explanation: "High late interest.".to_string(),
            recommendation: "Negotiate the rate.".to_string(),
        }]),
        assumptions_or_uncertainties: vec!["Currency is not specified".to_string()],
    };

    let results = [
        StageResult::new(StageKind::Summarize, StagePayload::Summary(summary)),
        StageResult::new(StageKind::ExplainClauses, StagePayload::Clauses(clauses)),
        StageResult::new(StageKind::AnalyzeRisk, StagePayload::Risk(risk)),
    ]
    .into_iter()
    .take(completed)
    .collect();

    AgentContext::new(Arc::new(sample_document()), results)
}

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::generation::{parse_agent_json, PromptBuilder};
use crate::providers::LlmProvider;
use crate::types::{DocumentSummary, StageKind, StagePayload};

use super::{AgentContext, StageAgent};

/// Produces the summary, key points, and plain-language explanation
pub struct Summarizer {
    llm: Arc<dyn LlmProvider>,
}

impl Summarizer {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl StageAgent for Summarizer {
    fn stage(&self) -> StageKind {
        StageKind::Summarize
    }

    async fn run(&self, ctx: &AgentContext) -> Result<StagePayload> {
        let prompt = PromptBuilder::summarize(&ctx.document.raw_text);
        let reply = self.llm.generate_structured(&prompt).await?;

        let summary: DocumentSummary = parse_agent_json(self.stage(), &reply)?;
        if summary.summary.trim().is_empty() {
            return Err(Error::malformed(self.stage(), "summary is empty"));
        }

        Ok(StagePayload::Summary(summary))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{analysis_context, ScriptedLlm, SUMMARY_REPLY};

    #[tokio::test]
    async fn test_parses_fenced_reply() {
        let llm = ScriptedLlm::new().reply("SummarizerAgent", SUMMARY_REPLY);
        let payload = Summarizer::new(Arc::new(llm))
            .run(&analysis_context(0))
            .await
            .unwrap();
        let StagePayload::Summary(summary) = payload else {
            panic!("expected summary payload");
        };
        assert_eq!(summary.key_points.len(), 2);
        assert_eq!(summary.unclear_points, vec!["Governing law is not stated"]);
    }

    #[tokio::test]
    async fn test_missing_fields_are_malformed() {
        let llm = ScriptedLlm::new().reply("SummarizerAgent", r#"{"summary": "Short."}"#);
        let err = Summarizer::new(Arc::new(llm))
            .run(&analysis_context(0))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::MalformedAgentOutput {
                stage: StageKind::Summarize,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_blank_summary_is_malformed() {
        let llm = ScriptedLlm::new().reply(
            "SummarizerAgent",
            r#"{"summary": "  ", "key_points": [], "detailed_explanation": ""}"#,
        );
        assert!(Summarizer::new(Arc::new(llm))
            .run(&analysis_context(0))
            .await
            .is_err());
    }
}

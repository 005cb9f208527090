use async_trait::async_trait;
use std::sync::Arc;

use crate::error::Result;
use crate::generation::{parse_agent_json, PromptBuilder};
use crate::providers::LlmProvider;
use crate::types::{ClauseExplanations, StageKind, StagePayload};

use super::{AgentContext, StageAgent};

/// Rewrites complex clauses in plain language
pub struct ClauseExplainer {
    llm: Arc<dyn LlmProvider>,
}

impl ClauseExplainer {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl StageAgent for ClauseExplainer {
    fn stage(&self) -> StageKind {
        StageKind::ExplainClauses
    }

    async fn run(&self, ctx: &AgentContext) -> Result<StagePayload> {
        let prompt = PromptBuilder::explain_clauses(&ctx.document.raw_text, ctx.summary()?);
        let reply = self.llm.generate_structured(&prompt).await?;

        let mut explained: ClauseExplanations = parse_agent_json(self.stage(), &reply)?;
        explained
            .clauses
            .retain(|c| !c.original_clause.trim().is_empty());

        Ok(StagePayload::Clauses(explained))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::test_support::{analysis_context, ScriptedLlm};

    #[tokio::test]
    async fn test_drops_clauses_without_original_text() {
        let llm = ScriptedLlm::new().reply(
            "ClauseExplainerAgent",
            r#"Sure! {"simplified_clauses": [
                {"original_clause": "Time is of the essence.", "simplified_explanation": "Deadlines are strict."},
                {"original_clause": " ", "simplified_explanation": "Nothing to explain."}
            ]}"#,
        );
        let payload = ClauseExplainer::new(Arc::new(llm))
            .run(&analysis_context(1))
            .await
            .unwrap();
        let StagePayload::Clauses(explained) = payload else {
            panic!("expected clauses payload");
        };
        assert_eq!(explained.clauses.len(), 1);
        assert_eq!(explained.clauses[0].original_clause, "Time is of the essence.");
    }

    #[tokio::test]
    async fn test_requires_summary() {
        let llm = ScriptedLlm::new().reply("ClauseExplainerAgent", r#"{"simplified_clauses": []}"#);
        let err = ClauseExplainer::new(Arc::new(llm))
            .run(&analysis_context(0))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
    }
}

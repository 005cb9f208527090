//! Prompt templates for the analysis stages and grounded Q&A

use crate::index::ScoredPassage;
use crate::types::{ChatTurn, ClauseExplanations, DocumentSummary, RiskAssessment};

/// Agent role names; each prompt opens with `You are <role>`
pub const SUMMARIZER_ROLE: &str = "SummarizerAgent";
pub const CLAUSE_EXPLAINER_ROLE: &str = "ClauseExplainerAgent";
pub const RISK_ANALYST_ROLE: &str = "RiskAnalysisAgent";
pub const REPORT_ASSEMBLER_ROLE: &str = "ReportAssemblerAgent";
pub const QA_ROLE: &str = "LegalQA";

/// Prompt builder for stage agents and Q&A
pub struct PromptBuilder;

impl PromptBuilder {
    /// Summarizer prompt over the raw document text
    pub fn summarize(text: &str) -> String {
        format!(
            r#"You are {role}, a legal assistant specialized in analyzing and summarizing legal documents such as contracts, agreements, policies, and regulatory filings.

INSTRUCTIONS:
1) Identify the key legal elements: clauses, obligations, rights, conditions, deadlines, amounts, penalties, and referenced sections.
2) List ambiguous, unclear, or potentially conflicting points under "unclear_points".
3) Retain clause or section numbers where mentioned.
4) Explain in plain language for a non-lawyer without omitting critical legal meaning.
5) Put the most important points first in "key_points".

OUTPUT (STRICT JSON ONLY, no Markdown):
{{
  "summary": "7-10 sentence overview",
  "key_points": ["key point with section reference", "..."],
  "detailed_explanation": "plain-language explanation",
  "unclear_points": ["..."]
}}

DOCUMENT:
{text}
"#,
            role = SUMMARIZER_ROLE,
            text = text
        )
    }

    /// Clause explainer prompt over the raw text and the summary
    pub fn explain_clauses(text: &str, summary: &DocumentSummary) -> String {
        format!(
            r#"You are {role}, an expert at simplifying complex legal clauses.

Identify sentences, phrases, or clauses in the DOCUMENT that are complex or use legal jargon, and explain each in plain language.

RULES:
- Quote the original clause exactly as it appears in the DOCUMENT.
- Keep explanations short, accurate, and easy to understand.
- Do not speculate; only simplify what is explicitly present.
- If no complex clauses are found, return {{"simplified_clauses": []}}.

OUTPUT (STRICT JSON ONLY):
{{
  "simplified_clauses": [
    {{"original_clause": "exact text", "simplified_explanation": "plain-language explanation"}}
  ]
}}

SUMMARY:
{summary}

DOCUMENT:
{text}
"#,
            role = CLAUSE_EXPLAINER_ROLE,
            summary = summary.summary,
            text = text
        )
    }

    /// Risk analysis prompt over the text, summary, and explained clauses
    pub fn analyze_risk(
        text: &str,
        summary: &DocumentSummary,
        clauses: &ClauseExplanations,
    ) -> String {
        let clause_list = if clauses.clauses.is_empty() {
            "(none)".to_string()
        } else {
            clauses
                .clauses
                .iter()
                .enumerate()
                .map(|(i, c)| {
                    format!(
                        "[{}] {}\n    Meaning: {}",
                        i + 1,
                        c.original_clause,
                        c.simplified_explanation
                    )
                })
                .collect::<Vec<_>>()
                .join("\n")
        };

        format!(
            r#"You are {role}, an expert at identifying legal, financial, and operational risks in documents.

TASK:
Identify specific risks strictly grounded in the provided content. Classify each risk as one of:
Legal | Financial | Operational | Privacy | Compliance | Other
For each risk give severity (low/medium/high/critical) and probability (low/medium/high/unknown) based only on the text. Cite a clause or section if available with a short excerpt, and give a concrete mitigation recommendation.

RULES:
- Do NOT invent facts. List anything unclear under "assumptions_or_uncertainties".
- If there are no obvious risks, return an empty "risks" array.
- Prefer the explained clauses when present; otherwise rely on the summary, then the document.

OUTPUT (STRICT JSON ONLY):
{{
  "risks": [
    {{
      "id": "R1",
      "category": "Legal",
      "severity": "medium",
      "probability": "unknown",
      "clause_reference": null,
      "clause_excerpt": "",
      "explanation": "",
      "recommendation": ""
    }}
  ],
  "assumptions_or_uncertainties": []
}}

SUMMARY:
{summary}

EXPLAINED CLAUSES:
{clauses}

DOCUMENT:
{text}
"#,
            role = RISK_ANALYST_ROLE,
            summary = summary.summary,
            clauses = clause_list,
            text = text
        )
    }

    /// Report assembler prompt: asks only for recommendations and highlights
    pub fn assemble_report(
        title: &str,
        summary: &DocumentSummary,
        clauses: &ClauseExplanations,
        risk: &RiskAssessment,
    ) -> String {
        let findings = risk
            .profile
            .findings
            .iter()
            .map(|f| {
                format!(
                    "- {} [{:?}, severity {:?}]: {} Recommendation: {}",
                    f.id, f.category, f.severity, f.explanation, f.recommendation
                )
            })
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            r#"You are {role}, preparing the closing sections of an analysis report for "{title}".

Using ONLY the analysis below, write:
- "recommendations": concrete actions the reader should take before signing or relying on the document.
- "highlights": 3-5 one-line takeaways for the reader.

OUTPUT (STRICT JSON ONLY):
{{
  "recommendations": ["..."],
  "highlights": ["..."]
}}

SUMMARY:
{summary}

KEY POINTS:
{key_points}

COMPLEX CLAUSES EXPLAINED: {clause_count}

OVERALL RISK: {score}/100 ({category})
FINDINGS:
{findings}
"#,
            role = REPORT_ASSEMBLER_ROLE,
            title = title,
            summary = summary.summary,
            key_points = summary.key_points.join("\n"),
            clause_count = clauses.clauses.len(),
            score = risk.profile.score,
            category = risk.profile.category,
            findings = if findings.is_empty() { "(none)".to_string() } else { findings },
        )
    }

    /// Build a numbered context block from retrieved passages
    pub fn build_context(passages: &[ScoredPassage]) -> String {
        passages
            .iter()
            .enumerate()
            .map(|(i, p)| format!("[{}] {}", i + 1, p.passage.text))
            .collect::<Vec<_>>()
            .join("\n\n---\n\n")
    }

    /// Grounded question-answering prompt
    pub fn grounded_answer(question: &str, context: &str, history: &[ChatTurn]) -> String {
        let history = if history.is_empty() {
            String::new()
        } else {
            let turns: Vec<String> = history
                .iter()
                .map(|t| format!("Q: {}\nA: {}", t.question, t.answer))
                .collect();
            format!(
                "\nEARLIER IN THIS CONVERSATION (keep answers consistent):\n{}\n",
                turns.join("\n\n")
            )
        };

        format!(
            r#"You are {role}, a careful assistant answering questions strictly from the provided CONTEXT.

RULES:
1. Only use information found in the CONTEXT; do not invent facts.
2. If the answer is not in the CONTEXT, say so plainly.
3. Be concise and precise, and explain in plain language. Name clauses or sections if visible.
4. If multiple interpretations exist, list them.
5. Quote numbers (fees, penalties, dates) exactly as they appear in the CONTEXT.
{history}
CONTEXT:
{context}

QUESTION: {question}

Answer using ONLY the CONTEXT above:"#,
            role = QA_ROLE,
            history = history,
            context = context,
            question = question
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompts_open_with_role() {
        let summary = DocumentSummary {
            summary: "A services agreement.".to_string(),
            key_points: vec!["One year term".to_string()],
            detailed_explanation: String::new(),
            unclear_points: Vec::new(),
        };
        assert!(PromptBuilder::summarize("text").starts_with("You are SummarizerAgent"));
        assert!(PromptBuilder::explain_clauses("text", &summary)
            .starts_with("You are ClauseExplainerAgent"));
        assert!(PromptBuilder::grounded_answer("q", "c", &[]).starts_with("You are LegalQA"));
    }

    #[test]
    fn test_history_is_included() {
        let history = vec![ChatTurn {
            question: "Who are the parties?".to_string(),
            answer: "Acme and Beta.".to_string(),
        }];
        let prompt = PromptBuilder::grounded_answer("When does it end?", "[1] text", &history);
        assert!(prompt.contains("Q: Who are the parties?\nA: Acme and Beta."));
        assert!(prompt.contains("QUESTION: When does it end?"));
    }
}

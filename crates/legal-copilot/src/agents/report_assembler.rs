use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

use crate::error::Result;
use crate::generation::{parse_agent_json, PromptBuilder};
use crate::providers::LlmProvider;
use crate::types::report::{
    escape_block_markup, inline_text, layout_sections, APPENDIX, COMPLEX_CLAUSES, EXECUTIVE_SUMMARY, KEY_POINTS, RECOMMENDATIONS,
    REPORT_HEADINGS, RISK_ASSESSMENT, TABLE_OF_CONTENTS, UNCLEAR_OR_MISSING,
};
use crate::types::{
    ClauseExplanations, Document, DocumentSummary, Report, RiskAssessment, StageKind,
    StagePayload,
};

use super::{AgentContext, StageAgent};

/// Number of highlights kept on the report
const MAX_HIGHLIGHTS: usize = 5;

/// Builds the final report from the earlier stage results
///
/// The model contributes recommendations and highlights only. Every section is laid
/// out here so the headings and their order never depend on model output.
pub struct ReportAssembler {
    llm: Arc<dyn LlmProvider>,
}

impl ReportAssembler {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }
}

#[derive(Deserialize)]
struct AssemblerReply {
    recommendations: Vec<String>,
    #[serde(default)]
    highlights: Vec<String>,
}

#[async_trait]
impl StageAgent for ReportAssembler {
    fn stage(&self) -> StageKind {
        StageKind::AssembleReport
    }

    async fn run(&self, ctx: &AgentContext) -> Result<StagePayload> {
        let summary = ctx.summary()?;
        let clauses = ctx.clauses()?;
        let risk = ctx.risk()?;

        let prompt = PromptBuilder::assemble_report(&ctx.document.title, summary, clauses, risk);
        let reply = self.llm.generate_structured(&prompt).await?;
        let extra: AssemblerReply = parse_agent_json(self.stage(), &reply)?;

        Ok(StagePayload::Report(build_report(
            &ctx.document,
            summary,
            clauses,
            risk,
            extra,
        )))
    }
}

fn build_report(
    document: &Document,
    summary: &DocumentSummary,
    clauses: &ClauseExplanations,
    risk: &RiskAssessment,
    extra: AssemblerReply,
) -> Report {
    let profile = &risk.profile;

    let mut recommendations: Vec<String> = clean(extra.recommendations);
    if recommendations.is_empty() {
        recommendations = clean(
            profile
                .findings
                .iter()
                .map(|f| f.recommendation.clone())
                .collect(),
        );
    }

    let mut highlights = clean(extra.highlights);
    if highlights.is_empty() {
        highlights = clean(summary.key_points.clone());
    }
    highlights.truncate(MAX_HIGHLIGHTS);

    let unclear: Vec<String> = clean(
        summary
            .unclear_points
            .iter()
            .chain(risk.assumptions_or_uncertainties.iter())
            .cloned()
            .collect(),
    );

    let sections = layout_sections(vec![
        (TABLE_OF_CONTENTS, table_of_contents()),
        (EXECUTIVE_SUMMARY, plain(&summary.summary)),
        (KEY_POINTS, bullets(&clean(summary.key_points.clone()))),
        (COMPLEX_CLAUSES, clause_section(clauses)),
        (RISK_ASSESSMENT, risk_section(risk)),
        (RECOMMENDATIONS, bullets(&recommendations)),
        (UNCLEAR_OR_MISSING, bullets(&unclear)),
        (APPENDIX, appendix(document, summary)),
    ]);

    Report {
        document_id: document.id,
        title: document.title.clone(),
        sections,
        highlights,
        overall_risk_score: profile.score,
        overall_risk_level: profile.category,
        risks_count: profile.findings.len(),
        generated_at: chrono::Utc::now(),
    }
}

fn table_of_contents() -> String {
    REPORT_HEADINGS[1..]
        .iter()
        .enumerate()
        .map(|(i, heading)| format!("{}. {}", i + 1, heading))
        .collect::<Vec<_>>()
        .join("\n")
}

fn clause_section(clauses: &ClauseExplanations) -> String {
    clauses
        .clauses
        .iter()
        .enumerate()
        .map(|(i, c)| {
            format!(
                "**Clause {}**\n\n> {}\n\n{}",
                i + 1,
                plain(&c.original_clause).replace('\n', " "),
                plain(&c.simplified_explanation)
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn risk_section(risk: &RiskAssessment) -> String {
    let profile = &risk.profile;
    let mut out = format!(
        "**Overall risk:** {} ({}/100), {} finding{}",
        profile.category,
        profile.score,
        profile.findings.len(),
        if profile.findings.len() == 1 { "" } else { "s" }
    );

    for finding in &profile.findings {
        out.push_str(&format!(
            "\n\n- **{}** ({:?}, severity {:?}, probability {:?}): {}",
            finding.id,
            finding.category,
            finding.severity,
            finding.probability,
            plain(&finding.explanation)
        ));
        if let Some(reference) = &finding.clause_reference {
            out.push_str(&format!(" Clause: {}.", plain(reference)));
        }
        if !finding.clause_excerpt.trim().is_empty() {
            out.push_str(&format!(" Excerpt: \"{}\"", plain(&finding.clause_excerpt)));
        }
    }

    out
}

fn appendix(document: &Document, summary: &DocumentSummary) -> String {
    let mut out = String::new();
    if !summary.detailed_explanation.trim().is_empty() {
        out.push_str(&plain(&summary.detailed_explanation));
        out.push_str("\n\n");
    }
    out.push_str(&format!(
        "- Document: {}\n- Document ID: {}\n- Content SHA-256: {}\n- Passages indexed: {}",
        inline_text(&document.title),
        document.id,
        document.content_hash,
        document.passages.len()
    ));
    out
}

fn bullets(items: &[String]) -> String {
    items
        .iter()
        .map(|item| format!("- {}", plain(item).replace('\n', " ")))
        .collect::<Vec<_>>()
        .join("\n")
}

fn clean(items: Vec<String>) -> Vec<String> {
    items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Model or caller text as plain paragraphs that cannot open a report section
fn plain(text: &str) -> String {
    let stripped = text
        .lines()
        .map(|line| line.trim_start().trim_start_matches('#').trim_start())
        .collect::<Vec<_>>()
        .join("\n");
    escape_block_markup(&stripped)
}

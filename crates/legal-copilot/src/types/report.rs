//! Final report layout
//!
//! Downstream consumers split the rendered Markdown by exact `## ` heading text, so
//! the eight headings below are a fixed contract: same text, same order, always present.

use pulldown_cmark::{Event, HeadingLevel, Parser, Tag, TagEnd};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::risk::RiskCategory;

pub const TABLE_OF_CONTENTS: &str = "Table of Contents";
pub const EXECUTIVE_SUMMARY: &str = "Executive Summary";
pub const KEY_POINTS: &str = "Key Points";
pub const COMPLEX_CLAUSES: &str = "Complex Clauses Explained";
pub const RISK_ASSESSMENT: &str = "Risk Assessment";
pub const RECOMMENDATIONS: &str = "Recommendations";
pub const UNCLEAR_OR_MISSING: &str = "Unclear or Missing Information";
pub const APPENDIX: &str = "Appendix";

/// Report headings in render order
pub const REPORT_HEADINGS: [&str; 8] = [
    TABLE_OF_CONTENTS,
    EXECUTIVE_SUMMARY,
    KEY_POINTS,
    COMPLEX_CLAUSES,
    RISK_ASSESSMENT,
    RECOMMENDATIONS,
    UNCLEAR_OR_MISSING,
    APPENDIX,
];

/// Body used when a section has no upstream content
pub const EMPTY_SECTION_PLACEHOLDER: &str = "_No information available for this section._";

/// One named report section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReportSection {
    pub heading: String,
    pub body: String,
}

/// Assembled analysis report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub document_id: Uuid,
    pub title: String,
    pub sections: Vec<ReportSection>,
    pub highlights: Vec<String>,
    pub overall_risk_score: u8,
    pub overall_risk_level: RiskCategory,
    pub risks_count: usize,
    pub generated_at: chrono::DateTime<chrono::Utc>,
}

impl Report {
    /// Section body by exact heading
    pub fn section(&self, heading: &str) -> Option<&str> {
        self.sections
            .iter()
            .find(|s| s.heading == heading)
            .map(|s| s.body.as_str())
    }

    /// Render as Markdown with one `## ` heading per section
    pub fn to_markdown(&self) -> String {
        let mut out = format!("# {}\n\n", inline_text(&self.title));
        for section in &self.sections {
            out.push_str(&format!("## {}\n\n{}\n\n", section.heading, section.body.trim()));
        }
        out
    }
}

/// Normalize section bodies and guarantee all eight headings in order
pub fn layout_sections(mut bodies: Vec<(&'static str, String)>) -> Vec<ReportSection> {
    REPORT_HEADINGS
        .iter()
        .map(|heading| {
            let body = bodies
                .iter_mut()
                .find(|(h, _)| h == heading)
                .map(|(_, b)| std::mem::take(b))
                .unwrap_or_default();
            let body = body.trim();
            ReportSection {
                heading: heading.to_string(),
                body: if body.is_empty() {
                    EMPTY_SECTION_PLACEHOLDER.to_string()
                } else {
                    body.to_string()
                },
            }
        })
        .collect()
}

/// Neutralize Markdown block syntax in free text
///
/// Heading markers, code fences, and HTML openers are escaped wherever they occur,
/// including inside list items and block quotes. A line that could act as a setext
/// underline or thematic break is escaped as a whole.
pub fn escape_block_markup(text: &str) -> String {
    text.trim()
        .lines()
        .map(|line| {
            let line = line.trim();
            if is_rule_like(line) {
                escape_chars(line, |c| !c.is_whitespace())
            } else {
                escape_chars(line, |c| matches!(c, '\\' | '#' | '`' | '~' | '<'))
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Free text collapsed onto one line and escaped
pub fn inline_text(text: &str) -> String {
    escape_block_markup(&text.split_whitespace().collect::<Vec<_>>().join(" "))
}

fn is_rule_like(line: &str) -> bool {
    line.contains(|c: char| c == '-' || c == '=')
        && line
            .chars()
            .all(|c| matches!(c, '-' | '=' | '>' | '*' | '+' | '_') || c.is_whitespace())
}

fn escape_chars(line: &str, escape: impl Fn(char) -> bool) -> String {
    let mut out = String::with_capacity(line.len());
    for c in line.chars() {
        if escape(c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Extract a section body from rendered Markdown by exact `## ` heading text
pub fn extract_section(markdown: &str, heading: &str) -> Option<String> {
    let mut body_start: Option<usize> = None;
    let mut current_heading: Option<(std::ops::Range<usize>, String)> = None;

    for (event, range) in Parser::new(markdown).into_offset_iter() {
        match event {
            Event::Start(Tag::Heading {
                level: HeadingLevel::H2,
                ..
            }) => {
                if let Some(start) = body_start {
                    return Some(markdown[start..range.start].trim().to_string());
                }
                current_heading = Some((range, String::new()));
            }
            Event::Text(text) | Event::Code(text) => {
                if let Some((_, buf)) = current_heading.as_mut() {
                    buf.push_str(&text);
                }
            }
            Event::End(TagEnd::Heading(HeadingLevel::H2)) => {
                if let Some((range, text)) = current_heading.take() {
                    if text.trim() == heading {
                        body_start = Some(range.end);
                    }
                }
            }
            _ => {}
        }
    }

    body_start.map(|start| markdown[start..].trim().to_string())
}

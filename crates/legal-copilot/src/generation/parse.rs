//! Structured output extraction from free-form model replies

use regex::Regex;
use serde::de::DeserializeOwned;
use std::sync::OnceLock;

use crate::error::{Error, Result};
use crate::types::StageKind;

fn fence_pattern() -> Option<&'static Regex> {
    static FENCE: OnceLock<Option<Regex>> = OnceLock::new();
    FENCE
        .get_or_init(|| Regex::new(r"(?s)```[A-Za-z0-9_-]*\s*\n(.*?)```").ok())
        .as_ref()
}

/// Extract the JSON object from a reply, handling Markdown code fences and surrounding prose
pub fn extract_json(reply: &str) -> Option<&str> {
    let text = reply.trim();

    let text = fence_pattern()
        .and_then(|re| re.captures(text))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
        .unwrap_or(text);

    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Deserialize a stage's reply; any failure is a malformed-output error
pub fn parse_agent_json<T: DeserializeOwned>(stage: StageKind, reply: &str) -> Result<T> {
    let json = extract_json(reply)
        .ok_or_else(|| Error::malformed(stage, "reply contains no JSON object"))?;

    serde_json::from_str(json).map_err(|e| Error::malformed(stage, e.to_string()))
}

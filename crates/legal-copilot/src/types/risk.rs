//! Risk findings and deterministic risk scoring

use serde::{Deserialize, Serialize};
use std::fmt;

/// Upper bound of the Low band (exclusive)
pub const LOW_RISK_CEILING: u8 = 34;
/// Upper bound of the Medium band (inclusive)
pub const MEDIUM_RISK_CEILING: u8 = 66;

/// Share of non-dominant finding weight added on top of the dominant one
const SECONDARY_WEIGHT_FACTOR: f64 = 0.25;

/// Overall risk band
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RiskCategory {
    Low,
    Medium,
    High,
}

impl RiskCategory {
    /// Map a score to its band; depends on the score alone
    pub fn from_score(score: u8) -> Self {
        if score < LOW_RISK_CEILING {
            Self::Low
        } else if score <= MEDIUM_RISK_CEILING {
            Self::Medium
        } else {
            Self::High
        }
    }
}

impl fmt::Display for RiskCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
        })
    }
}

/// Finding severity
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn weight(self) -> f64 {
        match self {
            Self::Low => 10.0,
            Self::Medium => 25.0,
            Self::High => 45.0,
            Self::Critical => 70.0,
        }
    }
}

/// Likelihood the risk materializes
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Probability {
    Low,
    Medium,
    High,
    #[default]
    Unknown,
}

impl Probability {
    pub fn factor(self) -> f64 {
        match self {
            Self::Low => 0.6,
            Self::Medium | Self::Unknown => 0.8,
            Self::High => 1.0,
        }
    }
}

/// Area the risk belongs to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum FindingCategory {
    Legal,
    Financial,
    Operational,
    Privacy,
    Compliance,
    #[default]
    Other,
}

/// A single identified risk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskFinding {
    pub id: String,
    #[serde(default)]
    pub category: FindingCategory,
    pub severity: Severity,
    #[serde(default)]
    pub probability: Probability,
    #[serde(default)]
    pub clause_reference: Option<String>,
    #[serde(default)]
    pub clause_excerpt: String,
    pub explanation: String,
    #[serde(default)]
    pub recommendation: String,
}

impl RiskFinding {
    /// Contribution of this finding before aggregation
    pub fn weight(&self) -> f64 {
        self.severity.weight() * self.probability.factor()
    }
}

/// Aggregated risk for a document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskProfile {
    /// 0 (no risk) to 100
    pub score: u8,
    pub category: RiskCategory,
    pub findings: Vec<RiskFinding>,
}

impl RiskProfile {
    /// Score findings: the dominant finding counts fully, the rest at a quarter weight
    pub fn from_findings(findings: Vec<RiskFinding>) -> Self {
        let score = aggregate_score(&findings);
        Self {
            score,
            category: RiskCategory::from_score(score),
            findings,
        }
    }
}

/// Max-dominant aggregation, clamped to [0, 100]
pub fn aggregate_score(findings: &[RiskFinding]) -> u8 {
    let mut weights: Vec<f64> = findings.iter().map(RiskFinding::weight).collect();
    if weights.is_empty() {
        return 0;
    }
    weights.sort_by(|a, b| b.total_cmp(a));

    let dominant = weights[0];
    let rest: f64 = weights[1..].iter().sum();
    let raw = dominant + SECONDARY_WEIGHT_FACTOR * rest;

    raw.round().clamp(0.0, 100.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn finding(severity: Severity, probability: Probability) -> RiskFinding {
        RiskFinding {
            id: "R1".to_string(),
            category: FindingCategory::Legal,
            severity,
            probability,
            clause_reference: None,
            clause_excerpt: String::new(),
            explanation: "test".to_string(),
            recommendation: String::new(),
        }
    }

    #[test]
    fn test_category_thresholds() {
        assert_eq!(RiskCategory::from_score(0), RiskCategory::Low);
        assert_eq!(RiskCategory::from_score(33), RiskCategory::Low);
        assert_eq!(RiskCategory::from_score(34), RiskCategory::Medium);
        assert_eq!(RiskCategory::from_score(66), RiskCategory::Medium);
        assert_eq!(RiskCategory::from_score(67), RiskCategory::High);
        assert_eq!(RiskCategory::from_score(100), RiskCategory::High);
    }

    #[test]
    fn test_no_findings_scores_zero() {
        let profile = RiskProfile::from_findings(Vec::new());
        assert_eq!(profile.score, 0);
        assert_eq!(profile.category, RiskCategory::Low);
    }

    #[test]
    fn test_dominant_finding_drives_score() {
        // 45 * 1.0 + 0.25 * (25 * 0.8) = 50
        let profile = RiskProfile::from_findings(vec![
            finding(Severity::Medium, Probability::Medium),
            finding(Severity::High, Probability::High),
        ]);
        assert_eq!(profile.score, 50);
        assert_eq!(profile.category, RiskCategory::Medium);
    }

    #[test]
    fn test_score_is_clamped() {
        let findings = (0..20)
            .map(|_| finding(Severity::Critical, Probability::High))
            .collect();
        let profile = RiskProfile::from_findings(findings);
        assert_eq!(profile.score, 100);
        assert_eq!(profile.category, RiskCategory::High);
    }

    fn arb_severity() -> impl Strategy<Value = Severity> {
        prop_oneof![
            Just(Severity::Low),
            Just(Severity::Medium),
            Just(Severity::High),
            Just(Severity::Critical),
        ]
    }

    fn arb_probability() -> impl Strategy<Value = Probability> {
        prop_oneof![
            Just(Probability::Low),
            Just(Probability::Medium),
            Just(Probability::High),
            Just(Probability::Unknown),
        ]
    }

    proptest! {
        #[test]
        fn prop_score_within_bounds(
            pairs in proptest::collection::vec((arb_severity(), arb_probability()), 0..40)
        ) {
            let findings: Vec<_> = pairs.into_iter().map(|(s, p)| finding(s, p)).collect();
            let score = aggregate_score(&findings);
            prop_assert!(score <= 100);
        }

        #[test]
        fn prop_category_is_function_of_score(score in 0u8..=100) {
            prop_assert_eq!(RiskCategory::from_score(score), RiskCategory::from_score(score));
            let expected = if score < 34 {
                RiskCategory::Low
            } else if score <= 66 {
                RiskCategory::Medium
            } else {
                RiskCategory::High
            };
            prop_assert_eq!(RiskCategory::from_score(score), expected);
        }
    }
}

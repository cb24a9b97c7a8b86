//! Guardrail verdict types.

use serde::{Deserialize, Serialize};

/// Which family of patterns a verdict was computed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardrailKind {
    /// Prompt-injection attempts in user input.
    Injection,
    /// Personal data (SSNs, card numbers, phone numbers) in user input.
    Pii,
    /// Credentials or secrets in generated output.
    SecretLeak,
    /// The engine itself failed; carried by fail-closed verdicts.
    EngineFault,
}

impl GuardrailKind {
    /// Category label written into findings and audit records.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Injection => "Injection",
            Self::Pii => "PII",
            Self::SecretLeak => "SecretLeak",
            Self::EngineFault => "EngineFault",
        }
    }
}

impl std::fmt::Display for GuardrailKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.category())
    }
}

/// How matched rule weights fold into one risk score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskAggregate {
    /// Highest single confidence.
    #[default]
    Max,
    /// `1 - Π(1 - wᵢ)`: independent signals reinforce each other.
    NoisyOr,
}

impl RiskAggregate {
    pub fn fold(&self, weights: impl IntoIterator<Item = f64>) -> f64 {
        let score = match self {
            Self::Max => weights.into_iter().fold(0.0_f64, f64::max),
            Self::NoisyOr => 1.0 - weights.into_iter().map(|w| 1.0 - w).product::<f64>(),
        };
        score.clamp(0.0, 1.0)
    }
}

/// One pattern match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub pattern_id: String,
    /// Byte offsets `(start, end)` into the evaluated text.
    pub span: (usize, usize),
    pub category: String,
    /// Weight of the rule that produced this finding.
    pub confidence: f64,
}

/// Outcome of one guardrail evaluation. Never mutated after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardrailVerdict {
    pub passed: bool,
    pub risk_score: f64,
    pub findings: Vec<Finding>,
    pub kind: GuardrailKind,
}

impl GuardrailVerdict {
    /// Blocking verdict used when evaluation could not complete.
    pub fn fail_closed(pattern_id: impl Into<String>) -> Self {
        Self {
            passed: false,
            risk_score: 1.0,
            findings: vec![Finding {
                pattern_id: pattern_id.into(),
                span: (0, 0),
                category: GuardrailKind::EngineFault.category().to_string(),
                confidence: 1.0,
            }],
            kind: GuardrailKind::EngineFault,
        }
    }

    /// Merge verdicts from several kinds into one.
    ///
    /// Findings keep their order. The merged verdict passes only if every part
    /// passed and the aggregated risk stays under `threshold`. Its kind is the
    /// kind of the riskiest part, earliest part on ties.
    pub fn merge(parts: Vec<GuardrailVerdict>, threshold: f64, aggregate: RiskAggregate) -> Self {
        let mut kind = parts
            .first()
            .map(|v| v.kind)
            .unwrap_or(GuardrailKind::Injection);
        let mut top = f64::MIN;
        for part in &parts {
            if part.risk_score > top {
                top = part.risk_score;
                kind = part.kind;
            }
        }

        let risk_score = aggregate.fold(parts.iter().map(|v| v.risk_score));
        let all_passed = parts.iter().all(|v| v.passed);
        let findings = parts.into_iter().flat_map(|v| v.findings).collect();

        Self {
            passed: all_passed && risk_score < threshold,
            risk_score,
            findings,
            kind,
        }
    }

    /// Distinct finding categories, in first-seen order.
    pub fn categories(&self) -> Vec<&str> {
        let mut seen: Vec<&str> = Vec::new();
        for finding in &self.findings {
            if !seen.contains(&finding.category.as_str()) {
                seen.push(&finding.category);
            }
        }
        seen
    }
}

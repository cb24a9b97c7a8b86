//! Guardrail evaluation.
//!
//! Verdicts are a pure fold over the ruleset. The only side effect is one
//! audit record per public call, written through `tracing`.

use tracing::warn;

use crate::error::GuardrailError;
use crate::guardrails::rules::Ruleset;
use crate::guardrails::types::{Finding, GuardrailKind, GuardrailVerdict, RiskAggregate};
use crate::observability::audit_verdict;

/// Immutable guardrail engine, shared across sessions behind an `Arc`.
#[derive(Debug, Clone)]
pub struct GuardrailEngine {
    ruleset: Ruleset,
    aggregate: RiskAggregate,
}

impl GuardrailEngine {
    pub fn new(ruleset: Ruleset, aggregate: RiskAggregate) -> Self {
        Self { ruleset, aggregate }
    }

    /// Default rules, max aggregate.
    pub fn with_defaults() -> Self {
        Self::new(Ruleset::default_rules(), RiskAggregate::Max)
    }

    pub fn ruleset(&self) -> &Ruleset {
        &self.ruleset
    }

    pub fn aggregate(&self) -> RiskAggregate {
        self.aggregate
    }

    /// Evaluate `text` against the rules registered for `kind`.
    pub fn evaluate(
        &self,
        text: &str,
        kind: GuardrailKind,
        risk_threshold: f64,
    ) -> Result<GuardrailVerdict, GuardrailError> {
        let verdict = self.compute(text, kind, risk_threshold)?;
        audit_verdict("guardrail_evaluation", &verdict);
        Ok(verdict)
    }

    /// Like [`evaluate`](Self::evaluate), for raw bytes that must be UTF-8 text.
    pub fn evaluate_bytes(
        &self,
        bytes: &[u8],
        kind: GuardrailKind,
        risk_threshold: f64,
    ) -> Result<GuardrailVerdict, GuardrailError> {
        let text = std::str::from_utf8(bytes).map_err(|e| GuardrailError::InvalidInputKind {
            reason: e.to_string(),
        })?;
        self.evaluate(text, kind, risk_threshold)
    }

    /// Evaluate, turning any engine error into a blocking verdict.
    pub fn evaluate_or_block(
        &self,
        text: &str,
        kind: GuardrailKind,
        risk_threshold: f64,
    ) -> GuardrailVerdict {
        let verdict = self.compute_or_block(text, kind, risk_threshold);
        audit_verdict("guardrail_evaluation", &verdict);
        verdict
    }

    /// Input gate: injection then PII, merged into one verdict.
    pub fn check_input(&self, text: &str, risk_threshold: f64) -> GuardrailVerdict {
        let parts = vec![
            self.compute_or_block(text, GuardrailKind::Injection, risk_threshold),
            self.compute_or_block(text, GuardrailKind::Pii, risk_threshold),
        ];
        let verdict = if risk_threshold.is_finite() {
            GuardrailVerdict::merge(parts, risk_threshold, self.aggregate)
        } else {
            GuardrailVerdict::fail_closed("threshold")
        };
        audit_verdict("input_check", &verdict);
        verdict
    }

    /// Output gate: secret-leak rules.
    pub fn check_output(&self, text: &str, risk_threshold: f64) -> GuardrailVerdict {
        let verdict = self.compute_or_block(text, GuardrailKind::SecretLeak, risk_threshold);
        audit_verdict("output_check", &verdict);
        verdict
    }

    fn compute_or_block(
        &self,
        text: &str,
        kind: GuardrailKind,
        risk_threshold: f64,
    ) -> GuardrailVerdict {
        match self.compute(text, kind, risk_threshold) {
            Ok(verdict) => verdict,
            Err(e) => {
                warn!(kind = %kind, error = %e, "Guardrail evaluation failed, blocking");
                let pattern_id = match &e {
                    GuardrailError::EngineFault { pattern_id, .. }
                    | GuardrailError::InvalidRule { pattern_id, .. } => pattern_id.clone(),
                    GuardrailError::InvalidInputKind { .. } => "input".to_string(),
                };
                GuardrailVerdict::fail_closed(pattern_id)
            }
        }
    }

    fn compute(
        &self,
        text: &str,
        kind: GuardrailKind,
        risk_threshold: f64,
    ) -> Result<GuardrailVerdict, GuardrailError> {
        if !risk_threshold.is_finite() {
            return Err(GuardrailError::EngineFault {
                pattern_id: "threshold".into(),
                reason: format!("risk threshold {risk_threshold} is not finite"),
            });
        }

        let mut findings = Vec::new();
        let mut weights = Vec::new();
        for rule in self.ruleset.rules_for(kind) {
            let spans = rule
                .find_spans(text)
                .map_err(|reason| GuardrailError::EngineFault {
                    pattern_id: rule.id.clone(),
                    reason,
                })?;
            if spans.is_empty() {
                continue;
            }
            weights.push(rule.weight);
            findings.extend(spans.into_iter().map(|span| Finding {
                pattern_id: rule.id.clone(),
                span,
                category: rule.category.clone(),
                confidence: rule.weight,
            }));
        }

        let risk_score = self.aggregate.fold(weights);
        Ok(GuardrailVerdict {
            passed: risk_score < risk_threshold,
            risk_score,
            findings,
            kind,
        })
    }
}

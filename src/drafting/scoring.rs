//! Rubric scoring for candidate drafts.
//!
//! Four criteria, each in [0, 1]:
//!
//! | criterion        | measures                                              |
//! |------------------|-------------------------------------------------------|
//! | `relevance`      | share of request keywords that appear in the draft    |
//! | `tone_fit`       | 1.0 minus penalties for refusals, shouting, `!!!`     |
//! | `length`         | 1.0 inside `[min_words, max_words]`, decays outside   |
//! | `call_to_action` | 1.0 for a CTA phrase, 0.5 for a closing question      |
//!
//! The total is `Σ wᵢ·sᵢ / Σ wᵢ`. Weights and word bounds come from the
//! `[scoring]` config table.

use std::collections::BTreeSet;

use serde::Deserialize;
use tracing::debug;

use crate::error::{ConfigError, ScoringError};
use crate::pipeline::types::Candidate;

pub const RELEVANCE: &str = "relevance";
pub const TONE_FIT: &str = "tone_fit";
pub const LENGTH: &str = "length";
pub const CALL_TO_ACTION: &str = "call_to_action";

const STOPWORDS: &[&str] = &[
    "and", "are", "can", "for", "how", "its", "new", "our", "the", "who", "you", "about", "above",
    "after", "again", "also", "because", "been", "before", "being", "could", "does", "draft", "email", "emails", "from", "have", "into", "just", "like", "make", "more",
    "please", "sales", "send", "should", "some", "than", "that", "their", "them", "then", "there",
    "these", "they", "this", "those", "very", "want", "what", "when", "which", "will", "with",
    "would", "write", "your",
];

const REFUSAL_PHRASES: &[&str] = &[
    "as an ai",
    "language model",
    "i cannot",
    "i can't",
    "i can not",
    "i'm sorry",
    "i am sorry",
    "i am unable",
    "i'm unable",
];

const CTA_PHRASES: &[&str] = &[
    "schedule",
    "book a",
    "set up a",
    "sign up",
    "get started",
    "free trial",
    "demo",
    "reply to this",
    "just reply",
    "let me know",
    "reach out",
    "contact us",
    "give us a call",
    "hop on a call",
    "quick call",
    "click",
    "visit",
];

/// Per-criterion weights.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    pub relevance: f64,
    pub tone_fit: f64,
    pub length: f64,
    pub call_to_action: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            relevance: 0.35,
            tone_fit: 0.20,
            length: 0.25,
            call_to_action: 0.20,
        }
    }
}

/// Scoring configuration (`[scoring]`).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub weights: ScoringWeights,
    pub min_words: usize,
    pub max_words: usize,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weights: ScoringWeights::default(),
            min_words: 50,
            max_words: 200,
        }
    }
}

impl ScoringConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let w = &self.weights;
        let all = [w.relevance, w.tone_fit, w.length, w.call_to_action];
        if all.iter().any(|x| !x.is_finite() || *x < 0.0) {
            return Err(ConfigError::InvalidValue {
                key: "scoring.weights".into(),
                message: "weights must be finite and non-negative".into(),
            });
        }
        if all.iter().sum::<f64>() <= 0.0 {
            return Err(ConfigError::InvalidValue {
                key: "scoring.weights".into(),
                message: "at least one weight must be positive".into(),
            });
        }
        if self.min_words == 0 || self.min_words > self.max_words {
            return Err(ConfigError::InvalidValue {
                key: "scoring.min_words".into(),
                message: format!(
                    "need 0 < min_words <= max_words, got {}..{}",
                    self.min_words, self.max_words
                ),
            });
        }
        Ok(())
    }
}

/// Deterministic rubric scorer.
#[derive(Debug, Clone)]
pub struct ScoringEngine {
    config: ScoringConfig,
    /// Strategy ids in configured order; earlier wins ties.
    strategy_order: Vec<String>,
}

impl ScoringEngine {
    pub fn new(config: ScoringConfig, strategy_order: Vec<String>) -> Self {
        Self {
            config,
            strategy_order,
        }
    }

    /// Score every candidate against `request_text` and rank best first.
    pub fn score(
        &self,
        request_text: &str,
        candidates: Vec<Candidate>,
    ) -> Result<Vec<Candidate>, ScoringError> {
        if candidates.is_empty() {
            return Err(ScoringError::NoViableCandidate);
        }

        let keywords = keywords(request_text);
        let mut scored: Vec<Candidate> = candidates
            .into_iter()
            .map(|c| self.score_one(&keywords, c))
            .collect();

        // Stable sort: equal score and rank keep input order.
        scored.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| self.rank(&a.strategy_id).cmp(&self.rank(&b.strategy_id)))
        });

        for c in &scored {
            debug!(strategy = %c.strategy_id, score = c.score, "Scored candidate");
        }
        Ok(scored)
    }

    fn rank(&self, strategy_id: &str) -> usize {
        self.strategy_order
            .iter()
            .position(|id| id == strategy_id)
            .unwrap_or(usize::MAX)
    }

    fn score_one(&self, keywords: &BTreeSet<String>, mut candidate: Candidate) -> Candidate {
        let w = &self.config.weights;
        let parts = [
            (RELEVANCE, w.relevance, relevance(keywords, &candidate.text)),
            (TONE_FIT, w.tone_fit, tone_fit(&candidate.text)),
            (
                LENGTH,
                w.length,
                length_fit(&candidate.text, self.config.min_words, self.config.max_words),
            ),
            (CALL_TO_ACTION, w.call_to_action, call_to_action(&candidate.text)),
        ];

        let weight_sum: f64 = parts.iter().map(|(_, w, _)| w).sum();
        let weighted: f64 = parts.iter().map(|(_, w, s)| w * s).sum();
        candidate.score = if weight_sum > 0.0 {
            weighted / weight_sum
        } else {
            0.0
        };
        candidate.score_breakdown = parts
            .iter()
            .map(|(name, _, s)| (name.to_string(), *s))
            .collect();
        candidate
    }
}

// ── Criteria ────────────────────────────────────────────────────────

fn words(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .filter(|w| !w.is_empty())
}

fn keywords(request_text: &str) -> BTreeSet<String> {
    words(request_text)
        .map(str::to_lowercase)
        .filter(|w| w.chars().count() >= 3 && !STOPWORDS.contains(&w.as_str()))
        .collect()
}

fn relevance(keywords: &BTreeSet<String>, text: &str) -> f64 {
    if keywords.is_empty() {
        return 1.0;
    }
    let present: BTreeSet<String> = words(text).map(str::to_lowercase).collect();
    let hits = keywords.iter().filter(|k| present.contains(*k)).count();
    hits as f64 / keywords.len() as f64
}

fn tone_fit(text: &str) -> f64 {
    let lower = text.to_lowercase();
    let mut score = 1.0;

    if REFUSAL_PHRASES.iter().any(|p| lower.contains(p)) {
        score -= 0.6;
    }

    let all_words: Vec<&str> = words(text).collect();
    if !all_words.is_empty() {
        let shouted = all_words
            .iter()
            .filter(|w| {
                w.chars().count() >= 4
                    && w.chars().all(|c| !c.is_alphabetic() || c.is_uppercase())
                    && w.chars().any(char::is_alphabetic)
            })
            .count();
        let ratio = shouted as f64 / all_words.len() as f64;
        score -= (ratio * 2.0).min(0.3);
    }

    let exclamations = text.matches('!').count();
    if exclamations > 2 {
        score -= (0.1 * (exclamations - 2) as f64).min(0.3);
    }

    f64::clamp(score, 0.0, 1.0)
}

fn length_fit(text: &str, min_words: usize, max_words: usize) -> f64 {
    let count = text.split_whitespace().count();
    if count == 0 {
        0.0
    } else if count < min_words {
        count as f64 / min_words as f64
    } else if count > max_words {
        max_words as f64 / count as f64
    } else {
        1.0
    }
}

fn call_to_action(text: &str) -> f64 {
    let lower = text.to_lowercase();
    if CTA_PHRASES.iter().any(|p| lower.contains(p)) {
        return 1.0;
    }
    // A question in the closing paragraph still invites a reply.
    let closing = lower
        .rsplit("\n\n")
        .filter(|p| !p.trim().is_empty())
        .take(2)
        .any(|p| p.contains('?'));
    if closing { 0.5 } else { 0.0 }
}

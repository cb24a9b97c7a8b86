//! Shared types for the drafting pipeline.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ContactError, SessionError};
use crate::guardrails::GuardrailVerdict;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9\-]+(\.[A-Za-z0-9\-]+)*\.[A-Za-z]{2,}$")
        .expect("email pattern must compile")
});

// ── Contact ─────────────────────────────────────────────────────────

/// One recipient. The address is validated at construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Contact {
    pub name: String,
    pub email: String,
}

impl Contact {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Result<Self, ContactError> {
        let name = name.into().trim().to_string();
        let email = email.into().trim().to_string();
        if name.is_empty() {
            return Err(ContactError::EmptyName);
        }
        if !EMAIL_RE.is_match(&email) {
            return Err(ContactError::InvalidEmail(email));
        }
        Ok(Self { name, email })
    }
}

#[derive(Deserialize)]
struct RawContact {
    name: String,
    email: String,
}

impl<'de> Deserialize<'de> for Contact {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawContact::deserialize(deserializer)?;
        Contact::new(raw.name, raw.email).map_err(serde::de::Error::custom)
    }
}

// ── Request ─────────────────────────────────────────────────────────

/// What the user asked for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Request {
    pub raw_text: String,
    pub sender_name: String,
    /// May be empty while drafting. Approval requires at least one.
    pub recipients: Vec<Contact>,
}

impl Request {
    pub fn new(
        raw_text: impl Into<String>,
        sender_name: impl Into<String>,
        recipients: Vec<Contact>,
    ) -> Result<Self, SessionError> {
        let raw_text = raw_text.into();
        let sender_name = sender_name.into().trim().to_string();
        if raw_text.trim().is_empty() {
            return Err(SessionError::EmptyRequest);
        }
        if sender_name.is_empty() {
            return Err(SessionError::EmptySender);
        }
        Ok(Self {
            raw_text,
            sender_name,
            recipients,
        })
    }
}

// ── Candidates and results ──────────────────────────────────────────

/// One draft from one strategy in one round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub strategy_id: String,
    pub text: String,
    /// Weighted total in [0, 1]. Zero until scored.
    pub score: f64,
    /// Criterion name → sub-score.
    pub score_breakdown: BTreeMap<String, f64>,
}

impl Candidate {
    pub fn unscored(strategy_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            strategy_id: strategy_id.into(),
            text: text.into(),
            score: 0.0,
            score_breakdown: BTreeMap::new(),
        }
    }
}

/// A completed round: the chosen draft plus everything that led to it.
#[derive(Debug, Clone, Serialize)]
pub struct DraftResult {
    pub round_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub chosen: Candidate,
    /// Ranked, best first. `chosen` is the first entry.
    pub all_candidates: Vec<Candidate>,
    pub input_verdict: GuardrailVerdict,
    pub output_verdict: GuardrailVerdict,
}

impl DraftResult {
    /// Both gates passed for this draft.
    pub fn is_cleared(&self) -> bool {
        self.input_verdict.passed && self.output_verdict.passed
    }
}

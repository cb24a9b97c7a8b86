//! Session data.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::mailer::SendOutcome;
use crate::pipeline::{DraftResult, Request, Round};

/// Where a session is in the approve/reject loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    AwaitingInput,
    Drafted,
    Approved,
    Sent,
    /// Last round was stopped by a guardrail.
    Blocked,
    /// Last round produced no candidate.
    Failed,
}

impl SessionState {
    pub fn label(&self) -> &'static str {
        match self {
            Self::AwaitingInput => "awaiting_input",
            Self::Drafted => "drafted",
            Self::Approved => "approved",
            Self::Sent => "sent",
            Self::Blocked => "blocked",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// One user's drafting session. Only `ApprovalStateMachine` mutates it.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub id: Uuid,
    pub state: SessionState,
    pub request: Option<Request>,
    /// The draft awaiting a decision. Cleared when a round does not complete.
    pub current_draft: Option<DraftResult>,
    /// Every completed draft, oldest first. Append-only.
    pub history: Vec<DraftResult>,
    /// Most recent round, for diagnostics.
    pub last_round: Option<Round>,
    pub subject: Option<String>,
    pub outcomes: Vec<SendOutcome>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            state: SessionState::AwaitingInput,
            request: None,
            current_draft: None,
            history: Vec::new(),
            last_round: None,
            subject: None,
            outcomes: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// What a state-machine call did. The UI renders this and nothing else.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    /// The call was not allowed in the current state. Nothing changed.
    Ignored { state: SessionState, reason: String },
    Drafted { round: Round },
    /// Carries the verdicts and findings that stopped the round.
    Blocked { round: Round },
    Failed { round: Round },
    Sent {
        subject: String,
        outcomes: Vec<SendOutcome>,
    },
}

impl Decision {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Ignored { .. } => "ignored",
            Self::Drafted { .. } => "drafted",
            Self::Blocked { .. } => "blocked",
            Self::Failed { .. } => "failed",
            Self::Sent { .. } => "sent",
        }
    }

    pub fn is_ignored(&self) -> bool {
        matches!(self, Self::Ignored { .. })
    }
}

//! One generation round.
//!
//! ```text
//! PendingInputCheck ─fail─▶ BlockedInput
//!        │
//!     Drafting (all strategies concurrently) ─none─▶ FailedNoCandidates
//!        │
//!     Scoring
//!        │
//! PendingOutputCheck ─fail─▶ BlockedOutput
//!        │
//!     Complete
//! ```
//!
//! No completion call is made unless the input gate passes, and scoring only
//! starts after every strategy has settled.

use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::drafting::scoring::{ScoringConfig, ScoringEngine};
use crate::drafting::strategy::DraftingStrategy;
use crate::error::DraftError;
use crate::guardrails::{GuardrailEngine, GuardrailVerdict};
use crate::pipeline::types::{Candidate, DraftResult, Request};

/// Risk thresholds for the two gates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GuardrailThresholds {
    pub input: f64,
    pub output: f64,
}

impl Default for GuardrailThresholds {
    fn default() -> Self {
        Self {
            input: 0.7,
            output: 0.7,
        }
    }
}

/// Stages a round moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundStage {
    PendingInputCheck,
    Drafting,
    Scoring,
    PendingOutputCheck,
    Complete,
    BlockedInput,
    BlockedOutput,
    FailedNoCandidates,
}

/// A strategy that produced nothing this round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StrategyFailure {
    pub strategy_id: String,
    pub reason: String,
}

impl From<DraftError> for StrategyFailure {
    fn from(e: DraftError) -> Self {
        let DraftError::StrategyUnavailable {
            strategy_id,
            reason,
        } = e;
        Self {
            strategy_id,
            reason,
        }
    }
}

/// How a round ended.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RoundOutcome {
    Complete(DraftResult),
    BlockedInput {
        verdict: GuardrailVerdict,
    },
    /// The chosen text is withheld; only the verdicts are returned.
    BlockedOutput {
        input_verdict: GuardrailVerdict,
        output_verdict: GuardrailVerdict,
    },
    NoViableCandidate,
}

impl RoundOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Complete(_) => "complete",
            Self::BlockedInput { .. } => "blocked_input",
            Self::BlockedOutput { .. } => "blocked_output",
            Self::NoViableCandidate => "no_viable_candidate",
        }
    }
}

/// Record of one round.
#[derive(Debug, Clone, Serialize)]
pub struct Round {
    pub id: Uuid,
    /// Every stage visited, in order.
    pub stages: Vec<RoundStage>,
    pub failures: Vec<StrategyFailure>,
    /// Number of candidates handed to scoring.
    pub scored: usize,
    pub outcome: RoundOutcome,
}

impl Round {
    pub fn draft(&self) -> Option<&DraftResult> {
        match &self.outcome {
            RoundOutcome::Complete(result) => Some(result),
            _ => None,
        }
    }

    pub fn visited(&self, stage: RoundStage) -> bool {
        self.stages.contains(&stage)
    }
}

/// Runs rounds. Shared read-only across sessions.
pub struct Orchestrator {
    guardrails: Arc<GuardrailEngine>,
    strategies: Vec<DraftingStrategy>,
    scoring: ScoringEngine,
    thresholds: GuardrailThresholds,
}

impl Orchestrator {
    /// Strategy order doubles as the scoring tie-break order.
    pub fn new(
        guardrails: Arc<GuardrailEngine>,
        strategies: Vec<DraftingStrategy>,
        scoring: ScoringConfig,
        thresholds: GuardrailThresholds,
    ) -> Self {
        let order = strategies.iter().map(|s| s.id().to_string()).collect();
        Self {
            guardrails,
            strategies,
            scoring: ScoringEngine::new(scoring, order),
            thresholds,
        }
    }

    pub fn strategy_count(&self) -> usize {
        self.strategies.len()
    }

    pub fn thresholds(&self) -> GuardrailThresholds {
        self.thresholds
    }

    /// Run one round for `request`.
    pub async fn generate(&self, request: &Request) -> Round {
        let id = Uuid::new_v4();
        let mut stages = vec![RoundStage::PendingInputCheck];

        let input_verdict = self
            .guardrails
            .check_input(&request.raw_text, self.thresholds.input);
        if !input_verdict.passed {
            stages.push(RoundStage::BlockedInput);
            warn!(
                round = %id,
                risk_score = input_verdict.risk_score,
                categories = ?input_verdict.categories(),
                "Input blocked"
            );
            return Round {
                id,
                stages,
                failures: Vec::new(),
                scored: 0,
                outcome: RoundOutcome::BlockedInput {
                    verdict: input_verdict,
                },
            };
        }

        stages.push(RoundStage::Drafting);
        let settled = join_all(self.strategies.iter().map(|s| s.draft(request))).await;

        let mut candidates: Vec<Candidate> = Vec::with_capacity(settled.len());
        let mut failures = Vec::new();
        for result in settled {
            match result {
                Ok(candidate) => candidates.push(candidate),
                Err(e) => failures.push(StrategyFailure::from(e)),
            }
        }
        info!(
            round = %id,
            drafted = candidates.len(),
            failed = failures.len(),
            "Drafting settled"
        );

        let scored = candidates.len();
        let ranked = if candidates.is_empty() {
            None
        } else {
            stages.push(RoundStage::Scoring);
            self.scoring.score(&request.raw_text, candidates).ok()
        };
        let Some(ranked) = ranked else {
            stages.push(RoundStage::FailedNoCandidates);
            warn!(round = %id, "No viable candidate");
            return Round {
                id,
                stages,
                failures,
                scored,
                outcome: RoundOutcome::NoViableCandidate,
            };
        };

        stages.push(RoundStage::PendingOutputCheck);
        let output_verdict = self
            .guardrails
            .check_output(&ranked[0].text, self.thresholds.output);
        if !output_verdict.passed {
            stages.push(RoundStage::BlockedOutput);
            warn!(
                round = %id,
                strategy = %ranked[0].strategy_id,
                risk_score = output_verdict.risk_score,
                categories = ?output_verdict.categories(),
                "Output blocked, draft withheld"
            );
            return Round {
                id,
                stages,
                failures,
                scored,
                outcome: RoundOutcome::BlockedOutput {
                    input_verdict,
                    output_verdict,
                },
            };
        }

        stages.push(RoundStage::Complete);
        let chosen = ranked[0].clone();
        info!(
            round = %id,
            strategy = %chosen.strategy_id,
            score = chosen.score,
            "Round complete"
        );
        Round {
            id,
            stages,
            failures,
            scored,
            outcome: RoundOutcome::Complete(DraftResult {
                round_id: id,
                created_at: Utc::now(),
                chosen,
                all_candidates: ranked,
                input_verdict,
                output_verdict,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::drafting::persona::Persona;
    use crate::error::LlmError;
    use crate::guardrails::GuardrailKind;
    use crate::llm::provider::{CompletionRequest, CompletionResponse, LlmProvider};

    enum Reply {
        Text(String),
        Fail,
        Hang,
    }

    /// Replies per persona, keyed by the system prompt.
    struct ScriptedLlm {
        replies: HashMap<String, Reply>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LlmProvider for ScriptedLlm {
        fn model_name(&self) -> &str {
            "scripted"
        }

        async fn complete(
            &self,
            request: CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let key = request.system_prompt().unwrap_or_default();
            match self.replies.get(key) {
                Some(Reply::Text(t)) => Ok(CompletionResponse::text(t.clone())),
                Some(Reply::Hang) => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(CompletionResponse::text("late"))
                }
                Some(Reply::Fail) | None => Err(LlmError::RequestFailed {
                    provider: "scripted".into(),
                    reason: "offline".into(),
                }),
            }
        }
    }

    fn good_text(strategy: &str) -> String {
        format!(
            "Hi [Recipient name],\n\nOur CRM keeps your pipeline tidy ({strategy}). \
             Teams close deals faster with automated follow-ups and clear reporting.\n\n\
             Can we book a demo next week?\n\n[Your name]"
        )
    }

    fn orchestrator(replies: Vec<(&str, Reply)>) -> (Orchestrator, Arc<ScriptedLlm>) {
        let llm = Arc::new(ScriptedLlm {
            replies: replies
                .into_iter()
                .map(|(id, r)| (id.to_string(), r))
                .collect(),
            calls: AtomicUsize::new(0),
        });
        let strategies = ["professional", "humorous", "concise"]
            .into_iter()
            .map(|id| {
                DraftingStrategy::new(
                    Persona::new(id, id, id),
                    llm.clone(),
                    Duration::from_millis(100),
                )
            })
            .collect();
        let orch = Orchestrator::new(
            Arc::new(GuardrailEngine::with_defaults()),
            strategies,
            ScoringConfig::default(),
            GuardrailThresholds::default(),
        );
        (orch, llm)
    }

    fn all_good() -> Vec<(&'static str, Reply)> {
        vec![
            ("professional", Reply::Text(good_text("professional"))),
            ("humorous", Reply::Text(good_text("humorous"))),
            ("concise", Reply::Text(good_text("concise"))),
        ]
    }

    fn request(text: &str) -> Request {
        Request::new(text, "Alex", vec![]).unwrap()
    }

    #[tokio::test]
    async fn clean_round_completes_with_all_candidates() {
        let (orch, llm) = orchestrator(all_good());
        let round = orch.generate(&request("Write a sales email about our CRM")).await;

        assert_eq!(
            round.stages,
            vec![
                RoundStage::PendingInputCheck,
                RoundStage::Drafting,
                RoundStage::Scoring,
                RoundStage::PendingOutputCheck,
                RoundStage::Complete,
            ]
        );
        assert_eq!(llm.calls.load(Ordering::SeqCst), 3);
        let draft = round.draft().unwrap();
        assert_eq!(draft.all_candidates.len(), 3);
        assert_eq!(draft.chosen, draft.all_candidates[0]);
        // Scores tie, so the first configured persona wins.
        assert_eq!(draft.chosen.strategy_id, "professional");
        assert!(draft.is_cleared());
        assert_eq!(draft.round_id, round.id);
    }

    #[tokio::test]
    async fn blocked_input_makes_no_completion_calls() {
        let (orch, llm) = orchestrator(all_good());
        let round = orch
            .generate(&request("Email my client, SSN 123-45-6789"))
            .await;

        assert_eq!(
            round.stages,
            vec![RoundStage::PendingInputCheck, RoundStage::BlockedInput]
        );
        assert_eq!(llm.calls.load(Ordering::SeqCst), 0);
        assert!(!round.visited(RoundStage::Scoring));
        assert!(!round.visited(RoundStage::PendingOutputCheck));
        match round.outcome {
            RoundOutcome::BlockedInput { verdict } => {
                assert!(!verdict.passed);
                assert_eq!(verdict.kind, GuardrailKind::Pii);
                assert_eq!(verdict.categories(), vec!["PII"]);
            }
            other => panic!("expected BlockedInput, got {}", other.label()),
        }
    }

    #[tokio::test]
    async fn partial_failures_score_survivors_only() {
        let (orch, _) = orchestrator(vec![
            ("professional", Reply::Fail),
            ("humorous", Reply::Text(good_text("humorous"))),
            ("concise", Reply::Hang),
        ]);
        let round = orch.generate(&request("Write a sales email about our CRM")).await;

        assert_eq!(round.scored, 1);
        assert_eq!(round.failures.len(), 2);
        let failed: Vec<_> = round.failures.iter().map(|f| f.strategy_id.as_str()).collect();
        assert_eq!(failed, vec!["professional", "concise"]);
        assert!(round.failures[1].reason.contains("timed out"));

        let draft = round.draft().unwrap();
        assert_eq!(draft.all_candidates.len(), 1);
        assert_eq!(draft.chosen.strategy_id, "humorous");
    }

    #[tokio::test]
    async fn all_failures_skip_scoring() {
        let (orch, llm) = orchestrator(vec![
            ("professional", Reply::Fail),
            ("humorous", Reply::Fail),
            ("concise", Reply::Fail),
        ]);
        let round = orch.generate(&request("Write a sales email about our CRM")).await;

        assert!(matches!(round.outcome, RoundOutcome::NoViableCandidate));
        assert_eq!(round.scored, 0);
        assert_eq!(round.failures.len(), 3);
        assert_eq!(llm.calls.load(Ordering::SeqCst), 3);
        assert!(!round.visited(RoundStage::Scoring));
        assert!(!round.visited(RoundStage::PendingOutputCheck));
        assert_eq!(round.stages.last(), Some(&RoundStage::FailedNoCandidates));
    }

    #[tokio::test]
    async fn leaked_key_in_top_candidate_blocks_output() {
        let leaky = format!(
            "{}\n\nP.S. api_key: sk-live1234567890abcdefghij",
            good_text("professional")
        );
        let (orch, _) = orchestrator(vec![
            ("professional", Reply::Text(leaky)),
            ("humorous", Reply::Text("Short.".into())),
            ("concise", Reply::Fail),
        ]);
        let round = orch.generate(&request("Write a sales email about our CRM")).await;

        assert_eq!(round.stages.last(), Some(&RoundStage::BlockedOutput));
        match &round.outcome {
            RoundOutcome::BlockedOutput {
                input_verdict,
                output_verdict,
            } => {
                assert!(input_verdict.passed);
                assert!(!output_verdict.passed);
                assert_eq!(output_verdict.kind, GuardrailKind::SecretLeak);
            }
            other => panic!("expected BlockedOutput, got {}", other.label()),
        }
        assert!(round.draft().is_none());
    }

    #[test]
    fn outcome_serializes_with_status_tag() {
        let json = serde_json::to_value(RoundOutcome::NoViableCandidate).unwrap();
        assert_eq!(json["status"], "no_viable_candidate");
    }
}

//! Draft generation pipeline.
//!
//! A request flows through one round:
//! 1. `GuardrailEngine::check_input()`: blocks before any completion call
//! 2. `DraftingStrategy::draft()` for every persona, concurrently
//! 3. `ScoringEngine::score()`: ranks the survivors
//! 4. `GuardrailEngine::check_output()` on the top candidate
//!
//! **Nothing is sent from here.** Sending happens only after approval.

pub mod orchestrator;
pub mod types;

pub use orchestrator::{
    GuardrailThresholds, Orchestrator, Round, RoundOutcome, RoundStage, StrategyFailure,
};
pub use types::{Candidate, Contact, DraftResult, Request};

//! Pattern-based safety checks on user input and generated output.

pub mod engine;
pub mod rules;
pub mod types;

pub use engine::GuardrailEngine;
pub use rules::{GuardrailRule, PatternMatcher, RegexMatcher, RuleSpec, Ruleset};
pub use types::{Finding, GuardrailKind, GuardrailVerdict, RiskAggregate};

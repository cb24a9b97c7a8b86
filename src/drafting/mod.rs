//! Drafting strategies and candidate scoring.

pub mod persona;
pub mod scoring;
pub mod strategy;

pub use persona::{Persona, default_personas};
pub use scoring::{ScoringConfig, ScoringEngine, ScoringWeights};
pub use strategy::DraftingStrategy;

//! Sales Agent: guarded, human-approved sales email drafting.

pub mod api;
pub mod config;
pub mod drafting;
pub mod error;
pub mod guardrails;
pub mod llm;
pub mod mailer;
pub mod observability;
pub mod pipeline;
pub mod repl;
pub mod session;

//! Error types for the sales agent.

use std::time::Duration;

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Completion service errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} rate limited")]
    RateLimited { provider: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Provider {provider} timed out after {timeout:?}")]
    Timeout { provider: String, timeout: Duration },
}

/// Guardrail evaluation errors.
#[derive(Debug, thiserror::Error)]
pub enum GuardrailError {
    #[error("Input is not text: {reason}")]
    InvalidInputKind { reason: String },

    #[error("Guardrail engine fault in {pattern_id}: {reason}")]
    EngineFault { pattern_id: String, reason: String },

    #[error("Invalid guardrail rule {pattern_id}: {reason}")]
    InvalidRule { pattern_id: String, reason: String },
}

/// Drafting strategy errors. Recovered by the orchestrator.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DraftError {
    #[error("Strategy {strategy_id} unavailable: {reason}")]
    StrategyUnavailable { strategy_id: String, reason: String },
}

/// Scoring errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScoringError {
    #[error("No viable candidate to score")]
    NoViableCandidate,
}

/// Per-recipient delivery errors. Recorded in `SendOutcome`, never abort a batch.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("Invalid address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Provider {provider} rejected message to {recipient}: {reason}")]
    Rejected {
        provider: String,
        recipient: String,
        reason: String,
    },

    #[error("Transport error on {provider}: {reason}")]
    Transport { provider: String, reason: String },

    #[error("Send to {recipient} timed out after {timeout:?}; delivery status unknown")]
    Timeout { recipient: String, timeout: Duration },
}

/// Contact list ingestion errors.
#[derive(Debug, thiserror::Error)]
pub enum ContactError {
    #[error("Invalid email address: {0}")]
    InvalidEmail(String),

    #[error("Contact name must not be empty")]
    EmptyName,

    #[error("Contact table has no header row")]
    MissingHeader,

    #[error("Contact table header must name a {0} column")]
    MissingColumn(&'static str),
}

/// Session / request validation errors.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Request text must not be empty")]
    EmptyRequest,

    #[error("Sender name must not be empty")]
    EmptySender,

    #[error("Session {0} not found")]
    NotFound(uuid::Uuid),
}

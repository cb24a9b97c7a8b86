//! LLM integration.
//!
//! The completion service is a black box reached over HTTP. The only backend
//! shipped is an OpenAI-compatible `/chat/completions` client, which also
//! covers a local Ollama server (the default endpoint).

pub mod openai_compat;
pub mod provider;

pub use openai_compat::OpenAiCompatProvider;
pub use provider::*;

use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

const DEFAULT_API_URL: &str = "http://localhost:11434/v1";
const DEFAULT_MODEL: &str = "llama3.2:3b";
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Configuration for creating an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_url: String,
    pub api_key: SecretString,
    pub model: String,
    /// Upper bound for a single HTTP exchange. Strategies apply their own,
    /// usually tighter, per-call timeout on top.
    pub request_timeout: Duration,
}

impl LlmConfig {
    /// Build config from `LLM_API_URL`, `LLM_API_KEY`, `SALES_AGENT_MODEL`
    /// and `SALES_AGENT_LLM_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(&|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup(var: &dyn Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let api_url = var("LLM_API_URL").unwrap_or_else(|| DEFAULT_API_URL.into());
        // Local Ollama ignores the key but the API still wants one.
        let api_key = var("LLM_API_KEY").unwrap_or_else(|| "ollama".into());
        let model = var("SALES_AGENT_MODEL").unwrap_or_else(|| DEFAULT_MODEL.into());

        let timeout_secs = match var("SALES_AGENT_LLM_TIMEOUT_SECS") {
            Some(raw) => raw.parse::<u64>().map_err(|e| ConfigError::InvalidValue {
                key: "SALES_AGENT_LLM_TIMEOUT_SECS".into(),
                message: e.to_string(),
            })?,
            None => DEFAULT_TIMEOUT_SECS,
        };

        Ok(Self {
            api_url,
            api_key: SecretString::from(api_key),
            model,
            request_timeout: Duration::from_secs(timeout_secs),
        })
    }
}

/// Create an LLM provider from configuration.
pub fn create_provider(config: &LlmConfig) -> Arc<dyn LlmProvider> {
    tracing::info!(url = %config.api_url, model = %config.model, "Using completion service");
    Arc::new(OpenAiCompatProvider::new(
        &config.api_url,
        config.api_key.clone(),
        config.model.clone(),
        config.request_timeout,
    ))
}

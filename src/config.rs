//! Configuration.
//!
//! Two layers:
//! - environment variables for endpoints, credentials and ports
//!   (`AppConfig::from_env`)
//! - an optional TOML file named by `SALES_AGENT_CONFIG` for guardrail rules
//!   and thresholds, scoring weights, personas and timeouts (`FileConfig`)
//!
//! ```toml
//! [guardrails]
//! input_threshold = 0.7
//! output_threshold = 0.7
//! aggregate = "noisy_or"
//!
//! [[guardrails.rules]]
//! id = "injection.dan"
//! kind = "injection"
//! pattern = "(?i)\\bDAN mode\\b"
//! weight = 0.9
//!
//! [scoring.weights]
//! relevance = 0.4
//!
//! [[personas]]
//! id = "storyteller"
//! name = "Storyteller"
//! instructions = "Open with a short customer story."
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;
use serde::Deserialize;
use tracing::info;

use crate::drafting::persona::{Persona, default_personas};
use crate::drafting::scoring::ScoringConfig;
use crate::drafting::strategy::{DEFAULT_CALL_TIMEOUT, DraftingStrategy};
use crate::error::ConfigError;
use crate::guardrails::{GuardrailEngine, RiskAggregate, RuleSpec, Ruleset};
use crate::llm::{LlmConfig, LlmProvider};
use crate::mailer::delivery::DEFAULT_SEND_TIMEOUT;
use crate::mailer::smtp::SmtpConfig;
use crate::pipeline::orchestrator::{GuardrailThresholds, Orchestrator};

const DEFAULT_THRESHOLD: f64 = 0.7;

// ── File configuration ──────────────────────────────────────────────

/// `[guardrails]` table.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GuardrailSettings {
    pub input_threshold: f64,
    pub output_threshold: f64,
    pub aggregate: RiskAggregate,
    /// Keep the built-in rules underneath the configured ones.
    pub keep_default_rules: bool,
    pub rules: Vec<RuleSpec>,
}

impl Default for GuardrailSettings {
    fn default() -> Self {
        Self {
            input_threshold: DEFAULT_THRESHOLD,
            output_threshold: DEFAULT_THRESHOLD,
            aggregate: RiskAggregate::Max,
            keep_default_rules: true,
            rules: Vec::new(),
        }
    }
}

/// `[timeouts]` table, in seconds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimeoutSettings {
    pub draft_secs: u64,
    pub subject_secs: u64,
    pub send_secs: u64,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            draft_secs: DEFAULT_CALL_TIMEOUT.as_secs(),
            subject_secs: 20,
            send_secs: DEFAULT_SEND_TIMEOUT.as_secs(),
        }
    }
}

impl TimeoutSettings {
    pub fn draft(&self) -> Duration {
        Duration::from_secs(self.draft_secs)
    }

    pub fn subject(&self) -> Duration {
        Duration::from_secs(self.subject_secs)
    }

    pub fn send(&self) -> Duration {
        Duration::from_secs(self.send_secs)
    }
}

/// Contents of the TOML config file. Every table is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub guardrails: GuardrailSettings,
    pub scoring: ScoringConfig,
    pub timeouts: TimeoutSettings,
    /// Replaces the built-in personas when non-empty.
    pub personas: Vec<Persona>,
}

impl FileConfig {
    /// Parse and validate.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(text).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config = Self::parse(&text)?;
        info!(
            path = %path.display(),
            rules = config.guardrails.rules.len(),
            personas = config.personas.len(),
            "Loaded config file"
        );
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (key, value) in [
            ("guardrails.input_threshold", self.guardrails.input_threshold),
            ("guardrails.output_threshold", self.guardrails.output_threshold),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::InvalidValue {
                    key: key.into(),
                    message: format!("threshold must be a positive number, got {value}"),
                });
            }
        }

        for (key, secs) in [
            ("timeouts.draft_secs", self.timeouts.draft_secs),
            ("timeouts.subject_secs", self.timeouts.subject_secs),
            ("timeouts.send_secs", self.timeouts.send_secs),
        ] {
            if secs == 0 {
                return Err(ConfigError::InvalidValue {
                    key: key.into(),
                    message: "timeout must be at least one second".into(),
                });
            }
        }

        self.scoring.validate()?;

        let mut seen = Vec::new();
        for persona in &self.personas {
            if persona.id.trim().is_empty() || persona.instructions.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    key: "personas".into(),
                    message: "each persona needs an id and instructions".into(),
                });
            }
            if seen.contains(&persona.id) {
                return Err(ConfigError::InvalidValue {
                    key: "personas".into(),
                    message: format!("duplicate persona id {}", persona.id),
                });
            }
            seen.push(persona.id.clone());
        }

        // Compile once here so a bad pattern fails at startup.
        self.ruleset().map(|_| ())
    }

    pub fn ruleset(&self) -> Result<Ruleset, ConfigError> {
        Ruleset::from_specs(&self.guardrails.rules, self.guardrails.keep_default_rules).map_err(
            |e| ConfigError::InvalidValue {
                key: "guardrails.rules".into(),
                message: e.to_string(),
            },
        )
    }

    pub fn guardrail_engine(&self) -> Result<GuardrailEngine, ConfigError> {
        Ok(GuardrailEngine::new(
            self.ruleset()?,
            self.guardrails.aggregate,
        ))
    }

    pub fn thresholds(&self) -> GuardrailThresholds {
        GuardrailThresholds {
            input: self.guardrails.input_threshold,
            output: self.guardrails.output_threshold,
        }
    }

    /// Configured personas, or the built-in three.
    pub fn personas(&self) -> Vec<Persona> {
        if self.personas.is_empty() {
            default_personas()
        } else {
            self.personas.clone()
        }
    }

    /// Wire the orchestrator: one strategy per persona, in persona order.
    pub fn build_orchestrator(
        &self,
        llm: Arc<dyn LlmProvider>,
    ) -> Result<Orchestrator, ConfigError> {
        let strategies = self
            .personas()
            .into_iter()
            .map(|p| DraftingStrategy::new(p, llm.clone(), self.timeouts.draft()))
            .collect();
        Ok(Orchestrator::new(
            Arc::new(self.guardrail_engine()?),
            strategies,
            self.scoring.clone(),
            self.thresholds(),
        ))
    }
}

// ── Environment configuration ───────────────────────────────────────

/// Which email provider to send through.
#[derive(Debug, Clone)]
pub enum DeliveryBackend {
    SendGrid { api_key: SecretString },
    Smtp(SmtpConfig),
}

#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    pub from_address: String,
    pub backend: DeliveryBackend,
}

/// Everything the binary needs at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub delivery: DeliveryConfig,
    /// HTTP surface is only started when a port is set.
    pub http_port: Option<u16>,
    /// Contact table loaded for REPL sessions.
    pub contacts_path: Option<PathBuf>,
    pub sender_name: Option<String>,
    pub file: FileConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(&|key| std::env::var(key).ok().filter(|v| !v.is_empty()))
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup(var: &dyn Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let llm = LlmConfig::from_lookup(var)?;

        let from_address = var("FROM_EMAIL")
            .ok_or_else(|| ConfigError::MissingEnvVar("FROM_EMAIL".into()))?;
        let backend = if let Some(key) = var("SENDGRID_API_KEY").or_else(|| var("SENDGRID")) {
            DeliveryBackend::SendGrid {
                api_key: SecretString::from(key),
            }
        } else if let Some(smtp) = SmtpConfig::from_lookup(var)? {
            DeliveryBackend::Smtp(smtp)
        } else {
            return Err(ConfigError::MissingEnvVar(
                "SENDGRID_API_KEY or EMAIL_SMTP_HOST".into(),
            ));
        };

        let file = match var("SALES_AGENT_CONFIG") {
            Some(path) => FileConfig::load(Path::new(&path))?,
            None => FileConfig::default(),
        };

        Ok(Self {
            llm,
            delivery: DeliveryConfig {
                from_address,
                backend,
            },
            http_port: parse_var(var, "SALES_AGENT_HTTP_PORT")?,
            contacts_path: var("SALES_AGENT_CONTACTS").map(PathBuf::from),
            sender_name: var("SALES_AGENT_SENDER"),
            file,
        })
    }
}

fn parse_var<T>(var: &dyn Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    var(key)
        .map(|raw| {
            raw.parse::<T>().map_err(|e| ConfigError::InvalidValue {
                key: key.into(),
                message: e.to_string(),
            })
        })
        .transpose()
}

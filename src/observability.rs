//! Logging setup and audit records.
//!
//! Console output is filtered by `RUST_LOG` (or `LOG_LEVEL`). When
//! `SALES_AGENT_LOG_DIR` is set, two daily-rolling JSON files are written
//! through non-blocking appenders: `sales-agent.log` with everything the
//! filter lets through, and `audit.log` with audit records only.

use std::path::PathBuf;

use chrono::Utc;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::{EnvFilter, LevelFilter, Targets};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{Layer, fmt};

use crate::guardrails::GuardrailVerdict;
use crate::mailer::SendOutcome;

/// Target of every audit record.
pub const AUDIT_TARGET: &str = "sales_agent::audit";

const DEFAULT_FILTER: &str = "info";

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub filter: String,
    pub log_dir: Option<PathBuf>,
}

impl LogConfig {
    /// Read `RUST_LOG` (falling back to `LOG_LEVEL`) and `SALES_AGENT_LOG_DIR`.
    pub fn from_env() -> Self {
        let filter = std::env::var("RUST_LOG")
            .or_else(|_| std::env::var("LOG_LEVEL").map(|l| l.to_lowercase()))
            .unwrap_or_else(|_| DEFAULT_FILTER.into());
        let log_dir = std::env::var("SALES_AGENT_LOG_DIR").ok().map(PathBuf::from);
        Self { filter, log_dir }
    }

    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_new(&self.filter).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
    }
}

/// Keeps the file appenders flushing. Drop it only at shutdown.
pub struct LogGuards {
    _guards: Vec<WorkerGuard>,
}

/// Install the global subscriber.
pub fn init_tracing(config: &LogConfig) -> LogGuards {
    let console = fmt::layer()
        .with_target(false)
        .with_filter(config.env_filter());

    let mut guards = Vec::new();
    let (file, audit) = match &config.log_dir {
        Some(dir) => {
            let (all_writer, all_guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, "sales-agent.log"));
            let (audit_writer, audit_guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, "audit.log"));
            guards.push(all_guard);
            guards.push(audit_guard);

            let file = fmt::layer()
                .json()
                .with_writer(all_writer)
                .with_filter(config.env_filter());
            let audit = fmt::layer()
                .json()
                .with_writer(audit_writer)
                .with_filter(Targets::new().with_target(AUDIT_TARGET, LevelFilter::INFO));
            (Some(file), Some(audit))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file)
        .with(audit)
        .init();

    LogGuards { _guards: guards }
}

// ── Audit records ───────────────────────────────────────────────────

/// One record per guardrail decision.
pub fn audit_verdict(event: &'static str, verdict: &GuardrailVerdict) {
    let findings = serde_json::to_string(&verdict.findings).unwrap_or_default();
    info!(
        target: AUDIT_TARGET,
        event,
        kind = %verdict.kind,
        passed = verdict.passed,
        risk_score = verdict.risk_score,
        findings = %findings,
        timestamp = %Utc::now().to_rfc3339(),
        "Guardrail verdict"
    );
}

/// One record per delivery attempt.
pub fn audit_send(outcome: &SendOutcome) {
    info!(
        target: AUDIT_TARGET,
        event = "send_outcome",
        recipient = %outcome.recipient.email,
        delivered = outcome.delivered,
        error_detail = outcome.error_detail.as_deref().unwrap_or(""),
        timestamp = %Utc::now().to_rfc3339(),
        "Send outcome"
    );
}

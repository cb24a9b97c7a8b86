//! SMTP provider via lettre.

use std::time::Duration;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, Message, SmtpTransport, Transport};
use secrecy::{ExposeSecret, SecretString};
use tracing::info;

use crate::error::{ConfigError, DeliveryError};
use crate::mailer::delivery::{EmailProvider, OutboundEmail};

const PROVIDER: &str = "smtp";

/// SMTP relay settings.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
}

impl SmtpConfig {
    /// Build config from `EMAIL_SMTP_HOST`, `EMAIL_SMTP_PORT`,
    /// `EMAIL_USERNAME`, `EMAIL_PASSWORD`.
    /// Returns `None` if `EMAIL_SMTP_HOST` is not set.
    pub fn from_lookup(
        var: &dyn Fn(&str) -> Option<String>,
    ) -> Result<Option<Self>, ConfigError> {
        let Some(host) = var("EMAIL_SMTP_HOST") else {
            return Ok(None);
        };
        let port = match var("EMAIL_SMTP_PORT") {
            Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
                key: "EMAIL_SMTP_PORT".into(),
                message: format!("not a port number: {raw}"),
            })?,
            None => 587,
        };
        Ok(Some(Self {
            host,
            port,
            username: var("EMAIL_USERNAME").unwrap_or_default(),
            password: SecretString::from(var("EMAIL_PASSWORD").unwrap_or_default()),
        }))
    }
}

pub struct SmtpProvider {
    transport: SmtpTransport,
}

impl SmtpProvider {
    /// Port 465 uses implicit TLS, anything else STARTTLS. `timeout`
    /// bounds each socket operation on the relay connection.
    pub fn new(config: &SmtpConfig, timeout: Duration) -> Result<Self, ConfigError> {
        let builder = if config.port == 465 {
            SmtpTransport::relay(&config.host)
        } else {
            SmtpTransport::starttls_relay(&config.host)
        }
        .map_err(|e| ConfigError::InvalidValue {
            key: "EMAIL_SMTP_HOST".into(),
            message: format!("SMTP relay error: {e}"),
        })?;

        let creds = Credentials::new(
            config.username.clone(),
            config.password.expose_secret().to_string(),
        );
        let transport = builder
            .port(config.port)
            .credentials(creds)
            .timeout(Some(timeout))
            .build();
        info!(
            host = %config.host,
            port = config.port,
            timeout_secs = timeout.as_secs(),
            "SMTP transport ready"
        );
        Ok(Self { transport })
    }
}

/// Build the MIME message for one recipient.
fn build_message(email: &OutboundEmail) -> Result<Message, DeliveryError> {
    let from: Address = email.from.parse().map_err(|e| DeliveryError::InvalidAddress {
        address: email.from.clone(),
        reason: format!("invalid from address: {e}"),
    })?;
    let to: Address = email.to.parse().map_err(|e| DeliveryError::InvalidAddress {
        address: email.to.clone(),
        reason: format!("invalid to address: {e}"),
    })?;

    Message::builder()
        .from(Mailbox::new(None, from))
        .to(Mailbox::new(email.to_name.clone(), to))
        .subject(&email.subject)
        .header(ContentType::TEXT_HTML)
        .body(email.html_body.clone())
        .map_err(|e| DeliveryError::Transport {
            provider: PROVIDER.into(),
            reason: format!("failed to build email: {e}"),
        })
}

#[async_trait]
impl EmailProvider for SmtpProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn send(&self, email: &OutboundEmail) -> Result<(), DeliveryError> {
        let message = build_message(email)?;
        let transport = self.transport.clone();
        let recipient = email.to.clone();

        // lettre's SmtpTransport is blocking.
        tokio::task::spawn_blocking(move || transport.send(&message))
            .await
            .map_err(|e| DeliveryError::Transport {
                provider: PROVIDER.into(),
                reason: format!("send task failed: {e}"),
            })?
            .map_err(|e| {
                if e.is_permanent() {
                    DeliveryError::Rejected {
                        provider: PROVIDER.into(),
                        recipient,
                        reason: e.to_string(),
                    }
                } else {
                    DeliveryError::Transport {
                        provider: PROVIDER.into(),
                        reason: format!("SMTP send failed: {e}"),
                    }
                }
            })?;
        Ok(())
    }
}

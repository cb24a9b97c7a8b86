//! SendGrid v3 `mail/send` provider.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::DeliveryError;
use crate::mailer::delivery::{EmailProvider, OutboundEmail};

const PROVIDER: &str = "sendgrid";
const DEFAULT_BASE_URL: &str = "https://api.sendgrid.com";
const MAX_ERROR_BODY_CHARS: usize = 300;

pub struct SendGridProvider {
    base_url: String,
    api_key: SecretString,
    client: Client,
}

#[derive(Serialize)]
struct MailSend<'a> {
    personalizations: [Personalization<'a>; 1],
    from: Address<'a>,
    subject: &'a str,
    content: [Content<'a>; 1],
}

#[derive(Serialize)]
struct Personalization<'a> {
    to: [Address<'a>; 1],
}

#[derive(Serialize)]
struct Address<'a> {
    email: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
}

#[derive(Serialize)]
struct Content<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    value: &'a str,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    errors: Vec<ErrorItem>,
}

#[derive(Deserialize)]
struct ErrorItem {
    #[serde(default)]
    message: String,
}

impl SendGridProvider {
    pub fn new(api_key: SecretString) -> Self {
        Self::with_base_url(DEFAULT_BASE_URL, api_key)
    }

    /// Point at a different host (tests, regional endpoints).
    pub fn with_base_url(base_url: &str, api_key: SecretString) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            client: Client::builder()
                .connect_timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }
}

#[async_trait]
impl EmailProvider for SendGridProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn send(&self, email: &OutboundEmail) -> Result<(), DeliveryError> {
        let body = MailSend {
            personalizations: [Personalization {
                to: [Address {
                    email: &email.to,
                    name: email.to_name.as_deref(),
                }],
            }],
            from: Address {
                email: &email.from,
                name: None,
            },
            subject: &email.subject,
            content: [Content {
                kind: "text/html",
                value: &email.html_body,
            }],
        };

        let response = self
            .client
            .post(format!("{}/v3/mail/send", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| DeliveryError::Transport {
                provider: PROVIDER.into(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if status.is_success() {
            debug!(to = %email.to, status = status.as_u16(), "SendGrid accepted message");
            return Ok(());
        }

        let text = response.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<ErrorBody>(&text)
            .ok()
            .map(|b| {
                b.errors
                    .into_iter()
                    .map(|e| e.message)
                    .filter(|m| !m.is_empty())
                    .collect::<Vec<_>>()
                    .join("; ")
            })
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| text.chars().take(MAX_ERROR_BODY_CHARS).collect());

        Err(DeliveryError::Rejected {
            provider: PROVIDER.into(),
            recipient: email.to.clone(),
            reason: format!("HTTP {}: {}", status.as_u16(), detail),
        })
    }
}

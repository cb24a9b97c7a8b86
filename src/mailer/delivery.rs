//! Per-recipient delivery.
//!
//! One attempt per recipient, all recipients concurrently, each with its own
//! timeout. A failure is recorded in that recipient's `SendOutcome` and never
//! stops the rest of the batch.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use serde::Serialize;
use tracing::info;

use crate::error::DeliveryError;
use crate::mailer::format::to_html;
use crate::observability::audit_send;
use crate::pipeline::types::Contact;

/// A fully-rendered message ready for the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundEmail {
    pub from: String,
    pub to: String,
    pub to_name: Option<String>,
    pub subject: String,
    pub html_body: String,
}

/// Transactional email service.
#[async_trait]
pub trait EmailProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, email: &OutboundEmail) -> Result<(), DeliveryError>;
}

/// Result for one recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SendOutcome {
    pub recipient: Contact,
    pub delivered: bool,
    pub error_detail: Option<String>,
}

pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(30);

pub struct DeliveryAdapter {
    provider: Arc<dyn EmailProvider>,
    from_address: String,
    send_timeout: Duration,
}

impl DeliveryAdapter {
    pub fn new(
        provider: Arc<dyn EmailProvider>,
        from_address: impl Into<String>,
        send_timeout: Duration,
    ) -> Self {
        Self {
            provider,
            from_address: from_address.into(),
            send_timeout,
        }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Send every personalized text. Outcomes come back in input order.
    pub async fn send_all(
        &self,
        subject: &str,
        personalized: Vec<(Contact, String)>,
    ) -> Vec<SendOutcome> {
        let total = personalized.len();
        let outcomes =
            join_all(personalized.into_iter().map(|(contact, body)| self.send_one(subject, contact, body)))
                .await;

        let delivered = outcomes.iter().filter(|o| o.delivered).count();
        info!(
            provider = self.provider.name(),
            delivered,
            failed = total - delivered,
            "Batch send finished"
        );
        outcomes
    }

    async fn send_one(&self, subject: &str, contact: Contact, body: String) -> SendOutcome {
        let email = OutboundEmail {
            from: self.from_address.clone(),
            to: contact.email.clone(),
            to_name: Some(contact.name.clone()),
            subject: subject.to_string(),
            html_body: to_html(&body),
        };

        let result = match tokio::time::timeout(self.send_timeout, self.provider.send(&email)).await
        {
            Ok(result) => result,
            Err(_) => Err(DeliveryError::Timeout {
                recipient: contact.email.clone(),
                timeout: self.send_timeout,
            }),
        };

        let outcome = SendOutcome {
            recipient: contact,
            delivered: result.is_ok(),
            error_detail: result.err().map(|e| e.to_string()),
        };
        audit_send(&outcome);
        outcome
    }
}

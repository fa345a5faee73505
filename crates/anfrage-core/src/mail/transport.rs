//! Outbound mail transport (SMTP submission)

use super::sanitize::html_to_text;
use anfrage_storage::models::{MailSettings, QueueItem, SmtpSecurity};
use async_trait::async_trait;
use lettre::{
    message::{Mailbox, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// Email handed to the transport
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundEmail {
    pub to_address: String,
    pub to_name: Option<String>,
    pub subject: String,
    pub html_body: String,
    /// Derived from the HTML body when absent
    pub text_body: Option<String>,
    pub reply_to: Option<String>,
    pub in_reply_to: Option<String>,
}

impl From<&QueueItem> for OutboundEmail {
    fn from(item: &QueueItem) -> Self {
        Self {
            to_address: item.to_address.clone(),
            to_name: item.to_name.clone(),
            subject: item.subject.clone(),
            html_body: item.html_body.clone(),
            text_body: item.text_body.clone(),
            reply_to: item.reply_to.clone(),
            in_reply_to: item.in_reply_to.clone(),
        }
    }
}

/// Result of a single send
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SendOutcome {
    pub success: bool,
    pub message_id: Option<String>,
    pub error: Option<String>,
}

impl SendOutcome {
    pub fn sent(message_id: impl Into<String>) -> Self {
        Self {
            success: true,
            message_id: Some(message_id.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            message_id: None,
            error: Some(error.into()),
        }
    }
}

/// Result of a connectivity check
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionCheck {
    pub success: bool,
    pub error: Option<String>,
}

impl ConnectionCheck {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

/// Outbound transport.
///
/// Ordinary delivery problems (refused connection, timeout, rejected
/// recipient) are reported through the outcome, never as errors.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, settings: &MailSettings, email: &OutboundEmail) -> SendOutcome;

    async fn test_connection(&self, settings: &MailSettings) -> ConnectionCheck;
}

/// SMTP transport built on lettre
#[derive(Debug, Clone)]
pub struct SmtpMailer {
    timeout: Duration,
}

impl SmtpMailer {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn transport(
        &self,
        settings: &MailSettings,
    ) -> Result<AsyncSmtpTransport<Tokio1Executor>, String> {
        let builder = match settings.smtp_security {
            SmtpSecurity::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(&settings.smtp_host)
                .map_err(|e| format!("Failed to create SMTP transport: {}", e))?,
            SmtpSecurity::Starttls => {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.smtp_host)
                    .map_err(|e| format!("Failed to create SMTP transport: {}", e))?
            }
            SmtpSecurity::None => {
                AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&settings.smtp_host)
            }
        };

        let mut builder = builder
            .port(settings.smtp_port)
            .timeout(Some(self.timeout));

        if !settings.smtp_user.is_empty() {
            builder = builder.credentials(Credentials::new(
                settings.smtp_user.clone(),
                settings.smtp_password.clone(),
            ));
        }

        Ok(builder.build())
    }
}

fn mailbox(name: Option<&str>, address: &str) -> Result<Mailbox, String> {
    let address = address
        .parse()
        .map_err(|e| format!("Invalid address {}: {}", address, e))?;
    let name = name.map(str::trim).filter(|n| !n.is_empty()).map(str::to_string);
    Ok(Mailbox::new(name, address))
}

/// Message-ID in the sender's domain
fn new_message_id(from_address: &str) -> String {
    let domain = from_address
        .rsplit_once('@')
        .map(|(_, domain)| domain)
        .unwrap_or("localhost");
    format!("<{}@{}>", Uuid::new_v4(), domain)
}

/// Normalize a Message-ID to its angle-bracket form
fn bracketed(id: &str) -> String {
    let id = id.trim();
    if id.starts_with('<') {
        id.to_string()
    } else {
        format!("<{}>", id)
    }
}

/// Build the MIME message for an outbound email
pub fn build_message(
    settings: &MailSettings,
    email: &OutboundEmail,
    message_id: &str,
) -> Result<Message, String> {
    let from = mailbox(Some(&settings.from_name), &settings.from_address)?;
    let to = mailbox(email.to_name.as_deref(), &email.to_address)?;

    let mut builder = Message::builder()
        .from(from)
        .to(to)
        .subject(email.subject.as_str())
        .message_id(Some(message_id.to_string()));

    if let Some(reply_to) = &email.reply_to {
        builder = builder.reply_to(mailbox(None, reply_to)?);
    }

    if let Some(parent) = &email.in_reply_to {
        let parent = bracketed(parent);
        builder = builder.in_reply_to(parent.clone()).references(parent);
    }

    let text = email
        .text_body
        .clone()
        .unwrap_or_else(|| html_to_text(&email.html_body));

    builder
        .multipart(
            MultiPart::alternative()
                .singlepart(SinglePart::plain(text))
                .singlepart(SinglePart::html(email.html_body.clone())),
        )
        .map_err(|e| format!("Failed to build email: {}", e))
}

#[async_trait]
impl MailTransport for SmtpMailer {
    async fn send(&self, settings: &MailSettings, email: &OutboundEmail) -> SendOutcome {
        let message_id = new_message_id(&settings.from_address);

        let message = match build_message(settings, email, &message_id) {
            Ok(m) => m,
            Err(e) => return SendOutcome::failed(e),
        };

        let mailer = match self.transport(settings) {
            Ok(m) => m,
            Err(e) => return SendOutcome::failed(e),
        };

        match mailer.send(message).await {
            Ok(response) => {
                debug!(to = %email.to_address, code = %response.code(), "SMTP accepted message");
                SendOutcome::sent(message_id)
            }
            Err(e) => {
                warn!(to = %email.to_address, error = %e, "SMTP send failed");
                SendOutcome::failed(e.to_string())
            }
        }
    }

    async fn test_connection(&self, settings: &MailSettings) -> ConnectionCheck {
        let mailer = match self.transport(settings) {
            Ok(m) => m,
            Err(e) => return ConnectionCheck::failed(e),
        };

        match mailer.test_connection().await {
            Ok(true) => ConnectionCheck::ok(),
            Ok(false) => ConnectionCheck::failed("SMTP server did not accept the connection"),
            Err(e) => ConnectionCheck::failed(e.to_string()),
        }
    }
}

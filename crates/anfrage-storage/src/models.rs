//! Database models
//!
//! Rows are read through `*Row` structs that mirror the table columns one to
//! one and are converted into the domain types below. Enumerated columns are
//! parsed during that conversion so an unexpected value fails the read
//! instead of leaking an unknown state into the workers.

use anfrage_common::types::{
    Direction, EmailAddress, EmailType, MessageId, QueueItemId, QueueStatus, StaffUserId,
    TicketCategory, TicketId, TicketStatus,
};
use anfrage_common::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::str::FromStr;

fn parse_column<T>(column: &str, value: &str) -> Result<T>
where
    T: FromStr<Err = String>,
{
    value
        .parse()
        .map_err(|e| Error::Database(format!("Unexpected value in column {}: {}", column, e)))
}

/// Ticket (contact request)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: TicketId,
    pub ticket_number: i64,
    pub category: TicketCategory,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub message: String,
    pub metadata: serde_json::Value,
    pub status: TicketStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub(crate) struct TicketRow {
    pub id: TicketId,
    pub ticket_number: i64,
    pub category: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub message: String,
    pub metadata: serde_json::Value,
    pub status: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<TicketRow> for Ticket {
    type Error = Error;

    fn try_from(row: TicketRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            ticket_number: row.ticket_number,
            category: parse_column("tickets.category", &row.category)?,
            name: row.name,
            email: row.email,
            phone: row.phone,
            message: row.message,
            metadata: row.metadata,
            status: parse_column("tickets.status", &row.status)?,
            notes: row.notes,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Input for creating a ticket
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTicket {
    pub category: TicketCategory,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    #[serde(default)]
    pub message: String,
    #[serde(default = "empty_metadata")]
    pub metadata: serde_json::Value,
}

fn empty_metadata() -> serde_json::Value {
    serde_json::json!({})
}

impl CreateTicket {
    /// Reject tickets without a requester name or with an implausible address
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Validation("Name is required".to_string()));
        }
        if self.email.trim().is_empty() {
            return Err(Error::Validation("Email is required".to_string()));
        }
        if EmailAddress::parse(&self.email).is_none() {
            return Err(Error::Validation(format!(
                "Invalid email address: {}",
                self.email
            )));
        }
        if !self.metadata.is_object() {
            return Err(Error::Validation("Metadata must be a JSON object".to_string()));
        }
        Ok(())
    }
}

/// Message in a ticket conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub id: MessageId,
    pub ticket_id: TicketId,
    pub direction: Direction,
    pub from_address: String,
    pub from_name: Option<String>,
    pub to_address: String,
    pub to_name: Option<String>,
    pub subject: String,
    pub html_body: Option<String>,
    pub text_body: Option<String>,
    pub message_id: Option<String>,
    pub in_reply_to: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub(crate) struct ConversationMessageRow {
    pub id: MessageId,
    pub ticket_id: TicketId,
    pub direction: String,
    pub from_address: String,
    pub from_name: Option<String>,
    pub to_address: String,
    pub to_name: Option<String>,
    pub subject: String,
    pub html_body: Option<String>,
    pub text_body: Option<String>,
    pub message_id: Option<String>,
    pub in_reply_to: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<ConversationMessageRow> for ConversationMessage {
    type Error = Error;

    fn try_from(row: ConversationMessageRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            ticket_id: row.ticket_id,
            direction: parse_column("ticket_messages.direction", &row.direction)?,
            from_address: row.from_address,
            from_name: row.from_name,
            to_address: row.to_address,
            to_name: row.to_name,
            subject: row.subject,
            html_body: row.html_body,
            text_body: row.text_body,
            message_id: row.message_id,
            in_reply_to: row.in_reply_to,
            created_at: row.created_at,
        })
    }
}

/// Input for appending a conversation message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMessage {
    pub direction: Direction,
    pub from_address: String,
    pub from_name: Option<String>,
    pub to_address: String,
    pub to_name: Option<String>,
    pub subject: String,
    pub html_body: Option<String>,
    pub text_body: Option<String>,
    pub message_id: Option<String>,
    pub in_reply_to: Option<String>,
}

/// Persisted outbound email
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: QueueItemId,
    pub ticket_id: Option<TicketId>,
    pub to_address: String,
    pub to_name: Option<String>,
    pub subject: String,
    pub html_body: String,
    pub text_body: Option<String>,
    pub reply_to: Option<String>,
    pub in_reply_to: Option<String>,
    pub email_type: EmailType,
    pub status: QueueStatus,
    pub attempts: i32,
    pub max_attempts: i32,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub message_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub(crate) struct QueueItemRow {
    pub id: QueueItemId,
    pub ticket_id: Option<TicketId>,
    pub to_address: String,
    pub to_name: Option<String>,
    pub subject: String,
    pub html_body: String,
    pub text_body: Option<String>,
    pub reply_to: Option<String>,
    pub in_reply_to: Option<String>,
    pub email_type: String,
    pub status: String,
    pub attempts: i32,
    pub max_attempts: i32,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub message_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<QueueItemRow> for QueueItem {
    type Error = Error;

    fn try_from(row: QueueItemRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            ticket_id: row.ticket_id,
            to_address: row.to_address,
            to_name: row.to_name,
            subject: row.subject,
            html_body: row.html_body,
            text_body: row.text_body,
            reply_to: row.reply_to,
            in_reply_to: row.in_reply_to,
            email_type: parse_column("email_queue.email_type", &row.email_type)?,
            status: parse_column("email_queue.status", &row.status)?,
            attempts: row.attempts,
            max_attempts: row.max_attempts,
            last_attempt_at: row.last_attempt_at,
            error_message: row.error_message,
            sent_at: row.sent_at,
            message_id: row.message_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Input for enqueueing an outbound email
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewQueueItem {
    pub ticket_id: Option<TicketId>,
    pub to_address: String,
    pub to_name: Option<String>,
    pub subject: String,
    pub html_body: String,
    pub text_body: Option<String>,
    pub reply_to: Option<String>,
    pub in_reply_to: Option<String>,
    pub email_type: EmailType,
    /// Defaults to the configured queue maximum when absent
    pub max_attempts: Option<i32>,
}

impl NewQueueItem {
    pub fn validate(&self) -> Result<()> {
        if EmailAddress::parse(&self.to_address).is_none() {
            return Err(Error::Validation(format!(
                "Invalid recipient address: {}",
                self.to_address
            )));
        }
        if let Some(max) = self.max_attempts {
            if max < 1 {
                return Err(Error::Validation(
                    "max_attempts must be at least 1".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Queue counts by status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: i64,
    pub processing: i64,
    pub sent: i64,
    pub failed: i64,
}

impl QueueStats {
    pub fn total(&self) -> i64 {
        self.pending + self.processing + self.sent + self.failed
    }
}

/// SMTP connection security
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SmtpSecurity {
    /// Implicit TLS, usually port 465
    Tls,
    /// Plain connection upgraded with STARTTLS, usually port 587
    #[default]
    Starttls,
    /// Unencrypted, only for local relays
    None,
}

impl std::fmt::Display for SmtpSecurity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SmtpSecurity::Tls => write!(f, "tls"),
            SmtpSecurity::Starttls => write!(f, "starttls"),
            SmtpSecurity::None => write!(f, "none"),
        }
    }
}

impl std::str::FromStr for SmtpSecurity {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "tls" | "ssl" => Ok(SmtpSecurity::Tls),
            "starttls" => Ok(SmtpSecurity::Starttls),
            "none" => Ok(SmtpSecurity::None),
            _ => Err(format!("Invalid SMTP security: {}", s)),
        }
    }
}

/// Mail transport settings (singleton)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MailSettings {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_user: String,
    pub smtp_password: String,
    pub smtp_security: SmtpSecurity,
    pub imap_host: String,
    pub imap_port: u16,
    pub imap_user: String,
    pub imap_password: String,
    pub imap_mailbox: String,
    pub from_address: String,
    pub from_name: String,
    pub active: bool,
    pub updated_at: DateTime<Utc>,
}

impl MailSettings {
    /// Whether inbound fetching has enough configuration to connect
    pub fn has_imap(&self) -> bool {
        !self.imap_host.is_empty() && !self.imap_user.is_empty()
    }
}

#[derive(Debug, Clone, FromRow)]
pub(crate) struct MailSettingsRow {
    pub smtp_host: String,
    pub smtp_port: i32,
    pub smtp_user: String,
    pub smtp_password: String,
    pub smtp_security: String,
    pub imap_host: String,
    pub imap_port: i32,
    pub imap_user: String,
    pub imap_password: String,
    pub imap_mailbox: String,
    pub from_address: String,
    pub from_name: String,
    pub active: bool,
    pub updated_at: DateTime<Utc>,
}

fn port_column(column: &str, value: i32) -> Result<u16> {
    u16::try_from(value)
        .map_err(|_| Error::Database(format!("Unexpected value in column {}: {}", column, value)))
}

impl TryFrom<MailSettingsRow> for MailSettings {
    type Error = Error;

    fn try_from(row: MailSettingsRow) -> Result<Self> {
        Ok(Self {
            smtp_host: row.smtp_host,
            smtp_port: port_column("mail_settings.smtp_port", row.smtp_port)?,
            smtp_user: row.smtp_user,
            smtp_password: row.smtp_password,
            smtp_security: parse_column("mail_settings.smtp_security", &row.smtp_security)?,
            imap_host: row.imap_host,
            imap_port: port_column("mail_settings.imap_port", row.imap_port)?,
            imap_user: row.imap_user,
            imap_password: row.imap_password,
            imap_mailbox: row.imap_mailbox,
            from_address: row.from_address,
            from_name: row.from_name,
            active: row.active,
            updated_at: row.updated_at,
        })
    }
}

/// Input for saving mail settings.
///
/// A `None` password keeps the stored one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateMailSettings {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_user: String,
    pub smtp_password: Option<String>,
    pub smtp_security: SmtpSecurity,
    pub imap_host: String,
    pub imap_port: u16,
    pub imap_user: String,
    pub imap_password: Option<String>,
    pub imap_mailbox: String,
    pub from_address: String,
    pub from_name: String,
    pub active: bool,
}

impl UpdateMailSettings {
    pub fn validate(&self) -> Result<()> {
        if self.smtp_host.trim().is_empty() {
            return Err(Error::Validation("SMTP host is required".to_string()));
        }
        if self.smtp_port == 0 || (!self.imap_host.is_empty() && self.imap_port == 0) {
            return Err(Error::Validation("Port must be non-zero".to_string()));
        }
        if EmailAddress::parse(&self.from_address).is_none() {
            return Err(Error::Validation(format!(
                "Invalid sender address: {}",
                self.from_address
            )));
        }
        Ok(())
    }
}

/// Staff member receiving new-ticket notifications
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct StaffUser {
    pub id: StaffUserId,
    pub name: String,
    pub email: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ticket_input() -> CreateTicket {
        CreateTicket {
            category: TicketCategory::Viewing,
            name: "Erika Muster".to_string(),
            email: "erika@example.de".to_string(),
            phone: None,
            message: "Ist die Wohnung noch frei?".to_string(),
            metadata: serde_json::json!({"property": "Altbau Mitte"}),
        }
    }

    #[test]
    fn test_create_ticket_validation() {
        assert!(ticket_input().validate().is_ok());

        let missing_name = CreateTicket {
            name: "  ".to_string(),
            ..ticket_input()
        };
        assert!(matches!(missing_name.validate(), Err(Error::Validation(_))));

        let bad_email = CreateTicket {
            email: "erika".to_string(),
            ..ticket_input()
        };
        assert!(matches!(bad_email.validate(), Err(Error::Validation(_))));

        let bad_metadata = CreateTicket {
            metadata: serde_json::json!([1, 2]),
            ..ticket_input()
        };
        assert!(bad_metadata.validate().is_err());
    }

    #[test]
    fn test_ticket_row_conversion_rejects_unknown_status() {
        let row = TicketRow {
            id: uuid::Uuid::new_v4(),
            ticket_number: 7,
            category: "rental".to_string(),
            name: "A".to_string(),
            email: "a@example.de".to_string(),
            phone: None,
            message: String::new(),
            metadata: serde_json::json!({}),
            status: "archived".to_string(),
            notes: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(matches!(Ticket::try_from(row.clone()), Err(Error::Database(_))));

        let ticket = Ticket::try_from(TicketRow {
            status: "in_progress".to_string(),
            ..row
        })
        .unwrap();
        assert_eq!(ticket.status, TicketStatus::InProgress);
        assert_eq!(ticket.category, TicketCategory::Rental);
    }

    #[test]
    fn test_queue_stats_total() {
        let stats = QueueStats {
            pending: 2,
            processing: 1,
            sent: 10,
            failed: 3,
        };
        assert_eq!(stats.total(), 16);
    }

    #[test]
    fn test_smtp_security_parse() {
        assert_eq!("ssl".parse::<SmtpSecurity>(), Ok(SmtpSecurity::Tls));
        assert_eq!("starttls".parse::<SmtpSecurity>(), Ok(SmtpSecurity::Starttls));
        assert!("plain".parse::<SmtpSecurity>().is_err());
    }

    #[test]
    fn test_new_queue_item_validation() {
        let item = NewQueueItem {
            ticket_id: None,
            to_address: "kunde@example.de".to_string(),
            to_name: None,
            subject: "Test".to_string(),
            html_body: "<p>Test</p>".to_string(),
            text_body: None,
            reply_to: None,
            in_reply_to: None,
            email_type: EmailType::Reply,
            max_attempts: Some(0),
        };
        assert!(item.validate().is_err());
        assert!(NewQueueItem {
            max_attempts: None,
            ..item
        }
        .validate()
        .is_ok());
    }
}

//! Common types for Anfrage Desk

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for tickets (contact requests)
pub type TicketId = Uuid;

/// Unique identifier for conversation messages
pub type MessageId = Uuid;

/// Unique identifier for outbound queue items
pub type QueueItemId = Uuid;

/// Unique identifier for staff users
pub type StaffUserId = Uuid;

/// Timestamp wrapper
pub type Timestamp = DateTime<Utc>;

/// Email address
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EmailAddress {
    pub local: String,
    pub domain: String,
}

impl EmailAddress {
    /// Create a new email address
    pub fn new(local: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            local: local.into(),
            domain: domain.into(),
        }
    }

    /// Parse an email address from a string.
    ///
    /// Only plausibility is checked: a non-empty local part, a dotted domain
    /// and no whitespace anywhere.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if s.chars().any(char::is_whitespace) {
            return None;
        }
        let (local, domain) = s.rsplit_once('@')?;
        if local.is_empty() || domain.is_empty() || local.contains('@') {
            return None;
        }
        if !domain.contains('.') || domain.starts_with('.') || domain.ends_with('.') {
            return None;
        }
        Some(Self::new(local, domain))
    }
}

impl std::fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.local, self.domain)
    }
}

impl std::str::FromStr for EmailAddress {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| crate::Error::Validation("Invalid email address".to_string()))
    }
}

/// Ticket reference as written in a subject tag: either the human ticket
/// number or the opaque ticket id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TicketRef(String);

impl TicketRef {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Interpret the reference as a ticket number
    pub fn as_number(&self) -> Option<i64> {
        if self.0.bytes().all(|b| b.is_ascii_digit()) {
            self.0.parse().ok()
        } else {
            None
        }
    }

    /// Interpret the reference as a ticket id
    pub fn as_id(&self) -> Option<TicketId> {
        Uuid::parse_str(&self.0).ok()
    }
}

impl std::fmt::Display for TicketRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<i64> for TicketRef {
    fn from(number: i64) -> Self {
        Self(number.to_string())
    }
}

impl From<Uuid> for TicketRef {
    fn from(id: Uuid) -> Self {
        Self(id.to_string())
    }
}

/// Ticket status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    New,
    InProgress,
    Done,
}

impl std::fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TicketStatus::New => write!(f, "new"),
            TicketStatus::InProgress => write!(f, "in_progress"),
            TicketStatus::Done => write!(f, "done"),
        }
    }
}

impl std::str::FromStr for TicketStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(TicketStatus::New),
            "in_progress" => Ok(TicketStatus::InProgress),
            "done" => Ok(TicketStatus::Done),
            _ => Err(format!("Invalid ticket status: {}", s)),
        }
    }
}

/// Kind of request a ticket was opened for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketCategory {
    General,
    Viewing,
    Valuation,
    Rental,
    Purchase,
    Sale,
    /// Opened from an inbound email without a known ticket tag
    Email,
}

impl TicketCategory {
    /// German label used in staff notifications
    pub fn label(&self) -> &'static str {
        match self {
            TicketCategory::General => "Allgemeine Anfrage",
            TicketCategory::Viewing => "Besichtigung",
            TicketCategory::Valuation => "Immobilienbewertung",
            TicketCategory::Rental => "Vermietung",
            TicketCategory::Purchase => "Kaufinteresse",
            TicketCategory::Sale => "Verkauf",
            TicketCategory::Email => "E-Mail",
        }
    }
}

impl std::fmt::Display for TicketCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TicketCategory::General => write!(f, "general"),
            TicketCategory::Viewing => write!(f, "viewing"),
            TicketCategory::Valuation => write!(f, "valuation"),
            TicketCategory::Rental => write!(f, "rental"),
            TicketCategory::Purchase => write!(f, "purchase"),
            TicketCategory::Sale => write!(f, "sale"),
            TicketCategory::Email => write!(f, "email"),
        }
    }
}

impl std::str::FromStr for TicketCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "general" => Ok(TicketCategory::General),
            "viewing" => Ok(TicketCategory::Viewing),
            "valuation" => Ok(TicketCategory::Valuation),
            "rental" => Ok(TicketCategory::Rental),
            "purchase" => Ok(TicketCategory::Purchase),
            "sale" => Ok(TicketCategory::Sale),
            "email" => Ok(TicketCategory::Email),
            _ => Err(format!("Invalid ticket category: {}", s)),
        }
    }
}

/// Direction of a conversation message relative to the agency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Incoming,
    Outgoing,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Incoming => write!(f, "incoming"),
            Direction::Outgoing => write!(f, "outgoing"),
        }
    }
}

impl std::str::FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "incoming" => Ok(Direction::Incoming),
            "outgoing" => Ok(Direction::Outgoing),
            _ => Err(format!("Invalid message direction: {}", s)),
        }
    }
}

/// Outbound queue item status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    Pending,
    Processing,
    Sent,
    Failed,
}

impl std::fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueStatus::Pending => write!(f, "pending"),
            QueueStatus::Processing => write!(f, "processing"),
            QueueStatus::Sent => write!(f, "sent"),
            QueueStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for QueueStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(QueueStatus::Pending),
            "processing" => Ok(QueueStatus::Processing),
            "sent" => Ok(QueueStatus::Sent),
            "failed" => Ok(QueueStatus::Failed),
            _ => Err(format!("Invalid queue status: {}", s)),
        }
    }
}

/// Purpose of an outbound email
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailType {
    /// Staff reply to a requester
    Reply,
    /// Receipt confirmation sent to a requester
    Confirmation,
    /// New-ticket notice sent to staff
    Notification,
}

impl std::fmt::Display for EmailType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmailType::Reply => write!(f, "reply"),
            EmailType::Confirmation => write!(f, "confirmation"),
            EmailType::Notification => write!(f, "notification"),
        }
    }
}

impl std::str::FromStr for EmailType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reply" => Ok(EmailType::Reply),
            "confirmation" => Ok(EmailType::Confirmation),
            "notification" => Ok(EmailType::Notification),
            _ => Err(format!("Invalid email type: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_address_parse() {
        let email = EmailAddress::parse("kunde@example.de").unwrap();
        assert_eq!(email.local, "kunde");
        assert_eq!(email.domain, "example.de");
        assert_eq!(email.to_string(), "kunde@example.de");
    }

    #[test]
    fn test_email_address_invalid() {
        assert!(EmailAddress::parse("invalid").is_none());
        assert!(EmailAddress::parse("@example.com").is_none());
        assert!(EmailAddress::parse("user@").is_none());
        assert!(EmailAddress::parse("user@localhost").is_none());
        assert!(EmailAddress::parse("max mustermann@example.com").is_none());
        assert!(EmailAddress::parse("a@b@example.com").is_none());
    }

    #[test]
    fn test_status_round_trip_strings() {
        for status in [TicketStatus::New, TicketStatus::InProgress, TicketStatus::Done] {
            assert_eq!(status.to_string().parse::<TicketStatus>(), Ok(status));
        }
        assert!("closed".parse::<TicketStatus>().is_err());
        assert_eq!("failed".parse::<QueueStatus>(), Ok(QueueStatus::Failed));
    }

    #[test]
    fn test_ticket_ref_interpretation() {
        assert_eq!(TicketRef::new("482").as_number(), Some(482));
        assert_eq!(TicketRef::new("482").as_id(), None);
        let id = Uuid::new_v4();
        assert_eq!(TicketRef::from(id).as_id(), Some(id));
        assert_eq!(TicketRef::from(id).as_number(), None);
        assert_eq!(TicketRef::new("-5").as_number(), None);
        assert_eq!(TicketRef::new("abc").as_number(), None);
    }

    #[test]
    fn test_serde_names_match_display() {
        let json = serde_json::to_string(&TicketStatus::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
        let json = serde_json::to_string(&EmailType::Notification).unwrap();
        assert_eq!(json, "\"notification\"");
    }
}

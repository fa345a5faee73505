//! Anfrage Core - mail queue, inbound fetch and ticket correlation
//!
//! This crate provides the mail adapters (SMTP submission, IMAP polling,
//! parsing and sanitizing), the drain and fetch workers, the subject tag
//! correlator, and the desk services the HTTP layer calls.

pub mod correlator;
pub mod desk;
pub mod fetch;
pub mod mail;
pub mod queue;

#[cfg(test)]
pub(crate) mod testing;

pub use correlator::{extract_ticket_ref, reply_subject, tag_subject};
pub use desk::{InquiryService, Notifier, ReplyService, SettingsService};
pub use fetch::{FetchSummary, FetchWorker};
pub use mail::{ImapMailbox, InboundMailbox, MailTransport, SmtpMailer};
pub use queue::{DrainSummary, DrainWorker};

//! Mail transport adapters and message handling

pub mod inbound;
pub mod parse;
pub mod sanitize;
pub mod transport;

pub use inbound::{FetchBatch, ImapMailbox, InboundMailbox, MailboxSession, SkippedMessage};
pub use parse::{parse_email, FetchedEmail};
pub use sanitize::{html_to_text, sanitize_html};
pub use transport::{ConnectionCheck, MailTransport, OutboundEmail, SendOutcome, SmtpMailer};

//! Desk services used by the HTTP layer
//!
//! Each service composes the repositories and the notifier into one
//! user-facing operation; none of them talks to a mail server except the
//! settings connection test.

pub mod inquiries;
pub mod notifications;
pub mod replies;
pub mod settings;

pub use inquiries::{InquiryReceipt, InquiryService};
pub use notifications::{text_to_html, Notifier, StaffNotifications};
pub use replies::{ReplyRequest, ReplyService};
pub use settings::{MailSettingsView, SettingsService, SettingsTestReport, MASKED_PASSWORD};

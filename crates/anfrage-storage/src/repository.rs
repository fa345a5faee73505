//! Repository layer for data access

pub mod api_keys;
pub mod email_queue;
pub mod mail_settings;
pub mod staff;
pub mod tickets;

pub use api_keys::{ApiKey, ApiKeyId, ApiKeyRepository, DbApiKeyRepository};
pub use email_queue::{DbQueueRepository, QueueRepository, DEFAULT_MAX_ATTEMPTS, STALE_CLAIM_ERROR};
pub use mail_settings::{DbMailSettingsRepository, MailSettingsRepository};
pub use staff::{DbStaffRepository, StaffRepository};
pub use tickets::{DbTicketRepository, TicketRepository};

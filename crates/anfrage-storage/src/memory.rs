//! In-memory repositories
//!
//! Same contracts as the PostgreSQL repositories, with every multi-step
//! update done under a single lock so claims stay atomic across tasks.

use crate::models::{
    ConversationMessage, CreateTicket, MailSettings, NewMessage, NewQueueItem, QueueItem,
    QueueStats, StaffUser, Ticket, UpdateMailSettings,
};
use crate::repository::{
    ApiKey, ApiKeyId, ApiKeyRepository, MailSettingsRepository, QueueRepository,
    StaffRepository, TicketRepository, DEFAULT_MAX_ATTEMPTS, STALE_CLAIM_ERROR,
};
use anfrage_common::types::{QueueItemId, QueueStatus, TicketId, TicketRef, TicketStatus};
use anfrage_common::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct TicketState {
    tickets: Vec<Ticket>,
    messages: Vec<ConversationMessage>,
    next_number: i64,
}

/// In-memory tickets and conversations
#[derive(Default)]
pub struct InMemoryTicketRepository {
    state: Mutex<TicketState>,
}

impl InMemoryTicketRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn ticket_not_found(id: TicketId) -> Error {
    Error::NotFound(format!("Ticket {} not found", id))
}

impl TicketState {
    fn insert_ticket(&mut self, input: CreateTicket) -> Ticket {
        self.next_number += 1;
        let now = Utc::now();
        let ticket = Ticket {
            id: Uuid::new_v4(),
            ticket_number: self.next_number,
            category: input.category,
            name: input.name.trim().to_string(),
            email: input.email.trim().to_string(),
            phone: input.phone,
            message: input.message,
            metadata: input.metadata,
            status: TicketStatus::New,
            notes: None,
            created_at: now,
            updated_at: now,
        };
        self.tickets.push(ticket.clone());
        ticket
    }

    fn insert_message(
        &mut self,
        ticket_id: TicketId,
        message: NewMessage,
    ) -> Result<ConversationMessage> {
        let now = Utc::now();
        let ticket = self
            .tickets
            .iter_mut()
            .find(|t| t.id == ticket_id)
            .ok_or_else(|| ticket_not_found(ticket_id))?;
        ticket.updated_at = now;

        let stored = ConversationMessage {
            id: Uuid::new_v4(),
            ticket_id,
            direction: message.direction,
            from_address: message.from_address,
            from_name: message.from_name,
            to_address: message.to_address,
            to_name: message.to_name,
            subject: message.subject,
            html_body: message.html_body,
            text_body: message.text_body,
            message_id: message.message_id,
            in_reply_to: message.in_reply_to,
            created_at: now,
        };
        self.messages.push(stored.clone());
        Ok(stored)
    }
}

#[async_trait]
impl TicketRepository for InMemoryTicketRepository {
    async fn create_ticket(&self, input: CreateTicket) -> Result<Ticket> {
        input.validate()?;

        let mut state = self.state.lock().await;
        Ok(state.insert_ticket(input))
    }

    async fn create_ticket_with_message(
        &self,
        input: CreateTicket,
        message: NewMessage,
    ) -> Result<(Ticket, ConversationMessage)> {
        input.validate()?;

        let mut state = self.state.lock().await;
        let ticket = state.insert_ticket(input);
        let stored = state.insert_message(ticket.id, message)?;
        Ok((ticket, stored))
    }

    async fn get_ticket(&self, id: TicketId) -> Result<Option<Ticket>> {
        let state = self.state.lock().await;
        Ok(state.tickets.iter().find(|t| t.id == id).cloned())
    }

    async fn get_ticket_by_ref(&self, reference: &TicketRef) -> Result<Option<Ticket>> {
        let state = self.state.lock().await;
        let found = if let Some(number) = reference.as_number() {
            state.tickets.iter().find(|t| t.ticket_number == number)
        } else if let Some(id) = reference.as_id() {
            state.tickets.iter().find(|t| t.id == id)
        } else {
            None
        };
        Ok(found.cloned())
    }

    async fn list_tickets(&self, status: Option<TicketStatus>, limit: i64) -> Result<Vec<Ticket>> {
        let state = self.state.lock().await;
        Ok(state
            .tickets
            .iter()
            .rev()
            .filter(|t| status.map_or(true, |s| t.status == s))
            .take(usize::try_from(limit).unwrap_or(0))
            .cloned()
            .collect())
    }

    async fn append_message(
        &self,
        ticket_id: TicketId,
        message: NewMessage,
    ) -> Result<ConversationMessage> {
        let mut state = self.state.lock().await;
        state.insert_message(ticket_id, message)
    }

    async fn list_messages(&self, ticket_id: TicketId) -> Result<Vec<ConversationMessage>> {
        let state = self.state.lock().await;
        Ok(state
            .messages
            .iter()
            .filter(|m| m.ticket_id == ticket_id)
            .cloned()
            .collect())
    }

    async fn find_message_by_message_id(
        &self,
        message_id: &str,
    ) -> Result<Option<ConversationMessage>> {
        let state = self.state.lock().await;
        Ok(state
            .messages
            .iter()
            .find(|m| m.message_id.as_deref() == Some(message_id))
            .cloned())
    }

    async fn set_status(&self, id: TicketId, status: TicketStatus) -> Result<()> {
        let mut state = self.state.lock().await;
        let ticket = state
            .tickets
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| ticket_not_found(id))?;
        ticket.status = status;
        ticket.updated_at = Utc::now();
        Ok(())
    }

    async fn set_notes(&self, id: TicketId, notes: Option<String>) -> Result<()> {
        let mut state = self.state.lock().await;
        let ticket = state
            .tickets
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| ticket_not_found(id))?;
        ticket.notes = notes;
        ticket.updated_at = Utc::now();
        Ok(())
    }

    async fn delete_ticket(&self, id: TicketId) -> Result<bool> {
        let mut state = self.state.lock().await;
        let before = state.tickets.len();
        state.tickets.retain(|t| t.id != id);
        if state.tickets.len() == before {
            return Ok(false);
        }
        state.messages.retain(|m| m.ticket_id != id);
        Ok(true)
    }
}

/// In-memory outbound queue
#[derive(Default)]
pub struct InMemoryQueueRepository {
    items: Mutex<Vec<QueueItem>>,
}

impl InMemoryQueueRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every item in enqueue order
    pub async fn all(&self) -> Vec<QueueItem> {
        self.items.lock().await.clone()
    }
}

/// Status after a failed attempt on a claimed item
fn after_failure(item: &mut QueueItem, error: &str, now: DateTime<Utc>) {
    item.status = if item.attempts < item.max_attempts {
        QueueStatus::Pending
    } else {
        QueueStatus::Failed
    };
    item.error_message = Some(error.to_string());
    item.updated_at = now;
}

#[async_trait]
impl QueueRepository for InMemoryQueueRepository {
    async fn enqueue(&self, item: NewQueueItem) -> Result<QueueItem> {
        item.validate()?;

        let now = Utc::now();
        let stored = QueueItem {
            id: Uuid::new_v4(),
            ticket_id: item.ticket_id,
            to_address: item.to_address,
            to_name: item.to_name,
            subject: item.subject,
            html_body: item.html_body,
            text_body: item.text_body,
            reply_to: item.reply_to,
            in_reply_to: item.in_reply_to,
            email_type: item.email_type,
            status: QueueStatus::Pending,
            attempts: 0,
            max_attempts: item.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS),
            last_attempt_at: None,
            error_message: None,
            sent_at: None,
            message_id: None,
            created_at: now,
            updated_at: now,
        };
        self.items.lock().await.push(stored.clone());
        Ok(stored)
    }

    async fn get(&self, id: QueueItemId) -> Result<Option<QueueItem>> {
        Ok(self.items.lock().await.iter().find(|i| i.id == id).cloned())
    }

    async fn claim_pending(&self, limit: i64) -> Result<Vec<QueueItem>> {
        let mut items = self.items.lock().await;
        let now = Utc::now();
        let limit = usize::try_from(limit).unwrap_or(0);

        let claimed: Vec<QueueItem> = items
            .iter_mut()
            .filter(|i| i.status == QueueStatus::Pending)
            .take(limit)
            .map(|item| {
                item.status = QueueStatus::Processing;
                item.attempts += 1;
                item.last_attempt_at = Some(now);
                item.updated_at = now;
                item.clone()
            })
            .collect();
        Ok(claimed)
    }

    async fn mark_sent(&self, id: QueueItemId, message_id: Option<&str>) -> Result<bool> {
        let mut items = self.items.lock().await;
        match items
            .iter_mut()
            .find(|i| i.id == id && i.status == QueueStatus::Processing)
        {
            Some(item) => {
                let now = Utc::now();
                item.status = QueueStatus::Sent;
                item.message_id = message_id.map(str::to_string);
                item.sent_at = Some(now);
                item.error_message = None;
                item.updated_at = now;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn record_failure(&self, id: QueueItemId, error: &str) -> Result<Option<QueueItem>> {
        let mut items = self.items.lock().await;
        Ok(items
            .iter_mut()
            .find(|i| i.id == id && i.status == QueueStatus::Processing)
            .map(|item| {
                after_failure(item, error, Utc::now());
                item.clone()
            }))
    }

    async fn release_stale(&self, older_than: DateTime<Utc>) -> Result<u64> {
        let mut items = self.items.lock().await;
        let now = Utc::now();
        let mut released = 0;
        for item in items.iter_mut().filter(|i| {
            i.status == QueueStatus::Processing
                && i.last_attempt_at.map_or(false, |at| at < older_than)
        }) {
            after_failure(item, STALE_CLAIM_ERROR, now);
            released += 1;
        }
        Ok(released)
    }

    async fn retry(&self, id: QueueItemId) -> Result<bool> {
        let mut items = self.items.lock().await;
        match items
            .iter_mut()
            .find(|i| i.id == id && i.status == QueueStatus::Failed)
        {
            Some(item) => {
                item.status = QueueStatus::Pending;
                item.attempts = 0;
                item.error_message = None;
                item.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, id: QueueItemId) -> Result<bool> {
        let mut items = self.items.lock().await;
        let before = items.len();
        items.retain(|i| i.id != id);
        Ok(items.len() < before)
    }

    async fn list(&self, status: Option<QueueStatus>, limit: i64) -> Result<Vec<QueueItem>> {
        let items = self.items.lock().await;
        Ok(items
            .iter()
            .rev()
            .filter(|i| status.map_or(true, |s| i.status == s))
            .take(usize::try_from(limit).unwrap_or(0))
            .cloned()
            .collect())
    }

    async fn stats(&self) -> Result<QueueStats> {
        let items = self.items.lock().await;
        let mut stats = QueueStats::default();
        for item in items.iter() {
            match item.status {
                QueueStatus::Pending => stats.pending += 1,
                QueueStatus::Processing => stats.processing += 1,
                QueueStatus::Sent => stats.sent += 1,
                QueueStatus::Failed => stats.failed += 1,
            }
        }
        Ok(stats)
    }
}

/// In-memory mail settings
#[derive(Default)]
pub struct InMemoryMailSettingsRepository {
    settings: Mutex<Option<MailSettings>>,
}

impl InMemoryMailSettingsRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(settings: MailSettings) -> Self {
        Self {
            settings: Mutex::new(Some(settings)),
        }
    }
}

#[async_trait]
impl MailSettingsRepository for InMemoryMailSettingsRepository {
    async fn get(&self) -> Result<Option<MailSettings>> {
        Ok(self.settings.lock().await.clone())
    }

    async fn save(&self, input: UpdateMailSettings) -> Result<MailSettings> {
        input.validate()?;

        let mut current = self.settings.lock().await;
        let keep = |new: Option<String>, old: Option<&String>| {
            new.or_else(|| old.cloned()).unwrap_or_default()
        };
        let saved = MailSettings {
            smtp_password: keep(
                input.smtp_password,
                current.as_ref().map(|s| &s.smtp_password),
            ),
            imap_password: keep(
                input.imap_password,
                current.as_ref().map(|s| &s.imap_password),
            ),
            smtp_host: input.smtp_host,
            smtp_port: input.smtp_port,
            smtp_user: input.smtp_user,
            smtp_security: input.smtp_security,
            imap_host: input.imap_host,
            imap_port: input.imap_port,
            imap_user: input.imap_user,
            imap_mailbox: input.imap_mailbox,
            from_address: input.from_address,
            from_name: input.from_name,
            active: input.active,
            updated_at: Utc::now(),
        };
        *current = Some(saved.clone());
        Ok(saved)
    }
}

/// In-memory staff directory
#[derive(Default)]
pub struct InMemoryStaffRepository {
    staff: Mutex<Vec<StaffUser>>,
}

impl InMemoryStaffRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a staff member and return it
    pub async fn add(&self, name: &str, email: &str, active: bool) -> StaffUser {
        let user = StaffUser {
            id: Uuid::new_v4(),
            name: name.to_string(),
            email: email.to_string(),
            active,
            created_at: Utc::now(),
        };
        self.staff.lock().await.push(user.clone());
        user
    }
}

#[async_trait]
impl StaffRepository for InMemoryStaffRepository {
    async fn list_active(&self) -> Result<Vec<StaffUser>> {
        let staff = self.staff.lock().await;
        Ok(staff.iter().filter(|s| s.active).cloned().collect())
    }
}

/// In-memory API keys
#[derive(Default)]
pub struct InMemoryApiKeyRepository {
    keys: Mutex<Vec<ApiKey>>,
}

impl InMemoryApiKeyRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, key: ApiKey) {
        self.keys.lock().await.push(key);
    }

    pub async fn get(&self, id: ApiKeyId) -> Option<ApiKey> {
        self.keys.lock().await.iter().find(|k| k.id == id).cloned()
    }
}

#[async_trait]
impl ApiKeyRepository for InMemoryApiKeyRepository {
    async fn find_by_prefix(&self, prefix: &str) -> Result<Vec<ApiKey>> {
        let keys = self.keys.lock().await;
        Ok(keys
            .iter()
            .filter(|k| k.key_prefix == prefix && !k.is_expired())
            .take(10)
            .cloned()
            .collect())
    }

    async fn update_last_used(&self, id: ApiKeyId) -> Result<()> {
        let mut keys = self.keys.lock().await;
        if let Some(key) = keys.iter_mut().find(|k| k.id == id) {
            key.last_used_at = Some(Utc::now());
        }
        Ok(())
    }
}

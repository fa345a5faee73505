//! Fakes shared by worker and service tests

use crate::mail::{
    parse_email, ConnectionCheck, FetchBatch, InboundMailbox, MailTransport, MailboxSession,
    OutboundEmail, SendOutcome, SkippedMessage,
};
use anfrage_common::types::{
    EmailType, QueueItemId, QueueStatus, TicketId, TicketRef, TicketStatus,
};
use anfrage_common::{Error, Result};
use anfrage_storage::memory::InMemoryTicketRepository;
use anfrage_storage::models::{
    ConversationMessage, CreateTicket, MailSettings, NewMessage, NewQueueItem, QueueItem,
    QueueStats, SmtpSecurity, Ticket,
};
use anfrage_storage::repository::{QueueRepository, TicketRepository};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;

pub(crate) fn active_settings() -> MailSettings {
    MailSettings {
        smtp_host: "smtp.makler.de".to_string(),
        smtp_port: 587,
        smtp_user: "info@makler.de".to_string(),
        smtp_password: "geheim".to_string(),
        smtp_security: SmtpSecurity::Starttls,
        imap_host: "imap.makler.de".to_string(),
        imap_port: 993,
        imap_user: "info@makler.de".to_string(),
        imap_password: "auch-geheim".to_string(),
        imap_mailbox: "INBOX".to_string(),
        from_address: "info@makler.de".to_string(),
        from_name: "Makler Muster".to_string(),
        active: true,
        updated_at: Utc::now(),
    }
}

pub(crate) fn queued(to: &str) -> NewQueueItem {
    NewQueueItem {
        ticket_id: None,
        to_address: to.to_string(),
        to_name: None,
        subject: "Re: Ihre Anfrage [ANFRAGE-1]".to_string(),
        html_body: "<p>Guten Tag</p>".to_string(),
        text_body: None,
        reply_to: None,
        in_reply_to: None,
        email_type: EmailType::Reply,
        max_attempts: None,
    }
}

pub(crate) fn raw_email(from: &str, subject: &str, body: &str, message_id: &str) -> String {
    format!(
        "From: {}\r\nTo: info@makler.de\r\nSubject: {}\r\nMessage-ID: <{}>\r\n\r\n{}\r\n",
        from, subject, message_id, body
    )
}

/// Transport answering from a script; once the script runs out every send
/// gets the fallback result
pub(crate) struct FakeTransport {
    script: Mutex<VecDeque<bool>>,
    fallback: bool,
    attempts: Mutex<Vec<OutboundEmail>>,
}

impl FakeTransport {
    pub(crate) fn scripted(script: Vec<bool>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback: true,
            attempts: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn succeeding() -> Self {
        Self::scripted(Vec::new())
    }

    pub(crate) fn failing() -> Self {
        Self {
            fallback: false,
            ..Self::scripted(Vec::new())
        }
    }

    pub(crate) async fn attempt_count(&self) -> usize {
        self.attempts.lock().await.len()
    }

    pub(crate) async fn attempts(&self) -> Vec<OutboundEmail> {
        self.attempts.lock().await.clone()
    }
}

#[async_trait]
impl MailTransport for FakeTransport {
    async fn send(&self, _settings: &MailSettings, email: &OutboundEmail) -> SendOutcome {
        self.attempts.lock().await.push(email.clone());
        let success = self.script.lock().await.pop_front().unwrap_or(self.fallback);
        if success {
            SendOutcome::sent(format!("<{}@makler.de>", uuid::Uuid::new_v4()))
        } else {
            SendOutcome::failed("421 Service not available")
        }
    }

    async fn test_connection(&self, _settings: &MailSettings) -> ConnectionCheck {
        if self.fallback {
            ConnectionCheck::ok()
        } else {
            ConnectionCheck::failed("connection refused")
        }
    }
}

#[derive(Default)]
struct MailboxState {
    messages: Vec<(u32, String)>,
    seen: Vec<u32>,
}

/// Mailbox holding raw messages in memory
#[derive(Default, Clone)]
pub(crate) struct FakeMailbox {
    state: Arc<Mutex<MailboxState>>,
    unreachable: bool,
}

impl FakeMailbox {
    pub(crate) fn unreachable() -> Self {
        Self {
            unreachable: true,
            ..Self::default()
        }
    }

    pub(crate) async fn deliver(&self, uid: u32, raw: impl Into<String>) {
        self.state.lock().await.messages.push((uid, raw.into()));
    }

    pub(crate) async fn seen(&self) -> Vec<u32> {
        self.state.lock().await.seen.clone()
    }
}

#[async_trait]
impl InboundMailbox for FakeMailbox {
    async fn open(&self, _settings: &MailSettings) -> Result<Box<dyn MailboxSession>> {
        if self.unreachable {
            return Err(Error::Transport("IMAP connect: connection refused".to_string()));
        }
        Ok(Box::new(FakeSession {
            state: self.state.clone(),
        }))
    }

    async fn test_connection(&self, settings: &MailSettings) -> ConnectionCheck {
        match self.open(settings).await {
            Ok(_) => ConnectionCheck::ok(),
            Err(e) => ConnectionCheck::failed(e.to_string()),
        }
    }
}

struct FakeSession {
    state: Arc<Mutex<MailboxState>>,
}

#[async_trait]
impl MailboxSession for FakeSession {
    async fn fetch_unseen(&mut self, limit: usize) -> Result<FetchBatch> {
        let state = self.state.lock().await;
        let mut unseen: Vec<&(u32, String)> = state
            .messages
            .iter()
            .filter(|(uid, _)| !state.seen.contains(uid))
            .collect();
        unseen.sort_by_key(|(uid, _)| *uid);

        let mut batch = FetchBatch::default();
        for (uid, raw) in unseen.into_iter().take(limit) {
            match parse_email(*uid, raw.as_bytes()) {
                Ok(email) => batch.emails.push(email),
                Err(e) => batch.skipped.push(SkippedMessage {
                    uid: *uid,
                    reason: e.to_string(),
                }),
            }
        }
        Ok(batch)
    }

    async fn mark_seen(&mut self, uid: u32) -> Result<()> {
        self.state.lock().await.seen.push(uid);
        Ok(())
    }

    async fn close(self: Box<Self>) {}
}

/// Ticket store whose first `create_ticket_with_message` call fails, as a
/// dropped database connection would
pub(crate) struct FlakyTickets {
    inner: InMemoryTicketRepository,
    failures_left: Mutex<usize>,
}

impl FlakyTickets {
    pub(crate) fn failing_once() -> Self {
        Self {
            inner: InMemoryTicketRepository::new(),
            failures_left: Mutex::new(1),
        }
    }
}

#[async_trait]
impl TicketRepository for FlakyTickets {
    async fn create_ticket(&self, input: CreateTicket) -> Result<Ticket> {
        self.inner.create_ticket(input).await
    }

    async fn create_ticket_with_message(
        &self,
        input: CreateTicket,
        message: NewMessage,
    ) -> Result<(Ticket, ConversationMessage)> {
        {
            let mut left = self.failures_left.lock().await;
            if *left > 0 {
                *left -= 1;
                return Err(Error::Database("connection reset".to_string()));
            }
        }
        self.inner.create_ticket_with_message(input, message).await
    }

    async fn get_ticket(&self, id: TicketId) -> Result<Option<Ticket>> {
        self.inner.get_ticket(id).await
    }

    async fn get_ticket_by_ref(&self, reference: &TicketRef) -> Result<Option<Ticket>> {
        self.inner.get_ticket_by_ref(reference).await
    }

    async fn list_tickets(&self, status: Option<TicketStatus>, limit: i64) -> Result<Vec<Ticket>> {
        self.inner.list_tickets(status, limit).await
    }

    async fn append_message(
        &self,
        ticket_id: TicketId,
        message: NewMessage,
    ) -> Result<ConversationMessage> {
        self.inner.append_message(ticket_id, message).await
    }

    async fn list_messages(&self, ticket_id: TicketId) -> Result<Vec<ConversationMessage>> {
        self.inner.list_messages(ticket_id).await
    }

    async fn find_message_by_message_id(
        &self,
        message_id: &str,
    ) -> Result<Option<ConversationMessage>> {
        self.inner.find_message_by_message_id(message_id).await
    }

    async fn set_status(&self, id: TicketId, status: TicketStatus) -> Result<()> {
        self.inner.set_status(id, status).await
    }

    async fn set_notes(&self, id: TicketId, notes: Option<String>) -> Result<()> {
        self.inner.set_notes(id, notes).await
    }

    async fn delete_ticket(&self, id: TicketId) -> Result<bool> {
        self.inner.delete_ticket(id).await
    }
}

/// Queue that refuses every new item and otherwise reports an empty queue
pub(crate) struct RefusingQueue;

#[async_trait]
impl QueueRepository for RefusingQueue {
    async fn enqueue(&self, _item: NewQueueItem) -> Result<QueueItem> {
        Err(Error::Database("queue table is read-only".to_string()))
    }

    async fn get(&self, _id: QueueItemId) -> Result<Option<QueueItem>> {
        Ok(None)
    }

    async fn claim_pending(&self, _limit: i64) -> Result<Vec<QueueItem>> {
        Ok(Vec::new())
    }

    async fn mark_sent(&self, _id: QueueItemId, _message_id: Option<&str>) -> Result<bool> {
        Ok(false)
    }

    async fn record_failure(&self, _id: QueueItemId, _error: &str) -> Result<Option<QueueItem>> {
        Ok(None)
    }

    async fn release_stale(&self, _older_than: DateTime<Utc>) -> Result<u64> {
        Ok(0)
    }

    async fn retry(&self, _id: QueueItemId) -> Result<bool> {
        Ok(false)
    }

    async fn delete(&self, _id: QueueItemId) -> Result<bool> {
        Ok(false)
    }

    async fn list(&self, _status: Option<QueueStatus>, _limit: i64) -> Result<Vec<QueueItem>> {
        Ok(Vec::new())
    }

    async fn stats(&self) -> Result<QueueStats> {
        Ok(QueueStats::default())
    }
}

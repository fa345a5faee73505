//! Staff replies to a ticket

use super::Notifier;
use anfrage_common::types::{Direction, TicketId, TicketStatus};
use anfrage_common::{Error, Result};
use anfrage_storage::models::{NewMessage, QueueItem};
use anfrage_storage::repository::{MailSettingsRepository, QueueRepository, TicketRepository};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Reply written by staff
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplyRequest {
    pub message: String,
    /// Subject override; the ticket tag is appended when missing
    #[serde(default)]
    pub subject: Option<String>,
}

pub struct ReplyService {
    tickets: Arc<dyn TicketRepository>,
    queue: Arc<dyn QueueRepository>,
    settings: Arc<dyn MailSettingsRepository>,
    notifier: Notifier,
}

impl ReplyService {
    pub fn new(
        tickets: Arc<dyn TicketRepository>,
        queue: Arc<dyn QueueRepository>,
        settings: Arc<dyn MailSettingsRepository>,
        notifier: Notifier,
    ) -> Self {
        Self {
            tickets,
            queue,
            settings,
            notifier,
        }
    }

    /// Queue a reply, record it in the conversation and move the ticket to
    /// `in_progress`.
    ///
    /// The reply threads onto the requester's latest message that carries a
    /// Message-ID.
    pub async fn send_reply(&self, ticket_id: TicketId, request: ReplyRequest) -> Result<QueueItem> {
        if request.message.trim().is_empty() {
            return Err(Error::Validation("Reply message is required".to_string()));
        }

        let ticket = self
            .tickets
            .get_ticket(ticket_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Ticket {}", ticket_id)))?;

        let in_reply_to = self
            .tickets
            .list_messages(ticket.id)
            .await?
            .into_iter()
            .rev()
            .filter(|m| m.direction == Direction::Incoming)
            .find_map(|m| m.message_id);

        let queued = self
            .queue
            .enqueue(self.notifier.reply(
                &ticket,
                request.subject.as_deref(),
                &request.message,
                in_reply_to.clone(),
            ))
            .await?;

        let sender = self.settings.get().await?;
        self.tickets
            .append_message(
                ticket.id,
                NewMessage {
                    direction: Direction::Outgoing,
                    from_address: sender
                        .as_ref()
                        .map(|s| s.from_address.clone())
                        .unwrap_or_default(),
                    from_name: sender.map(|s| s.from_name),
                    to_address: ticket.email.clone(),
                    to_name: Some(ticket.name.clone()),
                    subject: queued.subject.clone(),
                    html_body: Some(queued.html_body.clone()),
                    text_body: queued.text_body.clone(),
                    message_id: None,
                    in_reply_to,
                },
            )
            .await?;

        self.tickets
            .set_status(ticket.id, TicketStatus::InProgress)
            .await?;

        info!(ticket_id = %ticket.id, queue_id = %queued.id, "Queued staff reply");
        Ok(queued)
    }
}

//! Fetch worker
//!
//! One pass opens the mailbox, reads unseen messages and routes each one:
//! a message whose subject carries a known ticket tag is appended to that
//! ticket, anything else opens a new ticket and notifies staff. A message
//! is flagged as seen only after it has been recorded, so a crash between
//! the two leaves it for the next pass, where the Message-ID check drops
//! the duplicate.

use crate::correlator::extract_ticket_ref;
use crate::desk::Notifier;
use crate::mail::{FetchedEmail, InboundMailbox, MailboxSession};
use crate::queue::drain::serialize_count;
use anfrage_common::config::FetchConfig;
use anfrage_common::types::{Direction, TicketCategory, TicketStatus};
use anfrage_common::Result;
use anfrage_storage::models::{CreateTicket, MailSettings, NewMessage, Ticket};
use anfrage_storage::repository::{
    MailSettingsRepository, QueueRepository, StaffRepository, TicketRepository,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Outcome of one fetch pass
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FetchSummary {
    /// Messages returned by the mailbox, including unparseable ones
    pub fetched: usize,
    /// Messages recorded and flagged as seen
    pub processed: usize,
    pub new_tickets: usize,
    pub replies: usize,
    /// Messages already recorded by an earlier pass
    pub duplicates: usize,
    /// Mail settings missing, inactive or without a mailbox; the mailbox
    /// was not opened
    pub skipped: bool,
    /// Logged in full; callers of the trigger endpoints only see the count
    #[serde(rename = "error_count", serialize_with = "serialize_count")]
    pub errors: Vec<String>,
}

/// How a single message was handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Routed {
    NewTicket,
    Reply,
    Duplicate,
}

/// Polls the inbound mailbox in single passes
pub struct FetchWorker {
    tickets: Arc<dyn TicketRepository>,
    queue: Arc<dyn QueueRepository>,
    staff: Arc<dyn StaffRepository>,
    settings: Arc<dyn MailSettingsRepository>,
    mailbox: Arc<dyn InboundMailbox>,
    notifier: Notifier,
    max_messages: usize,
}

impl FetchWorker {
    pub fn new(
        tickets: Arc<dyn TicketRepository>,
        queue: Arc<dyn QueueRepository>,
        staff: Arc<dyn StaffRepository>,
        settings: Arc<dyn MailSettingsRepository>,
        mailbox: Arc<dyn InboundMailbox>,
        notifier: Notifier,
        config: &FetchConfig,
    ) -> Self {
        Self {
            tickets,
            queue,
            staff,
            settings,
            mailbox,
            notifier,
            max_messages: config.max_messages,
        }
    }

    /// Run one pass.
    ///
    /// Failing to load settings or to reach the mailbox aborts the pass;
    /// problems with individual messages are collected in the summary.
    pub async fn run_once(&self) -> Result<FetchSummary> {
        let mut summary = FetchSummary::default();

        let settings = match self.settings.get().await? {
            Some(s) if s.active => s,
            _ => {
                debug!("Mail settings inactive, skipping inbound fetch");
                summary.skipped = true;
                return Ok(summary);
            }
        };
        if !settings.has_imap() {
            debug!("No inbound mailbox configured, skipping inbound fetch");
            summary.skipped = true;
            return Ok(summary);
        }

        let mut session = self.mailbox.open(&settings).await?;
        let result = self.process(&settings, session.as_mut(), &mut summary).await;
        session.close().await;
        result?;

        info!(
            fetched = summary.fetched,
            new_tickets = summary.new_tickets,
            replies = summary.replies,
            duplicates = summary.duplicates,
            errors = summary.errors.len(),
            "Inbound fetch finished"
        );
        Ok(summary)
    }

    async fn process(
        &self,
        settings: &MailSettings,
        session: &mut dyn MailboxSession,
        summary: &mut FetchSummary,
    ) -> Result<()> {
        let batch = session.fetch_unseen(self.max_messages).await?;
        summary.fetched = batch.emails.len() + batch.skipped.len();

        // Unparseable messages would come back on every pass
        for skipped in batch.skipped {
            summary
                .errors
                .push(format!("UID {}: {}", skipped.uid, skipped.reason));
            if let Err(e) = session.mark_seen(skipped.uid).await {
                warn!(uid = skipped.uid, error = %e, "Failed to flag malformed message");
            }
        }

        for email in batch.emails {
            let uid = email.uid;
            let mut follow_up = Vec::new();
            let routed = self.route(settings, &email, &mut follow_up).await;
            summary
                .errors
                .extend(follow_up.into_iter().map(|e| format!("UID {}: {}", uid, e)));

            match routed {
                Ok(routed) => {
                    match routed {
                        Routed::NewTicket => summary.new_tickets += 1,
                        Routed::Reply => summary.replies += 1,
                        Routed::Duplicate => summary.duplicates += 1,
                    }
                    match session.mark_seen(uid).await {
                        Ok(()) => summary.processed += 1,
                        Err(e) => {
                            warn!(uid, error = %e, "Failed to flag message as seen");
                            summary.errors.push(format!("UID {}: {}", uid, e));
                        }
                    }
                }
                Err(e) if e.is_client_error() => {
                    warn!(uid, error = %e, "Dropping unusable message");
                    summary.errors.push(format!("UID {}: {}", uid, e));
                    if let Err(e) = session.mark_seen(uid).await {
                        warn!(uid, error = %e, "Failed to flag message as seen");
                    }
                }
                Err(e) => {
                    // Left unseen so the next pass tries again
                    error!(uid, error = %e, "Failed to record inbound message");
                    summary.errors.push(format!("UID {}: {}", uid, e));
                }
            }
        }

        Ok(())
    }

    /// Record one message. Problems that happen after it is recorded, such as
    /// a notification that could not be queued, go to `follow_up`.
    async fn route(
        &self,
        settings: &MailSettings,
        email: &FetchedEmail,
        follow_up: &mut Vec<String>,
    ) -> Result<Routed> {
        if let Some(message_id) = &email.message_id {
            if self
                .tickets
                .find_message_by_message_id(message_id)
                .await?
                .is_some()
            {
                debug!(uid = email.uid, message_id = %message_id, "Message already recorded");
                return Ok(Routed::Duplicate);
            }
        }

        if let Some(reference) = extract_ticket_ref(&email.subject) {
            if let Some(ticket) = self.tickets.get_ticket_by_ref(&reference).await? {
                self.record_reply(settings, &ticket, email).await?;
                return Ok(Routed::Reply);
            }
            debug!(reference = %reference, "Subject tag matches no ticket");
        }

        self.open_ticket(settings, email, follow_up).await?;
        Ok(Routed::NewTicket)
    }

    async fn record_reply(
        &self,
        settings: &MailSettings,
        ticket: &Ticket,
        email: &FetchedEmail,
    ) -> Result<()> {
        // A requester reply puts the ticket back on the staff's desk. The
        // status goes first: once the message is stored a re-fetch is
        // dropped as a duplicate and would not reopen the ticket.
        self.tickets.set_status(ticket.id, TicketStatus::New).await?;
        self.tickets
            .append_message(ticket.id, incoming(settings, email))
            .await?;

        info!(
            ticket_id = %ticket.id,
            ticket_number = ticket.ticket_number,
            from = %email.from_address,
            "Recorded requester reply"
        );
        Ok(())
    }

    async fn open_ticket(
        &self,
        settings: &MailSettings,
        email: &FetchedEmail,
        follow_up: &mut Vec<String>,
    ) -> Result<Ticket> {
        let body = email.plain_text();
        let input = CreateTicket {
            category: TicketCategory::Email,
            name: email
                .from_name
                .clone()
                .unwrap_or_else(|| email.from_address.clone()),
            email: email.from_address.clone(),
            phone: None,
            message: body.clone(),
            metadata: serde_json::json!({
                "source": "email",
                "subject": email.subject,
            }),
        };
        // Ticket and message are stored together, so a failure leaves
        // nothing behind for the next pass to duplicate
        let (ticket, _) = self
            .tickets
            .create_ticket_with_message(input, incoming(settings, email))
            .await?;

        info!(
            ticket_id = %ticket.id,
            ticket_number = ticket.ticket_number,
            from = %email.from_address,
            "Opened ticket from email"
        );

        match self
            .notifier
            .notify_staff(
                self.queue.as_ref(),
                self.staff.as_ref(),
                &ticket,
                &email.subject,
                &body,
            )
            .await
        {
            Ok(notified) => follow_up.extend(notified.failures),
            Err(e) => {
                error!(ticket_id = %ticket.id, error = %e, "Failed to notify staff");
                follow_up.push(format!("staff notification: {}", e));
            }
        }

        Ok(ticket)
    }
}

fn incoming(settings: &MailSettings, email: &FetchedEmail) -> NewMessage {
    NewMessage {
        direction: Direction::Incoming,
        from_address: email.from_address.clone(),
        from_name: email.from_name.clone(),
        to_address: email
            .to_address
            .clone()
            .unwrap_or_else(|| settings.from_address.clone()),
        to_name: None,
        subject: email.subject.clone(),
        html_body: email.html_body.clone(),
        text_body: email.text_body.clone(),
        message_id: email.message_id.clone(),
        in_reply_to: email.in_reply_to.clone(),
    }
}

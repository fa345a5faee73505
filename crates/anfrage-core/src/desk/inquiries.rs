//! Public contact form submissions

use super::Notifier;
use anfrage_common::types::{Direction, TicketId};
use anfrage_common::Result;
use anfrage_storage::models::{CreateTicket, NewMessage};
use anfrage_storage::repository::{
    MailSettingsRepository, QueueRepository, StaffRepository, TicketRepository,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};

/// What the requester gets back after submitting the form
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InquiryReceipt {
    pub ticket_id: TicketId,
    pub ticket_number: i64,
    pub confirmation_queued: bool,
    pub notifications_queued: usize,
}

pub struct InquiryService {
    tickets: Arc<dyn TicketRepository>,
    queue: Arc<dyn QueueRepository>,
    staff: Arc<dyn StaffRepository>,
    settings: Arc<dyn MailSettingsRepository>,
    notifier: Notifier,
}

impl InquiryService {
    pub fn new(
        tickets: Arc<dyn TicketRepository>,
        queue: Arc<dyn QueueRepository>,
        staff: Arc<dyn StaffRepository>,
        settings: Arc<dyn MailSettingsRepository>,
        notifier: Notifier,
    ) -> Self {
        Self {
            tickets,
            queue,
            staff,
            settings,
            notifier,
        }
    }

    /// Open a ticket from a form submission.
    ///
    /// Once the ticket and its first message are stored the submission
    /// counts as accepted; failing to queue the follow-up emails is logged
    /// and reflected in the receipt.
    pub async fn submit(&self, input: CreateTicket) -> Result<InquiryReceipt> {
        let subject = input
            .metadata
            .get("subject")
            .and_then(|s| s.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| input.category.label().to_string());

        let to_address = self
            .settings
            .get()
            .await?
            .map(|s| s.from_address)
            .unwrap_or_default();
        let first_message = NewMessage {
            direction: Direction::Incoming,
            from_address: input.email.trim().to_string(),
            from_name: Some(input.name.trim().to_string()),
            to_address,
            to_name: None,
            subject: subject.clone(),
            html_body: None,
            text_body: Some(input.message.clone()),
            message_id: None,
            in_reply_to: None,
        };
        let (ticket, _) = self
            .tickets
            .create_ticket_with_message(input, first_message)
            .await?;

        info!(
            ticket_id = %ticket.id,
            ticket_number = ticket.ticket_number,
            category = %ticket.category,
            "Inquiry received"
        );

        let confirmation_queued = match self.queue.enqueue(self.notifier.confirmation(&ticket)).await
        {
            Ok(_) => true,
            Err(e) => {
                error!(ticket_id = %ticket.id, error = %e, "Failed to queue confirmation");
                false
            }
        };

        let notifications_queued = self
            .notifier
            .notify_staff(
                self.queue.as_ref(),
                self.staff.as_ref(),
                &ticket,
                &subject,
                &ticket.message,
            )
            .await
            .map(|n| n.queued)
            .unwrap_or_else(|e| {
                error!(ticket_id = %ticket.id, error = %e, "Failed to notify staff");
                0
            });

        Ok(InquiryReceipt {
            ticket_id: ticket.id,
            ticket_number: ticket.ticket_number,
            confirmation_queued,
            notifications_queued,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anfrage_common::types::{EmailType, TicketCategory, TicketStatus};
    use anfrage_common::{Config, Error};
    use anfrage_storage::memory::{
        InMemoryMailSettingsRepository, InMemoryQueueRepository, InMemoryStaffRepository,
        InMemoryTicketRepository,
    };
    use pretty_assertions::assert_eq;

    struct Harness {
        tickets: Arc<InMemoryTicketRepository>,
        queue: Arc<InMemoryQueueRepository>,
        staff: Arc<InMemoryStaffRepository>,
        service: InquiryService,
    }

    fn harness() -> Harness {
        let tickets = Arc::new(InMemoryTicketRepository::new());
        let queue = Arc::new(InMemoryQueueRepository::new());
        let staff = Arc::new(InMemoryStaffRepository::new());
        let service = InquiryService::new(
            tickets.clone(),
            queue.clone(),
            staff.clone(),
            Arc::new(InMemoryMailSettingsRepository::new()),
            Notifier::new(&Config::default()),
        );
        Harness {
            tickets,
            queue,
            staff,
            service,
        }
    }

    fn form(email: &str) -> CreateTicket {
        CreateTicket {
            category: TicketCategory::Valuation,
            name: "Erika Muster".to_string(),
            email: email.to_string(),
            phone: Some("030 1234".to_string()),
            message: "Was ist mein Haus wert?".to_string(),
            metadata: serde_json::json!({ "property": "Gartenstraße 4" }),
        }
    }

    #[tokio::test]
    async fn test_submit_opens_ticket_and_queues_mail() {
        let h = harness();
        h.staff.add("Max Makler", "max@makler.de", true).await;

        let receipt = h.service.submit(form("erika@example.de")).await.unwrap();
        assert!(receipt.confirmation_queued);
        assert_eq!(receipt.notifications_queued, 1);

        let ticket = h
            .tickets
            .get_ticket(receipt.ticket_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(ticket.status, TicketStatus::New);
        assert_eq!(ticket.ticket_number, receipt.ticket_number);

        let messages = h.tickets.list_messages(ticket.id).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].direction, Direction::Incoming);
        assert_eq!(messages[0].subject, "Immobilienbewertung");

        let queued = h.queue.all().await;
        assert_eq!(queued.len(), 2);
        let confirmation = queued
            .iter()
            .find(|q| q.email_type == EmailType::Confirmation)
            .unwrap();
        assert_eq!(confirmation.to_address, "erika@example.de");
        assert_eq!(
            confirmation.subject,
            format!("Ihre Anfrage [ANFRAGE-{}]", ticket.ticket_number)
        );
        assert!(queued
            .iter()
            .any(|q| q.email_type == EmailType::Notification && q.to_address == "max@makler.de"));
    }

    #[tokio::test]
    async fn test_invalid_submission_creates_nothing() {
        let h = harness();
        let err = h.service.submit(form("keine-adresse")).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(h.tickets.list_tickets(None, 10).await.unwrap().is_empty());
        assert!(h.queue.all().await.is_empty());
    }
}

//! Outbound email templates
//!
//! Requester-facing texts are German. User-supplied content is always
//! HTML-escaped before it is placed into a template.

use crate::correlator::{reply_subject, tag_subject, ticket_ref};
use anfrage_common::config::{Config, DeskConfig, SubjectRef};
use anfrage_common::types::{EmailType, TicketRef};
use anfrage_common::Result;
use anfrage_storage::models::{NewQueueItem, StaffUser, Ticket};
use anfrage_storage::repository::{QueueRepository, StaffRepository};
use tracing::{error, info};

/// Escape text for HTML and keep its line breaks
pub fn text_to_html(text: &str) -> String {
    html_escape::encode_text(text.trim())
        .replace("\r\n", "\n")
        .replace('\n', "<br>\n")
}

/// Result of notifying staff about a ticket
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StaffNotifications {
    pub queued: usize,
    /// One entry per recipient whose notification could not be queued
    pub failures: Vec<String>,
}

/// Builds queue items for the emails the desk sends
#[derive(Debug, Clone)]
pub struct Notifier {
    desk: DeskConfig,
    subject_ref: SubjectRef,
    max_attempts: i32,
}

impl Notifier {
    pub fn new(config: &Config) -> Self {
        Self {
            desk: config.desk.clone(),
            subject_ref: config.mail.subject_ref,
            max_attempts: config.queue.default_max_attempts,
        }
    }

    /// Reference written into subjects for this ticket
    pub fn reference(&self, ticket: &Ticket) -> TicketRef {
        ticket_ref(ticket, self.subject_ref)
    }

    fn signature_html(&self) -> String {
        format!(
            "<p>Mit freundlichen Grüßen<br>\n{}</p>",
            html_escape::encode_text(&self.desk.agency_name)
        )
    }

    fn signature_text(&self) -> String {
        format!("Mit freundlichen Grüßen\n{}", self.desk.agency_name)
    }

    fn ticket_url(&self, ticket: &Ticket) -> String {
        format!(
            "{}/tickets/{}",
            self.desk.staff_url.trim_end_matches('/'),
            ticket.id
        )
    }

    /// Staff reply to the requester
    pub fn reply(
        &self,
        ticket: &Ticket,
        subject: Option<&str>,
        message: &str,
        in_reply_to: Option<String>,
    ) -> NewQueueItem {
        let html = format!("<p>{}</p>\n{}", text_to_html(message), self.signature_html());
        let text = format!("{}\n\n{}", message.trim(), self.signature_text());

        NewQueueItem {
            ticket_id: Some(ticket.id),
            to_address: ticket.email.clone(),
            to_name: Some(ticket.name.clone()),
            subject: reply_subject(&self.reference(ticket), subject),
            html_body: html,
            text_body: Some(text),
            reply_to: None,
            in_reply_to,
            email_type: EmailType::Reply,
            max_attempts: Some(self.max_attempts),
        }
    }

    /// Receipt confirmation for a new inquiry
    pub fn confirmation(&self, ticket: &Ticket) -> NewQueueItem {
        let name = html_escape::encode_text(&ticket.name);
        let mut html = format!(
            "<p>Guten Tag {},</p>\n\
             <p>vielen Dank für Ihre Anfrage ({}). Wir haben sie erhalten und melden uns \
             schnellstmöglich bei Ihnen.</p>\n",
            name,
            ticket.category.label()
        );
        if !ticket.message.trim().is_empty() {
            html.push_str(&format!(
                "<p>Ihre Nachricht:</p>\n<blockquote>{}</blockquote>\n",
                text_to_html(&ticket.message)
            ));
        }
        html.push_str(&self.signature_html());

        NewQueueItem {
            ticket_id: Some(ticket.id),
            to_address: ticket.email.clone(),
            to_name: Some(ticket.name.clone()),
            subject: format!("Ihre Anfrage {}", tag_subject(&self.reference(ticket))),
            html_body: html,
            text_body: None,
            reply_to: None,
            in_reply_to: None,
            email_type: EmailType::Confirmation,
            max_attempts: Some(self.max_attempts),
        }
    }

    /// New-ticket notice for one staff member
    pub fn staff_notification(
        &self,
        ticket: &Ticket,
        staff: &StaffUser,
        subject: &str,
        body: &str,
    ) -> NewQueueItem {
        let mut html = format!(
            "<p>Neue Anfrage #{} ({})</p>\n<ul>\n<li>Name: {}</li>\n<li>E-Mail: {}</li>\n",
            ticket.ticket_number,
            ticket.category.label(),
            html_escape::encode_text(&ticket.name),
            html_escape::encode_text(&ticket.email),
        );
        if let Some(phone) = &ticket.phone {
            html.push_str(&format!(
                "<li>Telefon: {}</li>\n",
                html_escape::encode_text(phone)
            ));
        }
        html.push_str("</ul>\n");
        if !body.trim().is_empty() {
            html.push_str(&format!("<blockquote>{}</blockquote>\n", text_to_html(body)));
        }
        html.push_str(&format!(
            "<p><a href=\"{}\">Anfrage öffnen</a></p>",
            html_escape::encode_double_quoted_attribute(&self.ticket_url(ticket))
        ));

        let subject = if subject.trim().is_empty() {
            ticket.category.label().to_string()
        } else {
            subject.trim().to_string()
        };

        NewQueueItem {
            ticket_id: Some(ticket.id),
            to_address: staff.email.clone(),
            to_name: Some(staff.name.clone()),
            subject: format!("Neue Anfrage #{}: {}", ticket.ticket_number, subject),
            html_body: html,
            text_body: None,
            reply_to: None,
            in_reply_to: None,
            email_type: EmailType::Notification,
            max_attempts: Some(self.max_attempts),
        }
    }

    /// Queue one notification per active staff member.
    ///
    /// A failed enqueue for one recipient does not stop the others; it is
    /// reported in [`StaffNotifications::failures`].
    pub async fn notify_staff(
        &self,
        queue: &dyn QueueRepository,
        staff: &dyn StaffRepository,
        ticket: &Ticket,
        subject: &str,
        body: &str,
    ) -> Result<StaffNotifications> {
        let recipients = staff.list_active().await?;
        let mut outcome = StaffNotifications::default();
        for member in &recipients {
            match queue
                .enqueue(self.staff_notification(ticket, member, subject, body))
                .await
            {
                Ok(_) => outcome.queued += 1,
                Err(e) => {
                    error!(
                        ticket_id = %ticket.id,
                        staff = %member.email,
                        error = %e,
                        "Failed to queue staff notification"
                    );
                    outcome
                        .failures
                        .push(format!("notification to {}: {}", member.email, e));
                }
            }
        }
        info!(
            ticket_id = %ticket.id,
            queued = outcome.queued,
            failed = outcome.failures.len(),
            "Queued staff notifications"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anfrage_common::types::{TicketCategory, TicketStatus};
    use chrono::Utc;
    use crate::testing::RefusingQueue;
    use anfrage_storage::memory::{InMemoryQueueRepository, InMemoryStaffRepository};
    use pretty_assertions::assert_eq;
    use uuid::Uuid;

    pub(crate) fn ticket() -> Ticket {
        Ticket {
            id: Uuid::new_v4(),
            ticket_number: 482,
            category: TicketCategory::Viewing,
            name: "Erika <Muster>".to_string(),
            email: "erika@example.de".to_string(),
            phone: Some("030 1234".to_string()),
            message: "Ist die Wohnung\nnoch frei?".to_string(),
            metadata: serde_json::json!({}),
            status: TicketStatus::New,
            notes: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn staff() -> StaffUser {
        StaffUser {
            id: Uuid::new_v4(),
            name: "Max Makler".to_string(),
            email: "max@makler.de".to_string(),
            active: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_text_to_html() {
        assert_eq!(text_to_html("a < b\nzweite Zeile"), "a &lt; b<br>\nzweite Zeile");
    }

    #[test]
    fn test_reply_uses_tag_and_threading() {
        let notifier = Notifier::new(&Config::default());
        let item = notifier.reply(&ticket(), None, "Ja, gerne.", Some("<m1@example.de>".into()));
        assert_eq!(item.subject, "Re: Ihre Anfrage [ANFRAGE-482]");
        assert_eq!(item.email_type, EmailType::Reply);
        assert_eq!(item.in_reply_to.as_deref(), Some("<m1@example.de>"));
        assert_eq!(item.max_attempts, Some(3));
        assert!(item.html_body.contains("Ja, gerne."));
    }

    #[test]
    fn test_subject_ref_by_id() {
        let mut config = Config::default();
        config.mail.subject_ref = SubjectRef::Id;
        let notifier = Notifier::new(&config);
        let ticket = ticket();
        let item = notifier.confirmation(&ticket);
        assert_eq!(item.subject, format!("Ihre Anfrage [ANFRAGE-{}]", ticket.id));
    }

    #[test]
    fn test_confirmation_escapes_user_content() {
        let notifier = Notifier::new(&Config::default());
        let item = notifier.confirmation(&ticket());
        assert_eq!(item.subject, "Ihre Anfrage [ANFRAGE-482]");
        assert!(item.html_body.contains("Erika &lt;Muster&gt;"));
        assert!(item.html_body.contains("Ist die Wohnung<br>\nnoch frei?"));
        assert_eq!(item.to_address, "erika@example.de");
    }

    #[test]
    fn test_staff_notification() {
        let notifier = Notifier::new(&Config::default());
        let ticket = ticket();
        let item = notifier.staff_notification(&ticket, &staff(), "Frage zur Wohnung", "Hallo");
        assert_eq!(item.subject, "Neue Anfrage #482: Frage zur Wohnung");
        assert_eq!(item.to_address, "max@makler.de");
        assert_eq!(item.email_type, EmailType::Notification);
        assert!(item.html_body.contains(&format!("/tickets/{}", ticket.id)));
        assert!(item.html_body.contains("Besichtigung"));

        let untitled = notifier.staff_notification(&ticket, &staff(), " ", "");
        assert_eq!(untitled.subject, "Neue Anfrage #482: Besichtigung");
    }

    #[tokio::test]
    async fn test_refused_notifications_are_listed() {
        let staff = InMemoryStaffRepository::new();
        staff.add("Max Makler", "max@makler.de", true).await;
        staff.add("Lisa Lang", "lisa@makler.de", true).await;

        let outcome = Notifier::new(&Config::default())
            .notify_staff(&RefusingQueue, &staff, &ticket(), "Frage", "Hallo")
            .await
            .unwrap();
        assert_eq!(outcome.queued, 0);
        assert_eq!(outcome.failures.len(), 2);
        assert!(outcome
            .failures
            .iter()
            .any(|f| f.starts_with("notification to max@makler.de")));

        let queue = InMemoryQueueRepository::new();
        let outcome = Notifier::new(&Config::default())
            .notify_staff(&queue, &staff, &ticket(), "Frage", "Hallo")
            .await
            .unwrap();
        assert_eq!(
            outcome,
            StaffNotifications {
                queued: 2,
                failures: Vec::new(),
            }
        );
    }
}

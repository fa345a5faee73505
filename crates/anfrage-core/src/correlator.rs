//! Ticket correlation through subject tags
//!
//! Outbound mail carries `[ANFRAGE-<ref>]` in its subject. When the
//! requester answers, the tag survives in the reply subject and the fetch
//! worker uses it to find the conversation again.

use anfrage_common::config::SubjectRef;
use anfrage_common::types::TicketRef;
use anfrage_storage::models::Ticket;
use regex::Regex;
use std::sync::OnceLock;

/// Tag keyword, matched case-insensitively
pub const TAG_KEYWORD: &str = "ANFRAGE";

fn tag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)\[ANFRAGE-([^\]\s]+)\]").expect("ticket tag pattern is valid")
    })
}

/// `[ANFRAGE-<ref>]`
pub fn tag_subject(reference: &TicketRef) -> String {
    format!("[{}-{}]", TAG_KEYWORD, reference)
}

/// Subject for a staff reply.
///
/// Without an override the reply reads `Re: Ihre Anfrage [ANFRAGE-<ref>]`.
/// An override keeps its wording and gets the tag appended unless it
/// already carries it.
pub fn reply_subject(reference: &TicketRef, subject: Option<&str>) -> String {
    let tag = tag_subject(reference);
    match subject.map(str::trim).filter(|s| !s.is_empty()) {
        None => format!("Re: Ihre Anfrage {}", tag),
        Some(subject) => {
            let already_tagged = tag_pattern()
                .captures_iter(subject)
                .any(|c| c[1].eq_ignore_ascii_case(reference.as_str()));
            if already_tagged {
                subject.to_string()
            } else {
                format!("{} {}", subject, tag)
            }
        }
    }
}

/// First ticket reference found in a subject, if any
pub fn extract_ticket_ref(subject: &str) -> Option<TicketRef> {
    tag_pattern()
        .captures(subject)
        .map(|c| TicketRef::new(&c[1]))
}

/// Reference written into outbound subjects for a ticket
pub fn ticket_ref(ticket: &Ticket, mode: SubjectRef) -> TicketRef {
    match mode {
        SubjectRef::Number => TicketRef::from(ticket.ticket_number),
        SubjectRef::Id => TicketRef::from(ticket.id),
    }
}

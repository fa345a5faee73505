//! Normalization of raw inbound messages

use super::sanitize::{html_to_text, sanitize_html};
use anfrage_common::{Error, Result};
use chrono::{DateTime, Utc};
use mail_parser::{HeaderValue, MessageParser, PartType};

/// Parsed inbound email
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedEmail {
    /// Mailbox UID, used to flag the message once handled
    pub uid: u32,
    pub message_id: Option<String>,
    pub in_reply_to: Option<String>,
    pub from_address: String,
    pub from_name: Option<String>,
    pub to_address: Option<String>,
    pub subject: String,
    /// Sanitized HTML body
    pub html_body: Option<String>,
    pub text_body: Option<String>,
    pub date: Option<DateTime<Utc>>,
}

impl FetchedEmail {
    /// Best plain-text representation of the body
    pub fn plain_text(&self) -> String {
        match (&self.text_body, &self.html_body) {
            (Some(text), _) => text.clone(),
            (None, Some(html)) => html_to_text(html),
            (None, None) => String::new(),
        }
    }
}

fn first_text(value: &HeaderValue) -> Option<String> {
    match value {
        HeaderValue::Text(text) => Some(text.to_string()),
        HeaderValue::TextList(list) => list.first().map(|t| t.to_string()),
        _ => None,
    }
}

/// Parse a raw RFC 5322 message.
///
/// Fails with `Error::Parse` when the message cannot be parsed or has no
/// usable sender address.
pub fn parse_email(uid: u32, raw: &[u8]) -> Result<FetchedEmail> {
    let message = MessageParser::default()
        .parse(raw)
        .ok_or_else(|| Error::Parse(format!("UID {}: unparseable message", uid)))?;

    let sender = message.from().and_then(|a| a.first());
    let from_address = sender
        .and_then(|a| a.address())
        .map(|a| a.trim().to_lowercase())
        .filter(|a| !a.is_empty())
        .ok_or_else(|| Error::Parse(format!("UID {}: missing sender address", uid)))?;
    let from_name = sender
        .and_then(|a| a.name())
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty());

    let to_address = message
        .to()
        .and_then(|a| a.first())
        .and_then(|a| a.address())
        .map(|a| a.trim().to_lowercase());

    let html_body = message
        .html_bodies()
        .find_map(|part| match &part.body {
            PartType::Html(html) => Some(sanitize_html(html)),
            _ => None,
        });
    let text_body = message
        .text_bodies()
        .find_map(|part| match &part.body {
            PartType::Text(text) => Some(text.trim_end().to_string()),
            _ => None,
        });

    Ok(FetchedEmail {
        uid,
        message_id: message.message_id().map(str::to_string),
        in_reply_to: first_text(message.in_reply_to()),
        from_address,
        from_name,
        to_address,
        subject: message.subject().unwrap_or_default().trim().to_string(),
        html_body,
        text_body,
        date: message
            .date()
            .and_then(|d| DateTime::from_timestamp(d.to_timestamp(), 0)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const PLAIN: &str = "From: Erika Muster <Erika@Example.de>\r\n\
To: info@makler.de\r\n\
Subject: Frage zur Wohnung [ANFRAGE-482]\r\n\
Message-ID: <reply-1@example.de>\r\n\
In-Reply-To: <orig-1@makler.de>\r\n\
Date: Mon, 6 May 2024 10:00:00 +0200\r\n\
\r\n\
Ist die Wohnung noch frei?\r\n";

    const HTML: &str = "From: kunde@example.de\r\n\
To: info@makler.de\r\n\
Subject: Neue Anfrage\r\n\
Content-Type: text/html; charset=utf-8\r\n\
\r\n\
<p>Hi</p><script>alert(1)</script>\r\n";

    #[test]
    fn test_parse_plain_message() {
        let email = parse_email(7, PLAIN.as_bytes()).unwrap();
        assert_eq!(email.uid, 7);
        assert_eq!(email.from_address, "erika@example.de");
        assert_eq!(email.from_name.as_deref(), Some("Erika Muster"));
        assert_eq!(email.to_address.as_deref(), Some("info@makler.de"));
        assert_eq!(email.subject, "Frage zur Wohnung [ANFRAGE-482]");
        assert_eq!(email.message_id.as_deref(), Some("reply-1@example.de"));
        assert_eq!(email.in_reply_to.as_deref(), Some("orig-1@makler.de"));
        assert_eq!(email.text_body.as_deref(), Some("Ist die Wohnung noch frei?"));
        assert_eq!(email.html_body, None);
        assert!(email.date.is_some());
    }

    #[test]
    fn test_parse_html_message_is_sanitized() {
        let email = parse_email(8, HTML.as_bytes()).unwrap();
        let html = email.html_body.clone().unwrap();
        assert_eq!(html.trim(), "<p>Hi</p>");
        assert!(email.plain_text().contains("Hi"));
    }

    #[test]
    fn test_missing_sender_is_a_parse_error() {
        let raw = "To: info@makler.de\r\nSubject: Ohne Absender\r\n\r\nText\r\n";
        let err = parse_email(9, raw.as_bytes()).unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
    }
}

//! Mail settings administration

use crate::mail::{ConnectionCheck, InboundMailbox, MailTransport};
use anfrage_common::{Error, Result};
use anfrage_storage::models::{MailSettings, SmtpSecurity, UpdateMailSettings};
use anfrage_storage::repository::MailSettingsRepository;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

/// Placeholder shown instead of a stored password
pub const MASKED_PASSWORD: &str = "********";

/// Settings as shown to staff; passwords are masked
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MailSettingsView {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_user: String,
    pub smtp_password: String,
    pub smtp_security: SmtpSecurity,
    pub imap_host: String,
    pub imap_port: u16,
    pub imap_user: String,
    pub imap_password: String,
    pub imap_mailbox: String,
    pub from_address: String,
    pub from_name: String,
    pub active: bool,
    pub updated_at: DateTime<Utc>,
}

fn mask(password: &str) -> String {
    if password.is_empty() {
        String::new()
    } else {
        MASKED_PASSWORD.to_string()
    }
}

impl From<MailSettings> for MailSettingsView {
    fn from(s: MailSettings) -> Self {
        Self {
            smtp_password: mask(&s.smtp_password),
            imap_password: mask(&s.imap_password),
            smtp_host: s.smtp_host,
            smtp_port: s.smtp_port,
            smtp_user: s.smtp_user,
            smtp_security: s.smtp_security,
            imap_host: s.imap_host,
            imap_port: s.imap_port,
            imap_user: s.imap_user,
            imap_mailbox: s.imap_mailbox,
            from_address: s.from_address,
            from_name: s.from_name,
            active: s.active,
            updated_at: s.updated_at,
        }
    }
}

/// Result of testing both mail connections
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SettingsTestReport {
    pub smtp: ConnectionCheck,
    /// Absent when no inbound mailbox is configured
    pub imap: Option<ConnectionCheck>,
}

/// The masked placeholder means "unchanged"
fn unmask(input: &mut UpdateMailSettings) {
    for password in [&mut input.smtp_password, &mut input.imap_password] {
        if password.as_deref() == Some(MASKED_PASSWORD) {
            *password = None;
        }
    }
}

pub struct SettingsService {
    settings: Arc<dyn MailSettingsRepository>,
    transport: Arc<dyn MailTransport>,
    mailbox: Arc<dyn InboundMailbox>,
}

impl SettingsService {
    pub fn new(
        settings: Arc<dyn MailSettingsRepository>,
        transport: Arc<dyn MailTransport>,
        mailbox: Arc<dyn InboundMailbox>,
    ) -> Self {
        Self {
            settings,
            transport,
            mailbox,
        }
    }

    pub async fn get(&self) -> Result<Option<MailSettingsView>> {
        Ok(self.settings.get().await?.map(MailSettingsView::from))
    }

    pub async fn save(&self, mut input: UpdateMailSettings) -> Result<MailSettingsView> {
        unmask(&mut input);
        let saved = self.settings.save(input).await?;
        info!(
            smtp_host = %saved.smtp_host,
            imap_host = %saved.imap_host,
            active = saved.active,
            "Mail settings saved"
        );
        Ok(saved.into())
    }

    /// Test the stored settings, or unsaved ones with stored passwords
    /// filling in masked fields
    pub async fn test(&self, input: Option<UpdateMailSettings>) -> Result<SettingsTestReport> {
        let stored = self.settings.get().await?;
        let settings = match (input, stored) {
            (Some(mut input), stored) => {
                unmask(&mut input);
                input.validate()?;
                merge(input, stored.as_ref())
            }
            (None, Some(stored)) => stored,
            (None, None) => {
                return Err(Error::Validation("Mail settings are not configured".to_string()))
            }
        };

        let smtp = self.transport.test_connection(&settings).await;
        let imap = if settings.has_imap() {
            Some(self.mailbox.test_connection(&settings).await)
        } else {
            None
        };

        info!(
            smtp = smtp.success,
            imap = imap.as_ref().map(|c| c.success),
            "Mail connection test finished"
        );
        Ok(SettingsTestReport { smtp, imap })
    }
}

fn merge(input: UpdateMailSettings, stored: Option<&MailSettings>) -> MailSettings {
    let keep = |new: Option<String>, old: Option<&String>| {
        new.or_else(|| old.cloned()).unwrap_or_default()
    };
    MailSettings {
        smtp_password: keep(input.smtp_password, stored.map(|s| &s.smtp_password)),
        imap_password: keep(input.imap_password, stored.map(|s| &s.imap_password)),
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
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{active_settings, FakeMailbox, FakeTransport};
    use anfrage_storage::memory::InMemoryMailSettingsRepository;
    use pretty_assertions::assert_eq;

    fn update(smtp_password: Option<&str>) -> UpdateMailSettings {
        UpdateMailSettings {
            smtp_host: "smtp.neu.de".to_string(),
            smtp_port: 465,
            smtp_user: "info@makler.de".to_string(),
            smtp_password: smtp_password.map(str::to_string),
            smtp_security: SmtpSecurity::Tls,
            imap_host: String::new(),
            imap_port: 993,
            imap_user: String::new(),
            imap_password: Some(MASKED_PASSWORD.to_string()),
            imap_mailbox: "INBOX".to_string(),
            from_address: "info@makler.de".to_string(),
            from_name: "Makler Muster".to_string(),
            active: true,
        }
    }

    fn service(
        repo: Arc<InMemoryMailSettingsRepository>,
        transport: FakeTransport,
    ) -> SettingsService {
        SettingsService::new(repo, Arc::new(transport), Arc::new(FakeMailbox::default()))
    }

    #[tokio::test]
    async fn test_view_masks_passwords() {
        let repo = Arc::new(InMemoryMailSettingsRepository::with_settings(
            active_settings(),
        ));
        let view = service(repo, FakeTransport::succeeding())
            .get()
            .await
            .unwrap()
            .unwrap();
        assert_eq!(view.smtp_password, MASKED_PASSWORD);
        assert_eq!(view.imap_password, MASKED_PASSWORD);
        assert_eq!(view.smtp_host, "smtp.makler.de");
    }

    #[tokio::test]
    async fn test_masked_placeholder_keeps_stored_password() {
        let repo = Arc::new(InMemoryMailSettingsRepository::with_settings(
            active_settings(),
        ));
        let service = service(repo.clone(), FakeTransport::succeeding());

        service.save(update(Some(MASKED_PASSWORD))).await.unwrap();
        let stored = repo.get().await.unwrap().unwrap();
        assert_eq!(stored.smtp_host, "smtp.neu.de");
        assert_eq!(stored.smtp_password, "geheim");
        assert_eq!(stored.imap_password, "auch-geheim");

        service.save(update(Some("neu"))).await.unwrap();
        let stored = repo.get().await.unwrap().unwrap();
        assert_eq!(stored.smtp_password, "neu");
    }

    #[tokio::test]
    async fn test_connection_report() {
        let repo = Arc::new(InMemoryMailSettingsRepository::with_settings(
            active_settings(),
        ));
        let report = service(repo, FakeTransport::failing())
            .test(None)
            .await
            .unwrap();
        assert!(!report.smtp.success);
        assert_eq!(report.imap, Some(ConnectionCheck::ok()));
    }

    #[tokio::test]
    async fn test_unsaved_settings_without_imap() {
        let repo = Arc::new(InMemoryMailSettingsRepository::new());
        let report = service(repo, FakeTransport::succeeding())
            .test(Some(update(Some("pw"))))
            .await
            .unwrap();
        assert!(report.smtp.success);
        assert_eq!(report.imap, None);
    }

    #[tokio::test]
    async fn test_nothing_to_test() {
        let repo = Arc::new(InMemoryMailSettingsRepository::new());
        let err = service(repo, FakeTransport::succeeding())
            .test(None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }
}

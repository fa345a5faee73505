//! Mail transport settings repository

use crate::db::DatabasePool;
use crate::models::{MailSettings, MailSettingsRow, UpdateMailSettings};
use anfrage_common::{Error, Result};
use async_trait::async_trait;

/// Mail settings repository trait
#[async_trait]
pub trait MailSettingsRepository: Send + Sync {
    /// Load the settings, if they were ever saved
    async fn get(&self) -> Result<Option<MailSettings>>;

    /// Create or replace the settings; `None` passwords keep the stored value
    async fn save(&self, input: UpdateMailSettings) -> Result<MailSettings>;
}

/// PostgreSQL mail settings repository implementation
pub struct DbMailSettingsRepository {
    pool: DatabasePool,
}

impl DbMailSettingsRepository {
    /// Create a new repository
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MailSettingsRepository for DbMailSettingsRepository {
    async fn get(&self) -> Result<Option<MailSettings>> {
        sqlx::query_as::<_, MailSettingsRow>("SELECT * FROM mail_settings WHERE id = 1")
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))?
            .map(MailSettings::try_from)
            .transpose()
    }

    async fn save(&self, input: UpdateMailSettings) -> Result<MailSettings> {
        input.validate()?;

        let row = sqlx::query_as::<_, MailSettingsRow>(
            r#"
            INSERT INTO mail_settings (
                id, smtp_host, smtp_port, smtp_user, smtp_password, smtp_security,
                imap_host, imap_port, imap_user, imap_password, imap_mailbox,
                from_address, from_name, active, updated_at
            )
            VALUES (
                1, $1, $2, $3, COALESCE($4, ''), $5,
                $6, $7, $8, COALESCE($9, ''), $10,
                $11, $12, $13, NOW()
            )
            ON CONFLICT (id) DO UPDATE SET
                smtp_host = EXCLUDED.smtp_host,
                smtp_port = EXCLUDED.smtp_port,
                smtp_user = EXCLUDED.smtp_user,
                smtp_password = COALESCE($4, mail_settings.smtp_password),
                smtp_security = EXCLUDED.smtp_security,
                imap_host = EXCLUDED.imap_host,
                imap_port = EXCLUDED.imap_port,
                imap_user = EXCLUDED.imap_user,
                imap_password = COALESCE($9, mail_settings.imap_password),
                imap_mailbox = EXCLUDED.imap_mailbox,
                from_address = EXCLUDED.from_address,
                from_name = EXCLUDED.from_name,
                active = EXCLUDED.active,
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(&input.smtp_host)
        .bind(i32::from(input.smtp_port))
        .bind(&input.smtp_user)
        .bind(&input.smtp_password)
        .bind(input.smtp_security.to_string())
        .bind(&input.imap_host)
        .bind(i32::from(input.imap_port))
        .bind(&input.imap_user)
        .bind(&input.imap_password)
        .bind(&input.imap_mailbox)
        .bind(&input.from_address)
        .bind(&input.from_name)
        .bind(input.active)
        .fetch_one(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        MailSettings::try_from(row)
    }
}

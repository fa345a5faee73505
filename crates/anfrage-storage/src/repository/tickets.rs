//! Ticket and conversation repository

use crate::db::DatabasePool;
use crate::models::{
    ConversationMessage, ConversationMessageRow, CreateTicket, NewMessage, Ticket, TicketRow,
};
use anfrage_common::types::{TicketId, TicketRef, TicketStatus};
use anfrage_common::{Error, Result};
use async_trait::async_trait;
use sqlx::postgres::PgArguments;
use sqlx::Postgres;
use uuid::Uuid;

/// Ticket repository trait
///
/// The store never changes a ticket's status on its own; callers decide
/// which transition a new message implies.
#[async_trait]
pub trait TicketRepository: Send + Sync {
    /// Create a ticket with status `new` and a freshly issued number
    async fn create_ticket(&self, input: CreateTicket) -> Result<Ticket>;

    /// Create a ticket together with its first message; either both are
    /// stored or neither is
    async fn create_ticket_with_message(
        &self,
        input: CreateTicket,
        message: NewMessage,
    ) -> Result<(Ticket, ConversationMessage)>;

    /// Get a ticket by ID
    async fn get_ticket(&self, id: TicketId) -> Result<Option<Ticket>>;

    /// Resolve a subject reference: digits match the ticket number, a UUID
    /// matches the id, anything else misses
    async fn get_ticket_by_ref(&self, reference: &TicketRef) -> Result<Option<Ticket>>;

    /// List tickets, newest first
    async fn list_tickets(&self, status: Option<TicketStatus>, limit: i64) -> Result<Vec<Ticket>>;

    /// Append a message to a ticket's conversation
    async fn append_message(
        &self,
        ticket_id: TicketId,
        message: NewMessage,
    ) -> Result<ConversationMessage>;

    /// List a ticket's messages in creation order
    async fn list_messages(&self, ticket_id: TicketId) -> Result<Vec<ConversationMessage>>;

    /// Find a stored message by its protocol Message-ID
    async fn find_message_by_message_id(
        &self,
        message_id: &str,
    ) -> Result<Option<ConversationMessage>>;

    /// Set a ticket's status
    async fn set_status(&self, id: TicketId, status: TicketStatus) -> Result<()>;

    /// Replace a ticket's internal notes
    async fn set_notes(&self, id: TicketId, notes: Option<String>) -> Result<()>;

    /// Delete a ticket and its conversation
    async fn delete_ticket(&self, id: TicketId) -> Result<bool>;
}

/// PostgreSQL ticket repository implementation
pub struct DbTicketRepository {
    pool: DatabasePool,
}

impl DbTicketRepository {
    /// Create a new repository
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    async fn fetch_ticket(&self, sql: &str, bind: TicketLookup) -> Result<Option<Ticket>> {
        let query = sqlx::query_as::<_, TicketRow>(sql);
        let query = match bind {
            TicketLookup::Id(id) => query.bind(id),
            TicketLookup::Number(number) => query.bind(number),
        };
        query
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))?
            .map(Ticket::try_from)
            .transpose()
    }
}

enum TicketLookup {
    Id(TicketId),
    Number(i64),
}

const INSERT_TICKET: &str = r#"
    INSERT INTO tickets (id, category, name, email, phone, message, metadata, status)
    VALUES ($1, $2, $3, $4, $5, $6, $7, 'new')
    RETURNING *
"#;

// The insert only happens when the ticket exists; the FK covers a
// concurrent delete.
const INSERT_MESSAGE: &str = r#"
    INSERT INTO ticket_messages (
        id, ticket_id, direction, from_address, from_name, to_address, to_name,
        subject, html_body, text_body, message_id, in_reply_to
    )
    SELECT $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12
    WHERE EXISTS (SELECT 1 FROM tickets WHERE id = $2)
    RETURNING *
"#;

type RowQuery<'q, R> = sqlx::query::QueryAs<'q, Postgres, R, PgArguments>;

fn bind_ticket<'q>(
    query: RowQuery<'q, TicketRow>,
    input: &'q CreateTicket,
) -> RowQuery<'q, TicketRow> {
    query
        .bind(Uuid::new_v4())
        .bind(input.category.to_string())
        .bind(input.name.trim())
        .bind(input.email.trim())
        .bind(&input.phone)
        .bind(&input.message)
        .bind(&input.metadata)
}

fn bind_message<'q>(
    query: RowQuery<'q, ConversationMessageRow>,
    ticket_id: TicketId,
    message: &'q NewMessage,
) -> RowQuery<'q, ConversationMessageRow> {
    query
        .bind(Uuid::new_v4())
        .bind(ticket_id)
        .bind(message.direction.to_string())
        .bind(&message.from_address)
        .bind(&message.from_name)
        .bind(&message.to_address)
        .bind(&message.to_name)
        .bind(&message.subject)
        .bind(&message.html_body)
        .bind(&message.text_body)
        .bind(&message.message_id)
        .bind(&message.in_reply_to)
}

fn not_found(id: TicketId) -> Error {
    Error::NotFound(format!("Ticket {} not found", id))
}

#[async_trait]
impl TicketRepository for DbTicketRepository {
    async fn create_ticket(&self, input: CreateTicket) -> Result<Ticket> {
        input.validate()?;

        let row = bind_ticket(sqlx::query_as::<_, TicketRow>(INSERT_TICKET), &input)
            .fetch_one(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        Ticket::try_from(row)
    }

    async fn create_ticket_with_message(
        &self,
        input: CreateTicket,
        message: NewMessage,
    ) -> Result<(Ticket, ConversationMessage)> {
        input.validate()?;

        let mut tx = self
            .pool
            .pool()
            .begin()
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        let ticket_row = bind_ticket(sqlx::query_as::<_, TicketRow>(INSERT_TICKET), &input)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        // An early return drops the transaction, which rolls the ticket back
        let message_row = bind_message(
            sqlx::query_as::<_, ConversationMessageRow>(INSERT_MESSAGE),
            ticket_row.id,
            &message,
        )
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| Error::Database(e.to_string()))?
        .ok_or_else(|| not_found(ticket_row.id))?;

        tx.commit()
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        Ok((
            Ticket::try_from(ticket_row)?,
            ConversationMessage::try_from(message_row)?,
        ))
    }

    async fn get_ticket(&self, id: TicketId) -> Result<Option<Ticket>> {
        self.fetch_ticket("SELECT * FROM tickets WHERE id = $1", TicketLookup::Id(id))
            .await
    }

    async fn get_ticket_by_ref(&self, reference: &TicketRef) -> Result<Option<Ticket>> {
        if let Some(number) = reference.as_number() {
            self.fetch_ticket(
                "SELECT * FROM tickets WHERE ticket_number = $1",
                TicketLookup::Number(number),
            )
            .await
        } else if let Some(id) = reference.as_id() {
            self.get_ticket(id).await
        } else {
            Ok(None)
        }
    }

    async fn list_tickets(&self, status: Option<TicketStatus>, limit: i64) -> Result<Vec<Ticket>> {
        let rows = if let Some(status) = status {
            sqlx::query_as::<_, TicketRow>(
                r#"
                SELECT * FROM tickets
                WHERE status = $1
                ORDER BY created_at DESC
                LIMIT $2
                "#,
            )
            .bind(status.to_string())
            .bind(limit)
            .fetch_all(self.pool.pool())
            .await
        } else {
            sqlx::query_as::<_, TicketRow>(
                r#"
                SELECT * FROM tickets
                ORDER BY created_at DESC
                LIMIT $1
                "#,
            )
            .bind(limit)
            .fetch_all(self.pool.pool())
            .await
        }
        .map_err(|e| Error::Database(e.to_string()))?;

        rows.into_iter().map(Ticket::try_from).collect()
    }

    async fn append_message(
        &self,
        ticket_id: TicketId,
        message: NewMessage,
    ) -> Result<ConversationMessage> {
        let row = bind_message(
            sqlx::query_as::<_, ConversationMessageRow>(INSERT_MESSAGE),
            ticket_id,
            &message,
        )
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?
        .ok_or_else(|| not_found(ticket_id))?;

        sqlx::query("UPDATE tickets SET updated_at = NOW() WHERE id = $1")
            .bind(ticket_id)
            .execute(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        ConversationMessage::try_from(row)
    }

    async fn list_messages(&self, ticket_id: TicketId) -> Result<Vec<ConversationMessage>> {
        let rows = sqlx::query_as::<_, ConversationMessageRow>(
            r#"
            SELECT * FROM ticket_messages
            WHERE ticket_id = $1
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(ticket_id)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        rows.into_iter().map(ConversationMessage::try_from).collect()
    }

    async fn find_message_by_message_id(
        &self,
        message_id: &str,
    ) -> Result<Option<ConversationMessage>> {
        sqlx::query_as::<_, ConversationMessageRow>(
            "SELECT * FROM ticket_messages WHERE message_id = $1 ORDER BY created_at LIMIT 1",
        )
        .bind(message_id)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?
        .map(ConversationMessage::try_from)
        .transpose()
    }

    async fn set_status(&self, id: TicketId, status: TicketStatus) -> Result<()> {
        let result =
            sqlx::query("UPDATE tickets SET status = $2, updated_at = NOW() WHERE id = $1")
                .bind(id)
                .bind(status.to_string())
                .execute(self.pool.pool())
                .await
                .map_err(|e| Error::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(not_found(id));
        }
        Ok(())
    }

    async fn set_notes(&self, id: TicketId, notes: Option<String>) -> Result<()> {
        let result = sqlx::query("UPDATE tickets SET notes = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(notes)
            .execute(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(not_found(id));
        }
        Ok(())
    }

    async fn delete_ticket(&self, id: TicketId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM tickets WHERE id = $1")
            .bind(id)
            .execute(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }
}

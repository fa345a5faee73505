//! Ticket handlers

use anfrage_common::types::{TicketId, TicketStatus};
use anfrage_common::Error;
use anfrage_core::desk::ReplyRequest;
use anfrage_storage::models::{ConversationMessage, Ticket};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use super::{api_error, error_response, page_limit, status_error, ApiResult};
use crate::auth::{require_scope, AuthContext};
use crate::state::AppState;

const SCOPE: &str = "tickets";

/// List tickets query parameters
#[derive(Debug, Deserialize)]
pub struct ListTicketsQuery {
    pub status: Option<TicketStatus>,
    pub limit: Option<i64>,
}

/// Ticket list response
#[derive(Debug, Serialize, Deserialize)]
pub struct TicketListResponse {
    pub data: Vec<Ticket>,
}

/// Ticket with its conversation
#[derive(Debug, Serialize, Deserialize)]
pub struct TicketDetail {
    pub ticket: Ticket,
    pub messages: Vec<ConversationMessage>,
}

/// Staff changes to a ticket
#[derive(Debug, Deserialize)]
pub struct UpdateTicketRequest {
    pub status: Option<TicketStatus>,
    /// Internal notes; an empty string clears them
    pub notes: Option<String>,
}

/// Response after queuing a reply
#[derive(Debug, Serialize, Deserialize)]
pub struct ReplyResponse {
    pub queue_id: Uuid,
    pub subject: String,
}

/// List tickets, newest first
pub async fn list_tickets(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<ListTicketsQuery>,
) -> ApiResult<Json<TicketListResponse>> {
    require_scope(&auth, SCOPE).map_err(status_error)?;

    let data = state
        .repos
        .tickets
        .list_tickets(query.status, page_limit(query.limit))
        .await
        .map_err(api_error)?;

    Ok(Json(TicketListResponse { data }))
}

/// Get a ticket with its messages
pub async fn get_ticket(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<TicketId>,
) -> ApiResult<Json<TicketDetail>> {
    require_scope(&auth, SCOPE).map_err(status_error)?;

    let ticket = state
        .repos
        .tickets
        .get_ticket(id)
        .await
        .map_err(api_error)?
        .ok_or_else(|| api_error(Error::NotFound(format!("Ticket {}", id))))?;
    let messages = state
        .repos
        .tickets
        .list_messages(id)
        .await
        .map_err(api_error)?;

    Ok(Json(TicketDetail { ticket, messages }))
}

/// Update status and/or notes
pub async fn update_ticket(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<TicketId>,
    Json(input): Json<UpdateTicketRequest>,
) -> ApiResult<Json<Ticket>> {
    require_scope(&auth, SCOPE).map_err(status_error)?;

    if input.status.is_none() && input.notes.is_none() {
        return Err(error_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            "VALIDATION_ERROR",
            "Nothing to update",
        ));
    }

    let tickets = &state.repos.tickets;
    if let Some(status) = input.status {
        tickets.set_status(id, status).await.map_err(api_error)?;
    }
    if let Some(notes) = input.notes {
        let notes = Some(notes).filter(|n| !n.trim().is_empty());
        tickets.set_notes(id, notes).await.map_err(api_error)?;
    }

    let ticket = tickets
        .get_ticket(id)
        .await
        .map_err(api_error)?
        .ok_or_else(|| api_error(Error::NotFound(format!("Ticket {}", id))))?;

    info!(ticket_id = %id, status = %ticket.status, "Ticket updated");
    Ok(Json(ticket))
}

/// Delete a ticket and its conversation
pub async fn delete_ticket(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<TicketId>,
) -> ApiResult<StatusCode> {
    require_scope(&auth, SCOPE).map_err(status_error)?;

    if state
        .repos
        .tickets
        .delete_ticket(id)
        .await
        .map_err(api_error)?
    {
        info!(ticket_id = %id, "Ticket deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(api_error(Error::NotFound(format!("Ticket {}", id))))
    }
}

/// Queue a staff reply
///
/// POST /api/v1/tickets/:id/reply
pub async fn reply_to_ticket(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<TicketId>,
    Json(input): Json<ReplyRequest>,
) -> ApiResult<(StatusCode, Json<ReplyResponse>)> {
    require_scope(&auth, SCOPE).map_err(status_error)?;

    let queued = state
        .replies
        .send_reply(id, input)
        .await
        .map_err(api_error)?;

    Ok((
        StatusCode::ACCEPTED,
        Json(ReplyResponse {
            queue_id: queued.id,
            subject: queued.subject,
        }),
    ))
}

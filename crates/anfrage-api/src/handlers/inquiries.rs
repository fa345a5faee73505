//! Public contact form endpoint

use anfrage_core::desk::InquiryReceipt;
use anfrage_storage::models::CreateTicket;
use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;

use super::{api_error, ApiResult};
use crate::state::AppState;

/// Submit an inquiry
///
/// POST /api/v1/inquiries
///
/// Opens a ticket, confirms receipt to the requester and notifies staff.
pub async fn create_inquiry(
    State(state): State<Arc<AppState>>,
    Json(input): Json<CreateTicket>,
) -> ApiResult<(StatusCode, Json<InquiryReceipt>)> {
    let receipt = state.inquiries.submit(input).await.map_err(api_error)?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

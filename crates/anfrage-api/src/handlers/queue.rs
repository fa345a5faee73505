//! Outbound queue handlers

use anfrage_common::types::{QueueItemId, QueueStatus};
use anfrage_common::Error;
use anfrage_storage::models::{QueueItem, QueueStats};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use super::{api_error, error_response, page_limit, status_error, ApiResult};
use crate::auth::{require_scope, AuthContext};
use crate::state::AppState;

const SCOPE: &str = "queue";

/// List queue query parameters
#[derive(Debug, Deserialize)]
pub struct ListQueueQuery {
    pub status: Option<QueueStatus>,
    pub limit: Option<i64>,
}

/// Queue items with counts by status
#[derive(Debug, Serialize, Deserialize)]
pub struct QueueListResponse {
    pub items: Vec<QueueItem>,
    pub stats: QueueStats,
}

/// Staff action on a queue item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueAction {
    Retry,
}

#[derive(Debug, Deserialize)]
pub struct UpdateQueueItemRequest {
    pub action: QueueAction,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct QueueActionResponse {
    pub id: QueueItemId,
    pub status: QueueStatus,
}

/// List queue items, newest first
pub async fn list_queue(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<ListQueueQuery>,
) -> ApiResult<Json<QueueListResponse>> {
    require_scope(&auth, SCOPE).map_err(status_error)?;

    let queue = &state.repos.queue;
    let items = queue
        .list(query.status, page_limit(query.limit))
        .await
        .map_err(api_error)?;
    let stats = queue.stats().await.map_err(api_error)?;

    Ok(Json(QueueListResponse { items, stats }))
}

/// Apply an action to a queue item
///
/// Only failed items can be retried.
pub async fn update_queue_item(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<QueueItemId>,
    Json(input): Json<UpdateQueueItemRequest>,
) -> ApiResult<Json<QueueActionResponse>> {
    require_scope(&auth, SCOPE).map_err(status_error)?;

    let queue = &state.repos.queue;
    match input.action {
        QueueAction::Retry => {
            if queue.retry(id).await.map_err(api_error)? {
                info!(queue_id = %id, "Queue item reset for retry");
                return Ok(Json(QueueActionResponse {
                    id,
                    status: QueueStatus::Pending,
                }));
            }

            let item = queue
                .get(id)
                .await
                .map_err(api_error)?
                .ok_or_else(|| api_error(Error::NotFound(format!("Queue item {}", id))))?;
            Err(error_response(
                StatusCode::CONFLICT,
                "INVALID_STATE",
                format!("Queue item is {}, only failed items can be retried", item.status),
            ))
        }
    }
}

/// Delete a queue item regardless of its status
pub async fn delete_queue_item(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<QueueItemId>,
) -> ApiResult<StatusCode> {
    require_scope(&auth, SCOPE).map_err(status_error)?;

    if state.repos.queue.delete(id).await.map_err(api_error)? {
        info!(queue_id = %id, "Queue item deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(api_error(Error::NotFound(format!("Queue item {}", id))))
    }
}

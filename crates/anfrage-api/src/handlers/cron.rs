//! Scheduled trigger endpoints
//!
//! An external scheduler calls these; access is restricted by
//! [`crate::auth::cron_guard`]. Each run is bounded by the configured
//! maximum duration. A drain cut off mid-send leaves its claims in
//! `processing` until the next pass releases them.

use anfrage_common::Result;
use anfrage_core::{DrainSummary, FetchSummary};
use axum::{extract::State, http::StatusCode, Json};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use super::{api_error, error_response, ApiResult};
use crate::state::AppState;

async fn run_bounded<T>(
    job: &str,
    limit: Duration,
    run: impl Future<Output = Result<T>>,
) -> ApiResult<Json<T>> {
    match tokio::time::timeout(limit, run).await {
        Ok(Ok(summary)) => Ok(Json(summary)),
        Ok(Err(e)) => Err(api_error(e)),
        Err(_) => {
            warn!(job, limit_secs = limit.as_secs(), "Scheduled job exceeded its time limit");
            Err(error_response(
                StatusCode::GATEWAY_TIMEOUT,
                "TIMEOUT",
                format!("{} did not finish within {}s", job, limit.as_secs()),
            ))
        }
    }
}

/// Drain the outbound queue once
///
/// GET|POST /cron/process-queue
pub async fn process_queue(State(state): State<Arc<AppState>>) -> ApiResult<Json<DrainSummary>> {
    run_bounded("process-queue", state.cron_max_duration, state.drain.run_once()).await
}

/// Poll the inbound mailbox once
///
/// GET|POST /cron/fetch-emails
pub async fn fetch_emails(State(state): State<Arc<AppState>>) -> ApiResult<Json<FetchSummary>> {
    run_bounded("fetch-emails", state.cron_max_duration, state.fetch.run_once()).await
}

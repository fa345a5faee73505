//! Mail settings handlers

use anfrage_common::Error;
use anfrage_core::desk::{MailSettingsView, SettingsTestReport};
use anfrage_storage::models::UpdateMailSettings;
use axum::{extract::State, Extension, Json};
use std::sync::Arc;

use super::{api_error, status_error, ApiResult};
use crate::auth::{require_scope, AuthContext};
use crate::state::AppState;

const SCOPE: &str = "settings";

/// Current settings with masked passwords
///
/// GET /api/v1/settings/email
pub async fn get_email_settings(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<MailSettingsView>> {
    require_scope(&auth, SCOPE).map_err(status_error)?;

    state
        .settings
        .get()
        .await
        .map_err(api_error)?
        .map(Json)
        .ok_or_else(|| api_error(Error::NotFound("Mail settings".to_string())))
}

/// Save settings; the masked placeholder keeps a stored password
///
/// PUT /api/v1/settings/email
pub async fn update_email_settings(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Json(input): Json<UpdateMailSettings>,
) -> ApiResult<Json<MailSettingsView>> {
    require_scope(&auth, SCOPE).map_err(status_error)?;

    state.settings.save(input).await.map(Json).map_err(api_error)
}

/// Test SMTP and IMAP connectivity
///
/// POST /api/v1/settings/email/test
///
/// Tests the submitted settings when a body is given, the stored ones
/// otherwise.
pub async fn test_email_settings(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    input: Option<Json<UpdateMailSettings>>,
) -> ApiResult<Json<SettingsTestReport>> {
    require_scope(&auth, SCOPE).map_err(status_error)?;

    state
        .settings
        .test(input.map(|Json(input)| input))
        .await
        .map(Json)
        .map_err(api_error)
}

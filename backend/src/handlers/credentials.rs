//! Credentials admin endpoints (Toggl token, calendar timezone).

use axum::{extract::State, Extension, Json};
use togglsync_shared::api::{mask_token, CredentialsResponse, UpdateCredentialsRequest};
use togglsync_shared::Credentials;
use validator::Validate;

use crate::auth::types::AuthUser;
use crate::db;
use crate::error::{ApiResult, AppError};
use crate::AppState;

fn to_response(credentials: Credentials) -> CredentialsResponse {
    CredentialsResponse {
        toggl_api_token_masked: mask_token(&credentials.toggl_api_token),
        google_connected: credentials.google_connected(),
        calendar_timezone: credentials.calendar_timezone,
        last_metadata_sync: credentials.last_metadata_sync,
    }
}

pub async fn get_credentials(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<CredentialsResponse>> {
    let mut conn = state.pool.get().await?;

    let credentials = db::credentials::get_for_user(&mut conn, user.id).await?;

    Ok(Json(to_response(credentials)))
}

pub async fn update_credentials(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<UpdateCredentialsRequest>,
) -> ApiResult<Json<CredentialsResponse>> {
    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let mut conn = state.pool.get().await?;

    let credentials = db::credentials::update_settings(
        &mut conn,
        user.id,
        payload.toggl_api_token.as_deref(),
        payload.calendar_timezone.as_deref(),
    )
    .await?;

    Ok(Json(to_response(credentials)))
}

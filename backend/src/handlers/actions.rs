//! Bulk sync actions: metadata refresh and historical backfill.

use axum::{extract::State, Extension, Json};
use chrono::Utc;
use togglsync_shared::api::{BackfillRequest, BackfillResponse, MetadataSyncSummary};
use validator::Validate;

use crate::auth::types::AuthUser;
use crate::error::{ApiResult, AppError};
use crate::sync::backfill::{backfill_entries, BackfillOptions};
use crate::sync::metadata;
use crate::AppState;

pub async fn sync_metadata(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<MetadataSyncSummary>> {
    let mut conn = state.pool.get().await?;

    let summary = metadata::sync_metadata_for_user(&mut conn, &state.config, user.id).await?;

    Ok(Json(summary))
}

pub async fn backfill(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<BackfillRequest>,
) -> ApiResult<Json<BackfillResponse>> {
    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    if let (Some(start), Some(end)) = (payload.start_date, payload.end_date) {
        if start > end {
            return Err(AppError::Validation(
                "start_date must not be after end_date".to_string(),
            ));
        }
    }

    let mut conn = state.pool.get().await?;

    let options = BackfillOptions::from_request(&payload, Utc::now().date_naive());
    let (response, imported_ids) =
        backfill_entries(&mut conn, &state.config, user.id, options).await?;

    // Imported entries are dirty rows; hand them straight to the worker
    for toggl_id in imported_ids {
        state.jobs.enqueue(user.id, toggl_id);
    }

    Ok(Json(response))
}

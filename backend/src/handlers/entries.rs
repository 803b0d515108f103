//! Time entry admin endpoints.

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use togglsync_shared::api::{ListEntriesQuery, ListEntriesResponse, StatusResponse};
use uuid::Uuid;

use crate::auth::types::AuthUser;
use crate::db;
use crate::error::{ApiResult, AppError};
use crate::AppState;

const DEFAULT_PAGE_SIZE: i64 = 50;
const MAX_PAGE_SIZE: i64 = 500;

pub async fn list_entries(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<ListEntriesQuery>,
) -> ApiResult<Json<ListEntriesResponse>> {
    let mut conn = state.pool.get().await?;

    let limit = query
        .limit
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);
    let offset = query.offset.unwrap_or(0).max(0);

    let entries =
        db::time_entries::list_for_user(&mut conn, user.id, Some(limit), Some(offset)).await?;
    let total = db::time_entries::count_for_user(&mut conn, user.id).await?;

    Ok(Json(ListEntriesResponse { entries, total }))
}

/// Force a re-sync of one entry through the worker.
pub async fn resync_entry(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(entry_id): Path<Uuid>,
) -> ApiResult<Json<StatusResponse>> {
    let mut conn = state.pool.get().await?;

    let entry = db::time_entries::get_by_id(&mut conn, entry_id).await?;
    if entry.user_id != user.id {
        return Err(AppError::NotFound("entry not found".to_string()));
    }

    db::time_entries::mark_unsynced(&mut conn, entry.id).await?;
    state.jobs.enqueue(user.id, entry.toggl_id);

    Ok(Json(StatusResponse::ok()))
}

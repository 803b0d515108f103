//! Mapping rule admin endpoints.

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use togglsync_shared::api::{
    ApplyMappingResponse, CreateMappingRequest, StatusResponse, UpdateMappingRequest,
};
use togglsync_shared::{is_valid_color_id, Mapping, MappingEntityType};
use uuid::Uuid;
use validator::Validate;

use crate::auth::types::AuthUser;
use crate::db;
use crate::error::{ApiResult, AppError};
use crate::AppState;

pub async fn list_mappings(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<Vec<Mapping>>> {
    let mut conn = state.pool.get().await?;

    let mappings = db::mappings::list_for_user(&mut conn, user.id).await?;

    Ok(Json(mappings))
}

pub async fn create_mapping(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<CreateMappingRequest>,
) -> ApiResult<Json<Mapping>> {
    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;
    validate_color(payload.color_id.as_deref())?;

    let mut conn = state.pool.get().await?;

    if let Some(calendar_id) = payload.calendar_id {
        let calendar = db::calendars::get_by_id(&mut conn, calendar_id).await?;
        if calendar.user_id != user.id {
            return Err(AppError::NotFound("calendar not found".to_string()));
        }
    }

    let mapping = db::mappings::create(
        &mut conn,
        user.id,
        payload.entity_type,
        payload.entity_id,
        &payload.entity_name,
        payload.calendar_id,
        payload.color_id.as_deref(),
        payload.priority,
    )
    .await?;

    Ok(Json(mapping))
}

pub async fn update_mapping(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(mapping_id): Path<Uuid>,
    Json(payload): Json<UpdateMappingRequest>,
) -> ApiResult<Json<Mapping>> {
    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;
    validate_color(payload.color_id.as_deref())?;

    let mut conn = state.pool.get().await?;

    let existing = db::mappings::get_by_id(&mut conn, mapping_id).await?;
    if existing.user_id != user.id {
        return Err(AppError::NotFound("mapping not found".to_string()));
    }

    if let Some(calendar_id) = payload.calendar_id {
        let calendar = db::calendars::get_by_id(&mut conn, calendar_id).await?;
        if calendar.user_id != user.id {
            return Err(AppError::NotFound("calendar not found".to_string()));
        }
    }

    let mapping = db::mappings::update(
        &mut conn,
        mapping_id,
        payload.entity_name.as_deref(),
        payload.calendar_id,
        payload.color_id.as_deref(),
        payload.priority,
    )
    .await?;

    Ok(Json(mapping))
}

pub async fn delete_mapping(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(mapping_id): Path<Uuid>,
) -> ApiResult<Json<StatusResponse>> {
    let mut conn = state.pool.get().await?;

    let existing = db::mappings::get_by_id(&mut conn, mapping_id).await?;
    if existing.user_id != user.id {
        return Err(AppError::NotFound("mapping not found".to_string()));
    }

    db::mappings::delete(&mut conn, mapping_id).await?;

    Ok(Json(StatusResponse::ok()))
}

/// Re-sync every synced entry the mapping matches. The worker re-resolves
/// each entry, so the new calendar/color takes effect.
pub async fn apply_mapping(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(mapping_id): Path<Uuid>,
) -> ApiResult<Json<ApplyMappingResponse>> {
    let mut conn = state.pool.get().await?;

    let mapping = db::mappings::get_by_id(&mut conn, mapping_id).await?;
    if mapping.user_id != user.id {
        return Err(AppError::NotFound("mapping not found".to_string()));
    }

    // Organization mappings match indirectly through workspace membership
    let org_workspace_toggl_ids = if mapping.entity_type == MappingEntityType::Organization {
        match db::organizations::find_by_toggl_id(&mut conn, user.id, mapping.entity_id).await? {
            Some(org) => {
                db::workspaces::toggl_ids_for_organization(&mut conn, user.id, org.id).await?
            }
            None => Vec::new(),
        }
    } else {
        Vec::new()
    };

    let toggl_ids = db::time_entries::toggl_ids_matching_mapping(
        &mut conn,
        user.id,
        mapping.entity_type,
        mapping.entity_id,
        &org_workspace_toggl_ids,
    )
    .await?;

    for toggl_id in &toggl_ids {
        if let Some(entry) = db::time_entries::get_by_toggl_id(&mut conn, user.id, *toggl_id).await?
        {
            db::time_entries::mark_unsynced(&mut conn, entry.id).await?;
        }
        state.jobs.enqueue(user.id, *toggl_id);
    }

    tracing::info!(
        "Applying mapping {} ({} {}) to {} entries",
        mapping.id,
        mapping.entity_type.as_str(),
        mapping.entity_name,
        toggl_ids.len()
    );

    Ok(Json(ApplyMappingResponse {
        enqueued: toggl_ids.len(),
    }))
}

fn validate_color(color_id: Option<&str>) -> Result<(), AppError> {
    if let Some(color_id) = color_id {
        if !is_valid_color_id(color_id) {
            return Err(AppError::Validation(format!(
                "invalid color id: {color_id} (expected \"1\" through \"11\")"
            )));
        }
    }
    Ok(())
}

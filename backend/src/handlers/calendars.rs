//! Calendar admin endpoints.

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use togglsync_shared::api::ImportCalendarsResponse;
use togglsync_shared::Calendar;
use uuid::Uuid;

use crate::auth::types::AuthUser;
use crate::db;
use crate::error::{ApiResult, AppError};
use crate::services::gcal::GoogleCalendarClient;
use crate::sync::metadata;
use crate::AppState;

const DEDICATED_CALENDAR_NAME: &str = "Toggl";

pub async fn list_calendars(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<Vec<Calendar>>> {
    let mut conn = state.pool.get().await?;

    let calendars = db::calendars::list_for_user(&mut conn, user.id).await?;

    Ok(Json(calendars))
}

/// Import writable calendars from the user's Google account.
pub async fn import_calendars(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<ImportCalendarsResponse>> {
    let mut conn = state.pool.get().await?;

    let response = metadata::import_calendars_for_user(&mut conn, &state.config, user.id).await?;

    Ok(Json(response))
}

/// Create a dedicated "Toggl" calendar on the Google side and register it,
/// making it the default when the user has none yet.
pub async fn create_dedicated_calendar(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<Calendar>> {
    let mut conn = state.pool.get().await?;

    let credentials = db::credentials::get_for_user(&mut conn, user.id).await?;
    if !credentials.google_connected() {
        return Err(AppError::Validation(
            "Google Calendar not connected".to_string(),
        ));
    }

    let gcal = GoogleCalendarClient::from_refresh_token(
        &state.config.google_client_id,
        &state.config.google_client_secret,
        credentials.google_refresh_token.as_deref().unwrap_or(""),
        &credentials.calendar_timezone,
    )
    .await?;

    // Reuse a registered dedicated calendar while it still exists on the
    // Google side; recreate it when it was deleted out from under us.
    let existing = db::calendars::find_by_name(&mut conn, user.id, DEDICATED_CALENDAR_NAME).await?;

    if let Some(existing) = &existing {
        if gcal
            .get_calendar(&existing.google_calendar_id)
            .await?
            .is_some()
        {
            return Ok(Json(existing.clone()));
        }
        tracing::warn!(
            "Stored calendar {} no longer exists, recreating",
            existing.google_calendar_id
        );
    }

    let google_calendar_id = gcal
        .insert_calendar(
            DEDICATED_CALENDAR_NAME,
            "Time entries synced from Toggl Track",
        )
        .await?;

    // A stale row keeps its identity (and the mappings pointing at it) and
    // is repointed at the freshly created Google calendar.
    let calendar = match existing {
        Some(stale) => db::calendars::set_google_id(&mut conn, stale.id, &google_calendar_id).await?,
        None => {
            db::calendars::upsert(&mut conn, user.id, &google_calendar_id, DEDICATED_CALENDAR_NAME)
                .await?
                .0
        }
    };

    let calendar = if db::calendars::get_default_for_user(&mut conn, user.id)
        .await?
        .is_none()
    {
        db::calendars::set_default(&mut conn, user.id, calendar.id).await?
    } else {
        calendar
    };

    tracing::info!(
        "Created dedicated calendar {} for user {}",
        calendar.google_calendar_id,
        user.email
    );

    Ok(Json(calendar))
}

pub async fn set_default_calendar(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(calendar_id): Path<Uuid>,
) -> ApiResult<Json<Calendar>> {
    let mut conn = state.pool.get().await?;

    let calendar = db::calendars::get_by_id(&mut conn, calendar_id).await?;
    if calendar.user_id != user.id {
        return Err(AppError::NotFound("calendar not found".to_string()));
    }

    let calendar = db::calendars::set_default(&mut conn, user.id, calendar_id).await?;

    Ok(Json(calendar))
}

//! Workspace admin endpoints, including Toggl webhook subscription management.

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use togglsync_shared::api::WorkspaceResponse;
use togglsync_shared::Workspace;
use uuid::Uuid;

use crate::auth::types::AuthUser;
use crate::db;
use crate::error::{ApiResult, AppError};
use crate::services::toggl::TogglClient;
use crate::AppState;

fn to_response(workspace: Workspace) -> WorkspaceResponse {
    WorkspaceResponse {
        id: workspace.id,
        toggl_id: workspace.toggl_id,
        organization_id: workspace.organization_id,
        name: workspace.name,
        webhook_token: workspace.webhook_token,
        webhook_subscription_id: workspace.webhook_subscription_id,
        webhook_enabled: workspace.webhook_enabled,
        updated_at: workspace.updated_at,
    }
}

pub async fn list_workspaces(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<Vec<WorkspaceResponse>>> {
    let mut conn = state.pool.get().await?;

    let workspaces = db::workspaces::list_for_user(&mut conn, user.id).await?;

    Ok(Json(workspaces.into_iter().map(to_response).collect()))
}

/// Create the Toggl webhook subscription for a workspace, pointing back at
/// this deployment's webhook endpoint.
pub async fn create_webhook(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(workspace_id): Path<Uuid>,
) -> ApiResult<Json<WorkspaceResponse>> {
    let mut conn = state.pool.get().await?;

    let workspace = db::workspaces::get_by_id(&mut conn, workspace_id).await?;
    if workspace.user_id != user.id {
        return Err(AppError::NotFound("workspace not found".to_string()));
    }

    let credentials = db::credentials::get_for_user(&mut conn, user.id).await?;
    if !credentials.has_toggl_token() {
        return Err(AppError::Validation(
            "Toggl API token not configured".to_string(),
        ));
    }

    let token = db::workspaces::ensure_webhook_token(&mut conn, workspace.id).await?;
    let callback_url = state.config.webhook_callback_url(&token);

    let toggl = TogglClient::new(
        &credentials.toggl_api_token,
        &state.config.toggl_api_url,
        &state.config.toggl_webhook_api_url,
    );

    let subscription = toggl
        .create_webhook(workspace.toggl_id, &callback_url, "togglsync")
        .await?;

    let workspace = db::workspaces::set_webhook_subscription(
        &mut conn,
        workspace.id,
        &token,
        Some(subscription.subscription_id),
        subscription.secret.as_deref(),
        subscription.enabled,
    )
    .await?;

    tracing::info!(
        "Created webhook subscription {} for workspace {}",
        subscription.subscription_id,
        workspace.toggl_id
    );

    Ok(Json(to_response(workspace)))
}

pub async fn delete_webhook(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(workspace_id): Path<Uuid>,
) -> ApiResult<Json<WorkspaceResponse>> {
    let mut conn = state.pool.get().await?;

    let workspace = db::workspaces::get_by_id(&mut conn, workspace_id).await?;
    if workspace.user_id != user.id {
        return Err(AppError::NotFound("workspace not found".to_string()));
    }

    if let Some(subscription_id) = workspace.webhook_subscription_id {
        let credentials = db::credentials::get_for_user(&mut conn, user.id).await?;
        let toggl = TogglClient::new(
            &credentials.toggl_api_token,
            &state.config.toggl_api_url,
            &state.config.toggl_webhook_api_url,
        );

        if let Err(e) = toggl.delete_webhook(workspace.toggl_id, subscription_id).await {
            // The subscription may already be gone on the Toggl side
            tracing::warn!(
                "Failed to delete Toggl subscription {}: {}",
                subscription_id,
                e
            );
        }
    }

    let workspace = db::workspaces::clear_webhook_subscription(&mut conn, workspace.id).await?;

    Ok(Json(to_response(workspace)))
}

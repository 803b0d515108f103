//! Toggl metadata refresh and Google calendar import.

use std::sync::OnceLock;

use anyhow::{bail, Context, Result};
use diesel_async::AsyncPgConnection;
use regex::Regex;
use togglsync_shared::api::{ImportCalendarsResponse, MetadataSyncSummary};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::db;
use crate::services::gcal::GoogleCalendarClient;
use crate::services::toggl::TogglClient;

/// Pull organizations, workspaces, projects and tags from Toggl and mirror
/// them into the database, minting webhook tokens for new workspaces and
/// adopting existing Toggl webhook subscriptions that already point at us.
pub async fn sync_metadata_for_user(
    conn: &mut AsyncPgConnection,
    config: &AppConfig,
    user_id: Uuid,
) -> Result<MetadataSyncSummary> {
    let credentials = db::credentials::get_for_user(conn, user_id).await?;
    if !credentials.has_toggl_token() {
        bail!("Toggl API token not configured");
    }

    let toggl = TogglClient::new(
        &credentials.toggl_api_token,
        &config.toggl_api_url,
        &config.toggl_webhook_api_url,
    );

    let mut summary = MetadataSyncSummary::default();

    let orgs = toggl.get_organizations().await?;
    for org in orgs {
        db::organizations::upsert(conn, user_id, org.id, &org.name).await?;
        summary.organizations += 1;
    }

    let workspaces = toggl.get_workspaces().await?;
    for ws in workspaces {
        let organization_id = match ws.organization_id {
            Some(org_toggl_id) => db::organizations::find_by_toggl_id(conn, user_id, org_toggl_id)
                .await?
                .map(|o| o.id),
            None => None,
        };

        let workspace =
            db::workspaces::upsert(conn, user_id, ws.id, &ws.name, organization_id).await?;
        db::workspaces::ensure_webhook_token(conn, workspace.id).await?;
        summary.workspaces += 1;
    }

    for workspace in db::workspaces::list_for_user(conn, user_id).await? {
        match toggl.get_projects(workspace.toggl_id).await {
            Ok(projects) => {
                for project in projects {
                    db::projects::upsert(
                        conn,
                        user_id,
                        project.id,
                        workspace.id,
                        &project.name,
                        project.color.as_deref(),
                        project.active,
                    )
                    .await?;
                    summary.projects += 1;
                }
            }
            Err(e) => {
                tracing::warn!(
                    "Failed to sync projects for workspace {}: {}",
                    workspace.toggl_id,
                    e
                );
            }
        }

        match toggl.get_tags(workspace.toggl_id).await {
            Ok(tags) => {
                for tag in tags {
                    db::tags::upsert(conn, user_id, tag.id, workspace.id, &tag.name).await?;
                    summary.tags += 1;
                }
            }
            Err(e) => {
                tracing::warn!(
                    "Failed to sync tags for workspace {}: {}",
                    workspace.toggl_id,
                    e
                );
            }
        }

        // Adopt subscriptions created out-of-band that already target us
        match toggl.list_webhooks(workspace.toggl_id).await {
            Ok(subscriptions) => {
                for subscription in subscriptions {
                    if !subscription.url_callback.contains(&config.webhook_domain) {
                        continue;
                    }
                    if let Some(token) = webhook_token_from_url(&subscription.url_callback) {
                        db::workspaces::set_webhook_subscription(
                            conn,
                            workspace.id,
                            &token,
                            Some(subscription.subscription_id),
                            subscription.secret.as_deref(),
                            subscription.enabled,
                        )
                        .await?;
                        summary.adopted_webhooks += 1;
                        tracing::info!(
                            "Adopted existing webhook for workspace {}: subscription_id={}",
                            workspace.name,
                            subscription.subscription_id
                        );
                    }
                }
            }
            Err(e) => {
                tracing::debug!(
                    "Could not fetch webhooks for workspace {}: {}",
                    workspace.toggl_id,
                    e
                );
            }
        }
    }

    db::credentials::touch_metadata_sync(conn, user_id).await?;

    tracing::info!(
        "Synced {} organizations, {} workspaces, {} projects, {} tags for user {}",
        summary.organizations,
        summary.workspaces,
        summary.projects,
        summary.tags,
        user_id
    );

    Ok(summary)
}

/// Refresh projects and tags for a single workspace, tolerating Toggl
/// failures per resource. Used when a webhook references unknown entities.
pub async fn refresh_workspace_metadata(
    conn: &mut AsyncPgConnection,
    config: &AppConfig,
    user_id: Uuid,
    api_token: &str,
    workspace_toggl_id: i64,
) -> Result<()> {
    let Some(workspace) = db::workspaces::find_by_toggl_id(conn, user_id, workspace_toggl_id).await?
    else {
        tracing::warn!(
            "Workspace {} not found for user {}, run a metadata sync first",
            workspace_toggl_id,
            user_id
        );
        return Ok(());
    };

    let toggl = TogglClient::new(api_token, &config.toggl_api_url, &config.toggl_webhook_api_url);

    match toggl.get_projects(workspace_toggl_id).await {
        Ok(projects) => {
            for project in projects {
                db::projects::upsert(
                    conn,
                    user_id,
                    project.id,
                    workspace.id,
                    &project.name,
                    project.color.as_deref(),
                    project.active,
                )
                .await?;
            }
        }
        Err(e) => {
            tracing::warn!(
                "Failed to sync projects for workspace {}: {}",
                workspace_toggl_id,
                e
            );
        }
    }

    match toggl.get_tags(workspace_toggl_id).await {
        Ok(tags) => {
            for tag in tags {
                db::tags::upsert(conn, user_id, tag.id, workspace.id, &tag.name).await?;
            }
        }
        Err(e) => {
            tracing::warn!(
                "Failed to sync tags for workspace {}: {}",
                workspace_toggl_id,
                e
            );
        }
    }

    tracing::info!("Refreshed metadata for workspace {}", workspace_toggl_id);

    Ok(())
}

/// Import the user's Google calendars, keeping only writable ones. Rows for
/// calendars gone from Google are removed (mappings go with them via FK),
/// and a default is ensured, preferring the primary calendar.
pub async fn import_calendars_for_user(
    conn: &mut AsyncPgConnection,
    config: &AppConfig,
    user_id: Uuid,
) -> Result<ImportCalendarsResponse> {
    let user = db::users::get_by_id(conn, user_id).await?;
    let credentials = db::credentials::get_for_user(conn, user_id).await?;
    if !credentials.google_connected() {
        bail!("Google Calendar not connected");
    }

    let gcal = GoogleCalendarClient::from_refresh_token(
        &config.google_client_id,
        &config.google_client_secret,
        credentials
            .google_refresh_token
            .as_deref()
            .context("missing refresh token")?,
        &credentials.calendar_timezone,
    )
    .await?;

    let listings = gcal.list_calendars().await?;

    let mut response = ImportCalendarsResponse {
        imported: 0,
        updated: 0,
        removed: 0,
        skipped_readonly: 0,
    };
    let mut keep_ids = Vec::new();
    let mut primary_google_id = None;

    for listing in listings {
        if !listing.writable() {
            tracing::debug!(
                "Skipping read-only calendar: {} (access: {})",
                listing.summary,
                listing.access_role
            );
            response.skipped_readonly += 1;
            continue;
        }

        if listing.primary {
            primary_google_id = Some(listing.id.clone());
        }

        let (_, created) = db::calendars::upsert(conn, user_id, &listing.id, &listing.summary)
            .await?;
        if created {
            response.imported += 1;
        } else {
            response.updated += 1;
        }
        keep_ids.push(listing.id);
    }

    response.removed = db::calendars::delete_missing(conn, user_id, &keep_ids).await?;

    // Make sure some calendar is the default target
    if db::calendars::get_default_for_user(conn, user_id)
        .await?
        .is_none()
    {
        let preferred = match &primary_google_id {
            Some(google_id) => db::calendars::find_by_google_id(conn, user_id, google_id).await?,
            None => None,
        };
        let preferred = match preferred {
            Some(c) => Some(c),
            None => db::calendars::find_by_google_id(conn, user_id, &user.email).await?,
        };
        let fallback = db::calendars::list_for_user(conn, user_id).await?.into_iter().next();

        if let Some(calendar) = preferred.or(fallback) {
            db::calendars::set_default(conn, user_id, calendar.id).await?;
            tracing::info!("Set \"{}\" as default calendar", calendar.name);
        }
    }

    Ok(response)
}

/// Extract the routing token out of a webhook callback URL.
fn webhook_token_from_url(url: &str) -> Option<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"/webhook/toggl/([^/?#]+)/?$").expect("webhook token pattern is valid")
    });
    re.captures(url).map(|captures| captures[1].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_webhook_token() {
        assert_eq!(
            webhook_token_from_url("https://sync.example.com/webhook/toggl/abc123").as_deref(),
            Some("abc123")
        );
        assert_eq!(
            webhook_token_from_url("https://sync.example.com/webhook/toggl/abc123/").as_deref(),
            Some("abc123")
        );
    }

    #[test]
    fn rejects_unrelated_urls() {
        assert_eq!(webhook_token_from_url("https://sync.example.com/health"), None);
        assert_eq!(webhook_token_from_url("https://sync.example.com/webhook/toggl/"), None);
    }
}

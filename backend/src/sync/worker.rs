//! Webhook-fed background sync worker.
//!
//! Webhook handlers enqueue one job per changed time entry; this worker
//! drains the queue, debounces rapid edits, and mirrors each entry to
//! Google Calendar. Failed jobs are re-enqueued with a delay up to a
//! bounded attempt count.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use diesel_async::AsyncPgConnection;
use tokio::sync::mpsc;
use togglsync_shared::{Credentials, TimeEntry};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::db::{self, DbPool};
use crate::services::gcal::GoogleCalendarClient;
use crate::services::resolver;
use crate::services::toggl::{TogglApiError, TogglClient};
use crate::sync::event::build_event_payload;
use crate::sync::metadata;

/// One unit of sync work: mirror a single entry for a single user.
#[derive(Debug, Clone)]
pub struct SyncJob {
    pub user_id: Uuid,
    pub toggl_id: i64,
    pub attempt: u32,
}

/// Cloneable handle used to enqueue sync jobs from handlers and tasks.
#[derive(Clone)]
pub struct JobQueue {
    tx: mpsc::UnboundedSender<SyncJob>,
}

impl JobQueue {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SyncJob>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn enqueue(&self, user_id: Uuid, toggl_id: i64) {
        self.send(SyncJob {
            user_id,
            toggl_id,
            attempt: 0,
        });
    }

    fn send(&self, job: SyncJob) {
        if self.tx.send(job).is_err() {
            tracing::error!("Sync worker is gone, dropping job");
        }
    }

    /// Re-enqueue a job after a delay (used for debounce deferral and retry).
    pub fn enqueue_after(&self, job: SyncJob, delay: Duration) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if tx.send(job).is_err() {
                tracing::error!("Sync worker is gone, dropping deferred job");
            }
        });
    }
}

/// How long to keep waiting before an entry may be processed, if at all.
///
/// Returns the remaining quiet period when the entry was updated more
/// recently than the debounce window allows.
pub fn debounce_remaining(
    updated_at: DateTime<Utc>,
    now: DateTime<Utc>,
    debounce: Duration,
) -> Option<Duration> {
    let elapsed = (now - updated_at).to_std().unwrap_or(Duration::ZERO);
    if elapsed < debounce {
        Some(debounce - elapsed + Duration::from_secs(1))
    } else {
        None
    }
}

/// Consume sync jobs until the queue closes.
pub async fn run_sync_worker(
    pool: DbPool,
    config: Arc<AppConfig>,
    queue: JobQueue,
    mut rx: mpsc::UnboundedReceiver<SyncJob>,
) {
    tracing::info!(
        "Sync worker started (debounce: {:?}, retry: {:?}, max attempts: {})",
        config.sync_debounce,
        config.sync_retry,
        config.sync_max_attempts
    );

    while let Some(job) = rx.recv().await {
        if let Err(e) = process_job(&pool, &config, &queue, &job).await {
            let next_attempt = job.attempt + 1;
            if next_attempt < config.sync_max_attempts {
                let delay = config.sync_retry * next_attempt;
                tracing::error!(
                    "Sync of entry {} failed (attempt {}), retrying in {:?}: {:#}",
                    job.toggl_id,
                    next_attempt,
                    delay,
                    e
                );
                queue.enqueue_after(
                    SyncJob {
                        attempt: next_attempt,
                        ..job
                    },
                    delay,
                );
            } else {
                tracing::error!(
                    "Sync of entry {} failed permanently after {} attempts: {:#}",
                    job.toggl_id,
                    next_attempt,
                    e
                );
            }
        }
    }

    tracing::info!("Sync worker stopped");
}

async fn process_job(
    pool: &DbPool,
    config: &AppConfig,
    queue: &JobQueue,
    job: &SyncJob,
) -> Result<()> {
    let mut conn = pool.get().await.context("Failed to get DB connection")?;

    let Some(credentials) = db::credentials::find_for_user(&mut conn, job.user_id).await? else {
        tracing::warn!("No credentials for user {}, dropping job", job.user_id);
        return Ok(());
    };

    let Some(entry) = db::time_entries::get_by_toggl_id(&mut conn, job.user_id, job.toggl_id).await?
    else {
        tracing::warn!("Entry {} not found in database", job.toggl_id);
        return Ok(());
    };

    if !credentials.google_connected() {
        tracing::info!(
            "Google Calendar not connected for user {}, entry {} stays unsynced",
            job.user_id,
            job.toggl_id
        );
        return Ok(());
    }

    // Rapid edits arrive as webhook bursts; wait for the entry to settle
    if let Some(remaining) = debounce_remaining(entry.updated_at, Utc::now(), config.sync_debounce)
    {
        tracing::info!(
            "Entry {} updated too recently, deferring for {:?}",
            job.toggl_id,
            remaining
        );
        queue.enqueue_after(job.clone(), remaining);
        return Ok(());
    }

    let entry = refetch_entry(&mut conn, config, &credentials, entry).await?;

    refresh_unknown_metadata(&mut conn, config, &credentials, &entry).await;

    let gcal = GoogleCalendarClient::from_refresh_token(
        &config.google_client_id,
        &config.google_client_secret,
        credentials.google_refresh_token.as_deref().unwrap_or(""),
        &credentials.calendar_timezone,
    )
    .await?;

    let synced = if entry.pending_deletion {
        handle_deleted(&mut conn, &gcal, &entry).await?;
        true
    } else {
        sync_to_calendar(&mut conn, &gcal, &entry).await?
    };

    if !synced {
        return Ok(());
    }

    // A concurrent webhook write means the entry is dirty again; the job it
    // enqueued will pick up the newer state.
    let marked = db::time_entries::mark_synced_if_unchanged(&mut conn, entry.id, entry.updated_at)
        .await?;
    if !marked {
        tracing::debug!(
            "Entry {} changed while syncing, leaving it dirty",
            job.toggl_id
        );
    }

    Ok(())
}

/// Pull the authoritative entry state from Toggl before syncing. The webhook
/// copy may be stale after a debounce window full of edits; a 404 means the
/// entry was deleted without us seeing the event. Falls back to the stored
/// row when Toggl is unreachable or no API token is configured.
async fn refetch_entry(
    conn: &mut AsyncPgConnection,
    config: &AppConfig,
    credentials: &Credentials,
    entry: TimeEntry,
) -> Result<TimeEntry> {
    if !credentials.has_toggl_token() || entry.pending_deletion {
        return Ok(entry);
    }

    let toggl = TogglClient::new(
        &credentials.toggl_api_token,
        &config.toggl_api_url,
        &config.toggl_webhook_api_url,
    );

    match toggl.get_time_entry(entry.toggl_id).await {
        Ok(fresh) => {
            let updated = db::time_entries::upsert_from_payload(
                conn,
                entry.user_id,
                entry.toggl_id,
                db::time_entries::EntryUpsert {
                    description: fresh.description.unwrap_or_default(),
                    start_time: fresh.start,
                    end_time: fresh.stop,
                    project_id: fresh.project_id,
                    workspace_id: fresh.workspace_id.or(entry.workspace_id),
                    tag_ids: fresh.tag_ids,
                    created_at: None,
                },
            )
            .await?;
            Ok(updated)
        }
        Err(TogglApiError::Status { status, .. }) if status == reqwest::StatusCode::NOT_FOUND => {
            tracing::info!(
                "Entry {} gone from Toggl, marking for deletion",
                entry.toggl_id
            );
            db::time_entries::mark_pending_deletion(conn, entry.user_id, entry.toggl_id).await?;
            let refreshed = db::time_entries::get_by_toggl_id(conn, entry.user_id, entry.toggl_id)
                .await?
                .unwrap_or(entry);
            Ok(refreshed)
        }
        Err(e) => {
            tracing::warn!(
                "Could not refetch entry {} from Toggl, using stored state: {}",
                entry.toggl_id,
                e
            );
            Ok(entry)
        }
    }
}

/// When an entry references a project or tags we have never seen, pull the
/// workspace metadata from Toggl before resolving mappings against it.
async fn refresh_unknown_metadata(
    conn: &mut AsyncPgConnection,
    config: &AppConfig,
    credentials: &Credentials,
    entry: &TimeEntry,
) {
    if !credentials.has_toggl_token() {
        return;
    }

    let Some(workspace_toggl_id) = entry.workspace_id else {
        return;
    };

    let mut unknown = false;
    if let Some(project_id) = entry.project_id {
        match db::projects::find_by_toggl_id(conn, entry.user_id, project_id).await {
            Ok(None) => unknown = true,
            Ok(Some(_)) => {}
            Err(e) => {
                tracing::warn!("Project lookup failed: {:#}", e);
                return;
            }
        }
    }
    if !unknown && !entry.tag_ids.is_empty() {
        match db::tags::list_by_toggl_ids(conn, entry.user_id, &entry.tag_ids).await {
            Ok(known) => unknown = known.len() < entry.tag_ids.len(),
            Err(e) => {
                tracing::warn!("Tag lookup failed: {:#}", e);
                return;
            }
        }
    }

    if !unknown {
        return;
    }

    tracing::info!(
        "Entry {} references unknown metadata, refreshing workspace {}",
        entry.toggl_id,
        workspace_toggl_id
    );
    if let Err(e) = metadata::refresh_workspace_metadata(
        conn,
        config,
        entry.user_id,
        &credentials.toggl_api_token,
        workspace_toggl_id,
    )
    .await
    {
        tracing::warn!(
            "Failed to refresh metadata for workspace {}: {:#}",
            workspace_toggl_id,
            e
        );
    }
}

async fn handle_deleted(
    conn: &mut AsyncPgConnection,
    gcal: &GoogleCalendarClient,
    entry: &TimeEntry,
) -> Result<()> {
    let Some(calendar_id) = entry.calendar_id else {
        tracing::debug!("Entry {} never had a calendar event", entry.toggl_id);
        return Ok(());
    };

    let Some(calendar) = db::calendars::find_by_id(conn, calendar_id).await? else {
        tracing::debug!("Calendar for entry {} no longer exists", entry.toggl_id);
        return Ok(());
    };

    match gcal
        .find_event_by_ical_uid(&calendar.google_calendar_id, &entry.ical_uid())
        .await?
    {
        Some(event) => {
            if let Some(event_id) = event.id {
                gcal.delete_event(&calendar.google_calendar_id, &event_id)
                    .await?;
                tracing::info!("Deleted calendar event for entry {}", entry.toggl_id);
            }
        }
        None => {
            tracing::debug!(
                "Event for entry {} not found in calendar, already deleted",
                entry.toggl_id
            );
        }
    }

    // The row stays around, flagged; the user can prune it from the admin API
    Ok(())
}

/// Mirror the entry to its resolved calendar. Returns false when there is
/// no destination to sync to, leaving the entry dirty.
async fn sync_to_calendar(
    conn: &mut AsyncPgConnection,
    gcal: &GoogleCalendarClient,
    entry: &TimeEntry,
) -> Result<bool> {
    let Some(destination) = resolver::resolve_destination(conn, entry).await? else {
        tracing::warn!(
            "No calendar found for entry {} (no mapping, no default), skipping",
            entry.toggl_id
        );
        return Ok(false);
    };

    let project_name = match entry.project_id {
        Some(project_id) => db::projects::find_by_toggl_id(conn, entry.user_id, project_id)
            .await?
            .map(|p| p.name),
        None => None,
    };
    let tag_names: Vec<String> = db::tags::list_by_toggl_ids(conn, entry.user_id, &entry.tag_ids)
        .await?
        .into_iter()
        .map(|t| t.name)
        .collect();

    let payload = build_event_payload(
        entry,
        project_name.as_deref(),
        &tag_names,
        destination.color_id.clone(),
    );

    let current_calendar = match entry.calendar_id {
        Some(id) => db::calendars::find_by_id(conn, id).await?,
        None => None,
    };

    match current_calendar {
        None => {
            // First sync of this entry
            let event = gcal
                .insert_event(&destination.calendar.google_calendar_id, &payload)
                .await?;
            db::time_entries::assign_event(
                conn,
                entry.id,
                Some(destination.calendar.id),
                event.id.as_deref(),
            )
            .await?;
            tracing::info!(
                "Created calendar event for entry {} (running: {})",
                entry.toggl_id,
                entry.is_running()
            );
        }
        Some(current) if current.id != destination.calendar.id => {
            tracing::info!(
                "Entry {} calendar changed from \"{}\" to \"{}\"",
                entry.toggl_id,
                current.name,
                destination.calendar.name
            );
            match gcal
                .find_event_by_ical_uid(&current.google_calendar_id, &payload.ical_uid)
                .await?
            {
                Some(event) => {
                    if let Some(event_id) = event.id {
                        if let Err(e) = gcal
                            .delete_event(&current.google_calendar_id, &event_id)
                            .await
                        {
                            tracing::warn!("Failed to delete old event: {:#}", e);
                        }
                    }
                }
                None => {
                    tracing::debug!(
                        "Event for entry {} not found in old calendar, skipping delete",
                        entry.toggl_id
                    );
                }
            }

            let event = gcal
                .insert_event(&destination.calendar.google_calendar_id, &payload)
                .await?;
            db::time_entries::assign_event(
                conn,
                entry.id,
                Some(destination.calendar.id),
                event.id.as_deref(),
            )
            .await?;
        }
        Some(current) => {
            match gcal
                .find_event_by_ical_uid(&current.google_calendar_id, &payload.ical_uid)
                .await?
            {
                Some(event) => {
                    let event_id = event.id.unwrap_or_default();
                    gcal.patch_event(&current.google_calendar_id, &event_id, &payload)
                        .await?;
                    db::time_entries::assign_event(
                        conn,
                        entry.id,
                        Some(current.id),
                        Some(&event_id),
                    )
                    .await?;
                    tracing::info!("Updated calendar event for entry {}", entry.toggl_id);
                }
                None => {
                    // Vanished remotely (user deleted it); recreate
                    tracing::info!(
                        "Event for entry {} not found in calendar, creating",
                        entry.toggl_id
                    );
                    let event = gcal
                        .insert_event(&current.google_calendar_id, &payload)
                        .await?;
                    db::time_entries::assign_event(
                        conn,
                        entry.id,
                        Some(current.id),
                        event.id.as_deref(),
                    )
                    .await?;
                }
            }
        }
    }

    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    #[test]
    fn fresh_update_is_deferred() {
        let now = Utc::now();
        let updated_at = now - ChronoDuration::seconds(10);
        let remaining = debounce_remaining(updated_at, now, Duration::from_secs(60));
        let remaining = remaining.expect("should defer");
        assert!(remaining >= Duration::from_secs(50));
        assert!(remaining <= Duration::from_secs(52));
    }

    #[test]
    fn settled_update_is_processed() {
        let now = Utc::now();
        let updated_at = now - ChronoDuration::seconds(120);
        assert_eq!(
            debounce_remaining(updated_at, now, Duration::from_secs(60)),
            None
        );
    }

    #[test]
    fn future_timestamp_is_deferred_for_full_window() {
        // Clock skew: updated_at slightly ahead of now
        let now = Utc::now();
        let updated_at = now + ChronoDuration::seconds(5);
        let remaining =
            debounce_remaining(updated_at, now, Duration::from_secs(60)).expect("should defer");
        assert!(remaining >= Duration::from_secs(60));
    }
}

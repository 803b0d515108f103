//! Periodic reconciliation between the database and Google Calendar.
//!
//! Webhooks can be missed and users can edit or delete mirrored events by
//! hand. This task periodically samples synced entries, verifies the event
//! still exists and still carries the expected summary, and re-enqueues a
//! corrective sync job when it does not. It also re-enqueues entries that
//! are already marked dirty, which recovers queued work lost to a restart.

use std::sync::Arc;

use anyhow::{Context, Result};
use diesel_async::AsyncPgConnection;
use togglsync_shared::TimeEntry;

use crate::config::AppConfig;
use crate::db::{self, DbPool};
use crate::services::gcal::GoogleCalendarClient;
use crate::sync::worker::JobQueue;

pub async fn run_reconciler(pool: DbPool, config: Arc<AppConfig>, queue: JobQueue) {
    let mut ticker = tokio::time::interval(config.validate_interval);

    tracing::info!(
        "Reconciler started (interval: {:?}, batch limit: {})",
        config.validate_interval,
        config.validate_batch_limit
    );

    loop {
        ticker.tick().await;
        tracing::debug!("Running reconciliation pass");

        if let Err(e) = run_validation_pass(&pool, &config, &queue).await {
            tracing::error!("Reconciliation pass failed: {:#}", e);
            // Keep ticking even on error
        }
    }
}

async fn run_validation_pass(
    pool: &DbPool,
    config: &AppConfig,
    queue: &JobQueue,
) -> Result<()> {
    let mut conn = pool.get().await.context("Failed to get DB connection")?;

    let users = db::users::list_all(&mut conn).await?;

    for user in users {
        let credentials = match db::credentials::get_for_user(&mut conn, user.id).await {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!("No credentials for user {}: {:#}", user.email, e);
                continue;
            }
        };

        if !credentials.google_connected() {
            tracing::debug!("Skipping {} (Google Calendar not connected)", user.email);
            continue;
        }

        let gcal = match GoogleCalendarClient::from_refresh_token(
            &config.google_client_id,
            &config.google_client_secret,
            credentials.google_refresh_token.as_deref().unwrap_or(""),
            &credentials.calendar_timezone,
        )
        .await
        {
            Ok(client) => client,
            Err(e) => {
                tracing::error!("Failed to build calendar client for {}: {}", user.email, e);
                continue;
            }
        };

        let entries =
            db::time_entries::list_synced_for_validation(&mut conn, user.id, config.validate_batch_limit)
                .await?;

        let mut drifted = 0usize;
        for entry in &entries {
            match validate_entry(&mut conn, &gcal, entry).await {
                Ok(true) => {}
                Ok(false) => {
                    drifted += 1;
                    queue.enqueue(entry.user_id, entry.toggl_id);
                }
                Err(e) => {
                    // Transient lookup failures don't count as drift
                    tracing::warn!("Could not validate entry {}: {:#}", entry.toggl_id, e);
                }
            }
        }

        if drifted > 0 {
            tracing::info!(
                "Reconciliation for {}: {} of {} entries drifted, corrective syncs enqueued",
                user.email,
                drifted,
                entries.len()
            );
        }

        // Recover dirty entries whose jobs were lost (e.g. process restart)
        let unsynced =
            db::time_entries::list_unsynced(&mut conn, user.id, config.validate_batch_limit).await?;
        for entry in &unsynced {
            queue.enqueue(entry.user_id, entry.toggl_id);
        }
        if !unsynced.is_empty() {
            tracing::debug!(
                "Re-enqueued {} dirty entries for {}",
                unsynced.len(),
                user.email
            );
        }
    }

    Ok(())
}

/// Check one entry against its calendar event. Returns false when the entry
/// drifted (event missing or summary mismatch) and was marked dirty.
async fn validate_entry(
    conn: &mut AsyncPgConnection,
    gcal: &GoogleCalendarClient,
    entry: &TimeEntry,
) -> Result<bool> {
    let Some(calendar_id) = entry.calendar_id else {
        return Ok(true);
    };

    let Some(calendar) = db::calendars::find_by_id(conn, calendar_id).await? else {
        tracing::warn!(
            "Calendar for entry {} disappeared, marking unsynced",
            entry.toggl_id
        );
        db::time_entries::mark_unsynced(conn, entry.id).await?;
        return Ok(false);
    };

    let event = gcal
        .find_event_by_ical_uid(&calendar.google_calendar_id, &entry.ical_uid())
        .await?;

    let expected_summary = if entry.description.is_empty() {
        "(No description)".to_string()
    } else {
        entry.description.clone()
    };

    match event {
        Some(event) => {
            let summary = event.summary.unwrap_or_default();
            if summary != expected_summary {
                tracing::info!(
                    "Entry {} summary drifted (\"{}\" != \"{}\"), marking unsynced",
                    entry.toggl_id,
                    summary,
                    expected_summary
                );
                db::time_entries::mark_unsynced(conn, entry.id).await?;
                return Ok(false);
            }
            Ok(true)
        }
        None => {
            tracing::info!(
                "Event for entry {} missing from calendar, marking unsynced",
                entry.toggl_id
            );
            db::time_entries::mark_unsynced(conn, entry.id).await?;
            Ok(false)
        }
    }
}

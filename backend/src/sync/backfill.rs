//! Historical import of existing Toggl time entries.

use anyhow::{bail, Result};
use chrono::{Duration, NaiveDate};
use diesel_async::AsyncPgConnection;
use togglsync_shared::api::{BackfillRequest, BackfillResponse};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::db;
use crate::services::toggl::TogglClient;

const DEFAULT_BACKFILL_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy)]
pub struct BackfillOptions {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub dry_run: bool,
}

impl BackfillOptions {
    pub fn from_request(request: &BackfillRequest, today: NaiveDate) -> Self {
        let end_date = request.end_date.unwrap_or(today);
        let start_date = request
            .start_date
            .unwrap_or(end_date - Duration::days(request.days.unwrap_or(DEFAULT_BACKFILL_DAYS)));
        Self {
            start_date,
            end_date,
            dry_run: request.dry_run,
        }
    }
}

/// Fetch a date range of entries from Toggl and store the ones we have not
/// seen. Running entries are skipped (the webhook will deliver them when
/// they stop). Returns the response plus the Toggl ids of stored entries so
/// the caller can enqueue sync jobs for them.
pub async fn backfill_entries(
    conn: &mut AsyncPgConnection,
    config: &AppConfig,
    user_id: Uuid,
    options: BackfillOptions,
) -> Result<(BackfillResponse, Vec<i64>)> {
    let credentials = db::credentials::get_for_user(conn, user_id).await?;
    if !credentials.has_toggl_token() {
        bail!("Toggl API token not configured");
    }

    let toggl = TogglClient::new(
        &credentials.toggl_api_token,
        &config.toggl_api_url,
        &config.toggl_webhook_api_url,
    );

    let entries = toggl
        .get_time_entries(options.start_date, options.end_date)
        .await?;

    let mut response = BackfillResponse {
        fetched: entries.len(),
        dry_run: options.dry_run,
        ..Default::default()
    };
    let mut imported_ids = Vec::new();

    for entry in entries {
        if entry.stop.is_none() {
            response.skipped_running += 1;
            continue;
        }

        if db::time_entries::exists(conn, user_id, entry.id).await? {
            response.skipped_existing += 1;
            continue;
        }

        if options.dry_run {
            response.imported += 1;
            continue;
        }

        let stored = db::time_entries::insert_if_missing(
            conn,
            user_id,
            entry.id,
            db::time_entries::EntryUpsert {
                description: entry.description.unwrap_or_default(),
                start_time: entry.start,
                end_time: entry.stop,
                project_id: entry.project_id,
                workspace_id: entry.workspace_id,
                tag_ids: entry.tag_ids,
                created_at: None,
            },
        )
        .await?;

        if let Some(stored) = stored {
            response.imported += 1;
            imported_ids.push(stored.toggl_id);
        } else {
            response.skipped_existing += 1;
        }
    }

    tracing::info!(
        "Backfill for user {}: fetched {}, imported {}, skipped {} running / {} existing{}",
        user_id,
        response.fetched,
        response.imported,
        response.skipped_running,
        response.skipped_existing,
        if options.dry_run { " (dry run)" } else { "" }
    );

    Ok((response, imported_ids))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn defaults_to_thirty_days_back() {
        let options =
            BackfillOptions::from_request(&BackfillRequest::default(), date(2026, 3, 31));
        assert_eq!(options.end_date, date(2026, 3, 31));
        assert_eq!(options.start_date, date(2026, 3, 1));
        assert!(!options.dry_run);
    }

    #[test]
    fn explicit_range_wins() {
        let request = BackfillRequest {
            days: Some(7),
            start_date: Some(date(2026, 1, 1)),
            end_date: Some(date(2026, 2, 1)),
            dry_run: true,
        };
        let options = BackfillOptions::from_request(&request, date(2026, 3, 31));
        assert_eq!(options.start_date, date(2026, 1, 1));
        assert_eq!(options.end_date, date(2026, 2, 1));
        assert!(options.dry_run);
    }

    #[test]
    fn days_counts_back_from_end_date() {
        let request = BackfillRequest {
            days: Some(7),
            ..Default::default()
        };
        let options = BackfillOptions::from_request(&request, date(2026, 3, 31));
        assert_eq!(options.start_date, date(2026, 3, 24));
    }
}

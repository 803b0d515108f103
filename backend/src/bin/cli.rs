use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};

use togglsync_backend::auth::jwt;
use togglsync_backend::config::AppConfig;
use togglsync_backend::db;
use togglsync_backend::sync::backfill::{backfill_entries, BackfillOptions};
use togglsync_backend::sync::metadata;
use togglsync_shared::api::BackfillRequest;
use togglsync_shared::User;

#[derive(Parser)]
#[command(name = "togglsync")]
#[command(about = "Management commands for the TogglSync server")]
#[command(
    long_about = "Management commands for the TogglSync server.\n\n\
    Creates users, issues API tokens, and runs Toggl metadata syncs,\n\
    Google calendar imports, and historical backfills directly against\n\
    the database. Reads the same environment (or .env) as the server."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a user and print an API token for the admin endpoints
    CreateUser {
        /// Email address identifying the user.
        email: String,

        /// Optional display name.
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Issue a fresh API token for an existing user
    IssueToken {
        email: String,
    },

    /// Sync organizations, workspaces, projects and tags from Toggl
    SyncMetadata {
        email: String,
    },

    /// Import writable calendars from the user's Google account
    ImportCalendars {
        email: String,
    },

    /// List imported calendars
    ListCalendars {
        email: String,
    },

    /// Set the default calendar by Google calendar id or name
    SetDefaultCalendar {
        email: String,

        /// Google calendar id, or the calendar's name.
        calendar: String,
    },

    /// Import historical Toggl time entries
    ///
    /// Imported entries are stored unsynced; the running server's sync
    /// worker picks them up on its next reconciliation pass.
    Backfill {
        email: String,

        /// Number of days to import, counted back from the end date.
        #[arg(long, default_value_t = 30)]
        days: i64,

        /// Start date (YYYY-MM-DD), overrides --days.
        #[arg(long)]
        start_date: Option<NaiveDate>,

        /// End date (YYYY-MM-DD), defaults to today.
        #[arg(long)]
        end_date: Option<NaiveDate>,

        /// Show what would be imported without writing anything.
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .init();

    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;
    let cli = Cli::parse();

    let pool = db::establish_connection_pool(&config.database_url)?;
    let mut conn = pool.get().await.context("Failed to get DB connection")?;

    match cli.command {
        Commands::CreateUser { email, name } => {
            if db::users::find_by_email(&mut conn, &email).await?.is_some() {
                bail!("User already exists: {email}");
            }
            let user = db::users::create(&mut conn, &email, name.as_deref()).await?;
            let token = jwt::issue_token(&config.auth_config(), &user.email, user.name.clone())?;
            println!("Created user {} ({})", user.email, user.id);
            println!("API token (valid {} days):", config.token_duration_days);
            println!("{token}");
        }

        Commands::IssueToken { email } => {
            let user = require_user(&mut conn, &email).await?;
            let token = jwt::issue_token(&config.auth_config(), &user.email, user.name.clone())?;
            println!("API token for {} (valid {} days):", user.email, config.token_duration_days);
            println!("{token}");
        }

        Commands::SyncMetadata { email } => {
            let user = require_user(&mut conn, &email).await?;
            let summary = metadata::sync_metadata_for_user(&mut conn, &config, user.id).await?;
            println!(
                "Synced {} organizations, {} workspaces, {} projects, {} tags for {}",
                summary.organizations, summary.workspaces, summary.projects, summary.tags, email
            );
            if summary.adopted_webhooks > 0 {
                println!("Adopted {} existing webhooks", summary.adopted_webhooks);
            }
        }

        Commands::ImportCalendars { email } => {
            let user = require_user(&mut conn, &email).await?;
            let result = metadata::import_calendars_for_user(&mut conn, &config, user.id).await?;
            println!(
                "Imported {} new, updated {} existing, removed {} deleted, skipped {} read-only",
                result.imported, result.updated, result.removed, result.skipped_readonly
            );
        }

        Commands::ListCalendars { email } => {
            let user = require_user(&mut conn, &email).await?;
            let calendars = db::calendars::list_for_user(&mut conn, user.id).await?;
            if calendars.is_empty() {
                println!("No calendars imported. Run import-calendars first.");
            }
            for calendar in calendars {
                let default_marker = if calendar.is_default { " (DEFAULT)" } else { "" };
                println!("{}{}", calendar.name, default_marker);
                println!("    ID: {}", calendar.google_calendar_id);
            }
        }

        Commands::SetDefaultCalendar { email, calendar } => {
            let user = require_user(&mut conn, &email).await?;
            let found = match db::calendars::find_by_google_id(&mut conn, user.id, &calendar).await?
            {
                Some(c) => Some(c),
                None => db::calendars::list_for_user(&mut conn, user.id)
                    .await?
                    .into_iter()
                    .find(|c| c.name.eq_ignore_ascii_case(&calendar)),
            };

            let Some(found) = found else {
                bail!(
                    "Calendar not found: {calendar}\n\
                     Use list-calendars to see available calendars, or import-calendars first."
                );
            };

            let updated = db::calendars::set_default(&mut conn, user.id, found.id).await?;
            println!("Set \"{}\" as default calendar for {}", updated.name, email);
        }

        Commands::Backfill {
            email,
            days,
            start_date,
            end_date,
            dry_run,
        } => {
            let user = require_user(&mut conn, &email).await?;
            let request = BackfillRequest {
                days: Some(days),
                start_date,
                end_date,
                dry_run,
            };
            let options = BackfillOptions::from_request(&request, Utc::now().date_naive());

            println!(
                "Importing entries for {} from {} to {}{}",
                email,
                options.start_date,
                options.end_date,
                if dry_run { " (dry run)" } else { "" }
            );

            let (result, _) = backfill_entries(&mut conn, &config, user.id, options).await?;

            println!(
                "Fetched {}, imported {}, skipped {} running / {} already known",
                result.fetched, result.imported, result.skipped_running, result.skipped_existing
            );
            if !dry_run && result.imported > 0 {
                println!(
                    "Imported entries will sync on the server's next reconciliation pass."
                );
            }
        }
    }

    Ok(())
}

async fn require_user(
    conn: &mut diesel_async::AsyncPgConnection,
    email: &str,
) -> Result<User> {
    db::users::find_by_email(conn, email)
        .await?
        .with_context(|| format!("User not found: {email}"))
}

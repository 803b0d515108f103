use anyhow::Result;
use axum::{
    http::{header, HeaderValue, Method},
    middleware,
    routing::{get, post, put},
    Json, Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use togglsync_shared::api::StatusResponse;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use togglsync_backend::auth::middleware::require_auth;
use togglsync_backend::config::AppConfig;
use togglsync_backend::handlers::{
    actions, calendars, credentials, entries, mappings, oauth, webhook, workspaces,
};
use togglsync_backend::sync::{reconciler, run_sync_worker, JobQueue};
use togglsync_backend::{db, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "togglsync_backend=debug,tower_http=debug,axum=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();
    let config = Arc::new(AppConfig::from_env()?);

    tracing::info!("Starting TogglSync server");

    // Establish database connection pool
    let pool = db::establish_connection_pool(&config.database_url)?;
    tracing::info!("Database connection pool initialized");

    let (jobs, job_rx) = JobQueue::new();

    // Start the sync worker and the reconciler as background tasks
    let worker_pool = pool.clone();
    let worker_config = config.clone();
    let worker_queue = jobs.clone();
    tokio::spawn(async move {
        run_sync_worker(worker_pool, worker_config, worker_queue, job_rx).await;
    });

    let reconciler_pool = pool.clone();
    let reconciler_config = config.clone();
    let reconciler_queue = jobs.clone();
    tokio::spawn(async move {
        reconciler::run_reconciler(reconciler_pool, reconciler_config, reconciler_queue).await;
    });

    let port = config.port;
    let cors = build_cors_layer(&config);
    let state = AppState { pool, config, jobs };

    let admin_routes = Router::new()
        // OAuth (start/disconnect act on the authenticated user)
        .route("/oauth/google/start", get(oauth::google_oauth_start))
        .route(
            "/oauth/google/disconnect",
            post(oauth::google_oauth_disconnect),
        )
        // Credentials
        .route("/api/credentials", get(credentials::get_credentials))
        .route("/api/credentials", put(credentials::update_credentials))
        // Workspaces and their webhook subscriptions
        .route("/api/workspaces", get(workspaces::list_workspaces))
        .route(
            "/api/workspaces/:id/webhook",
            post(workspaces::create_webhook).delete(workspaces::delete_webhook),
        )
        // Calendars
        .route("/api/calendars", get(calendars::list_calendars))
        .route(
            "/api/calendars",
            post(calendars::create_dedicated_calendar),
        )
        .route("/api/calendars/import", post(calendars::import_calendars))
        .route(
            "/api/calendars/:id/default",
            put(calendars::set_default_calendar),
        )
        // Mappings
        .route("/api/mappings", get(mappings::list_mappings))
        .route("/api/mappings", post(mappings::create_mapping))
        .route(
            "/api/mappings/:id",
            put(mappings::update_mapping).delete(mappings::delete_mapping),
        )
        .route("/api/mappings/:id/apply", post(mappings::apply_mapping))
        // Time entries
        .route("/api/entries", get(entries::list_entries))
        .route("/api/entries/:id/resync", post(entries::resync_entry))
        // Bulk actions
        .route("/api/actions/sync-metadata", post(actions::sync_metadata))
        .route("/api/actions/backfill", post(actions::backfill))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    let app = Router::new()
        .route("/health", get(health_check))
        // Vendor-facing endpoints stay unauthenticated
        .route("/webhook/toggl/:token", post(webhook::toggl_webhook))
        .route("/oauth/google/callback", get(oauth::google_oauth_callback))
        .merge(admin_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_check() -> Json<StatusResponse> {
    Json(StatusResponse::ok())
}

/// Restrict CORS to the configured origins. An empty list falls back to
/// permissive CORS so local development works without configuration.
fn build_cors_layer(config: &AppConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_allowed_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    if origins.is_empty() {
        tracing::warn!("No CORS origins configured, allowing any origin");
        return CorsLayer::permissive();
    }

    tracing::info!("CORS restricted to {:?}", config.cors_allowed_origins);
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}

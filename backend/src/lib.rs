//! TogglSync backend: webhook receiver, admin API, and background sync
//! between Toggl Track and Google Calendar.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod models;
pub mod schema;
pub mod services;
pub mod sync;

use std::sync::Arc;

use crate::config::AppConfig;
use crate::db::DbPool;
use crate::sync::JobQueue;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub config: Arc<AppConfig>,
    pub jobs: JobQueue,
}

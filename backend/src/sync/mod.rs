//! Background synchronization: the webhook-fed sync worker, the periodic
//! reconciler, Toggl metadata refresh, and historical backfill.

pub mod backfill;
pub mod event;
pub mod metadata;
pub mod reconciler;
pub mod worker;

pub use worker::{run_sync_worker, JobQueue, SyncJob};

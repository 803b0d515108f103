use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::{MappingEntityType, TimeEntry};

// ============================================================================
// Common
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error: &str, message: impl Into<String>) -> Self {
        Self {
            error: error.to_string(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
}

impl StatusResponse {
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
        }
    }
}

// ============================================================================
// Credentials API Types
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct CredentialsResponse {
    pub toggl_api_token_masked: Option<String>,
    pub google_connected: bool,
    pub calendar_timezone: String,
    pub last_metadata_sync: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct UpdateCredentialsRequest {
    #[validate(length(max = 255))]
    pub toggl_api_token: Option<String>,

    #[validate(length(min = 1, max = 50))]
    pub calendar_timezone: Option<String>,
}

/// Mask an API token for display, keeping only the first and last 4 characters.
pub fn mask_token(token: &str) -> Option<String> {
    if token.is_empty() {
        return None;
    }
    if token.len() > 8 {
        // get() rather than slicing: a non-ASCII token must not panic here
        if let (Some(head), Some(tail)) = (token.get(..4), token.get(token.len() - 4..)) {
            return Some(format!("{head}***{tail}"));
        }
    }
    Some("***".to_string())
}

// ============================================================================
// OAuth API Types
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct OAuthStartResponse {
    pub auth_url: String,
}

// ============================================================================
// Workspace API Types
// ============================================================================

/// Workspace as exposed over the API (webhook secret withheld).
#[derive(Debug, Serialize, Deserialize)]
pub struct WorkspaceResponse {
    pub id: Uuid,
    pub toggl_id: i64,
    pub organization_id: Option<Uuid>,
    pub name: String,
    pub webhook_token: Option<String>,
    pub webhook_subscription_id: Option<i64>,
    pub webhook_enabled: bool,
    pub updated_at: DateTime<Utc>,
}

// ============================================================================
// Mapping API Types
// ============================================================================

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct CreateMappingRequest {
    pub entity_type: MappingEntityType,
    pub entity_id: i64,

    #[validate(length(min = 1, max = 255))]
    pub entity_name: String,

    pub calendar_id: Option<Uuid>,
    pub color_id: Option<String>,
    pub priority: i32,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct UpdateMappingRequest {
    #[validate(length(min = 1, max = 255))]
    pub entity_name: Option<String>,

    pub calendar_id: Option<Uuid>,
    pub color_id: Option<String>,
    pub priority: Option<i32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApplyMappingResponse {
    pub enqueued: usize,
}

// ============================================================================
// Sync action API Types
// ============================================================================

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct MetadataSyncSummary {
    pub organizations: usize,
    pub workspaces: usize,
    pub projects: usize,
    pub tags: usize,
    pub adopted_webhooks: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ImportCalendarsResponse {
    pub imported: usize,
    pub updated: usize,
    pub removed: usize,
    pub skipped_readonly: usize,
}

#[derive(Debug, Default, Serialize, Deserialize, Validate)]
pub struct BackfillRequest {
    /// How many days back to import when no explicit start date is given.
    #[validate(range(min = 1, max = 365))]
    pub days: Option<i64>,

    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,

    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct BackfillResponse {
    pub fetched: usize,
    pub imported: usize,
    pub skipped_running: usize,
    pub skipped_existing: usize,
    pub dry_run: bool,
}

// ============================================================================
// Time entry API Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ListEntriesQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListEntriesResponse {
    pub entries: Vec<TimeEntry>,
    pub total: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_long_tokens() {
        assert_eq!(
            mask_token("abcd1234efgh5678").as_deref(),
            Some("abcd***5678")
        );
    }

    #[test]
    fn masks_short_tokens_entirely() {
        assert_eq!(mask_token("abcd").as_deref(), Some("***"));
    }

    #[test]
    fn masks_non_ascii_tokens_without_panicking() {
        // 3-byte chars put byte offset 4 inside a character
        assert_eq!(mask_token("€€€€").as_deref(), Some("***"));
    }

    #[test]
    fn empty_token_is_not_set() {
        assert_eq!(mask_token(""), None);
    }
}

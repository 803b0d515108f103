use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of Toggl entity a mapping rule matches against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MappingEntityType {
    Tag,
    Project,
    Workspace,
    Organization,
}

impl MappingEntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tag => "tag",
            Self::Project => "project",
            Self::Workspace => "workspace",
            Self::Organization => "organization",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "tag" => Some(Self::Tag),
            "project" => Some(Self::Project),
            "workspace" => Some(Self::Workspace),
            "organization" => Some(Self::Organization),
            _ => None,
        }
    }
}

/// User model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Per-user API credentials (Toggl token + Google OAuth tokens)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub id: Uuid,
    pub user_id: Uuid,
    pub toggl_api_token: String,
    pub google_refresh_token: Option<String>,
    pub google_access_token: Option<String>,
    pub google_token_expires_at: Option<DateTime<Utc>>,
    pub calendar_timezone: String,
    pub last_metadata_sync: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Credentials {
    /// Google Calendar is usable once a refresh token has been stored.
    pub fn google_connected(&self) -> bool {
        self.google_refresh_token.is_some()
    }

    pub fn has_toggl_token(&self) -> bool {
        !self.toggl_api_token.is_empty()
    }
}

/// Toggl organization
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Organization {
    pub id: Uuid,
    pub user_id: Uuid,
    pub toggl_id: i64,
    pub name: String,
    pub updated_at: DateTime<Utc>,
}

/// Toggl workspace, including its webhook subscription state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workspace {
    pub id: Uuid,
    pub user_id: Uuid,
    pub toggl_id: i64,
    pub organization_id: Option<Uuid>,
    pub name: String,
    pub webhook_token: Option<String>,
    pub webhook_subscription_id: Option<i64>,
    pub webhook_secret: Option<String>,
    pub webhook_enabled: bool,
    pub updated_at: DateTime<Utc>,
}

/// Toggl project
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: Uuid,
    pub user_id: Uuid,
    pub toggl_id: i64,
    pub workspace_id: Uuid,
    pub name: String,
    pub color: Option<String>,
    pub active: bool,
    pub updated_at: DateTime<Utc>,
}

/// Toggl tag
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tag {
    pub id: Uuid,
    pub user_id: Uuid,
    pub toggl_id: i64,
    pub workspace_id: Uuid,
    pub name: String,
    pub updated_at: DateTime<Utc>,
}

/// Imported Google calendar
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Calendar {
    pub id: Uuid,
    pub user_id: Uuid,
    pub google_calendar_id: String,
    pub name: String,
    pub is_default: bool,
    pub updated_at: DateTime<Utc>,
}

/// Priority-ordered rule assigning a calendar and/or color to time entries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mapping {
    pub id: Uuid,
    pub user_id: Uuid,
    pub entity_type: MappingEntityType,
    pub entity_id: i64,
    pub entity_name: String,
    pub calendar_id: Option<Uuid>,
    pub color_id: Option<String>,
    pub priority: i32,
    pub updated_at: DateTime<Utc>,
}

/// Mirrored Toggl time entry and its link to the Google Calendar event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub toggl_id: i64,
    pub description: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub project_id: Option<i64>,
    pub workspace_id: Option<i64>,
    pub tag_ids: Vec<i64>,
    pub calendar_id: Option<Uuid>,
    pub google_event_id: Option<String>,
    pub synced: bool,
    pub pending_deletion: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TimeEntry {
    /// Stable Google-side identity for this entry, used as the event iCalUID.
    pub fn ical_uid(&self) -> String {
        format!("toggl{}", self.toggl_id)
    }

    pub fn is_running(&self) -> bool {
        self.end_time.is_none()
    }
}

/// Google Calendar event color palette (name, colorId)
pub const EVENT_COLORS: [(&str, &str); 11] = [
    ("Lavender", "1"),
    ("Sage", "2"),
    ("Grape", "3"),
    ("Flamingo", "4"),
    ("Banana", "5"),
    ("Tangerine", "6"),
    ("Peacock", "7"),
    ("Graphite", "8"),
    ("Blueberry", "9"),
    ("Basil", "10"),
    ("Tomato", "11"),
];

/// colorId used for still-running entries
pub const RUNNING_COLOR_ID: &str = "8";

pub fn color_id_for_name(name: &str) -> Option<&'static str> {
    EVENT_COLORS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, id)| *id)
}

pub fn is_valid_color_id(id: &str) -> bool {
    EVENT_COLORS.iter().any(|(_, i)| *i == id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_type_round_trips() {
        for ty in [
            MappingEntityType::Tag,
            MappingEntityType::Project,
            MappingEntityType::Workspace,
            MappingEntityType::Organization,
        ] {
            assert_eq!(MappingEntityType::parse(ty.as_str()), Some(ty));
        }
        assert_eq!(MappingEntityType::parse("bogus"), None);
    }

    #[test]
    fn color_lookup() {
        assert_eq!(color_id_for_name("Tomato"), Some("11"));
        assert_eq!(color_id_for_name("Graphite"), Some(RUNNING_COLOR_ID));
        assert_eq!(color_id_for_name("Chartreuse"), None);
        assert!(is_valid_color_id("1"));
        assert!(is_valid_color_id("11"));
        assert!(!is_valid_color_id("12"));
        assert!(!is_valid_color_id("0"));
    }
}

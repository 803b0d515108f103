// Database row types for Diesel, converted into the shared domain types at the edges.
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use togglsync_shared::MappingEntityType;

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = crate::schema::users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct UserRow {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<UserRow> for togglsync_shared::User {
    fn from(row: UserRow) -> Self {
        togglsync_shared::User {
            id: row.id,
            email: row.email,
            name: row.name,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = crate::schema::credentials)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct CredentialsRow {
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

impl From<CredentialsRow> for togglsync_shared::Credentials {
    fn from(row: CredentialsRow) -> Self {
        togglsync_shared::Credentials {
            id: row.id,
            user_id: row.user_id,
            toggl_api_token: row.toggl_api_token,
            google_refresh_token: row.google_refresh_token,
            google_access_token: row.google_access_token,
            google_token_expires_at: row.google_token_expires_at,
            calendar_timezone: row.calendar_timezone,
            last_metadata_sync: row.last_metadata_sync,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = crate::schema::organizations)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct OrganizationRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub toggl_id: i64,
    pub name: String,
    pub updated_at: DateTime<Utc>,
}

impl From<OrganizationRow> for togglsync_shared::Organization {
    fn from(row: OrganizationRow) -> Self {
        togglsync_shared::Organization {
            id: row.id,
            user_id: row.user_id,
            toggl_id: row.toggl_id,
            name: row.name,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = crate::schema::workspaces)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct WorkspaceRow {
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

impl From<WorkspaceRow> for togglsync_shared::Workspace {
    fn from(row: WorkspaceRow) -> Self {
        togglsync_shared::Workspace {
            id: row.id,
            user_id: row.user_id,
            toggl_id: row.toggl_id,
            organization_id: row.organization_id,
            name: row.name,
            webhook_token: row.webhook_token,
            webhook_subscription_id: row.webhook_subscription_id,
            webhook_secret: row.webhook_secret,
            webhook_enabled: row.webhook_enabled,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = crate::schema::projects)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ProjectRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub toggl_id: i64,
    pub workspace_id: Uuid,
    pub name: String,
    pub color: Option<String>,
    pub active: bool,
    pub updated_at: DateTime<Utc>,
}

impl From<ProjectRow> for togglsync_shared::Project {
    fn from(row: ProjectRow) -> Self {
        togglsync_shared::Project {
            id: row.id,
            user_id: row.user_id,
            toggl_id: row.toggl_id,
            workspace_id: row.workspace_id,
            name: row.name,
            color: row.color,
            active: row.active,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = crate::schema::tags)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct TagRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub toggl_id: i64,
    pub workspace_id: Uuid,
    pub name: String,
    pub updated_at: DateTime<Utc>,
}

impl From<TagRow> for togglsync_shared::Tag {
    fn from(row: TagRow) -> Self {
        togglsync_shared::Tag {
            id: row.id,
            user_id: row.user_id,
            toggl_id: row.toggl_id,
            workspace_id: row.workspace_id,
            name: row.name,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = crate::schema::calendars)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct CalendarRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub google_calendar_id: String,
    pub name: String,
    pub is_default: bool,
    pub updated_at: DateTime<Utc>,
}

impl From<CalendarRow> for togglsync_shared::Calendar {
    fn from(row: CalendarRow) -> Self {
        togglsync_shared::Calendar {
            id: row.id,
            user_id: row.user_id,
            google_calendar_id: row.google_calendar_id,
            name: row.name,
            is_default: row.is_default,
            updated_at: row.updated_at,
        }
    }
}

/// Mapping rows store the entity type as text; unknown values are rejected
/// at the API boundary so the conversion here treats them as a data bug.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = crate::schema::mappings)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct MappingRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub entity_type: String,
    pub entity_id: i64,
    pub entity_name: String,
    pub calendar_id: Option<Uuid>,
    pub color_id: Option<String>,
    pub priority: i32,
    pub updated_at: DateTime<Utc>,
}

impl MappingRow {
    pub fn entity_type(&self) -> MappingEntityType {
        MappingEntityType::parse(&self.entity_type).unwrap_or(MappingEntityType::Project)
    }
}

impl From<MappingRow> for togglsync_shared::Mapping {
    fn from(row: MappingRow) -> Self {
        let entity_type = row.entity_type();
        togglsync_shared::Mapping {
            id: row.id,
            user_id: row.user_id,
            entity_type,
            entity_id: row.entity_id,
            entity_name: row.entity_name,
            calendar_id: row.calendar_id,
            color_id: row.color_id,
            priority: row.priority,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = crate::schema::time_entries)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct TimeEntryRow {
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

impl From<TimeEntryRow> for togglsync_shared::TimeEntry {
    fn from(row: TimeEntryRow) -> Self {
        togglsync_shared::TimeEntry {
            id: row.id,
            user_id: row.user_id,
            toggl_id: row.toggl_id,
            description: row.description,
            start_time: row.start_time,
            end_time: row.end_time,
            project_id: row.project_id,
            workspace_id: row.workspace_id,
            tag_ids: row.tag_ids,
            calendar_id: row.calendar_id,
            google_event_id: row.google_event_id,
            synced: row.synced,
            pending_deletion: row.pending_deletion,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Insertable struct for new time entries
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::time_entries)]
pub struct NewTimeEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub toggl_id: i64,
    pub description: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub project_id: Option<i64>,
    pub workspace_id: Option<i64>,
    pub tag_ids: Vec<i64>,
    pub synced: bool,
    pub pending_deletion: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

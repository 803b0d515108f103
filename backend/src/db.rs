use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::{
    pooled_connection::{deadpool::Pool, AsyncDieselConnectionManager, ManagerConfig},
    AsyncPgConnection, RunQueryDsl,
};
use togglsync_shared::{
    Calendar, Credentials, Mapping, MappingEntityType, Organization, Project, Tag, TimeEntry, User,
    Workspace,
};
use uuid::Uuid;

use crate::models::{
    CalendarRow, CredentialsRow, MappingRow, NewTimeEntry, OrganizationRow, ProjectRow, TagRow,
    TimeEntryRow, UserRow, WorkspaceRow,
};

pub type DbPool = Pool<AsyncPgConnection>;

async fn establish_tls_connection(config: String) -> diesel::ConnectionResult<AsyncPgConnection> {
    // Set up rustls TLS configuration
    let root_store =
        rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let tls_config = rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();
    let tls = tokio_postgres_rustls::MakeRustlsConnect::new(tls_config);

    // Parse the connection string and connect with TLS
    let (client, connection) = tokio_postgres::connect(&config, tls)
        .await
        .map_err(|e| diesel::ConnectionError::BadConnection(e.to_string()))?;

    // Spawn the connection task
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::error!("Connection error: {}", e);
        }
    });

    // Build the async connection from the tokio-postgres client
    AsyncPgConnection::try_from(client).await
}

pub fn establish_connection_pool(database_url: &str) -> anyhow::Result<DbPool> {
    let mut manager_config = ManagerConfig::default();
    manager_config.custom_setup =
        Box::new(|url| Box::pin(establish_tls_connection(url.to_string())));

    let config = AsyncDieselConnectionManager::<AsyncPgConnection>::new_with_config(
        database_url,
        manager_config,
    );
    let pool = Pool::builder(config).build()?;

    Ok(pool)
}

// User database operations
pub mod users {
    use super::*;

    pub async fn list_all(conn: &mut AsyncPgConnection) -> anyhow::Result<Vec<User>> {
        use crate::schema::users::dsl::*;

        let rows = users
            .order_by(created_at.asc())
            .load::<UserRow>(conn)
            .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn get_by_id(conn: &mut AsyncPgConnection, user_id: Uuid) -> anyhow::Result<User> {
        use crate::schema::users::dsl::*;

        let row = users.filter(id.eq(user_id)).first::<UserRow>(conn).await?;

        Ok(row.into())
    }

    pub async fn find_by_email(
        conn: &mut AsyncPgConnection,
        email_val: &str,
    ) -> anyhow::Result<Option<User>> {
        use crate::schema::users::dsl::*;

        let row = users
            .filter(email.eq(email_val))
            .first::<UserRow>(conn)
            .await
            .optional()?;

        Ok(row.map(Into::into))
    }

    pub async fn create(
        conn: &mut AsyncPgConnection,
        email_val: &str,
        name_val: Option<&str>,
    ) -> anyhow::Result<User> {
        use crate::schema::users::dsl::*;

        let now = Utc::now();
        let row = diesel::insert_into(users)
            .values((
                id.eq(Uuid::new_v4()),
                email.eq(email_val),
                name.eq(name_val),
                created_at.eq(now),
                updated_at.eq(now),
            ))
            .get_result::<UserRow>(conn)
            .await?;

        // Every user gets an (empty) credentials row
        credentials::create_for_user(conn, row.id).await?;

        Ok(row.into())
    }
}

// Credentials database operations
pub mod credentials {
    use super::*;

    pub async fn create_for_user(
        conn: &mut AsyncPgConnection,
        user_id_val: Uuid,
    ) -> anyhow::Result<Credentials> {
        use crate::schema::credentials::dsl::*;

        let row = diesel::insert_into(credentials)
            .values((
                id.eq(Uuid::new_v4()),
                user_id.eq(user_id_val),
                toggl_api_token.eq(""),
                calendar_timezone.eq("UTC"),
                updated_at.eq(Utc::now()),
            ))
            .get_result::<CredentialsRow>(conn)
            .await?;

        Ok(row.into())
    }

    pub async fn get_for_user(
        conn: &mut AsyncPgConnection,
        user_id_val: Uuid,
    ) -> anyhow::Result<Credentials> {
        use crate::schema::credentials::dsl::*;

        let row = credentials
            .filter(user_id.eq(user_id_val))
            .first::<CredentialsRow>(conn)
            .await?;

        Ok(row.into())
    }

    pub async fn find_for_user(
        conn: &mut AsyncPgConnection,
        user_id_val: Uuid,
    ) -> anyhow::Result<Option<Credentials>> {
        use crate::schema::credentials::dsl::*;

        let row = credentials
            .filter(user_id.eq(user_id_val))
            .first::<CredentialsRow>(conn)
            .await
            .optional()?;

        Ok(row.map(Into::into))
    }

    pub async fn update_settings(
        conn: &mut AsyncPgConnection,
        user_id_val: Uuid,
        toggl_token_val: Option<&str>,
        timezone_val: Option<&str>,
    ) -> anyhow::Result<Credentials> {
        use crate::schema::credentials::dsl::*;

        if let Some(t) = toggl_token_val {
            diesel::update(credentials.filter(user_id.eq(user_id_val)))
                .set(toggl_api_token.eq(t))
                .execute(conn)
                .await?;
        }
        if let Some(tz) = timezone_val {
            diesel::update(credentials.filter(user_id.eq(user_id_val)))
                .set(calendar_timezone.eq(tz))
                .execute(conn)
                .await?;
        }

        let row = diesel::update(credentials.filter(user_id.eq(user_id_val)))
            .set(updated_at.eq(Utc::now()))
            .get_result::<CredentialsRow>(conn)
            .await?;

        Ok(row.into())
    }

    pub async fn set_google_tokens(
        conn: &mut AsyncPgConnection,
        user_id_val: Uuid,
        refresh_token_val: &str,
        access_token_val: &str,
        expires_at_val: DateTime<Utc>,
    ) -> anyhow::Result<Credentials> {
        use crate::schema::credentials::dsl::*;

        let row = diesel::update(credentials.filter(user_id.eq(user_id_val)))
            .set((
                google_refresh_token.eq(Some(refresh_token_val)),
                google_access_token.eq(Some(access_token_val)),
                google_token_expires_at.eq(Some(expires_at_val)),
                updated_at.eq(Utc::now()),
            ))
            .get_result::<CredentialsRow>(conn)
            .await?;

        Ok(row.into())
    }

    pub async fn clear_google_tokens(
        conn: &mut AsyncPgConnection,
        user_id_val: Uuid,
    ) -> anyhow::Result<Credentials> {
        use crate::schema::credentials::dsl::*;

        let row = diesel::update(credentials.filter(user_id.eq(user_id_val)))
            .set((
                google_refresh_token.eq(None::<String>),
                google_access_token.eq(None::<String>),
                google_token_expires_at.eq(None::<DateTime<Utc>>),
                updated_at.eq(Utc::now()),
            ))
            .get_result::<CredentialsRow>(conn)
            .await?;

        Ok(row.into())
    }

    pub async fn touch_metadata_sync(
        conn: &mut AsyncPgConnection,
        user_id_val: Uuid,
    ) -> anyhow::Result<()> {
        use crate::schema::credentials::dsl::*;

        diesel::update(credentials.filter(user_id.eq(user_id_val)))
            .set(last_metadata_sync.eq(Some(Utc::now())))
            .execute(conn)
            .await?;

        Ok(())
    }
}

// Organization database operations
pub mod organizations {
    use super::*;

    pub async fn upsert(
        conn: &mut AsyncPgConnection,
        user_id_val: Uuid,
        toggl_id_val: i64,
        name_val: &str,
    ) -> anyhow::Result<Organization> {
        use crate::schema::organizations::dsl::*;

        let row = diesel::insert_into(organizations)
            .values((
                id.eq(Uuid::new_v4()),
                user_id.eq(user_id_val),
                toggl_id.eq(toggl_id_val),
                name.eq(name_val),
                updated_at.eq(Utc::now()),
            ))
            .on_conflict((user_id, toggl_id))
            .do_update()
            .set((name.eq(name_val), updated_at.eq(Utc::now())))
            .get_result::<OrganizationRow>(conn)
            .await?;

        Ok(row.into())
    }

    pub async fn find_by_toggl_id(
        conn: &mut AsyncPgConnection,
        user_id_val: Uuid,
        toggl_id_val: i64,
    ) -> anyhow::Result<Option<Organization>> {
        use crate::schema::organizations::dsl::*;

        let row = organizations
            .filter(user_id.eq(user_id_val))
            .filter(toggl_id.eq(toggl_id_val))
            .first::<OrganizationRow>(conn)
            .await
            .optional()?;

        Ok(row.map(Into::into))
    }

    pub async fn get_by_id(
        conn: &mut AsyncPgConnection,
        org_id: Uuid,
    ) -> anyhow::Result<Organization> {
        use crate::schema::organizations::dsl::*;

        let row = organizations
            .filter(id.eq(org_id))
            .first::<OrganizationRow>(conn)
            .await?;

        Ok(row.into())
    }
}

// Workspace database operations
pub mod workspaces {
    use super::*;

    pub async fn list_for_user(
        conn: &mut AsyncPgConnection,
        user_id_val: Uuid,
    ) -> anyhow::Result<Vec<Workspace>> {
        use crate::schema::workspaces::dsl::*;

        let rows = workspaces
            .filter(user_id.eq(user_id_val))
            .order_by(name.asc())
            .load::<WorkspaceRow>(conn)
            .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn get_by_id(
        conn: &mut AsyncPgConnection,
        workspace_id: Uuid,
    ) -> anyhow::Result<Workspace> {
        use crate::schema::workspaces::dsl::*;

        let row = workspaces
            .filter(id.eq(workspace_id))
            .first::<WorkspaceRow>(conn)
            .await?;

        Ok(row.into())
    }

    pub async fn find_by_toggl_id(
        conn: &mut AsyncPgConnection,
        user_id_val: Uuid,
        toggl_id_val: i64,
    ) -> anyhow::Result<Option<Workspace>> {
        use crate::schema::workspaces::dsl::*;

        let row = workspaces
            .filter(user_id.eq(user_id_val))
            .filter(toggl_id.eq(toggl_id_val))
            .first::<WorkspaceRow>(conn)
            .await
            .optional()?;

        Ok(row.map(Into::into))
    }

    /// Look up a workspace by its webhook routing token. This is how an
    /// incoming webhook is attributed to a user.
    pub async fn find_by_webhook_token(
        conn: &mut AsyncPgConnection,
        token: &str,
    ) -> anyhow::Result<Option<Workspace>> {
        use crate::schema::workspaces::dsl::*;

        let row = workspaces
            .filter(webhook_token.eq(token))
            .first::<WorkspaceRow>(conn)
            .await
            .optional()?;

        Ok(row.map(Into::into))
    }

    pub async fn upsert(
        conn: &mut AsyncPgConnection,
        user_id_val: Uuid,
        toggl_id_val: i64,
        name_val: &str,
        organization_id_val: Option<Uuid>,
    ) -> anyhow::Result<Workspace> {
        use crate::schema::workspaces::dsl::*;

        let row = diesel::insert_into(workspaces)
            .values((
                id.eq(Uuid::new_v4()),
                user_id.eq(user_id_val),
                toggl_id.eq(toggl_id_val),
                name.eq(name_val),
                organization_id.eq(organization_id_val),
                webhook_enabled.eq(false),
                updated_at.eq(Utc::now()),
            ))
            .on_conflict((user_id, toggl_id))
            .do_update()
            .set((
                name.eq(name_val),
                organization_id.eq(organization_id_val),
                updated_at.eq(Utc::now()),
            ))
            .get_result::<WorkspaceRow>(conn)
            .await?;

        Ok(row.into())
    }

    /// Mint a webhook routing token for the workspace if it has none yet.
    pub async fn ensure_webhook_token(
        conn: &mut AsyncPgConnection,
        workspace_id: Uuid,
    ) -> anyhow::Result<String> {
        use crate::schema::workspaces::dsl::*;

        let existing: Option<String> = workspaces
            .filter(id.eq(workspace_id))
            .select(webhook_token)
            .first::<Option<String>>(conn)
            .await?;

        if let Some(token) = existing {
            return Ok(token);
        }

        let token = Uuid::new_v4().simple().to_string();
        diesel::update(workspaces.filter(id.eq(workspace_id)))
            .set(webhook_token.eq(Some(token.clone())))
            .execute(conn)
            .await?;

        Ok(token)
    }

    pub async fn set_webhook_subscription(
        conn: &mut AsyncPgConnection,
        workspace_id: Uuid,
        token_val: &str,
        subscription_id_val: Option<i64>,
        secret_val: Option<&str>,
        enabled_val: bool,
    ) -> anyhow::Result<Workspace> {
        use crate::schema::workspaces::dsl::*;

        let row = diesel::update(workspaces.filter(id.eq(workspace_id)))
            .set((
                webhook_token.eq(Some(token_val)),
                webhook_subscription_id.eq(subscription_id_val),
                webhook_secret.eq(secret_val),
                webhook_enabled.eq(enabled_val),
                updated_at.eq(Utc::now()),
            ))
            .get_result::<WorkspaceRow>(conn)
            .await?;

        Ok(row.into())
    }

    pub async fn clear_webhook_subscription(
        conn: &mut AsyncPgConnection,
        workspace_id: Uuid,
    ) -> anyhow::Result<Workspace> {
        use crate::schema::workspaces::dsl::*;

        let row = diesel::update(workspaces.filter(id.eq(workspace_id)))
            .set((
                webhook_subscription_id.eq(None::<i64>),
                webhook_secret.eq(None::<String>),
                webhook_enabled.eq(false),
                updated_at.eq(Utc::now()),
            ))
            .get_result::<WorkspaceRow>(conn)
            .await?;

        Ok(row.into())
    }

    /// Toggl workspace ids belonging to an organization, for mapping matches.
    pub async fn toggl_ids_for_organization(
        conn: &mut AsyncPgConnection,
        user_id_val: Uuid,
        organization_id_val: Uuid,
    ) -> anyhow::Result<Vec<i64>> {
        use crate::schema::workspaces::dsl::*;

        let ids = workspaces
            .filter(user_id.eq(user_id_val))
            .filter(organization_id.eq(Some(organization_id_val)))
            .select(toggl_id)
            .load::<i64>(conn)
            .await?;

        Ok(ids)
    }
}

// Project database operations
pub mod projects {
    use super::*;

    pub async fn upsert(
        conn: &mut AsyncPgConnection,
        user_id_val: Uuid,
        toggl_id_val: i64,
        workspace_id_val: Uuid,
        name_val: &str,
        color_val: Option<&str>,
        active_val: bool,
    ) -> anyhow::Result<Project> {
        use crate::schema::projects::dsl::*;

        let row = diesel::insert_into(projects)
            .values((
                id.eq(Uuid::new_v4()),
                user_id.eq(user_id_val),
                toggl_id.eq(toggl_id_val),
                workspace_id.eq(workspace_id_val),
                name.eq(name_val),
                color.eq(color_val),
                active.eq(active_val),
                updated_at.eq(Utc::now()),
            ))
            .on_conflict((user_id, toggl_id))
            .do_update()
            .set((
                workspace_id.eq(workspace_id_val),
                name.eq(name_val),
                color.eq(color_val),
                active.eq(active_val),
                updated_at.eq(Utc::now()),
            ))
            .get_result::<ProjectRow>(conn)
            .await?;

        Ok(row.into())
    }

    pub async fn find_by_toggl_id(
        conn: &mut AsyncPgConnection,
        user_id_val: Uuid,
        toggl_id_val: i64,
    ) -> anyhow::Result<Option<Project>> {
        use crate::schema::projects::dsl::*;

        let row = projects
            .filter(user_id.eq(user_id_val))
            .filter(toggl_id.eq(toggl_id_val))
            .first::<ProjectRow>(conn)
            .await
            .optional()?;

        Ok(row.map(Into::into))
    }
}

// Tag database operations
pub mod tags {
    use super::*;

    pub async fn upsert(
        conn: &mut AsyncPgConnection,
        user_id_val: Uuid,
        toggl_id_val: i64,
        workspace_id_val: Uuid,
        name_val: &str,
    ) -> anyhow::Result<Tag> {
        use crate::schema::tags::dsl::*;

        let row = diesel::insert_into(tags)
            .values((
                id.eq(Uuid::new_v4()),
                user_id.eq(user_id_val),
                toggl_id.eq(toggl_id_val),
                workspace_id.eq(workspace_id_val),
                name.eq(name_val),
                updated_at.eq(Utc::now()),
            ))
            .on_conflict((user_id, toggl_id))
            .do_update()
            .set((
                workspace_id.eq(workspace_id_val),
                name.eq(name_val),
                updated_at.eq(Utc::now()),
            ))
            .get_result::<TagRow>(conn)
            .await?;

        Ok(row.into())
    }

    pub async fn list_by_toggl_ids(
        conn: &mut AsyncPgConnection,
        user_id_val: Uuid,
        toggl_ids: &[i64],
    ) -> anyhow::Result<Vec<Tag>> {
        use crate::schema::tags::dsl::*;

        let rows = tags
            .filter(user_id.eq(user_id_val))
            .filter(toggl_id.eq_any(toggl_ids))
            .order_by(name.asc())
            .load::<TagRow>(conn)
            .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}

// Calendar database operations
pub mod calendars {
    use super::*;

    pub async fn list_for_user(
        conn: &mut AsyncPgConnection,
        user_id_val: Uuid,
    ) -> anyhow::Result<Vec<Calendar>> {
        use crate::schema::calendars::dsl::*;

        let rows = calendars
            .filter(user_id.eq(user_id_val))
            .order_by(name.asc())
            .load::<CalendarRow>(conn)
            .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn get_by_id(
        conn: &mut AsyncPgConnection,
        calendar_id: Uuid,
    ) -> anyhow::Result<Calendar> {
        use crate::schema::calendars::dsl::*;

        let row = calendars
            .filter(id.eq(calendar_id))
            .first::<CalendarRow>(conn)
            .await?;

        Ok(row.into())
    }

    pub async fn find_by_id(
        conn: &mut AsyncPgConnection,
        calendar_id: Uuid,
    ) -> anyhow::Result<Option<Calendar>> {
        use crate::schema::calendars::dsl::*;

        let row = calendars
            .filter(id.eq(calendar_id))
            .first::<CalendarRow>(conn)
            .await
            .optional()?;

        Ok(row.map(Into::into))
    }

    pub async fn get_default_for_user(
        conn: &mut AsyncPgConnection,
        user_id_val: Uuid,
    ) -> anyhow::Result<Option<Calendar>> {
        use crate::schema::calendars::dsl::*;

        let row = calendars
            .filter(user_id.eq(user_id_val))
            .filter(is_default.eq(true))
            .first::<CalendarRow>(conn)
            .await
            .optional()?;

        Ok(row.map(Into::into))
    }

    pub async fn upsert(
        conn: &mut AsyncPgConnection,
        user_id_val: Uuid,
        google_calendar_id_val: &str,
        name_val: &str,
    ) -> anyhow::Result<(Calendar, bool)> {
        use crate::schema::calendars::dsl::*;

        let existing = calendars
            .filter(user_id.eq(user_id_val))
            .filter(google_calendar_id.eq(google_calendar_id_val))
            .first::<CalendarRow>(conn)
            .await
            .optional()?;

        match existing {
            Some(row) => {
                let row = diesel::update(calendars.filter(id.eq(row.id)))
                    .set((name.eq(name_val), updated_at.eq(Utc::now())))
                    .get_result::<CalendarRow>(conn)
                    .await?;
                Ok((row.into(), false))
            }
            None => {
                let row = diesel::insert_into(calendars)
                    .values((
                        id.eq(Uuid::new_v4()),
                        user_id.eq(user_id_val),
                        google_calendar_id.eq(google_calendar_id_val),
                        name.eq(name_val),
                        is_default.eq(false),
                        updated_at.eq(Utc::now()),
                    ))
                    .get_result::<CalendarRow>(conn)
                    .await?;
                Ok((row.into(), true))
            }
        }
    }

    /// Remove calendars (and, via FK cascade, their mappings) that no longer
    /// exist on the Google side.
    pub async fn delete_missing(
        conn: &mut AsyncPgConnection,
        user_id_val: Uuid,
        keep_google_ids: &[String],
    ) -> anyhow::Result<usize> {
        use crate::schema::calendars::dsl::*;

        let removed = diesel::delete(
            calendars
                .filter(user_id.eq(user_id_val))
                .filter(google_calendar_id.ne_all(keep_google_ids)),
        )
        .execute(conn)
        .await?;

        Ok(removed)
    }

    /// Point an existing calendar row at a new Google calendar. Used when a
    /// dedicated calendar was deleted on the Google side and recreated.
    pub async fn set_google_id(
        conn: &mut AsyncPgConnection,
        calendar_id: Uuid,
        google_calendar_id_val: &str,
    ) -> anyhow::Result<Calendar> {
        use crate::schema::calendars::dsl::*;

        let row = diesel::update(calendars.filter(id.eq(calendar_id)))
            .set((
                google_calendar_id.eq(google_calendar_id_val),
                updated_at.eq(Utc::now()),
            ))
            .get_result::<CalendarRow>(conn)
            .await?;

        Ok(row.into())
    }

    pub async fn set_default(
        conn: &mut AsyncPgConnection,
        user_id_val: Uuid,
        calendar_id: Uuid,
    ) -> anyhow::Result<Calendar> {
        use crate::schema::calendars::dsl::*;

        diesel::update(calendars.filter(user_id.eq(user_id_val)))
            .set(is_default.eq(false))
            .execute(conn)
            .await?;

        let row = diesel::update(
            calendars
                .filter(user_id.eq(user_id_val))
                .filter(id.eq(calendar_id)),
        )
        .set((is_default.eq(true), updated_at.eq(Utc::now())))
        .get_result::<CalendarRow>(conn)
        .await?;

        Ok(row.into())
    }

    pub async fn find_by_google_id(
        conn: &mut AsyncPgConnection,
        user_id_val: Uuid,
        google_calendar_id_val: &str,
    ) -> anyhow::Result<Option<Calendar>> {
        use crate::schema::calendars::dsl::*;

        let row = calendars
            .filter(user_id.eq(user_id_val))
            .filter(google_calendar_id.eq(google_calendar_id_val))
            .first::<CalendarRow>(conn)
            .await
            .optional()?;

        Ok(row.map(Into::into))
    }

    pub async fn find_by_name(
        conn: &mut AsyncPgConnection,
        user_id_val: Uuid,
        name_val: &str,
    ) -> anyhow::Result<Option<Calendar>> {
        use crate::schema::calendars::dsl::*;

        let row = calendars
            .filter(user_id.eq(user_id_val))
            .filter(name.eq(name_val))
            .first::<CalendarRow>(conn)
            .await
            .optional()?;

        Ok(row.map(Into::into))
    }
}

// Mapping database operations
pub mod mappings {
    use super::*;

    pub async fn list_for_user(
        conn: &mut AsyncPgConnection,
        user_id_val: Uuid,
    ) -> anyhow::Result<Vec<Mapping>> {
        use crate::schema::mappings::dsl::*;

        let rows = mappings
            .filter(user_id.eq(user_id_val))
            .order_by(priority.asc())
            .load::<MappingRow>(conn)
            .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn get_by_id(
        conn: &mut AsyncPgConnection,
        mapping_id: Uuid,
    ) -> anyhow::Result<Mapping> {
        use crate::schema::mappings::dsl::*;

        let row = mappings
            .filter(id.eq(mapping_id))
            .first::<MappingRow>(conn)
            .await?;

        Ok(row.into())
    }

    pub async fn create(
        conn: &mut AsyncPgConnection,
        user_id_val: Uuid,
        entity_type_val: MappingEntityType,
        entity_id_val: i64,
        entity_name_val: &str,
        calendar_id_val: Option<Uuid>,
        color_id_val: Option<&str>,
        priority_val: i32,
    ) -> anyhow::Result<Mapping> {
        use crate::schema::mappings::dsl::*;

        let row = diesel::insert_into(mappings)
            .values((
                id.eq(Uuid::new_v4()),
                user_id.eq(user_id_val),
                entity_type.eq(entity_type_val.as_str()),
                entity_id.eq(entity_id_val),
                entity_name.eq(entity_name_val),
                calendar_id.eq(calendar_id_val),
                color_id.eq(color_id_val),
                priority.eq(priority_val),
                updated_at.eq(Utc::now()),
            ))
            .get_result::<MappingRow>(conn)
            .await?;

        Ok(row.into())
    }

    pub async fn update(
        conn: &mut AsyncPgConnection,
        mapping_id: Uuid,
        entity_name_val: Option<&str>,
        calendar_id_val: Option<Uuid>,
        color_id_val: Option<&str>,
        priority_val: Option<i32>,
    ) -> anyhow::Result<Mapping> {
        use crate::schema::mappings::dsl::*;

        if let Some(n) = entity_name_val {
            diesel::update(mappings.filter(id.eq(mapping_id)))
                .set(entity_name.eq(n))
                .execute(conn)
                .await?;
        }
        if let Some(c) = calendar_id_val {
            diesel::update(mappings.filter(id.eq(mapping_id)))
                .set(calendar_id.eq(Some(c)))
                .execute(conn)
                .await?;
        }
        if let Some(c) = color_id_val {
            diesel::update(mappings.filter(id.eq(mapping_id)))
                .set(color_id.eq(Some(c)))
                .execute(conn)
                .await?;
        }
        if let Some(p) = priority_val {
            diesel::update(mappings.filter(id.eq(mapping_id)))
                .set(priority.eq(p))
                .execute(conn)
                .await?;
        }

        let row = diesel::update(mappings.filter(id.eq(mapping_id)))
            .set(updated_at.eq(Utc::now()))
            .get_result::<MappingRow>(conn)
            .await?;

        Ok(row.into())
    }

    pub async fn delete(conn: &mut AsyncPgConnection, mapping_id: Uuid) -> anyhow::Result<()> {
        use crate::schema::mappings::dsl::*;

        diesel::delete(mappings.filter(id.eq(mapping_id)))
            .execute(conn)
            .await?;

        Ok(())
    }
}

// Time entry database operations
pub mod time_entries {
    use super::*;
    use diesel::PgArrayExpressionMethods;

    /// Fields extracted from a webhook (or Toggl API) time entry payload.
    #[derive(Debug, Clone)]
    pub struct EntryUpsert {
        pub description: String,
        pub start_time: DateTime<Utc>,
        pub end_time: Option<DateTime<Utc>>,
        pub project_id: Option<i64>,
        pub workspace_id: Option<i64>,
        pub tag_ids: Vec<i64>,
        pub created_at: Option<DateTime<Utc>>,
    }

    pub async fn get_by_toggl_id(
        conn: &mut AsyncPgConnection,
        user_id_val: Uuid,
        toggl_id_val: i64,
    ) -> anyhow::Result<Option<TimeEntry>> {
        use crate::schema::time_entries::dsl::*;

        let row = time_entries
            .filter(user_id.eq(user_id_val))
            .filter(toggl_id.eq(toggl_id_val))
            .first::<TimeEntryRow>(conn)
            .await
            .optional()?;

        Ok(row.map(Into::into))
    }

    pub async fn exists(
        conn: &mut AsyncPgConnection,
        user_id_val: Uuid,
        toggl_id_val: i64,
    ) -> anyhow::Result<bool> {
        use crate::schema::time_entries::dsl::*;

        let count: i64 = time_entries
            .filter(user_id.eq(user_id_val))
            .filter(toggl_id.eq(toggl_id_val))
            .count()
            .get_result(conn)
            .await?;

        Ok(count > 0)
    }

    /// Store or refresh an entry from a webhook payload. The entry always
    /// comes back dirty (synced = false) so the worker picks it up.
    pub async fn upsert_from_payload(
        conn: &mut AsyncPgConnection,
        user_id_val: Uuid,
        toggl_id_val: i64,
        data: EntryUpsert,
    ) -> anyhow::Result<TimeEntry> {
        use crate::schema::time_entries::dsl::*;

        let now = Utc::now();
        let new_entry = NewTimeEntry {
            id: Uuid::new_v4(),
            user_id: user_id_val,
            toggl_id: toggl_id_val,
            description: data.description.clone(),
            start_time: data.start_time,
            end_time: data.end_time,
            project_id: data.project_id,
            workspace_id: data.workspace_id,
            tag_ids: data.tag_ids.clone(),
            synced: false,
            pending_deletion: false,
            created_at: data.created_at.unwrap_or(now),
            updated_at: now,
        };

        let row = diesel::insert_into(time_entries)
            .values(&new_entry)
            .on_conflict((user_id, toggl_id))
            .do_update()
            .set((
                description.eq(data.description),
                start_time.eq(data.start_time),
                end_time.eq(data.end_time),
                project_id.eq(data.project_id),
                workspace_id.eq(data.workspace_id),
                tag_ids.eq(data.tag_ids),
                synced.eq(false),
                pending_deletion.eq(false),
                updated_at.eq(now),
            ))
            .get_result::<TimeEntryRow>(conn)
            .await?;

        Ok(row.into())
    }

    /// Insert an entry imported by backfill; leaves existing rows untouched.
    pub async fn insert_if_missing(
        conn: &mut AsyncPgConnection,
        user_id_val: Uuid,
        toggl_id_val: i64,
        data: EntryUpsert,
    ) -> anyhow::Result<Option<TimeEntry>> {
        use crate::schema::time_entries::dsl::*;

        let now = Utc::now();
        let new_entry = NewTimeEntry {
            id: Uuid::new_v4(),
            user_id: user_id_val,
            toggl_id: toggl_id_val,
            description: data.description,
            start_time: data.start_time,
            end_time: data.end_time,
            project_id: data.project_id,
            workspace_id: data.workspace_id,
            tag_ids: data.tag_ids,
            synced: false,
            pending_deletion: false,
            created_at: data.created_at.unwrap_or(now),
            updated_at: now,
        };

        let row = diesel::insert_into(time_entries)
            .values(&new_entry)
            .on_conflict((user_id, toggl_id))
            .do_nothing()
            .get_result::<TimeEntryRow>(conn)
            .await
            .optional()?;

        Ok(row.map(Into::into))
    }

    pub async fn mark_pending_deletion(
        conn: &mut AsyncPgConnection,
        user_id_val: Uuid,
        toggl_id_val: i64,
    ) -> anyhow::Result<usize> {
        use crate::schema::time_entries::dsl::*;

        let n = diesel::update(
            time_entries
                .filter(user_id.eq(user_id_val))
                .filter(toggl_id.eq(toggl_id_val)),
        )
        .set((
            pending_deletion.eq(true),
            synced.eq(false),
            updated_at.eq(Utc::now()),
        ))
        .execute(conn)
        .await?;

        Ok(n)
    }

    /// Record which calendar/event the entry is mirrored to. Does not bump
    /// updated_at; only webhook writes count as entry changes.
    pub async fn assign_event(
        conn: &mut AsyncPgConnection,
        entry_id: Uuid,
        calendar_id_val: Option<Uuid>,
        google_event_id_val: Option<&str>,
    ) -> anyhow::Result<()> {
        use crate::schema::time_entries::dsl::*;

        diesel::update(time_entries.filter(id.eq(entry_id)))
            .set((
                calendar_id.eq(calendar_id_val),
                google_event_id.eq(google_event_id_val),
            ))
            .execute(conn)
            .await?;

        Ok(())
    }

    /// Flip synced on, but only when the row has not been touched since the
    /// worker read it. Returns false when a concurrent webhook won the race.
    pub async fn mark_synced_if_unchanged(
        conn: &mut AsyncPgConnection,
        entry_id: Uuid,
        seen_updated_at: DateTime<Utc>,
    ) -> anyhow::Result<bool> {
        use crate::schema::time_entries::dsl::*;

        let n = diesel::update(
            time_entries
                .filter(id.eq(entry_id))
                .filter(updated_at.eq(seen_updated_at)),
        )
        .set(synced.eq(true))
        .execute(conn)
        .await?;

        Ok(n > 0)
    }

    pub async fn mark_unsynced(
        conn: &mut AsyncPgConnection,
        entry_id: Uuid,
    ) -> anyhow::Result<()> {
        use crate::schema::time_entries::dsl::*;

        diesel::update(time_entries.filter(id.eq(entry_id)))
            .set(synced.eq(false))
            .execute(conn)
            .await?;

        Ok(())
    }

    pub async fn list_for_user(
        conn: &mut AsyncPgConnection,
        user_id_val: Uuid,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> anyhow::Result<Vec<TimeEntry>> {
        use crate::schema::time_entries::dsl::*;

        let mut query = time_entries
            .filter(user_id.eq(user_id_val))
            .order_by(start_time.desc())
            .into_boxed();

        if let Some(l) = limit {
            query = query.limit(l);
        }
        if let Some(o) = offset {
            query = query.offset(o);
        }

        let rows = query.load::<TimeEntryRow>(conn).await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn count_for_user(
        conn: &mut AsyncPgConnection,
        user_id_val: Uuid,
    ) -> anyhow::Result<i64> {
        use crate::schema::time_entries::dsl::*;

        let count: i64 = time_entries
            .filter(user_id.eq(user_id_val))
            .count()
            .get_result(conn)
            .await?;

        Ok(count)
    }

    pub async fn get_by_id(
        conn: &mut AsyncPgConnection,
        entry_id: Uuid,
    ) -> anyhow::Result<TimeEntry> {
        use crate::schema::time_entries::dsl::*;

        let row = time_entries
            .filter(id.eq(entry_id))
            .first::<TimeEntryRow>(conn)
            .await?;

        Ok(row.into())
    }

    /// Synced entries eligible for the reconciliation pass.
    pub async fn list_synced_for_validation(
        conn: &mut AsyncPgConnection,
        user_id_val: Uuid,
        limit: i64,
    ) -> anyhow::Result<Vec<TimeEntry>> {
        use crate::schema::time_entries::dsl::*;

        let rows = time_entries
            .filter(user_id.eq(user_id_val))
            .filter(synced.eq(true))
            .filter(pending_deletion.eq(false))
            .filter(calendar_id.is_not_null())
            .order_by(updated_at.desc())
            .limit(limit)
            .load::<TimeEntryRow>(conn)
            .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Dirty entries awaiting a sync; the reconciler re-enqueues these so
    /// jobs lost to a restart are not lost forever.
    pub async fn list_unsynced(
        conn: &mut AsyncPgConnection,
        user_id_val: Uuid,
        limit: i64,
    ) -> anyhow::Result<Vec<TimeEntry>> {
        use crate::schema::time_entries::dsl::*;

        let rows = time_entries
            .filter(user_id.eq(user_id_val))
            .filter(synced.eq(false))
            .order_by(updated_at.asc())
            .limit(limit)
            .load::<TimeEntryRow>(conn)
            .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Toggl entry ids of synced entries a mapping rule applies to.
    pub async fn toggl_ids_matching_mapping(
        conn: &mut AsyncPgConnection,
        user_id_val: Uuid,
        entity_type_val: MappingEntityType,
        entity_id_val: i64,
        org_workspace_toggl_ids: &[i64],
    ) -> anyhow::Result<Vec<i64>> {
        use crate::schema::time_entries::dsl::*;

        let base = time_entries
            .filter(user_id.eq(user_id_val))
            .filter(synced.eq(true))
            .filter(pending_deletion.eq(false));

        let ids = match entity_type_val {
            MappingEntityType::Project => {
                base.filter(project_id.eq(Some(entity_id_val)))
                    .select(toggl_id)
                    .load::<i64>(conn)
                    .await?
            }
            MappingEntityType::Tag => {
                base.filter(tag_ids.contains(vec![entity_id_val]))
                    .select(toggl_id)
                    .load::<i64>(conn)
                    .await?
            }
            MappingEntityType::Workspace => {
                base.filter(workspace_id.eq(Some(entity_id_val)))
                    .select(toggl_id)
                    .load::<i64>(conn)
                    .await?
            }
            MappingEntityType::Organization => {
                base.filter(workspace_id.assume_not_null().eq_any(org_workspace_toggl_ids))
                    .select(toggl_id)
                    .load::<i64>(conn)
                    .await?
            }
        };

        Ok(ids)
    }
}

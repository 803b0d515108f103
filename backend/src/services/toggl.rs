//! Toggl Track API client.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const PROJECTS_PER_PAGE: usize = 200;

#[derive(Debug, Error)]
pub enum TogglApiError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("toggl returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
}

/// Client for interacting with the Toggl Track API.
///
/// Authenticates with the user's API token over HTTP basic auth
/// (`token:api_token`), as the Toggl v9 API expects.
pub struct TogglClient {
    http: reqwest::Client,
    api_token: String,
    api_url: String,
    webhook_api_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TogglOrganization {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TogglWorkspace {
    pub id: i64,
    pub name: String,
    pub organization_id: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TogglProject {
    pub id: i64,
    pub name: String,
    pub color: Option<String>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct TogglTag {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TogglTimeEntry {
    pub id: i64,
    #[serde(default)]
    pub description: Option<String>,
    pub start: DateTime<Utc>,
    pub stop: Option<DateTime<Utc>>,
    pub project_id: Option<i64>,
    pub workspace_id: Option<i64>,
    #[serde(default)]
    pub tag_ids: Vec<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TogglWebhookSubscription {
    pub subscription_id: i64,
    #[serde(default)]
    pub url_callback: String,
    pub secret: Option<String>,
    #[serde(default)]
    pub enabled: bool,
}

impl TogglClient {
    pub fn new(api_token: &str, api_url: &str, webhook_api_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_token: api_token.to_string(),
            api_url: api_url.trim_end_matches('/').to_string(),
            webhook_api_url: webhook_api_url.trim_end_matches('/').to_string(),
        }
    }

    async fn get<T: serde::de::DeserializeOwned>(
        &self,
        url: String,
        query: &[(&str, String)],
    ) -> Result<T, TogglApiError> {
        let response = self
            .http
            .get(url)
            .basic_auth(&self.api_token, Some("api_token"))
            .query(query)
            .send()
            .await?;

        Self::decode(response).await
    }

    async fn decode<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, TogglApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TogglApiError::Status { status, body });
        }
        Ok(response.json::<T>().await?)
    }

    // =========================================================================
    // User & metadata
    // =========================================================================

    pub async fn get_organizations(&self) -> Result<Vec<TogglOrganization>, TogglApiError> {
        self.get(format!("{}/me/organizations", self.api_url), &[])
            .await
    }

    pub async fn get_workspaces(&self) -> Result<Vec<TogglWorkspace>, TogglApiError> {
        self.get(format!("{}/me/workspaces", self.api_url), &[])
            .await
    }

    /// Fetch all projects in a workspace, following pagination.
    pub async fn get_projects(
        &self,
        workspace_id: i64,
    ) -> Result<Vec<TogglProject>, TogglApiError> {
        let mut projects = Vec::new();
        let mut page = 1usize;

        loop {
            let batch: Vec<TogglProject> = self
                .get(
                    format!("{}/workspaces/{}/projects", self.api_url, workspace_id),
                    &[
                        ("page", page.to_string()),
                        ("per_page", PROJECTS_PER_PAGE.to_string()),
                    ],
                )
                .await?;

            if batch.is_empty() {
                break;
            }

            let last_page = batch.len() < PROJECTS_PER_PAGE;
            projects.extend(batch);
            if last_page {
                break;
            }
            page += 1;
        }

        Ok(projects)
    }

    /// Tags for a workspace. Toggl returns a JSON null when there are none.
    pub async fn get_tags(&self, workspace_id: i64) -> Result<Vec<TogglTag>, TogglApiError> {
        let tags: Option<Vec<TogglTag>> = self
            .get(
                format!("{}/workspaces/{}/tags", self.api_url, workspace_id),
                &[],
            )
            .await?;
        Ok(tags.unwrap_or_default())
    }

    // =========================================================================
    // Time entries
    // =========================================================================

    pub async fn get_time_entries(
        &self,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<TogglTimeEntry>, TogglApiError> {
        self.get(
            format!("{}/me/time_entries", self.api_url),
            &[
                ("start_date", start_date.to_string()),
                ("end_date", end_date.to_string()),
            ],
        )
        .await
    }

    pub async fn get_time_entry(&self, entry_id: i64) -> Result<TogglTimeEntry, TogglApiError> {
        self.get(format!("{}/me/time_entries/{}", self.api_url, entry_id), &[])
            .await
    }

    // =========================================================================
    // Webhook subscriptions
    // =========================================================================

    /// List webhook subscriptions for a workspace. Returns null for none.
    pub async fn list_webhooks(
        &self,
        workspace_id: i64,
    ) -> Result<Vec<TogglWebhookSubscription>, TogglApiError> {
        let subs: Option<Vec<TogglWebhookSubscription>> = self
            .get(
                format!("{}/subscriptions/{}", self.webhook_api_url, workspace_id),
                &[],
            )
            .await?;
        Ok(subs.unwrap_or_default())
    }

    /// Create a subscription for time entry created/updated/deleted events.
    pub async fn create_webhook(
        &self,
        workspace_id: i64,
        callback_url: &str,
        description: &str,
    ) -> Result<TogglWebhookSubscription, TogglApiError> {
        #[derive(Serialize)]
        struct EventFilter {
            entity: &'static str,
            action: &'static str,
        }

        #[derive(Serialize)]
        struct CreateSubscription<'a> {
            description: &'a str,
            url_callback: &'a str,
            event_filters: Vec<EventFilter>,
            enabled: bool,
        }

        let payload = CreateSubscription {
            description,
            url_callback: callback_url,
            event_filters: vec![
                EventFilter {
                    entity: "time_entry",
                    action: "created",
                },
                EventFilter {
                    entity: "time_entry",
                    action: "updated",
                },
                EventFilter {
                    entity: "time_entry",
                    action: "deleted",
                },
            ],
            enabled: true,
        };

        let response = self
            .http
            .post(format!(
                "{}/subscriptions/{}",
                self.webhook_api_url, workspace_id
            ))
            .basic_auth(&self.api_token, Some("api_token"))
            .json(&payload)
            .send()
            .await?;

        Self::decode(response).await
    }

    pub async fn delete_webhook(
        &self,
        workspace_id: i64,
        subscription_id: i64,
    ) -> Result<(), TogglApiError> {
        let response = self
            .http
            .delete(format!(
                "{}/subscriptions/{}/{}",
                self.webhook_api_url, workspace_id, subscription_id
            ))
            .basic_auth(&self.api_token, Some("api_token"))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TogglApiError::Status { status, body });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_time_entry() {
        let json = r#"{
            "id": 123,
            "description": "Work",
            "start": "2026-02-27T10:00:00Z",
            "stop": "2026-02-27T11:00:00Z",
            "project_id": 10,
            "workspace_id": 1,
            "tag_ids": [20, 21]
        }"#;

        let entry: TogglTimeEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.id, 123);
        assert_eq!(entry.description.as_deref(), Some("Work"));
        assert_eq!(entry.project_id, Some(10));
        assert_eq!(entry.tag_ids, vec![20, 21]);
        assert!(entry.stop.is_some());
    }

    #[test]
    fn parses_running_entry_without_tags() {
        let json = r#"{
            "id": 7,
            "description": null,
            "start": "2026-02-27T10:00:00+02:00",
            "stop": null,
            "project_id": null,
            "workspace_id": 1
        }"#;

        let entry: TogglTimeEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.description, None);
        assert!(entry.stop.is_none());
        assert!(entry.tag_ids.is_empty());
    }

    #[test]
    fn parses_project_with_default_active() {
        let json = r##"{"id": 1, "name": "P", "color": "#f00"}"##;
        let project: TogglProject = serde_json::from_str(json).unwrap();
        assert!(project.active);
    }
}

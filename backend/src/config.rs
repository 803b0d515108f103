use anyhow::{Context, Result};
use std::env;
use std::time::Duration;

use crate::auth::types::AuthConfig;

const TOGGL_API_URL: &str = "https://api.track.toggl.com/api/v9";
const TOGGL_WEBHOOK_API_URL: &str = "https://api.track.toggl.com/webhooks/api/v1";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub port: u16,
    pub jwt_secret: String,
    pub google_client_id: String,
    pub google_client_secret: String,
    /// Public host (scheme-less) webhook callbacks and the OAuth redirect
    /// are served from, e.g. "togglsync.example.com".
    pub webhook_domain: String,
    /// Origins allowed to call the admin API; empty means any.
    pub cors_allowed_origins: Vec<String>,
    pub toggl_api_url: String,
    pub toggl_webhook_api_url: String,
    /// Minimum quiet period after the last entry update before syncing.
    pub sync_debounce: Duration,
    /// Base delay between retries of a failed sync job.
    pub sync_retry: Duration,
    pub sync_max_attempts: u32,
    pub validate_interval: Duration,
    pub validate_batch_limit: i64,
    pub token_duration_days: i64,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("PORT must be a valid number")?,
            jwt_secret: env::var("JWT_SECRET").context("JWT_SECRET must be set")?,
            google_client_id: env::var("GOOGLE_CLIENT_ID")
                .context("GOOGLE_CLIENT_ID must be set")?,
            google_client_secret: env::var("GOOGLE_CLIENT_SECRET")
                .context("GOOGLE_CLIENT_SECRET must be set")?,
            webhook_domain: env::var("WEBHOOK_DOMAIN")
                .unwrap_or_else(|_| "localhost:8080".to_string()),
            cors_allowed_origins: split_csv(env::var("CORS_ALLOWED_ORIGINS").ok().as_deref()),
            toggl_api_url: env::var("TOGGL_API_URL")
                .unwrap_or_else(|_| TOGGL_API_URL.to_string()),
            toggl_webhook_api_url: env::var("TOGGL_WEBHOOK_API_URL")
                .unwrap_or_else(|_| TOGGL_WEBHOOK_API_URL.to_string()),
            sync_debounce: Duration::from_secs(env_u64("SYNC_DEBOUNCE_SECS", 60)?),
            sync_retry: Duration::from_secs(env_u64("SYNC_RETRY_SECS", 120)?),
            sync_max_attempts: env_u64("SYNC_MAX_ATTEMPTS", 5)? as u32,
            validate_interval: Duration::from_secs(env_u64("VALIDATE_INTERVAL_SECS", 600)?),
            validate_batch_limit: env_u64("VALIDATE_BATCH_LIMIT", 50)? as i64,
            token_duration_days: env_u64("TOKEN_DURATION_DAYS", 30)? as i64,
        })
    }

    pub fn google_redirect_uri(&self) -> String {
        format!("https://{}/oauth/google/callback", self.webhook_domain)
    }

    pub fn webhook_callback_url(&self, webhook_token: &str) -> String {
        format!(
            "https://{}/webhook/toggl/{}",
            self.webhook_domain, webhook_token
        )
    }

    pub fn auth_config(&self) -> AuthConfig {
        AuthConfig {
            jwt_secret: self.jwt_secret.clone(),
            token_duration_days: self.token_duration_days,
            cookie_name: "togglsync_token".to_string(),
        }
    }
}

fn env_u64(key: &str, default: u64) -> Result<u64> {
    match env::var(key) {
        Ok(v) => v
            .parse()
            .with_context(|| format!("{key} must be a valid number")),
        Err(_) => Ok(default),
    }
}

fn split_csv(value: Option<&str>) -> Vec<String> {
    value
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_origin_list() {
        assert_eq!(
            split_csv(Some("https://a.example, https://b.example")),
            vec!["https://a.example", "https://b.example"]
        );
        assert!(split_csv(Some("")).is_empty());
        assert!(split_csv(None).is_empty());
    }
}

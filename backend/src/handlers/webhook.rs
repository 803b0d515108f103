//! Toggl webhook receiver.
//!
//! The token in the URL routes the event to a workspace (and thereby a
//! user). Toggl signs each delivery with the subscription secret; events
//! for workspaces that have one are rejected unless the signature checks
//! out. PING events answer synchronously with the validation code, time
//! entry events are stored and handed to the sync worker.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::HeaderMap,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use togglsync_shared::api::StatusResponse;

use crate::db;
use crate::error::{ApiResult, AppError};
use crate::AppState;

const SIGNATURE_HEADER: &str = "x-webhook-signature-256";

type HmacSha256 = Hmac<Sha256>;

/// Toggl webhook envelope. For PING events `payload` is the string "ping",
/// otherwise it carries the time entry object.
#[derive(Debug, Deserialize)]
struct WebhookEnvelope {
    payload: serde_json::Value,
    #[serde(default)]
    metadata: WebhookMetadata,
    validation_code: Option<String>,
    created_at: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct WebhookMetadata {
    #[serde(default)]
    action: String,
}

#[derive(Debug, Deserialize)]
struct WebhookTimeEntry {
    id: i64,
    #[serde(default)]
    description: Option<String>,
    start: Option<DateTime<Utc>>,
    stop: Option<DateTime<Utc>>,
    project_id: Option<i64>,
    workspace_id: Option<i64>,
    #[serde(default)]
    tag_ids: Vec<i64>,
}

#[derive(Debug, Serialize)]
struct PingResponse {
    validation_code: String,
}

/// Verify the `X-Webhook-Signature-256` header: `sha256={hex}` where hex is
/// the HMAC-SHA256 of the raw request body keyed with the webhook secret.
pub fn verify_signature(payload: &[u8], signature: &str, secret: &str) -> bool {
    let hex_digest = signature.strip_prefix("sha256=").unwrap_or(signature);
    let Ok(expected) = hex::decode(hex_digest) else {
        return false;
    };

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("hmac accepts keys of any length");
    mac.update(payload);
    // verify_slice is constant-time
    mac.verify_slice(&expected).is_ok()
}

pub async fn toggl_webhook(
    State(state): State<AppState>,
    Path(webhook_token): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Response> {
    let mut conn = state.pool.get().await?;

    let Some(workspace) = db::workspaces::find_by_webhook_token(&mut conn, &webhook_token).await?
    else {
        let preview: String = webhook_token.chars().take(8).collect();
        tracing::warn!("Unknown webhook token: {}...", preview);
        return Err(AppError::NotFound("unknown webhook token".to_string()));
    };

    let envelope: WebhookEnvelope = serde_json::from_slice(&body).map_err(|e| {
        tracing::error!("Invalid JSON in webhook payload: {}", e);
        AppError::Validation("invalid JSON payload".to_string())
    })?;

    // Signed deliveries only once Toggl has handed us the secret
    if let Some(secret) = &workspace.webhook_secret {
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if !verify_signature(&body, signature, secret) {
            tracing::warn!(
                "Invalid webhook signature for workspace {}",
                workspace.toggl_id
            );
            return Err(AppError::Unauthorized("invalid signature".to_string()));
        }
    }

    // PING validation: Toggl expects the code echoed back synchronously
    if envelope.payload == serde_json::Value::String("ping".to_string()) {
        tracing::info!(
            "Received PING from Toggl for workspace {}, validation_code: {:?}",
            workspace.toggl_id,
            envelope.validation_code
        );
        return Ok(match envelope.validation_code {
            Some(validation_code) => Json(PingResponse { validation_code }).into_response(),
            None => Json(StatusResponse::ok()).into_response(),
        });
    }

    let entry: WebhookTimeEntry = match serde_json::from_value(envelope.payload) {
        Ok(entry) => entry,
        Err(e) => {
            tracing::warn!("Unknown webhook format or payload without id: {}", e);
            return Ok(Json(StatusResponse::ok()).into_response());
        }
    };

    let action = envelope.metadata.action.to_lowercase();
    if !matches!(action.as_str(), "created" | "updated" | "deleted") {
        tracing::warn!("Unknown event type: {}", action);
        return Ok(Json(StatusResponse::ok()).into_response());
    }

    tracing::info!(
        "Webhook for workspace {}: {} entry {} \"{}\"",
        workspace.toggl_id,
        action,
        entry.id,
        entry.description.as_deref().unwrap_or("(no description)")
    );

    if action == "deleted" {
        db::time_entries::mark_pending_deletion(&mut conn, workspace.user_id, entry.id).await?;
    } else {
        let Some(start_time) = entry.start else {
            tracing::warn!("Time entry {} missing start time", entry.id);
            return Ok(Json(StatusResponse::ok()).into_response());
        };

        db::time_entries::upsert_from_payload(
            &mut conn,
            workspace.user_id,
            entry.id,
            db::time_entries::EntryUpsert {
                description: entry.description.unwrap_or_default(),
                start_time,
                end_time: entry.stop,
                project_id: entry.project_id,
                workspace_id: entry.workspace_id.or(Some(workspace.toggl_id)),
                tag_ids: entry.tag_ids,
                created_at: parse_webhook_timestamp(envelope.created_at.as_deref()),
            },
        )
        .await?;
    }

    state.jobs.enqueue(workspace.user_id, entry.id);

    Ok(Json(StatusResponse::ok()).into_response())
}

/// Parse the envelope timestamp leniently; a malformed one is not worth
/// rejecting the whole delivery over.
fn parse_webhook_timestamp(value: Option<&str>) -> Option<DateTime<Utc>> {
    let value = value?;
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    // HMAC-SHA256 with an empty key over an empty message, a published
    // known-answer vector.
    const EMPTY_HMAC: &str = "b613679a0814d9ec772f95d778c35fc5ff1697c493715653c6c712144292c5ad";

    #[test]
    fn accepts_known_signature() {
        assert!(verify_signature(b"", EMPTY_HMAC, ""));
    }

    #[test]
    fn accepts_prefixed_signature() {
        let prefixed = format!("sha256={}", EMPTY_HMAC);
        assert!(verify_signature(b"", &prefixed, ""));
    }

    #[test]
    fn rejects_tampered_payload() {
        assert!(!verify_signature(b"tampered", EMPTY_HMAC, ""));
    }

    #[test]
    fn rejects_wrong_secret() {
        assert!(!verify_signature(b"", EMPTY_HMAC, "other-secret"));
    }

    #[test]
    fn rejects_garbage_signature() {
        assert!(!verify_signature(b"", "not-hex!", ""));
        assert!(!verify_signature(b"", "", ""));
    }

    #[test]
    fn parses_ping_envelope() {
        let envelope: WebhookEnvelope = serde_json::from_str(
            r#"{"payload": "ping", "validation_code": "abc"}"#,
        )
        .unwrap();
        assert_eq!(envelope.payload, serde_json::json!("ping"));
        assert_eq!(envelope.validation_code.as_deref(), Some("abc"));
    }

    #[test]
    fn parses_time_entry_envelope() {
        let envelope: WebhookEnvelope = serde_json::from_str(
            r#"{
                "payload": {
                    "id": 123,
                    "description": "Work",
                    "start": "2026-02-27T10:00:00Z",
                    "stop": "2026-02-27T11:00:00Z",
                    "project_id": null,
                    "tag_ids": []
                },
                "metadata": {"action": "created"},
                "created_at": "2026-02-27T11:00:01Z"
            }"#,
        )
        .unwrap();

        assert_eq!(envelope.metadata.action, "created");
        let entry: WebhookTimeEntry = serde_json::from_value(envelope.payload).unwrap();
        assert_eq!(entry.id, 123);
        assert_eq!(entry.description.as_deref(), Some("Work"));
        assert!(entry.start.is_some());
    }

    #[test]
    fn payload_without_id_is_rejected() {
        let payload = serde_json::json!({"description": "no id"});
        assert!(serde_json::from_value::<WebhookTimeEntry>(payload).is_err());
    }

    #[test]
    fn deleted_payload_needs_only_id() {
        let payload = serde_json::json!({"id": 99});
        let entry: WebhookTimeEntry = serde_json::from_value(payload).unwrap();
        assert_eq!(entry.id, 99);
        assert!(entry.start.is_none());
    }

    #[test]
    fn lenient_timestamp_parsing() {
        assert!(parse_webhook_timestamp(Some("2026-02-27T11:00:01Z")).is_some());
        assert!(parse_webhook_timestamp(Some("2026-02-27T11:00:01+02:00")).is_some());
        assert!(parse_webhook_timestamp(Some("not a date")).is_none());
        assert!(parse_webhook_timestamp(None).is_none());
    }
}

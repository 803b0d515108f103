//! Google OAuth flow for connecting a user's calendar.

use axum::{
    extract::{Query, State},
    response::{IntoResponse, Redirect},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use togglsync_shared::api::{OAuthStartResponse, StatusResponse};
use uuid::Uuid;

use crate::auth::types::AuthUser;
use crate::db;
use crate::error::ApiResult;
use crate::AppState;

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const CALENDAR_SCOPE: &str = "https://www.googleapis.com/auth/calendar";

// OAuth flow - Step 1: hand the client the Google consent URL
pub async fn google_oauth_start(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<OAuthStartResponse>> {
    let redirect_uri = state.config.google_redirect_uri();

    // The state parameter carries the user id back through the callback
    let auth_url = format!(
        "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&access_type=offline&prompt=consent&state={}",
        GOOGLE_AUTH_URL,
        urlencoding::encode(&state.config.google_client_id),
        urlencoding::encode(&redirect_uri),
        urlencoding::encode(CALENDAR_SCOPE),
        user.id
    );

    tracing::info!("Starting Google OAuth flow for user {}", user.email);

    Ok(Json(OAuthStartResponse { auth_url }))
}

#[derive(Debug, Deserialize)]
pub struct OAuthCallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

// OAuth flow - Step 2: handle the callback from Google
pub async fn google_oauth_callback(
    State(state): State<AppState>,
    Query(params): Query<OAuthCallbackParams>,
) -> impl IntoResponse {
    if let Some(error) = params.error {
        tracing::warn!("OAuth error from Google: {}", error);
        return Redirect::to("/oauth/error?msg=denied").into_response();
    }

    let user_id = match params.state.as_deref().map(Uuid::parse_str) {
        Some(Ok(user_id)) => user_id,
        _ => return Redirect::to("/oauth/error?msg=invalid_state").into_response(),
    };

    let code = match params.code {
        Some(code) => code,
        None => return Redirect::to("/oauth/error?msg=missing_code").into_response(),
    };

    // Exchange code for tokens using reqwest
    #[derive(Serialize)]
    struct TokenRequest {
        code: String,
        client_id: String,
        client_secret: String,
        redirect_uri: String,
        grant_type: String,
    }

    #[derive(Deserialize, Debug)]
    struct TokenResponse {
        access_token: String,
        refresh_token: Option<String>,
        expires_in: i64,
    }

    let client = reqwest::Client::new();
    let token_response = match client
        .post(GOOGLE_TOKEN_URL)
        .form(&TokenRequest {
            code,
            client_id: state.config.google_client_id.clone(),
            client_secret: state.config.google_client_secret.clone(),
            redirect_uri: state.config.google_redirect_uri(),
            grant_type: "authorization_code".to_string(),
        })
        .send()
        .await
    {
        Ok(resp) => resp,
        Err(_) => return Redirect::to("/oauth/error?msg=token_exchange_failed").into_response(),
    };

    let tokens: TokenResponse = match token_response.json().await {
        Ok(t) => t,
        Err(_) => return Redirect::to("/oauth/error?msg=invalid_token_response").into_response(),
    };

    // Without a refresh token the connection dies with the access token;
    // prompt=consent in the auth URL is supposed to guarantee one
    let refresh_token = match tokens.refresh_token {
        Some(rt) => rt,
        None => return Redirect::to("/oauth/error?msg=no_refresh_token").into_response(),
    };

    let mut conn = match state.pool.get().await {
        Ok(c) => c,
        Err(_) => return Redirect::to("/oauth/error?msg=db_error").into_response(),
    };

    let expires_at = chrono::Utc::now() + chrono::Duration::seconds(tokens.expires_in);

    match db::credentials::set_google_tokens(
        &mut conn,
        user_id,
        &refresh_token,
        &tokens.access_token,
        expires_at,
    )
    .await
    {
        Ok(_) => {}
        Err(_) => return Redirect::to("/oauth/error?msg=db_update_failed").into_response(),
    };

    tracing::info!("Google Calendar connected for user {}", user_id);

    Redirect::to("/oauth/success").into_response()
}

pub async fn google_oauth_disconnect(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<StatusResponse>> {
    let mut conn = state.pool.get().await?;

    db::credentials::clear_google_tokens(&mut conn, user.id).await?;

    tracing::info!("Google Calendar disconnected for user {}", user.email);

    Ok(Json(StatusResponse::ok()))
}

//! Authentication middleware layer for protecting routes.

use axum::{
    body::Body,
    extract::State,
    http::{header, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use togglsync_shared::api::ErrorResponse;

use crate::db;
use crate::AppState;

use super::jwt;
use super::types::AuthUser;

/// Middleware function that requires authentication.
///
/// Used with `axum::middleware::from_fn_with_state` on the admin API routes.
/// The resolved user is inserted into request extensions.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let config = state.config.auth_config();

    // Try to get token from cookie first, then Authorization header
    let token = extract_token_from_cookie(request.headers(), &config.cookie_name)
        .or_else(|| extract_token_from_header(request.headers()));

    let token = match token {
        Some(t) => t,
        None => {
            return (
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse::new("unauthorized", "Missing authentication")),
            )
                .into_response();
        }
    };

    let claims = match jwt::verify_token(&config, &token) {
        Ok(c) => c,
        Err(_) => {
            return (
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse::new(
                    "unauthorized",
                    "Invalid or expired token",
                )),
            )
                .into_response();
        }
    };

    // The token only names the user; the account must still exist
    let mut conn = match state.pool.get().await {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("Failed to get database connection in auth: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("internal_error", "database unavailable")),
            )
                .into_response();
        }
    };

    let user = match db::users::find_by_email(&mut conn, &claims.sub).await {
        Ok(Some(u)) => u,
        Ok(None) => {
            return (
                StatusCode::FORBIDDEN,
                Json(ErrorResponse::new("forbidden", "Unknown user")),
            )
                .into_response();
        }
        Err(e) => {
            tracing::error!("Failed to look up user in auth: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("internal_error", "database unavailable")),
            )
                .into_response();
        }
    };

    request.extensions_mut().insert(AuthUser {
        id: user.id,
        email: user.email,
        name: user.name,
    });

    next.run(request).await
}

fn extract_token_from_cookie(headers: &axum::http::HeaderMap, cookie_name: &str) -> Option<String> {
    let cookie_header = headers.get(header::COOKIE)?.to_str().ok()?;

    for cookie_str in cookie_header.split(';') {
        if let Ok(cookie) = cookie::Cookie::parse(cookie_str.trim()) {
            if cookie.name() == cookie_name {
                return Some(cookie.value().to_string());
            }
        }
    }

    None
}

fn extract_token_from_header(headers: &axum::http::HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(|s| s.to_string())
}

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Settings for token creation and validation.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub token_duration_days: i64,
    pub cookie_name: String,
}

/// JWT claims. `sub` is the user's email address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub name: Option<String>,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
}

/// The authenticated user, resolved from the token and the users table.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
}

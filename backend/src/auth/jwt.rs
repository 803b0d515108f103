//! Minting and verification of admin API tokens.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};

use super::types::{AuthConfig, Claims};

/// Required `iss` claim; tokens minted by anything else are rejected.
const ISSUER: &str = "togglsync";

/// Mint a signed bearer token for a user, identified by email.
pub fn issue_token(
    config: &AuthConfig,
    email: &str,
    name: Option<String>,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = Utc::now();
    let claims = Claims {
        sub: email.to_string(),
        name,
        iss: ISSUER.to_string(),
        iat: now.timestamp(),
        exp: (now + Duration::days(config.token_duration_days)).timestamp(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
}

/// Verify a token's signature, expiry and issuer, returning its claims.
pub fn verify_token(
    config: &AuthConfig,
    token: &str,
) -> Result<Claims, jsonwebtoken::errors::Error> {
    let mut validation = Validation::default();
    validation.set_issuer(&[ISSUER]);

    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret.as_bytes()),
        &validation,
    )?;

    Ok(data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> AuthConfig {
        AuthConfig {
            jwt_secret: "test-secret-key-for-testing-only".to_string(),
            token_duration_days: 7,
            cookie_name: "togglsync_token".to_string(),
        }
    }

    fn encode_claims(config: &AuthConfig, claims: &Claims) -> String {
        encode(
            &Header::default(),
            claims,
            &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn round_trips_claims() {
        let config = test_config();
        let token = issue_token(&config, "test@example.com", Some("Test User".to_string()))
            .expect("should mint token");

        let claims = verify_token(&config, &token).expect("should verify token");
        assert_eq!(claims.sub, "test@example.com");
        assert_eq!(claims.name, Some("Test User".to_string()));
        assert_eq!(claims.iss, ISSUER);
    }

    #[test]
    fn rejects_garbage() {
        let config = test_config();
        assert!(verify_token(&config, "not-a-token").is_err());
        assert!(verify_token(&config, "").is_err());
    }

    #[test]
    fn rejects_wrong_secret() {
        let config = test_config();
        let token = issue_token(&config, "test@example.com", None).expect("should mint token");

        let mut other = config;
        other.jwt_secret = "a-different-secret".to_string();

        assert!(verify_token(&other, &token).is_err());
    }

    #[test]
    fn rejects_foreign_issuer() {
        let config = test_config();
        let now = Utc::now();
        let token = encode_claims(
            &config,
            &Claims {
                sub: "test@example.com".to_string(),
                name: None,
                iss: "someone-else".to_string(),
                iat: now.timestamp(),
                exp: (now + Duration::days(1)).timestamp(),
            },
        );

        assert!(verify_token(&config, &token).is_err());
    }

    #[test]
    fn rejects_expired_token() {
        let config = test_config();
        let now = Utc::now();
        let token = encode_claims(
            &config,
            &Claims {
                sub: "test@example.com".to_string(),
                name: None,
                iss: ISSUER.to_string(),
                iat: (now - Duration::days(8)).timestamp(),
                exp: (now - Duration::days(1)).timestamp(),
            },
        );

        assert!(verify_token(&config, &token).is_err());
    }
}

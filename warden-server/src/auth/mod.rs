//! Request authentication module
//!
//! Provides the `AuthenticatedUser` extractor for Axum handlers.
//! A caller is identified either by an HS256 bearer token signed with
//! `JWT_SECRET` (`sub` = user id) or by the `user_id` of a logged-in session.

use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use uuid::Uuid;

use crate::db::User;
use crate::error::ApiError;
use crate::session::USER_ID_KEY;
use crate::state::AppState;

/// Bearer token claims
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject (user id)
    pub sub: String,
    /// Expiration time (validated by jsonwebtoken)
    pub exp: u64,
}

/// Sign a bearer token for a user.
pub fn issue_token(secret: &str, user_id: Uuid, ttl_secs: u64) -> Result<String, ApiError> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| ApiError::internal(format!("clock error: {}", e)))?
        .as_secs();
    let claims = TokenClaims {
        sub: user_id.to_string(),
        exp: now + ttl_secs,
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| ApiError::internal(format!("token signing failed: {}", e)))
}

/// Validate a bearer token and return the user id it names.
fn validate_token(token: &str, secret: &str) -> Result<Uuid, ApiError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    validation.validate_aud = false;

    let data = decode::<TokenClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
            ApiError::auth_error("AUTH_TOKEN_EXPIRED", "JWT token has expired")
        }
        jsonwebtoken::errors::ErrorKind::InvalidSignature => {
            ApiError::auth_error("AUTH_INVALID_TOKEN", "Invalid JWT signature")
        }
        _ => ApiError::auth_error("AUTH_INVALID_TOKEN", format!("JWT validation failed: {}", e)),
    })?;

    Uuid::parse_str(&data.claims.sub)
        .map_err(|_| ApiError::auth_error("AUTH_INVALID_TOKEN", "JWT subject is not a user id"))
}

/// Extract the Bearer token from the Authorization header, if any
fn extract_bearer_token(parts: &Parts) -> Result<Option<&str>, ApiError> {
    let Some(auth_header) = parts.headers.get(axum::http::header::AUTHORIZATION) else {
        return Ok(None);
    };

    let auth_value = auth_header.to_str().map_err(|_| {
        ApiError::auth_error(
            "AUTH_INVALID_TOKEN",
            "Invalid Authorization header encoding",
        )
    })?;

    auth_value.strip_prefix("Bearer ").map(Some).ok_or_else(|| {
        ApiError::auth_error(
            "AUTH_INVALID_TOKEN",
            "Authorization header must use Bearer scheme",
        )
    })
}

/// Resolve the caller's user id from the bearer token or the session.
async fn caller_id(parts: &mut Parts, state: &AppState) -> Result<Option<Uuid>, ApiError> {
    if let Some(token) = extract_bearer_token(parts)? {
        let secret = state.config.jwt_secret.as_deref().ok_or_else(|| {
            ApiError::auth_error(
                "AUTH_TOKEN_UNSUPPORTED",
                "Bearer authentication not configured (missing JWT_SECRET)",
            )
        })?;
        return validate_token(token, secret).map(Some);
    }

    let session = Session::from_request_parts(parts, state)
        .await
        .map_err(|(_, msg)| ApiError::internal(format!("session layer missing: {}", msg)))?;
    Ok(session.get::<Uuid>(USER_ID_KEY).await?)
}

/// Authenticated user extractor that resolves the user from the directory.
///
/// The extractor:
/// 1. Reads `Authorization: Bearer <token>` and validates it, or
/// 2. Falls back to the `user_id` of the session
/// 3. Looks up the user, who must be active
///
/// Returns 401 with structured error codes on any failure.
pub struct AuthenticatedUser {
    pub user: User,
}

impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user_id = caller_id(parts, state)
            .await?
            .ok_or_else(|| ApiError::auth_error("AUTH_MISSING_TOKEN", "Authentication required"))?;

        let user = state
            .directory
            .find_user(user_id)
            .await?
            .filter(|u| u.is_active)
            .ok_or_else(|| {
                ApiError::auth_error("AUTH_USER_NOT_FOUND", "Authenticated user not found")
            })?;

        Ok(AuthenticatedUser { user })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_round_trip() {
        let user_id = Uuid::new_v4();
        let token = issue_token("secret", user_id, 60).unwrap();
        assert_eq!(validate_token(&token, "secret").unwrap(), user_id);
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = issue_token("secret", Uuid::new_v4(), 60).unwrap();
        let err = validate_token(&token, "other").unwrap_err();
        assert!(matches!(err, ApiError::AuthError { ref code, .. } if code == "AUTH_INVALID_TOKEN"));
    }

    #[test]
    fn test_expired_token_rejected() {
        let claims = TokenClaims {
            sub: Uuid::new_v4().to_string(),
            exp: 1,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"secret"),
        )
        .unwrap();
        let err = validate_token(&token, "secret").unwrap_err();
        assert!(matches!(err, ApiError::AuthError { ref code, .. } if code == "AUTH_TOKEN_EXPIRED"));
    }

    #[test]
    fn test_non_uuid_subject_rejected() {
        let claims = TokenClaims {
            sub: "user_123".into(),
            exp: u64::MAX / 2,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"secret"),
        )
        .unwrap();
        assert!(validate_token(&token, "secret").is_err());
    }
}

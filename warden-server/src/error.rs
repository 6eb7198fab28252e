//! API error handling module
//!
//! Provides a unified error type for all API endpoints with structured error variants.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use warden_core::AuthError;

use crate::db::StorageError;

/// API error type with structured variants for different error categories
#[derive(Debug, Error)]
pub enum ApiError {
    /// Internal server error - unexpected server-side failure
    #[error("Internal error: {0}")]
    Internal(String),

    /// Service unavailable - required service is not configured or available
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Authentication error with specific error code
    #[error("{message}")]
    AuthError { message: String, code: String },

    /// Error from the login domain library
    #[error("Auth error: {0}")]
    Core(#[from] AuthError),

    /// Directory storage failure
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Session store failure
    #[error("Session error: {0}")]
    Session(#[from] tower_sessions::session::Error),
}

impl ApiError {
    /// Create an internal server error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Create a service unavailable error
    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::ServiceUnavailable(message.into())
    }

    /// Create an authentication error with a specific error code
    pub fn auth_error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::AuthError {
            message: message.into(),
            code: code.into(),
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::AuthError { .. } => StatusCode::UNAUTHORIZED,
            Self::Internal(_) | Self::Storage(_) | Self::Session(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Core(ref e) => match e {
                // A spent, expired or mismatched challenge is the caller's problem
                AuthError::ChallengeRejected(_) => StatusCode::BAD_REQUEST,

                // Stored configuration or infrastructure we depend on is broken
                AuthError::EntropyError(_)
                | AuthError::InvalidAuthenticator(_)
                | AuthError::InvalidProvider(_)
                | AuthError::UnknownProvider(_)
                | AuthError::SerializationError(_)
                | AuthError::FeatureLookup(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    /// Get the error code for programmatic error handling
    fn error_code(&self) -> &str {
        match self {
            Self::AuthError { code, .. } => code,
            Self::Internal(_) => "INTERNAL_ERROR",
            Self::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            Self::Storage(_) => "STORAGE_ERROR",
            Self::Session(_) => "SESSION_ERROR",
            Self::Core(ref e) => match e {
                AuthError::EntropyError(_) => "ENTROPY_UNAVAILABLE",
                AuthError::InvalidAuthenticator(_) => "INVALID_AUTHENTICATOR",
                AuthError::InvalidProvider(_) => "INVALID_PROVIDER",
                AuthError::UnknownProvider(_) => "UNKNOWN_PROVIDER",
                AuthError::SerializationError(_) => "SERIALIZATION_ERROR",
                AuthError::ChallengeRejected(_) => "CHALLENGE_REJECTED",
                AuthError::FeatureLookup(_) => "FEATURE_LOOKUP_FAILED",
            },
        }
    }

    /// Get sanitized error message for client response
    fn client_message(&self) -> String {
        match self {
            Self::Internal(_) => "Internal server error".to_string(),
            Self::Storage(_) | Self::Session(_) => "A storage error occurred".to_string(),
            // For core errors, sanitize internal details
            Self::Core(ref e) => match e {
                AuthError::ChallengeRejected(_) => "Challenge rejected".to_string(),
                AuthError::EntropyError(_) => "Entropy source unavailable".to_string(),
                AuthError::InvalidAuthenticator(_) => {
                    "Authenticator configuration is invalid".to_string()
                }
                AuthError::InvalidProvider(_) | AuthError::UnknownProvider(_) => {
                    "Auth provider configuration is invalid".to_string()
                }
                AuthError::SerializationError(_) => "Serialization error".to_string(),
                AuthError::FeatureLookup(_) => "Feature lookup failed".to_string(),
            },
            // For other errors, use the Display message
            _ => self.to_string(),
        }
    }

    /// Get the error category for logging
    fn error_category(&self) -> &'static str {
        match self {
            Self::AuthError { .. } => "auth_error",
            Self::Internal(_) => "internal",
            Self::ServiceUnavailable(_) => "service_unavailable",
            Self::Core(_) => "core",
            Self::Storage(_) => "storage",
            Self::Session(_) => "session",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let category = self.error_category();
        let code = self.error_code();
        let internal_message = self.to_string();
        let client_message = self.client_message();

        // Internal details go to the log only
        if status.is_server_error() {
            tracing::error!(
                status = %status,
                category,
                code,
                error = %internal_message,
                "Request failed"
            );
        } else {
            tracing::warn!(
                status = %status,
                category,
                code,
                error = %internal_message,
                "Request rejected"
            );
        }

        // All error responses include a `code` field for programmatic error handling
        let body = serde_json::json!({
            "error": client_message,
            "code": code,
        });

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_is_sanitized() {
        let err = ApiError::from(StorageError::Query("relation users does not exist".into()));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.error_code(), "STORAGE_ERROR");
        assert!(!err.client_message().contains("relation"));
    }

    #[test]
    fn test_core_error_mapping() {
        let rejected = ApiError::from(AuthError::ChallengeRejected("challenge expired".into()));
        assert_eq!(rejected.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(rejected.client_message(), "Challenge rejected");

        let provider = ApiError::from(AuthError::UnknownProvider("saml2".into()));
        assert_eq!(provider.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(provider.error_code(), "UNKNOWN_PROVIDER");
    }

    #[test]
    fn test_auth_error_is_unauthorized() {
        let err = ApiError::auth_error("AUTH_MISSING_TOKEN", "Missing credentials");
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(err.error_code(), "AUTH_MISSING_TOKEN");
        assert_eq!(err.client_message(), "Missing credentials");
    }
}

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Entropy error: {0}")]
    EntropyError(String),

    #[error("Invalid authenticator configuration: {0}")]
    InvalidAuthenticator(String),

    #[error("Invalid provider configuration: {0}")]
    InvalidProvider(String),

    #[error("Unknown auth provider: {0}")]
    UnknownProvider(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Challenge rejected: {0}")]
    ChallengeRejected(String),

    #[error("Feature lookup failed: {0}")]
    FeatureLookup(String),
}

pub type Result<T> = std::result::Result<T, AuthError>;

/// Lifetime of an issued second-factor challenge.
pub const CHALLENGE_EXPIRY_SECS: i64 = 300;

/// Lifetime of a pending SSO handshake.
pub const HANDSHAKE_EXPIRY_SECS: i64 = 600;

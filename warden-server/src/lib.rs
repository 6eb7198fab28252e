//! Warden Server Library - HTTP surface for second-factor challenges and
//! organization SSO login
//!
//! This library exposes the server components for use in integration tests.
//! The main binary uses these same components.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod identity;
pub mod openapi;
pub mod routes;
pub mod session;
pub mod state;

pub use auth::{issue_token, AuthenticatedUser, TokenClaims};
pub use config::Config;
pub use db::{
    AuthenticatorRecord, Directory, DirectoryTx, MemoryDirectory, PgDirectory, StorageError, User,
};
pub use error::ApiError;
pub use identity::IdentityClient;
pub use openapi::ApiDoc;
pub use routes::create_router;
pub use session::{FlashMessage, LoginTransaction, MessageLevel, StagedSession};
pub use state::AppState;

//! HTTP request handlers
//!
//! This module contains all the request handlers for the API endpoints.

pub mod authenticators;
pub mod health;
pub mod login;
pub mod organization_login;
pub mod sso;

pub use crate::state::AppState;
pub use authenticators::{list_authenticators, AuthenticatorChallenge};
pub use health::{health, ready, HealthResponse, ReadyResponse};
pub use login::{
    login_page, login_submit, LoginForm, LoginFormState, LoginPage, OrganizationSummary,
    PromptField,
};
pub use organization_login::{organization_login_page, organization_login_submit};
pub use sso::{sso_callback, sso_callback_submit};

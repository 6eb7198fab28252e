//! Login pages and basic credential login
//!
//! Pages are returned as JSON documents naming the template to render and
//! its context. Organizations without an auth provider, and the generic
//! `/auth/login/` page, fall back to username/password login.

use axum::{
    extract::{rejection::FormRejection, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Form, Json,
};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use utoipa::ToSchema;
use uuid::Uuid;
use warden_core::{AuthFlow, Organization, Prompt, Provider, StepInput};

use crate::error::ApiError;
use crate::handlers::AppState;
use crate::session::{FlashMessage, LoginTransaction};

/// Generic login page, also the fallback for unknown organizations
pub const LOGIN_PATH: &str = "/auth/login/";

pub const LOGIN_TEMPLATE: &str = "warden/login.html";
pub const ORGANIZATION_LOGIN_TEMPLATE: &str = "warden/organization-login.html";
pub const ASK_EMAIL_TEMPLATE: &str = "warden/auth-ask-email.html";

const INVALID_LOGIN: &str = "Please enter a correct username and password. \
Note that both fields may be case-sensitive.";

/// Form body accepted by the login endpoints.
///
/// The SSO callback reads the same fields from its query string.
#[derive(Debug, Default, Clone, Deserialize, ToSchema)]
pub struct LoginForm {
    /// Start a new SSO handshake when truthy
    #[serde(default)]
    pub init: Option<String>,
    #[serde(default)]
    pub op: Option<String>,
    #[serde(default)]
    #[schema(example = "jane@example.com")]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Answer to the e-mail prompt of the local test provider
    #[serde(default)]
    pub email: Option<String>,
    /// OAuth2 authorization code
    #[serde(default)]
    pub code: Option<String>,
    /// OAuth2 state echo
    #[serde(default)]
    pub state: Option<String>,
    /// OAuth2 error
    #[serde(default)]
    pub error: Option<String>,
}

impl LoginForm {
    pub fn wants_init(&self) -> bool {
        matches!(
            self.init.as_deref().map(str::trim),
            Some(v) if !v.is_empty() && v != "0" && !v.eq_ignore_ascii_case("false")
        )
    }

    fn is_login_attempt(&self) -> bool {
        self.op.as_deref().unwrap_or("login") == "login" && self.username.is_some()
    }

    /// Parameters the handshake pipeline may read.
    pub fn step_input(&self) -> StepInput {
        [
            ("email", &self.email),
            ("code", &self.code),
            ("state", &self.state),
            ("error", &self.error),
        ]
        .into_iter()
        .filter_map(|(key, value)| value.as_ref().map(|v| (key, v.clone())))
        .collect()
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OrganizationSummary {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
}

impl From<&Organization> for OrganizationSummary {
    fn from(org: &Organization) -> Self {
        Self {
            id: org.id,
            slug: org.slug.clone(),
            name: org.name.clone(),
        }
    }
}

/// A field the user is asked to fill in mid-handshake
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PromptField {
    pub field: &'static str,
    pub label: &'static str,
}

/// Submitted credentials echoed back with their errors
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LoginFormState {
    pub errors: Vec<String>,
    pub username: String,
}

/// Rendered login page
#[derive(Debug, Default, Serialize, ToSchema)]
pub struct LoginPage {
    /// Template to render
    #[schema(example = "warden/organization-login.html")]
    pub template: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization: Option<OrganizationSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_name: Option<String>,
    /// Whether the visitor already has a logged-in session
    pub authenticated: bool,
    pub can_register: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub op: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<PromptField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub login_form: Option<LoginFormState>,
    pub messages: Vec<FlashMessage>,
}

impl LoginPage {
    /// Username/password page, for an organization or the generic login.
    pub fn basic(
        organization: Option<&Organization>,
        can_register: bool,
        authenticated: bool,
        messages: Vec<FlashMessage>,
    ) -> Self {
        Self {
            template: if organization.is_some() {
                ORGANIZATION_LOGIN_TEMPLATE
            } else {
                LOGIN_TEMPLATE
            },
            organization: organization.map(OrganizationSummary::from),
            authenticated,
            can_register,
            op: Some("login"),
            messages,
            ..Self::default()
        }
    }

    /// SSO landing page offering to continue with the organization's provider.
    pub fn sso(
        organization: &Organization,
        provider: &Provider,
        authenticated: bool,
        messages: Vec<FlashMessage>,
    ) -> Self {
        Self {
            template: ORGANIZATION_LOGIN_TEMPLATE,
            organization: Some(organization.into()),
            provider_key: Some(provider.key.clone()),
            provider_name: Some(provider.name.clone()),
            authenticated,
            can_register: false,
            messages,
            ..Self::default()
        }
    }

    pub fn with_prompt(mut self, prompt: Prompt) -> Self {
        self.template = match prompt {
            Prompt::Email => ASK_EMAIL_TEMPLATE,
        };
        self.prompt = Some(PromptField {
            field: prompt.field(),
            label: prompt.label(),
        });
        self
    }
}

/// `302 Found` to a local path or provider URL.
pub fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}

/// A POST whose body is not a urlencoded form is handled as an empty form.
pub fn form_or_default(form: Result<Form<LoginForm>, FormRejection>) -> LoginForm {
    match form {
        Ok(Form(form)) => form,
        Err(rejection) => {
            tracing::debug!(%rejection, "Login form not decoded, using an empty form");
            LoginForm::default()
        }
    }
}

/// Username/password login for an organization without a provider, or for
/// the generic page when `organization` is `None`.
pub async fn basic_login(
    state: &AppState,
    txn: &mut LoginTransaction,
    organization: Option<&Organization>,
    form: Option<&LoginForm>,
) -> Result<Response, ApiError> {
    let mut login_form = None;

    if let Some(form) = form.filter(|f| f.is_login_attempt()) {
        let username = form.username.as_deref().unwrap_or_default().trim();
        let password = form.password.as_deref().unwrap_or_default();

        let user = if username.is_empty() || password.is_empty() {
            None
        } else {
            txn.directory()
                .await?
                .find_user_by_email(username)
                .await?
                .filter(|u| u.is_active && u.check_password(password))
        };

        match user {
            Some(user) => {
                txn.session().login(user.id);
                tracing::info!(
                    user_id = %user.id,
                    organization = organization.map(|o| o.slug.as_str()),
                    "User logged in with password"
                );
                let next = organization
                    .map(|o| AuthFlow::Login.success_path(o))
                    .unwrap_or_else(|| "/".to_string());
                return Ok(found(&next));
            }
            None => {
                tracing::warn!(
                    organization = organization.map(|o| o.slug.as_str()),
                    "Password login rejected"
                );
                login_form = Some(LoginFormState {
                    errors: vec![INVALID_LOGIN.to_string()],
                    username: username.to_string(),
                });
            }
        }
    }

    let authenticated = txn.session().is_authenticated();
    let messages = txn.session().take_messages().await?;
    let mut page = LoginPage::basic(
        organization,
        state.config.allow_registration,
        authenticated,
        messages,
    );
    page.login_form = login_form;
    Ok(Json(page).into_response())
}

async fn generic_login(
    state: AppState,
    session: Session,
    form: Option<LoginForm>,
) -> Result<Response, ApiError> {
    let mut txn = LoginTransaction::begin(&state.directory, session).await?;
    txn.session().set_test_cookie();
    let response = basic_login(&state, &mut txn, None, form.as_ref()).await?;
    txn.commit().await?;
    Ok(response)
}

/// Generic login page
#[utoipa::path(
    get,
    path = "/auth/login/",
    tag = "Login",
    responses((status = 200, description = "Login page", body = LoginPage))
)]
pub async fn login_page(
    State(state): State<AppState>,
    session: Session,
) -> Result<Response, ApiError> {
    generic_login(state, session, None).await
}

/// Submit credentials on the generic login page
#[utoipa::path(
    post,
    path = "/auth/login/",
    tag = "Login",
    request_body(content = LoginForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Login page with form errors", body = LoginPage),
        (status = 302, description = "Logged in")
    )
)]
pub async fn login_submit(
    State(state): State<AppState>,
    session: Session,
    form: Result<Form<LoginForm>, FormRejection>,
) -> Result<Response, ApiError> {
    generic_login(state, session, Some(form_or_default(form))).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(init: Option<&str>) -> LoginForm {
        LoginForm {
            init: init.map(String::from),
            ..LoginForm::default()
        }
    }

    #[test]
    fn test_init_truthiness() {
        assert!(form(Some("1")).wants_init());
        assert!(form(Some("true")).wants_init());
        assert!(!form(Some("")).wants_init());
        assert!(!form(Some("0")).wants_init());
        assert!(!form(Some("False")).wants_init());
        assert!(!form(None).wants_init());
    }

    #[test]
    fn test_step_input_skips_absent_fields() {
        let form = LoginForm {
            email: Some("jane@example.com".into()),
            username: Some("ignored".into()),
            ..LoginForm::default()
        };
        let input = form.step_input();
        assert_eq!(input.get("email"), Some("jane@example.com"));
        assert_eq!(input.get("username"), None);
        assert_eq!(input.get("code"), None);
    }

    #[test]
    fn test_sso_page_omits_absent_fields() {
        let org = Organization::new("acme", "Acme");
        let page = LoginPage {
            template: ORGANIZATION_LOGIN_TEMPLATE,
            organization: Some((&org).into()),
            ..LoginPage::default()
        };
        let json = serde_json::to_value(&page).unwrap();
        assert_eq!(json["organization"]["slug"], "acme");
        assert!(json.get("provider_key").is_none());
        assert!(json.get("prompt").is_none());
        assert_eq!(json["can_register"], false);
        assert_eq!(json["messages"], serde_json::json!([]));
    }

    #[test]
    fn test_prompt_switches_template() {
        let page = LoginPage::default().with_prompt(Prompt::Email);
        assert_eq!(page.template, ASK_EMAIL_TEMPLATE);
        assert_eq!(page.prompt.unwrap().field, "email");
    }

    #[test]
    fn test_found_sets_location() {
        let response = found("/auth/login/");
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers()[header::LOCATION], "/auth/login/");
    }
}

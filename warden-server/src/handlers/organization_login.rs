//! Organization login controller
//!
//! `GET|POST /auth/login/{organization_slug}/` picks between SSO through the
//! organization's auth provider and basic credential login. The whole
//! request runs in one [`LoginTransaction`].

use axum::{
    extract::{rejection::FormRejection, Path, State},
    response::{IntoResponse, Response},
    Form, Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use chrono::Utc;
use tower_sessions::Session;
use warden_core::{AuthFlow, AuthHelper, Organization, Provider};

use crate::error::ApiError;
use crate::handlers::login::{
    basic_login, form_or_default, found, LoginForm, LoginPage, LOGIN_PATH,
};
use crate::handlers::sso::{advance, generic_error};
use crate::handlers::AppState;
use crate::session::{LoginTransaction, MessageLevel};

/// Cookie set by the front end when a session timed out
pub const SESSION_EXPIRED_COOKIE: &str = "session_expired";
pub const SESSION_EXPIRED_MESSAGE: &str = "Your session has expired.";

async fn handle(
    state: AppState,
    slug: String,
    jar: CookieJar,
    session: Session,
    form: Option<LoginForm>,
) -> Result<Response, ApiError> {
    let session_expired = jar.get(SESSION_EXPIRED_COOKIE).is_some();
    let mut txn = LoginTransaction::begin(&state.directory, session).await?;

    let Some(organization) = txn
        .directory()
        .await?
        .organization_by_slug(&slug)
        .await?
        .filter(|o| o.status.is_visible())
    else {
        tracing::debug!(organization = %slug, "Login requested for unknown organization");
        return Ok(found(LOGIN_PATH));
    };

    txn.session().set_test_cookie();
    let auth_provider = txn
        .directory()
        .await?
        .auth_provider_for(organization.id)
        .await?;

    if session_expired {
        txn.session()
            .add_message(MessageLevel::Warning, SESSION_EXPIRED_MESSAGE);
    }

    let response = match auth_provider {
        None => basic_login(&state, &mut txn, Some(&organization), form.as_ref()).await?,
        Some(auth_provider) => {
            let provider = Provider::from_auth_provider(&auth_provider)?;
            sso_login(&state, &mut txn, &organization, &provider, form.as_ref()).await?
        }
    };

    txn.commit().await?;

    if session_expired {
        let jar = jar.remove(Cookie::build(SESSION_EXPIRED_COOKIE).path("/"));
        return Ok((jar, response).into_response());
    }
    Ok(response)
}

async fn sso_login(
    state: &AppState,
    txn: &mut LoginTransaction,
    organization: &Organization,
    provider: &Provider,
    form: Option<&LoginForm>,
) -> Result<Response, ApiError> {
    let Some(form) = form else {
        let authenticated = txn.session().is_authenticated();
        let messages = txn.session().take_messages().await?;
        let page = LoginPage::sso(organization, provider, authenticated, messages);
        return Ok(Json(page).into_response());
    };

    let stored = txn.session().handshake().await?;
    let mut helper = AuthHelper::new(organization, provider, AuthFlow::Login, stored);
    let now = Utc::now();

    if form.wants_init() {
        helper.initialize(state.entropy.as_ref(), now)?;
    }

    if !helper.is_valid(now) {
        return Ok(generic_error(
            txn,
            "handshake missing, stale or for another organization",
            &organization.login_path(),
        ));
    }

    advance(state, txn, organization, provider, helper, &form.step_input()).await
}

/// Organization login page
#[utoipa::path(
    get,
    path = "/auth/login/{organization_slug}/",
    tag = "Login",
    params(("organization_slug" = String, Path, description = "Organization slug")),
    responses(
        (status = 200, description = "Login page", body = LoginPage),
        (status = 302, description = "Unknown organization, redirected to the generic login")
    )
)]
pub async fn organization_login_page(
    State(state): State<AppState>,
    Path(organization_slug): Path<String>,
    jar: CookieJar,
    session: Session,
) -> Result<Response, ApiError> {
    handle(state, organization_slug, jar, session, None).await
}

/// Submit the organization login form or step the SSO handshake
#[utoipa::path(
    post,
    path = "/auth/login/{organization_slug}/",
    tag = "Login",
    params(("organization_slug" = String, Path, description = "Organization slug")),
    request_body(content = LoginForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Login or prompt page", body = LoginPage),
        (status = 302, description = "Provider redirect, login success or generic error")
    )
)]
pub async fn organization_login_submit(
    State(state): State<AppState>,
    Path(organization_slug): Path<String>,
    jar: CookieJar,
    session: Session,
    form: Result<Form<LoginForm>, FormRejection>,
) -> Result<Response, ApiError> {
    let form = form_or_default(form);
    handle(state, organization_slug, jar, session, Some(form)).await
}

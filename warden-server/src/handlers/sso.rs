//! SSO handshake stepping and the provider callback
//!
//! `advance` is shared by the organization login POST and by `/auth/sso/`,
//! which is where OAuth2 providers send the user back to.

use axum::{
    extract::{rejection::FormRejection, Query, State},
    response::{IntoResponse, Response},
    Form, Json,
};
use chrono::Utc;
use tower_sessions::Session;
use warden_core::{AuthFlow, AuthHelper, Organization, Provider, StepContext, StepInput, StepOutcome};

use crate::error::ApiError;
use crate::handlers::login::{form_or_default, found, LoginForm, LoginPage, LOGIN_PATH};
use crate::handlers::AppState;
use crate::session::{LoginTransaction, MessageLevel};

pub const GENERIC_ERROR: &str = "Something unexpected happened during authentication.";

/// Abort the handshake with the generic error.
///
/// `cause` goes to the logs only.
pub fn generic_error(txn: &mut LoginTransaction, cause: &str, back_to: &str) -> Response {
    tracing::warn!(cause, "SSO handshake aborted");
    txn.session().add_message(MessageLevel::Error, GENERIC_ERROR);
    txn.session().clear_handshake();
    found(back_to)
}

/// Run the handshake as far as `input` allows and build the response.
pub async fn advance(
    state: &AppState,
    txn: &mut LoginTransaction,
    organization: &Organization,
    provider: &Provider,
    mut helper: AuthHelper<'_>,
    input: &StepInput,
) -> Result<Response, ApiError> {
    let ctx = StepContext {
        callback_url: state.config.sso_callback_url(),
        now: Utc::now(),
    };
    let outcome = helper.current_step(input, &ctx);
    let flow = helper.flow();
    let handshake = helper.into_session();

    let pending = match outcome {
        StepOutcome::Failed(reason) => {
            return Ok(generic_error(txn, &reason, &organization.login_path()));
        }
        StepOutcome::Redirect(url) => {
            if let Some(handshake) = &handshake {
                txn.session().store_handshake(handshake)?;
            }
            tracing::debug!(provider = %provider.key, "Redirecting to identity provider");
            return Ok(found(url.as_str()));
        }
        StepOutcome::Prompt(prompt) => {
            if let Some(handshake) = &handshake {
                txn.session().store_handshake(handshake)?;
            }
            let authenticated = txn.session().is_authenticated();
            let messages = txn.session().take_messages().await?;
            let page =
                LoginPage::sso(organization, provider, authenticated, messages).with_prompt(prompt);
            return Ok(Json(page).into_response());
        }
        StepOutcome::Finished(pending) => pending,
    };

    txn.release_directory().await?;
    let identity = match state
        .identity
        .resolve(provider, &pending, &ctx.callback_url)
        .await
    {
        Ok(identity) => identity,
        Err(e) => return Ok(generic_error(txn, &e.to_string(), &organization.login_path())),
    };

    if flow == AuthFlow::Setup {
        tracing::info!(
            organization = %organization.slug,
            provider = %provider.key,
            "Provider linked"
        );
        txn.session().clear_handshake();
        return Ok(found(&flow.success_path(organization)));
    }

    let Some(user) = txn
        .directory()
        .await?
        .find_user_by_email(&identity.email)
        .await?
        .filter(|u| u.is_active)
    else {
        return Ok(generic_error(
            txn,
            "no active user for provider identity",
            &organization.login_path(),
        ));
    };

    txn.session().login(user.id);
    txn.session().clear_handshake();
    tracing::info!(
        user_id = %user.id,
        organization = %organization.slug,
        provider = %provider.key,
        "User logged in through SSO"
    );
    Ok(found(&flow.success_path(organization)))
}

async fn continue_handshake(
    state: AppState,
    session: Session,
    params: LoginForm,
) -> Result<Response, ApiError> {
    let mut txn = LoginTransaction::begin(&state.directory, session).await?;
    let response = callback_response(&state, &mut txn, &params).await?;
    txn.commit().await?;
    Ok(response)
}

async fn callback_response(
    state: &AppState,
    txn: &mut LoginTransaction,
    params: &LoginForm,
) -> Result<Response, ApiError> {
    let Some(stored) = txn.session().handshake().await? else {
        return Ok(generic_error(txn, "no pending handshake", LOGIN_PATH));
    };

    let Some(organization) = txn
        .directory()
        .await?
        .organization_by_id(stored.organization_id)
        .await?
        .filter(|o| o.status.is_visible())
    else {
        return Ok(generic_error(txn, "handshake organization is gone", LOGIN_PATH));
    };

    let Some(auth_provider) = txn.directory().await?.auth_provider_for(organization.id).await? else {
        return Ok(generic_error(
            txn,
            "organization no longer has a provider",
            &organization.login_path(),
        ));
    };
    let provider = Provider::from_auth_provider(&auth_provider)?;

    let flow = stored.flow;
    let helper = AuthHelper::new(&organization, &provider, flow, Some(stored));
    if !helper.is_valid(Utc::now()) {
        return Ok(generic_error(
            txn,
            "stored handshake is invalid",
            &organization.login_path(),
        ));
    }

    advance(state, txn, &organization, &provider, helper, &params.step_input()).await
}

/// Provider callback (query string)
#[utoipa::path(
    get,
    path = "/auth/sso/",
    tag = "Login",
    params(
        ("code" = Option<String>, Query, description = "OAuth2 authorization code"),
        ("state" = Option<String>, Query, description = "OAuth2 state echo"),
        ("error" = Option<String>, Query, description = "OAuth2 error")
    ),
    responses(
        (status = 302, description = "Redirect to the provider, the organization or back to login"),
        (status = 200, description = "Prompt page", body = LoginPage)
    )
)]
pub async fn sso_callback(
    State(state): State<AppState>,
    session: Session,
    Query(params): Query<LoginForm>,
) -> Result<Response, ApiError> {
    continue_handshake(state, session, params).await
}

/// Provider callback (form post)
#[utoipa::path(
    post,
    path = "/auth/sso/",
    tag = "Login",
    request_body(content = LoginForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 302, description = "Redirect to the provider, the organization or back to login"),
        (status = 200, description = "Prompt page", body = LoginPage)
    )
)]
pub async fn sso_callback_submit(
    State(state): State<AppState>,
    session: Session,
    form: Result<Form<LoginForm>, FormRejection>,
) -> Result<Response, ApiError> {
    continue_handshake(state, session, form_or_default(form)).await
}

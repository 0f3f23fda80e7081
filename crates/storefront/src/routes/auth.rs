//! Login, registration and logout.
//!
//! Token issuance belongs to the backend; these handlers relay the forms,
//! store the returned token through the
//! [`AuthStore`](crate::services::auth_store::AuthStore) and replay any
//! checkout that was waiting on the login.

use std::collections::BTreeMap;

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tracing::instrument;
use union_bakery_core::Email;

use crate::backend::{BackendError, LoginPayload, RegisterPayload};
use crate::error::{AppError, clear_sentry_user};
use crate::filters;
use crate::middleware::OptionalAuth;
use crate::routes::PageContext;
use crate::services::auth_store::AuthSnapshot;
use crate::services::checkout::CheckoutOutcome;
use crate::state::AppState;
use crate::storage::ClientStorage;

/// Where visitors land when no usable return path was given.
const DEFAULT_RETURN_PATH: &str = "/home";

const LOGIN_FAILED_MESSAGE: &str = "Unable to login. Please try again.";
const REGISTER_FAILED_MESSAGE: &str = "Unable to register. Please try again.";

/// Resolve the `ref` return path.
///
/// Absolute and protocol-relative URLs are refused so a crafted link cannot
/// bounce the visitor off-site.
#[must_use]
pub fn safe_return_path(reference: Option<&str>) -> String {
    match reference.map(str::trim).filter(|r| !r.is_empty()) {
        Some(r) if r.starts_with("http") || r.starts_with("//") || r.starts_with("/\\") => {
            DEFAULT_RETURN_PATH.to_string()
        }
        Some(r) if r.starts_with('/') => r.to_string(),
        Some(r) => format!("/{r}"),
        None => DEFAULT_RETURN_PATH.to_string(),
    }
}

/// Query parameters of the auth pages.
#[derive(Debug, Default, Deserialize)]
pub struct AuthQuery {
    #[serde(rename = "ref")]
    pub reference: Option<String>,
    #[serde(default)]
    pub registered: Option<String>,
}

/// Login form data.
#[derive(Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(rename = "ref", default)]
    pub reference: Option<String>,
}

/// Registration form data.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterForm {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(rename = "ref", default)]
    pub reference: Option<String>,
}

/// Login page template.
#[derive(Template, WebTemplate)]
#[template(path = "pages/login.html")]
pub struct LoginTemplate {
    pub page: PageContext,
    pub reference: String,
    pub email: String,
    pub errors: BTreeMap<String, String>,
    pub error: Option<String>,
    pub notice: Option<String>,
}

/// Register page template.
#[derive(Template, WebTemplate)]
#[template(path = "pages/register.html")]
pub struct RegisterTemplate {
    pub page: PageContext,
    pub reference: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub errors: BTreeMap<String, String>,
    pub error: Option<String>,
}

impl LoginTemplate {
    fn field_error(&self, field: &str) -> Option<&str> {
        self.errors.get(field).map(String::as_str)
    }
}

impl RegisterTemplate {
    fn field_error(&self, field: &str) -> Option<&str> {
        self.errors.get(field).map(String::as_str)
    }
}

/// Split a backend failure into field messages and a banner message.
fn failure(error: &BackendError, fallback: &str) -> (BTreeMap<String, String>, String) {
    let message = match error {
        BackendError::Api { body, .. } if !body.message.trim().is_empty() => body.message.clone(),
        _ => fallback.to_string(),
    };
    (error.field_errors(), message)
}

/// Validate the email field locally before bothering the backend.
fn check_email(email: &str, errors: &mut BTreeMap<String, String>) -> Option<Email> {
    Email::parse(email)
        .map_err(|e| errors.insert("email".to_string(), e.to_string()))
        .ok()
}

fn check_password(password: &str, errors: &mut BTreeMap<String, String>) {
    if password.is_empty() {
        errors.insert("password".to_string(), "Please enter a password".to_string());
    }
}

/// Store the new token, then replay a checkout that was waiting on it.
///
/// Returns where to send the visitor next.
async fn sign_in(
    state: &AppState,
    storage: &ClientStorage,
    payload: union_bakery_core::AuthPayload,
    return_path: String,
) -> Result<String, AppError> {
    let snapshot = state.auth_store(storage.clone()).set_auth(payload).await?;
    tracing::info!(expires_at = ?snapshot.expires_at(), "Signed in");

    let next = match state.checkout(storage.clone()).resume_pending(&snapshot).await? {
        Some(CheckoutOutcome::Completed { .. }) => "/checkout".to_string(),
        Some(outcome) => {
            tracing::warn!(?outcome, "Resumed checkout did not complete");
            "/cart".to_string()
        }
        None => return_path,
    };
    Ok(next)
}

/// Display login page.
#[instrument(skip(state, storage, auth, query))]
pub async fn login_page(
    State(state): State<AppState>,
    storage: ClientStorage,
    OptionalAuth(auth): OptionalAuth,
    Query(query): Query<AuthQuery>,
) -> impl IntoResponse {
    let notice = query
        .registered
        .is_some()
        .then(|| "Account created. Please log in.".to_string());

    LoginTemplate {
        page: PageContext::load(&state, &storage, &auth).await,
        reference: safe_return_path(query.reference.as_deref()),
        email: String::new(),
        errors: BTreeMap::new(),
        error: None,
        notice,
    }
}

/// Handle login form submission.
#[instrument(skip(state, storage, form))]
pub async fn login(
    State(state): State<AppState>,
    storage: ClientStorage,
    Form(form): Form<LoginForm>,
) -> Result<Response, AppError> {
    let return_path = safe_return_path(form.reference.as_deref());

    let mut errors = BTreeMap::new();
    let email = check_email(&form.email, &mut errors);
    check_password(&form.password, &mut errors);

    let result = match email {
        Some(email) if errors.is_empty() => {
            let payload = LoginPayload {
                email: email.into_inner(),
                password: form.password,
            };
            state.backend().login(&payload).await
        }
        _ => {
            return render_login(&state, &storage, form.email, return_path, errors, None).await;
        }
    };

    match result {
        Ok(payload) => {
            let next = sign_in(&state, &storage, payload, return_path).await?;
            Ok(Redirect::to(&next).into_response())
        }
        Err(e) => {
            tracing::warn!(error = %e, "Login failed");
            let (errors, message) = failure(&e, LOGIN_FAILED_MESSAGE);
            render_login(&state, &storage, form.email, return_path, errors, Some(message)).await
        }
    }
}

async fn render_login(
    state: &AppState,
    storage: &ClientStorage,
    email: String,
    reference: String,
    errors: BTreeMap<String, String>,
    error: Option<String>,
) -> Result<Response, AppError> {
    let page = PageContext::load(state, storage, &AuthSnapshot::anonymous()).await;
    Ok((
        StatusCode::UNPROCESSABLE_ENTITY,
        LoginTemplate {
            page,
            reference,
            email,
            errors,
            error,
            notice: None,
        },
    )
        .into_response())
}

/// Display register page.
#[instrument(skip(state, storage, auth, query))]
pub async fn register_page(
    State(state): State<AppState>,
    storage: ClientStorage,
    OptionalAuth(auth): OptionalAuth,
    Query(query): Query<AuthQuery>,
) -> impl IntoResponse {
    RegisterTemplate {
        page: PageContext::load(&state, &storage, &auth).await,
        reference: safe_return_path(query.reference.as_deref()),
        first_name: String::new(),
        last_name: String::new(),
        email: String::new(),
        errors: BTreeMap::new(),
        error: None,
    }
}

/// Handle register form submission.
///
/// When the backend logs the new customer in straight away they are signed
/// in here too; otherwise they are sent to the login page.
#[instrument(skip(state, storage, form))]
pub async fn register(
    State(state): State<AppState>,
    storage: ClientStorage,
    Form(form): Form<RegisterForm>,
) -> Result<Response, AppError> {
    let return_path = safe_return_path(form.reference.as_deref());

    let mut errors = BTreeMap::new();
    if form.first_name.trim().is_empty() {
        errors.insert("firstName".to_string(), "Please enter your first name".to_string());
    }
    let email = check_email(&form.email, &mut errors);
    check_password(&form.password, &mut errors);

    let result = match email {
        Some(email) if errors.is_empty() => {
            let payload = RegisterPayload {
                email: email.into_inner(),
                password: form.password.clone(),
                first_name: form.first_name.trim().to_string(),
                last_name: form.last_name.trim().to_string(),
            };
            state.backend().register(&payload).await
        }
        _ => return render_register(&state, &storage, form, return_path, errors, None).await,
    };

    match result {
        Ok(Some(payload)) => {
            let next = sign_in(&state, &storage, payload, return_path).await?;
            Ok(Redirect::to(&next).into_response())
        }
        Ok(None) => {
            tracing::info!("Registered; asking the customer to log in");
            let login = format!(
                "/auth/login?registered=1&ref={}",
                urlencoding::encode(&return_path)
            );
            Ok(Redirect::to(&login).into_response())
        }
        Err(e) => {
            tracing::warn!(error = %e, "Registration failed");
            let (errors, message) = failure(&e, REGISTER_FAILED_MESSAGE);
            render_register(&state, &storage, form, return_path, errors, Some(message)).await
        }
    }
}

async fn render_register(
    state: &AppState,
    storage: &ClientStorage,
    form: RegisterForm,
    reference: String,
    errors: BTreeMap<String, String>,
    error: Option<String>,
) -> Result<Response, AppError> {
    let page = PageContext::load(state, storage, &AuthSnapshot::anonymous()).await;
    Ok((
        StatusCode::UNPROCESSABLE_ENTITY,
        RegisterTemplate {
            page,
            reference,
            first_name: form.first_name,
            last_name: form.last_name,
            email: form.email,
            errors,
            error,
        },
    )
        .into_response())
}

/// Handle logout.
///
/// Forgets the token and announces it to the visitor's other tabs.
#[instrument(skip(state, storage))]
pub async fn logout(
    State(state): State<AppState>,
    storage: ClientStorage,
) -> Result<Redirect, AppError> {
    state.auth_store(storage).clear_auth().await?;
    clear_sentry_user();
    tracing::info!("Signed out");
    Ok(Redirect::to(DEFAULT_RETURN_PATH))
}

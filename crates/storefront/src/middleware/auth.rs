//! Authentication extractors.
//!
//! Both extractors read the visitor's auth state through the
//! [`AuthStore`](crate::services::auth_store::AuthStore), so an expired token
//! is purged and announced on the same read that finds it expired.

use axum::{
    Json,
    extract::{FromRequestParts, OriginalUri},
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Redirect, Response},
};
use serde_json::json;

use crate::services::auth_store::AuthSnapshot;
use crate::state::AppState;
use crate::storage::ClientStorage;

/// Extractor that requires a valid access token.
///
/// Page requests without one are redirected to the login page with a `ref`
/// back to where they came from; `/api` requests get a 401.
///
/// # Example
///
/// ```rust,ignore
/// async fn account(RequireAuth(auth): RequireAuth) -> impl IntoResponse {
///     format!("token expires at {:?}", auth.expires_at())
/// }
/// ```
pub struct RequireAuth(pub AuthSnapshot);

/// Error returned when authentication is required but missing.
pub enum AuthRejection {
    /// Redirect to login page (for HTML requests).
    RedirectToLogin(String),
    /// Unauthorized response (for API requests).
    Unauthorized,
    /// The session could not be read.
    Unavailable,
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        match self {
            Self::RedirectToLogin(to) => Redirect::to(&to).into_response(),
            Self::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "success": false, "message": "Please log in to continue." })),
            )
                .into_response(),
            Self::Unavailable => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        }
    }
}

/// Login URL returning to `path` afterwards.
#[must_use]
pub fn login_url_for(path: &str) -> String {
    format!("/auth/login?ref={}", urlencoding::encode(path))
}

async fn snapshot(parts: &mut Parts, state: &AppState) -> Option<AuthSnapshot> {
    let storage = ClientStorage::from_request_parts(parts, state).await.ok()?;
    match state.auth_store(storage).snapshot().await {
        Ok(snapshot) => Some(snapshot),
        Err(e) => {
            tracing::error!(error = %e, "Failed to read auth state");
            None
        }
    }
}

impl FromRequestParts<AppState> for RequireAuth {
    type Rejection = AuthRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let snapshot = snapshot(parts, state).await.ok_or(AuthRejection::Unavailable)?;
        if snapshot.is_auth() {
            return Ok(Self(snapshot));
        }

        // Nested routers see a stripped URI; the return path needs the full one.
        let path = parts
            .extensions
            .get::<OriginalUri>()
            .map_or_else(|| parts.uri.path(), |original| original.path());
        if path.starts_with("/api/") {
            Err(AuthRejection::Unauthorized)
        } else {
            Err(AuthRejection::RedirectToLogin(login_url_for(path)))
        }
    }
}

/// Extractor that reads the auth state without requiring it.
///
/// A session failure reads as anonymous.
pub struct OptionalAuth(pub AuthSnapshot);

impl FromRequestParts<AppState> for OptionalAuth {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        Ok(Self(snapshot(parts, state).await.unwrap_or_default()))
    }
}

//! Same-origin JSON proxy to the bakery backend.
//!
//! `/api/{endpoint}` forwards the browser's request to the backend with its
//! cookies (minus the storefront session cookie) and `Authorization` header,
//! and relays status, body and `Set-Cookie` back unchanged. Only the
//! backend's own endpoints are forwarded; anything else is a 404.
//!
//! Two endpoints get extra handling:
//!
//! - `login` mints an http-only `accessToken` cookie from the returned token
//!   and stores the token in the visitor's session
//! - `customer` falls back to the `accessToken` cookie when no
//!   `Authorization` header was sent

use axum::{
    Json,
    body::Bytes,
    extract::{Path, RawQuery, State},
    http::{HeaderMap, HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value, json};
use tower_sessions::cookie::{Cookie, SameSite, time::OffsetDateTime};
use tracing::instrument;

use crate::backend::{
    BackendError, GENERIC_FAILURE_MESSAGE, NOT_CONFIGURED_MESSAGE, extract_auth_payload,
    redirected_to_login,
};
use crate::error::{AppError, clear_sentry_user};
use crate::middleware::session::SESSION_COOKIE_NAME;
use crate::state::AppState;
use crate::storage::ClientStorage;

/// Cookie carrying the bearer token for the proxy.
pub const ACCESS_TOKEN_COOKIE: &str = "accessToken";

/// A backend endpoint the proxy forwards to.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Endpoint {
    Login,
    Register,
    Customer,
    AllProducts,
    Product(String),
    CreateCart,
    CartLineAdd,
    GetCart,
    UpdateCartLine,
    RemoveCartItem,
    UpdateBuyerIdentity,
    Checkout,
}

impl Endpoint {
    /// Match the path after `/api/`.
    fn parse(path: &str) -> Option<Self> {
        let path = path.trim_matches('/');
        let endpoint = match path {
            "login" => Self::Login,
            "register" => Self::Register,
            "customer" => Self::Customer,
            "all-products" => Self::AllProducts,
            "createCart" => Self::CreateCart,
            "cart-line-add" => Self::CartLineAdd,
            "get-cart" => Self::GetCart,
            "update-cart-line" => Self::UpdateCartLine,
            "remove-cart-item" => Self::RemoveCartItem,
            "update-cart-buyer-identity" => Self::UpdateBuyerIdentity,
            "checkout" => Self::Checkout,
            other => {
                let slug = other.strip_prefix("product/")?;
                if slug.is_empty() || slug.contains('/') {
                    return None;
                }
                Self::Product(slug.to_string())
            }
        };
        Some(endpoint)
    }

    /// The method the backend expects.
    const fn method(&self) -> Method {
        match self {
            Self::Customer | Self::AllProducts | Self::Product(_) => Method::GET,
            _ => Method::POST,
        }
    }

    fn backend_path(&self) -> String {
        match self {
            Self::Login => "/login".to_string(),
            Self::Register => "/register".to_string(),
            Self::Customer => "/customer".to_string(),
            Self::AllProducts => "/all-products".to_string(),
            Self::Product(slug) => format!("/product/{}", urlencoding::encode(slug)),
            Self::CreateCart => "/createCart".to_string(),
            Self::CartLineAdd => "/cart-line-add".to_string(),
            Self::GetCart => "/get-cart".to_string(),
            Self::UpdateCartLine => "/update-cart-line".to_string(),
            Self::RemoveCartItem => "/remove-cart-item".to_string(),
            Self::UpdateBuyerIdentity => "/update-cart-buyer-identity".to_string(),
            Self::Checkout => "/checkout".to_string(),
        }
    }
}

/// `{ success: false, message }` with the given status.
fn failure(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "success": false, "message": message }))).into_response()
}

/// Value of the cookie `name` in a `Cookie` request header.
fn request_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(Cookie::split_parse)
        .filter_map(Result::ok)
        .find(|cookie| cookie.name() == name)
        .map(|cookie| cookie.value().to_string())
}

/// Names of every cookie the browser sent.
fn request_cookie_names(headers: &HeaderMap) -> Vec<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(Cookie::split_parse)
        .filter_map(Result::ok)
        .map(|cookie| cookie.name().to_string())
        .collect()
}

/// The browser's cookies minus the storefront session, as a `Cookie`
/// header for the backend.
fn forwarded_cookies(headers: &HeaderMap) -> Option<String> {
    let cookies: Vec<String> = headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(Cookie::split_parse)
        .filter_map(Result::ok)
        .filter(|cookie| cookie.name() != SESSION_COOKIE_NAME)
        .map(|cookie| format!("{}={}", cookie.name(), cookie.value()))
        .collect();
    (!cookies.is_empty()).then(|| cookies.join("; "))
}

/// The bearer token to forward: the header if present, else the cookie.
fn forwarded_authorization(endpoint: &Endpoint, headers: &HeaderMap) -> Option<String> {
    let header = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    match endpoint {
        Endpoint::Customer => header.or_else(|| request_cookie(headers, ACCESS_TOKEN_COOKIE)),
        _ => header,
    }
}

/// `{ status, ...data }`: the backend's fields win over `status`.
fn with_status(status: StatusCode, data: Value) -> Value {
    let mut merged = Map::new();
    merged.insert("status".to_string(), json!(status.as_u16()));
    match data {
        Value::Object(fields) => merged.extend(fields),
        other => {
            merged.insert("data".to_string(), other);
        }
    }
    Value::Object(merged)
}

/// The http-only cookie carrying a freshly issued token.
fn access_token_cookie(
    token: &str,
    expires_at: Option<DateTime<Utc>>,
    secure: bool,
) -> Cookie<'static> {
    let mut cookie = Cookie::build((ACCESS_TOKEN_COOKIE, token.to_string()))
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .path("/")
        .build();
    let expires = expires_at.and_then(|at| OffsetDateTime::from_unix_timestamp(at.timestamp()).ok());
    if let Some(at) = expires {
        cookie.set_expires(at);
    }
    cookie
}

/// A cookie that deletes `name` in the browser.
fn expired_cookie(name: String) -> Cookie<'static> {
    Cookie::build((name, ""))
        .path("/")
        .max_age(tower_sessions::cookie::time::Duration::ZERO)
        .build()
}

fn append_cookie(response: &mut Response, cookie: &Cookie<'_>) {
    match HeaderValue::from_str(&cookie.to_string()) {
        Ok(value) => {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
        Err(e) => tracing::warn!(error = %e, cookie = cookie.name(), "Unencodable cookie"),
    }
}

/// Store a token the backend issued through the proxy, then replay any
/// checkout that was waiting on it.
async fn adopt_login(state: &AppState, storage: &ClientStorage, data: &Value) {
    let Some(payload) = extract_auth_payload(data) else {
        return;
    };
    let snapshot = match state.auth_store(storage.clone()).set_auth(payload).await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            tracing::warn!(error = %e, "Proxied login returned an unusable token");
            return;
        }
    };
    match state.checkout(storage.clone()).resume_pending(&snapshot).await {
        Ok(Some(outcome)) => tracing::info!(?outcome, "Resumed checkout after proxied login"),
        Ok(None) => {}
        Err(e) => tracing::warn!(error = %e, "Failed to resume checkout after proxied login"),
    }
}

/// Forward `/api/{path}` to the backend.
#[instrument(skip(state, storage, headers, query, body), fields(path = %path))]
pub async fn proxy(
    State(state): State<AppState>,
    Path(path): Path<String>,
    method: Method,
    RawQuery(query): RawQuery,
    storage: ClientStorage,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(endpoint) = Endpoint::parse(&path) else {
        return failure(StatusCode::NOT_FOUND, "Not found");
    };
    if method != endpoint.method() {
        return failure(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed");
    }

    let backend_path = endpoint.backend_path();
    let mut url = match state.client().endpoint(&backend_path) {
        Ok(url) => url,
        Err(BackendError::NotConfigured) => {
            tracing::error!("Proxy called without API_BASE_URL");
            return failure(StatusCode::INTERNAL_SERVER_ERROR, NOT_CONFIGURED_MESSAGE);
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to build backend URL");
            return failure(StatusCode::INTERNAL_SERVER_ERROR, GENERIC_FAILURE_MESSAGE);
        }
    };
    url.set_query(query.as_deref().filter(|q| !q.is_empty()));

    let mut request = state
        .client()
        .http()
        .request(endpoint.method(), url)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(cookies) = forwarded_cookies(&headers) {
        request = request.header(header::COOKIE, cookies);
    }
    if let Some(token) = forwarded_authorization(&endpoint, &headers) {
        request = request.header(header::AUTHORIZATION, token);
    }
    if endpoint.method() == Method::POST {
        request = request.body(body);
    }

    let response = match request.send().await {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(error = %e, "Backend request failed");
            return failure(StatusCode::BAD_GATEWAY, GENERIC_FAILURE_MESSAGE);
        }
    };
    if redirected_to_login(&backend_path, response.url().path()) {
        tracing::warn!("Backend redirected proxied request to login");
        return failure(StatusCode::UNAUTHORIZED, "Please log in to continue.");
    }

    let status = response.status();
    let set_cookies: Vec<HeaderValue> = response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .cloned()
        .collect();
    let data: Value = match response.json().await {
        Ok(data) => data,
        Err(e) => {
            tracing::error!(error = %e, status = %status, "Backend returned unreadable body");
            return failure(StatusCode::BAD_GATEWAY, GENERIC_FAILURE_MESSAGE);
        }
    };

    let mut minted = None;
    let data = if endpoint == Endpoint::Login {
        if status.is_success() {
            adopt_login(&state, &storage, &data).await;
        }
        minted = extract_auth_payload(&data)
            .filter(|payload| !payload.access_token.is_empty())
            .map(|payload| {
                access_token_cookie(
                    &payload.access_token,
                    payload.expiry(),
                    state.config().secure_cookies(),
                )
            });
        with_status(status, data)
    } else {
        data
    };

    let mut response = (status, Json(data)).into_response();
    for value in set_cookies {
        response.headers_mut().append(header::SET_COOKIE, value);
    }
    if let Some(cookie) = minted {
        append_cookie(&mut response, &cookie);
    }
    response
}

/// Clear every cookie the browser sent and forget the session token.
///
/// The session cookie itself survives, so the cart stays put.
#[instrument(skip(state, storage, headers))]
pub async fn logout(
    State(state): State<AppState>,
    storage: ClientStorage,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    state.auth_store(storage).clear_auth().await?;
    clear_sentry_user();

    let mut response = Json(json!({ "ok": true })).into_response();
    for name in request_cookie_names(&headers) {
        if name != SESSION_COOKIE_NAME {
            append_cookie(&mut response, &expired_cookie(name));
        }
    }
    tracing::info!("Signed out through the proxy");
    Ok(response)
}

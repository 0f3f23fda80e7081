//! reqwest implementation of [`BackendApi`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::instrument;
use union_bakery_core::AuthPayload;
use url::Url;

use super::{
    AddCartLinePayload, ApiErrorBody, ApiSuccess, BackendApi, BackendError, CartData,
    CartIdPayload, CheckoutPayload, CheckoutResult, CustomerProfile, GetCartData, LineInput,
    LoginPayload, ProductDetail, ProductListItem, RegisterPayload, RemoveCartItemPayload,
    UpdateCartLineData, UpdateCartLinePayload,
};

/// Message returned when `API_BASE_URL` is unset.
pub const NOT_CONFIGURED_MESSAGE: &str = "API base URL is not configured.";

/// Client for the bakery backend.
///
/// Cheaply cloneable; the underlying connection pool is shared.
#[derive(Clone)]
pub struct BackendClient {
    inner: Arc<BackendClientInner>,
}

struct BackendClientInner {
    client: reqwest::Client,
    base_url: Option<Url>,
}

impl BackendClient {
    /// Create a new client.
    ///
    /// A missing `base_url` is not an error here: every call then fails with
    /// [`BackendError::NotConfigured`], matching how the proxy routes behave.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: Option<Url>, timeout: Duration) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("union-bakery-storefront/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            inner: Arc::new(BackendClientInner { client, base_url }),
        })
    }

    /// The shared HTTP client, for raw forwarding.
    #[must_use]
    pub fn http(&self) -> &reqwest::Client {
        &self.inner.client
    }

    /// Resolve a backend path (`/get-cart`) against the base URL.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::NotConfigured`] when no base URL is set.
    pub fn endpoint(&self, path: &str) -> Result<Url, BackendError> {
        let base = self
            .inner
            .base_url
            .as_ref()
            .ok_or(BackendError::NotConfigured)?;
        let joined = format!(
            "{}/{}",
            base.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        Url::parse(&joined).map_err(|e| BackendError::Malformed(format!("bad endpoint: {e}")))
    }

    /// Send a request and return the raw JSON body of a successful response.
    async fn send_raw<B: Serialize + Sync>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        token: Option<&str>,
    ) -> Result<Value, BackendError> {
        let url = self.endpoint(path)?;
        let mut request = self.inner.client.request(method, url);
        if let Some(token) = token {
            request = request.header(reqwest::header::AUTHORIZATION, token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        if is_login_redirect(&response, path) {
            tracing::warn!(path, "Backend redirected to login");
            return Err(BackendError::AuthRedirect);
        }

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            tracing::warn!(
                status = %status,
                path,
                body = %text.chars().take(300).collect::<String>(),
                "Backend returned non-success status"
            );
            return Err(match serde_json::from_str::<ApiErrorBody>(&text) {
                Ok(body) => BackendError::Api {
                    status: status.as_u16(),
                    body,
                },
                Err(_) => BackendError::Status {
                    status: status.as_u16(),
                },
            });
        }

        let value: Value = serde_json::from_str(&text).map_err(|e| {
            tracing::error!(
                error = %e,
                path,
                body = %text.chars().take(300).collect::<String>(),
                "Failed to parse backend response"
            );
            e
        })?;

        if value.get("success").and_then(Value::as_bool) == Some(false) {
            let body: ApiErrorBody = serde_json::from_value(value)?;
            return Err(BackendError::Api {
                status: status.as_u16(),
                body,
            });
        }

        Ok(value)
    }

    /// Send a request and decode the `data` of the success envelope.
    async fn send<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        token: Option<&str>,
    ) -> Result<T, BackendError> {
        let value = self.send_raw(method, path, body, token).await?;
        let envelope: ApiSuccess<T> = serde_json::from_value(value)?;
        Ok(envelope.data)
    }

    async fn post<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        token: Option<&str>,
    ) -> Result<T, BackendError> {
        self.send(Method::POST, path, Some(body), token).await
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        token: Option<&str>,
    ) -> Result<T, BackendError> {
        self.send::<(), T>(Method::GET, path, None, token).await
    }
}

/// Whether the response was bounced to a login page.
///
/// Requests that target a login path themselves are never flagged.
fn is_login_redirect(response: &Response, request_path: &str) -> bool {
    redirected_to_login(request_path, response.url().path())
}

/// Whether a request for `request_path` that ended at `final_path` was
/// bounced to a login page.
#[must_use]
pub fn redirected_to_login(request_path: &str, final_path: &str) -> bool {
    if request_path.to_lowercase().contains("/login") {
        return false;
    }
    final_path.to_lowercase().contains("/login")
}

/// Pull an access token out of a login/register response.
///
/// The token may sit at the top level or under `data`.
#[must_use]
pub fn extract_auth_payload(value: &Value) -> Option<AuthPayload> {
    let token = token_field(value, "accessToken")?;
    Some(AuthPayload::new(
        token,
        token_field(value, "expiresAt").unwrap_or_default(),
    ))
}

fn token_field<'a>(value: &'a Value, name: &str) -> Option<&'a str> {
    value
        .get(name)
        .and_then(Value::as_str)
        .or_else(|| value.get("data")?.get(name)?.as_str())
}

#[async_trait]
impl BackendApi for BackendClient {
    #[instrument(skip(self, payload))]
    async fn login(&self, payload: &LoginPayload) -> Result<AuthPayload, BackendError> {
        let value = self
            .send_raw(Method::POST, "/login", Some(payload), None)
            .await?;
        let auth = extract_auth_payload(&value)
            .ok_or_else(|| BackendError::Malformed("login response has no token".to_string()))?;
        auth.validate()
            .map_err(|e| BackendError::Malformed(e.to_string()))?;
        Ok(auth)
    }

    #[instrument(skip(self, payload))]
    async fn register(
        &self,
        payload: &RegisterPayload,
    ) -> Result<Option<AuthPayload>, BackendError> {
        let value = self
            .send_raw(Method::POST, "/register", Some(payload), None)
            .await?;
        Ok(extract_auth_payload(&value).filter(|auth| auth.validate().is_ok()))
    }

    #[instrument(skip(self, token))]
    async fn customer(&self, token: &str) -> Result<CustomerProfile, BackendError> {
        self.get("/customer", Some(token)).await
    }

    #[instrument(skip(self))]
    async fn all_products(&self) -> Result<Vec<ProductListItem>, BackendError> {
        let value = self
            .send_raw::<()>(Method::GET, "/all-products", None, None)
            .await?;
        // A non-array `data` means an empty shelf, not an error.
        match value.get("data") {
            Some(Value::Array(_)) => {
                let envelope: ApiSuccess<Vec<ProductListItem>> = serde_json::from_value(value)?;
                Ok(envelope.data)
            }
            _ => Ok(Vec::new()),
        }
    }

    #[instrument(skip(self), fields(slug = %slug))]
    async fn product(&self, slug: &str) -> Result<ProductDetail, BackendError> {
        let path = format!("/product/{}", urlencoding::encode(slug));
        self.get(&path, None).await
    }

    #[instrument(skip(self, line, token), fields(variant_id = %line.variant_id))]
    async fn create_cart(
        &self,
        line: &LineInput,
        token: Option<&str>,
    ) -> Result<CartData, BackendError> {
        self.post("/createCart", line, token).await
    }

    #[instrument(skip(self, payload, token), fields(cart_id = %payload.cart_id))]
    async fn add_cart_line(
        &self,
        payload: &AddCartLinePayload,
        token: Option<&str>,
    ) -> Result<CartData, BackendError> {
        self.post("/cart-line-add", payload, token).await
    }

    #[instrument(skip(self))]
    async fn get_cart(&self, cart_id: &str) -> Result<Option<CartData>, BackendError> {
        let payload = CartIdPayload {
            cart_id: cart_id.to_string(),
        };
        let data: GetCartData = self.post("/get-cart", &payload, None).await?;
        Ok(data.cart)
    }

    #[instrument(skip(self, payload), fields(cart_id = %payload.cart_id, line_id = %payload.line_id))]
    async fn update_cart_line(
        &self,
        payload: &UpdateCartLinePayload,
    ) -> Result<CartData, BackendError> {
        let data: UpdateCartLineData = self.post("/update-cart-line", payload, None).await?;
        Ok(data.cart_lines_update.cart)
    }

    #[instrument(skip(self, payload), fields(cart_id = %payload.cart_id))]
    async fn remove_cart_line(
        &self,
        payload: &RemoveCartItemPayload,
    ) -> Result<CartData, BackendError> {
        self.post("/remove-cart-item", payload, None).await
    }

    #[instrument(skip(self, token))]
    async fn update_buyer_identity(
        &self,
        cart_id: &str,
        token: &str,
    ) -> Result<CartData, BackendError> {
        let payload = CartIdPayload {
            cart_id: cart_id.to_string(),
        };
        self.post("/update-cart-buyer-identity", &payload, Some(token))
            .await
    }

    #[instrument(skip(self, payload, token), fields(cart_id = %payload.cart_id))]
    async fn checkout(
        &self,
        payload: &CheckoutPayload,
        token: &str,
    ) -> Result<CheckoutResult, BackendError> {
        self.post("/checkout", payload, Some(token)).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_login_redirect_detection() {
        assert!(redirected_to_login("/get-cart", "/auth/Login"));
        assert!(!redirected_to_login("/get-cart", "/get-cart"));
        assert!(!redirected_to_login("/login", "/login"));
    }

    #[test]
    fn test_extract_auth_payload_top_level_and_nested() {
        let top = json!({ "accessToken": "a", "expiresAt": "2030-01-01T00:00:00Z" });
        let nested = json!({ "success": true, "data": { "accessToken": "b", "expiresAt": "x" } });
        let missing = json!({ "success": true, "data": {} });

        assert_eq!(extract_auth_payload(&top).unwrap().access_token, "a");
        assert_eq!(extract_auth_payload(&nested).unwrap().expires_at, "x");
        assert!(extract_auth_payload(&missing).is_none());
    }

    #[test]
    fn test_endpoint_requires_base_url() {
        let client = BackendClient::new(None, Duration::from_secs(1)).unwrap();
        assert!(matches!(
            client.endpoint("/get-cart"),
            Err(BackendError::NotConfigured)
        ));
    }

    #[test]
    fn test_endpoint_joins_paths() {
        let base = Url::parse("https://api.unionbakery.id/v1/").unwrap();
        let client = BackendClient::new(Some(base), Duration::from_secs(1)).unwrap();
        assert_eq!(
            client.endpoint("/get-cart").unwrap().as_str(),
            "https://api.unionbakery.id/v1/get-cart"
        );
    }
}

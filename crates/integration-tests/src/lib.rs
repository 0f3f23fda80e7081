//! Integration test harness for the Union Bakery storefront.
//!
//! Tests drive the real router in-process: sessions live in a
//! [`MemoryStore`] and the bakery backend is replaced by [`FakeBackend`].
//! A [`TestApp`] behaves like one browser, carrying its session cookie from
//! response to request.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p union-bakery-integration-tests
//! ```

#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode, header};
use chrono::Utc;
use serde_json::json;
use tower::ServiceExt;
use tower_sessions::MemoryStore;
use union_bakery_core::AuthPayload;
use union_bakery_storefront::app;
use union_bakery_storefront::backend::{
    AddCartLinePayload, ApiErrorBody, BackendApi, BackendClient, BackendError, CartData,
    CheckoutPayload, CheckoutResult, CustomerProfile, LineInput, LoginPayload, ProductDetail,
    ProductListItem, RegisterPayload, RemoveCartItemPayload, UpdateCartLinePayload,
};
use union_bakery_storefront::config::StorefrontConfig;
use union_bakery_storefront::middleware::session::SESSION_COOKIE_NAME;
use union_bakery_storefront::state::AppState;

/// Password the fake backend accepts.
pub const PASSWORD: &str = "pastry-chef-42";

fn not_found(what: &str) -> BackendError {
    BackendError::Api {
        status: 404,
        body: ApiErrorBody {
            success: false,
            message: format!("{what} not found"),
            code: Some(404),
            errors: Vec::new(),
        },
    }
}

fn cart_line(id: &str, line: &LineInput) -> serde_json::Value {
    let mut attributes = Vec::new();
    if let Some(text) = &line.cake_wording {
        attributes.push(json!({ "key": "Cake Wording", "value": text }));
    }
    if let Some(text) = &line.greeting_wording {
        attributes.push(json!({ "key": "Greetings", "value": text }));
    }
    json!({
        "id": id,
        "quantity": line.quantity,
        "attributes": attributes,
        "merchandise": {
            "id": line.variant_id,
            "availableForSale": true,
            "title": "20cm",
            "price": { "amount": "350000", "currencyCode": "IDR" },
            "product": { "title": "Red Velvet" }
        }
    })
}

#[derive(Default)]
struct CartRecord {
    lines: Vec<serde_json::Value>,
}

impl CartRecord {
    fn to_cart(&self, id: &str) -> CartData {
        let quantity: u64 = self
            .lines
            .iter()
            .map(|line| line["quantity"].as_u64().unwrap_or(0))
            .sum();
        serde_json::from_value(json!({
            "id": id,
            "lines": { "nodes": self.lines },
            "cost": { "subtotalAmount": { "amount": quantity * 350_000, "currencyCode": "IDR" } }
        }))
        .unwrap()
    }
}

/// In-memory bakery backend that counts calls.
#[derive(Default)]
pub struct FakeBackend {
    carts: Mutex<HashMap<String, CartRecord>>,
    products: Mutex<Vec<ProductListItem>>,
    details: Mutex<HashMap<String, ProductDetail>>,
    calls: Mutex<HashMap<&'static str, usize>>,
    checkouts: Mutex<Vec<(CheckoutPayload, String)>>,
    next_id: Mutex<usize>,
}

impl FakeBackend {
    /// A backend with a two-cake catalog.
    #[must_use]
    pub fn with_catalog() -> Self {
        let backend = Self::default();
        *backend.products.lock().unwrap() = vec![
            serde_json::from_value(json!({
                "id": "p-red-velvet",
                "title": "Red Velvet",
                "handle": "red-velvet",
                "bestseller": true,
                "priceRange": { "maxVariantPrice": { "amount": "350000" } }
            }))
            .unwrap(),
            serde_json::from_value(json!({
                "id": "p-lemon",
                "title": "Lemon Drizzle",
                "handle": "lemon-drizzle",
                "seasonal": true
            }))
            .unwrap(),
        ];
        backend.details.lock().unwrap().insert(
            "red-velvet".to_string(),
            serde_json::from_value(json!({
                "id": "p-red-velvet",
                "title": "Red Velvet",
                "description": "Buttermilk sponge with cream cheese frosting.",
                "variants": { "nodes": [{
                    "id": "v-20cm",
                    "title": "20cm",
                    "availableForSale": true,
                    "selectedOptions": [{ "name": "Size", "value": "20cm" }],
                    "price": { "amount": "350000" }
                }] },
                "options": [{ "name": "Size", "optionValues": [{ "name": "20cm" }] }]
            }))
            .unwrap(),
        );
        backend
    }

    /// How many times `operation` was called.
    pub fn calls(&self, operation: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .get(operation)
            .copied()
            .unwrap_or(0)
    }

    /// Checkouts placed so far, with the token each was placed under.
    pub fn checkouts(&self) -> Vec<(CheckoutPayload, String)> {
        self.checkouts.lock().unwrap().clone()
    }

    fn enter(&self, operation: &'static str) {
        *self.calls.lock().unwrap().entry(operation).or_default() += 1;
    }

    fn next_id(&self, prefix: &str) -> String {
        let mut next = self.next_id.lock().unwrap();
        *next += 1;
        format!("{prefix}-{next}")
    }

    fn cart(&self, cart_id: &str) -> Option<CartData> {
        self.carts
            .lock()
            .unwrap()
            .get(cart_id)
            .map(|record| record.to_cart(cart_id))
    }

    fn push_line(&self, cart_id: &str, line: &LineInput) -> Result<CartData, BackendError> {
        let line_id = self.next_id("line");
        let mut carts = self.carts.lock().unwrap();
        let record = carts.get_mut(cart_id).ok_or_else(|| not_found("Cart"))?;
        record.lines.push(cart_line(&line_id, line));
        Ok(record.to_cart(cart_id))
    }
}

#[async_trait]
impl BackendApi for FakeBackend {
    async fn login(&self, payload: &LoginPayload) -> Result<AuthPayload, BackendError> {
        self.enter("login");
        if payload.password != PASSWORD {
            return Err(BackendError::Api {
                status: 401,
                body: ApiErrorBody {
                    success: false,
                    message: "Invalid email or password".to_string(),
                    code: Some(401),
                    errors: Vec::new(),
                },
            });
        }
        let expires_at = (Utc::now() + chrono::Duration::hours(1)).to_rfc3339();
        Ok(AuthPayload::new(format!("token-{}", payload.email), expires_at))
    }

    async fn register(
        &self,
        _payload: &RegisterPayload,
    ) -> Result<Option<AuthPayload>, BackendError> {
        self.enter("register");
        Ok(None)
    }

    async fn customer(&self, token: &str) -> Result<CustomerProfile, BackendError> {
        self.enter("customer");
        let email = token.strip_prefix("token-").unwrap_or("sari@example.com");
        Ok(CustomerProfile {
            id: "customer-1".to_string(),
            first_name: "Sari".to_string(),
            last_name: "Wijaya".to_string(),
            email: email.to_string(),
            display_name: String::new(),
        })
    }

    async fn all_products(&self) -> Result<Vec<ProductListItem>, BackendError> {
        self.enter("all_products");
        Ok(self.products.lock().unwrap().clone())
    }

    async fn product(&self, slug: &str) -> Result<ProductDetail, BackendError> {
        self.enter("product");
        self.details
            .lock()
            .unwrap()
            .get(slug)
            .cloned()
            .ok_or_else(|| not_found("Product"))
    }

    async fn create_cart(
        &self,
        line: &LineInput,
        _token: Option<&str>,
    ) -> Result<CartData, BackendError> {
        self.enter("create_cart");
        let cart_id = self.next_id("cart");
        self.carts
            .lock()
            .unwrap()
            .insert(cart_id.clone(), CartRecord::default());
        self.push_line(&cart_id, line)
    }

    async fn add_cart_line(
        &self,
        payload: &AddCartLinePayload,
        _token: Option<&str>,
    ) -> Result<CartData, BackendError> {
        self.enter("add_cart_line");
        self.push_line(&payload.cart_id, &payload.line)
    }

    async fn get_cart(&self, cart_id: &str) -> Result<Option<CartData>, BackendError> {
        self.enter("get_cart");
        Ok(self.cart(cart_id))
    }

    async fn update_cart_line(
        &self,
        payload: &UpdateCartLinePayload,
    ) -> Result<CartData, BackendError> {
        self.enter("update_cart_line");
        let mut carts = self.carts.lock().unwrap();
        let record = carts
            .get_mut(&payload.cart_id)
            .ok_or_else(|| not_found("Cart"))?;
        if let Some(quantity) = payload.quantity {
            for line in &mut record.lines {
                if line["id"] == payload.line_id.as_str() {
                    line["quantity"] = json!(quantity);
                }
            }
        }
        Ok(record.to_cart(&payload.cart_id))
    }

    async fn remove_cart_line(
        &self,
        payload: &RemoveCartItemPayload,
    ) -> Result<CartData, BackendError> {
        self.enter("remove_cart_line");
        let mut carts = self.carts.lock().unwrap();
        let record = carts
            .get_mut(&payload.cart_id)
            .ok_or_else(|| not_found("Cart"))?;
        record
            .lines
            .retain(|line| line["id"] != payload.line_ids.as_str());
        Ok(record.to_cart(&payload.cart_id))
    }

    async fn update_buyer_identity(
        &self,
        cart_id: &str,
        _token: &str,
    ) -> Result<CartData, BackendError> {
        self.enter("update_buyer_identity");
        self.cart(cart_id).ok_or_else(|| not_found("Cart"))
    }

    async fn checkout(
        &self,
        payload: &CheckoutPayload,
        token: &str,
    ) -> Result<CheckoutResult, BackendError> {
        self.enter("checkout");
        self.checkouts
            .lock()
            .unwrap()
            .push((payload.clone(), token.to_string()));
        Ok(CheckoutResult {
            message: "Order placed".to_string(),
        })
    }
}

/// A response read to the end.
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl TestResponse {
    /// `Location` of a redirect.
    #[must_use]
    pub fn location(&self) -> Option<&str> {
        self.headers
            .get(header::LOCATION)
            .and_then(|value| value.to_str().ok())
    }

    /// `HX-Trigger` header, if any.
    #[must_use]
    pub fn hx_trigger(&self) -> Option<serde_json::Value> {
        let raw = self.headers.get("hx-trigger")?.to_str().ok()?;
        serde_json::from_str(raw).ok()
    }

    #[must_use]
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).unwrap()
    }
}

/// One browser talking to an in-process storefront.
pub struct TestApp {
    router: Router,
    pub backend: Arc<FakeBackend>,
    session_cookie: Mutex<Option<String>>,
}

impl TestApp {
    /// A storefront over a fake backend with the sample catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(StorefrontConfig::default())
    }

    /// Same, with custom configuration.
    #[must_use]
    pub fn with_config(config: StorefrontConfig) -> Self {
        let backend = Arc::new(FakeBackend::with_catalog());
        let client = BackendClient::new(config.backend.base_url.clone(), Duration::from_secs(5))
            .unwrap();
        let state = AppState::with_backend(config, None, client, backend.clone());
        Self {
            router: app(state, MemoryStore::default()),
            backend,
            session_cookie: Mutex::new(None),
        }
    }

    /// A storefront whose order confirmations live for `ttl`.
    #[must_use]
    pub fn with_order_ttl(ttl: Duration) -> Self {
        let mut config = StorefrontConfig::default();
        config.cache.order_ttl = ttl;
        Self::with_config(config)
    }

    pub async fn get(&self, path: &str) -> TestResponse {
        let request = Request::get(path).body(Body::empty()).unwrap();
        self.send(request).await
    }

    pub async fn post_form(&self, path: &str, fields: &[(&str, &str)]) -> TestResponse {
        let body = fields
            .iter()
            .map(|(key, value)| format!("{key}={}", urlencoding::encode(value)))
            .collect::<Vec<_>>()
            .join("&");
        let request = Request::post(path)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body))
            .unwrap();
        self.send(request).await
    }

    pub async fn post_json(&self, path: &str, body: serde_json::Value) -> TestResponse {
        let request = Request::post(path)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    /// Send a request with this browser's session cookie.
    pub async fn send(&self, mut request: Request<Body>) -> TestResponse {
        let cookie = self.session_cookie.lock().unwrap().clone();
        if let Some(cookie) = cookie {
            request
                .headers_mut()
                .insert(header::COOKIE, cookie.parse().unwrap());
        }

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        self.remember_session(&headers);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        TestResponse {
            status,
            headers,
            body: String::from_utf8_lossy(&bytes).into_owned(),
        }
    }

    fn remember_session(&self, headers: &HeaderMap) {
        let prefix = format!("{SESSION_COOKIE_NAME}=");
        let session = headers
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .find(|value| value.starts_with(&prefix))
            .and_then(|value| value.split(';').next())
            .map(str::to_string);
        if let Some(session) = session {
            *self.session_cookie.lock().unwrap() = Some(session);
        }
    }

    /// Log in through the form.
    pub async fn log_in(&self, email: &str) -> TestResponse {
        self.post_form(
            "/auth/login",
            &[("email", email), ("password", PASSWORD), ("ref", "/home")],
        )
        .await
    }

    /// Add the sample cake to the cart.
    pub async fn add_cake(&self) -> TestResponse {
        self.post_form(
            "/cart/add",
            &[
                ("variant_id", "v-20cm"),
                ("quantity", "1"),
                ("cake_wording", "Happy Birthday Ana"),
            ],
        )
        .await
    }
}

impl Default for TestApp {
    fn default() -> Self {
        Self::new()
    }
}

/// A delivery date a few days out, in the form's format.
#[must_use]
pub fn future_delivery_date() -> String {
    (Utc::now() + chrono::Duration::days(3))
        .format("%Y-%m-%d")
        .to_string()
}

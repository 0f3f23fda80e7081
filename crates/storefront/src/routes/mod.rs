//! HTTP route handlers for storefront.
//!
//! # Route Structure
//!
//! ```text
//! GET  /                       - Home page
//! GET  /home                   - Home page
//! GET  /health                 - Liveness check
//! GET  /health/ready           - Readiness check
//!
//! # Products
//! GET  /shop/all               - Full catalog with badges
//! GET  /product/{slug}         - Product detail
//!
//! # Cart (HTMX fragments)
//! GET  /cart                   - Cart page with delivery form
//! GET  /cart/lines             - Cart lines fragment
//! GET  /cart/lines/{id}/edit   - Line edit form fragment
//! POST /cart/add               - Add line (HX-Trigger: cart-changed, cart:added)
//! POST /cart/update            - Update line (returns lines fragment)
//! POST /cart/remove            - Remove line (returns lines fragment)
//! GET  /cart/count             - Cart count badge fragment
//! POST /cart/checkout          - Submit delivery form
//!
//! # Payment
//! GET  /checkout               - Mock payment page
//! POST /checkout               - Store payment details
//!
//! # Account
//! GET  /account                - Profile (requires auth)
//! GET  /account/order          - Last order confirmation
//!
//! # Auth
//! GET  /auth/login             - Login page
//! POST /auth/login             - Login action
//! GET  /auth/register          - Register page
//! POST /auth/register          - Register action
//! POST /auth/logout            - Logout action
//!
//! # Live updates
//! GET  /events                 - Server-sent store events
//!
//! # Backend proxy
//! POST /api/logout             - Clear auth and cookies
//! ANY  /api/{*path}            - Forward to the backend
//! ```

pub mod account;
pub mod api;
pub mod auth;
pub mod cart;
pub mod checkout;
pub mod events;
pub mod health;
pub mod home;
pub mod products;

use axum::{
    Router,
    routing::{any, get, post},
};

use crate::services::auth_store::AuthSnapshot;
use crate::state::AppState;
use crate::storage::ClientStorage;

/// Navigation state every full page renders.
#[derive(Debug, Clone, Default)]
pub struct PageContext {
    pub cart_count: u32,
    pub signed_in: bool,
}

impl PageContext {
    /// Read the navigation state for a visitor.
    ///
    /// A cart that cannot be loaded shows as empty.
    pub async fn load(state: &AppState, storage: &ClientStorage, auth: &AuthSnapshot) -> Self {
        let cart_count = match state.cart(storage.clone()).load().await {
            Ok(loaded) => loaded.total_quantity(),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load cart for navigation");
                0
            }
        };
        Self {
            cart_count,
            signed_in: auth.is_auth(),
        }
    }
}

/// Create the auth routes router.
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/login", get(auth::login_page).post(auth::login))
        .route("/register", get(auth::register_page).post(auth::register))
        .route("/logout", post(auth::logout))
}

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(cart::show))
        .route("/lines", get(cart::lines))
        .route("/lines/{line_id}/edit", get(cart::edit_line))
        .route("/add", post(cart::add))
        .route("/update", post(cart::update))
        .route("/remove", post(cart::remove))
        .route("/count", get(cart::count))
        .route("/checkout", post(cart::checkout))
}

/// Create the account routes router.
pub fn account_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(account::index))
        .route("/order", get(account::order))
}

/// Create the backend proxy router.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/logout", post(api::logout))
        .route("/{*path}", any(api::proxy))
}

/// Create all routes for the storefront.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(home::home))
        .route("/home", get(home::home))
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
        .route("/shop/all", get(products::index))
        .route("/product/{slug}", get(products::show))
        .nest("/cart", cart_routes())
        .route("/checkout", get(checkout::show).post(checkout::submit))
        .nest("/account", account_routes())
        .nest("/auth", auth_routes())
        .route("/events", get(events::stream))
        .nest("/api", api_routes())
}

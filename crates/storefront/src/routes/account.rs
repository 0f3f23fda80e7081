//! Account route handlers.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::State,
    response::{IntoResponse, Redirect, Response},
};
use chrono::Utc;
use tracing::instrument;
use union_bakery_core::format_thousands;

use crate::backend::CustomerProfile;
use crate::error::{AppError, set_sentry_user};
use crate::filters;
use crate::middleware::{OptionalAuth, RequireAuth, login_url_for};
use crate::routes::PageContext;
use crate::services::auth_store::AuthSnapshot;
use crate::services::checkout::load_last_order;
use crate::state::AppState;
use crate::storage::{CheckoutInfo, ClientStorage, OrderSnapshot};

/// Account page template.
#[derive(Template, WebTemplate)]
#[template(path = "pages/account.html")]
pub struct AccountTemplate {
    pub page: PageContext,
    pub profile: Option<CustomerProfile>,
    pub error: Option<String>,
}

/// Order line display data.
pub struct OrderLineView {
    pub title: String,
    pub quantity: u32,
    pub note: Option<String>,
    pub image: Option<String>,
    pub price: String,
}

/// Order confirmation display data.
pub struct OrderView {
    pub delivery_date: String,
    pub delivery_time: String,
    pub phone: String,
    pub lines: Vec<OrderLineView>,
    pub subtotal: String,
    /// Milliseconds until the confirmation expires, for the page timer.
    pub expires_in_ms: Option<i64>,
}

impl OrderView {
    fn new(order: &OrderSnapshot, expires_in_ms: Option<i64>) -> Self {
        Self {
            delivery_date: order.delivery_date.clone(),
            delivery_time: order.delivery_time.clone(),
            phone: order.phone.clone(),
            lines: order
                .lines
                .iter()
                .map(|line| OrderLineView {
                    title: line.title.clone(),
                    quantity: line.quantity,
                    note: line.note.clone(),
                    image: line.image.clone(),
                    price: format_thousands(line.total()),
                })
                .collect(),
            subtotal: format_thousands(order.subtotal),
            expires_in_ms,
        }
    }
}

/// Order confirmation template.
#[derive(Template, WebTemplate)]
#[template(path = "pages/order.html")]
pub struct OrderTemplate {
    pub page: PageContext,
    pub order: Option<OrderView>,
    pub customer: Option<CustomerProfile>,
    pub payment: Option<CheckoutInfo>,
}

/// Fetch the profile for a signed-in visitor.
///
/// A rejected token is cleared, so the caller can send the visitor to log in.
async fn fetch_profile(
    state: &AppState,
    storage: &ClientStorage,
    auth: &AuthSnapshot,
) -> Result<Option<CustomerProfile>, AppError> {
    let Some(token) = auth.token() else {
        return Ok(None);
    };
    match state.backend().customer(token).await {
        Ok(profile) => {
            set_sentry_user(&profile.id, Some(&profile.email));
            Ok(Some(profile))
        }
        Err(e) if e.is_auth_failure() => {
            tracing::info!("Customer token rejected; clearing auth");
            state.auth_store(storage.clone()).clear_auth().await?;
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

/// Display the account page.
#[instrument(skip(state, storage, auth))]
pub async fn index(
    State(state): State<AppState>,
    storage: ClientStorage,
    RequireAuth(auth): RequireAuth,
) -> Result<Response, AppError> {
    let (profile, error) = match fetch_profile(&state, &storage, &auth).await {
        Ok(Some(profile)) => (Some(profile), None),
        Ok(None) => return Ok(Redirect::to(&login_url_for("/account")).into_response()),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to load customer profile");
            (None, Some(e.public_message()))
        }
    };

    Ok(AccountTemplate {
        page: PageContext::load(&state, &storage, &auth).await,
        profile,
        error,
    }
    .into_response())
}

/// Display the last order's confirmation.
///
/// Shows "no active order" once the confirmation has expired.
#[instrument(skip(state, storage, auth))]
pub async fn order(
    State(state): State<AppState>,
    storage: ClientStorage,
    OptionalAuth(auth): OptionalAuth,
) -> Result<OrderTemplate, AppError> {
    let now = Utc::now();
    let ttl = state.config().cache.order_ttl_chrono();
    let last = load_last_order(&storage, now, ttl).await?;

    let (order, payment, customer) = match last {
        Some(last) => {
            let view = OrderView::new(last.order(), last.remaining_millis(now));
            let payment = storage.load::<CheckoutInfo>().await?;
            let customer = fetch_profile(&state, &storage, &auth)
                .await
                .unwrap_or_else(|e| {
                    tracing::warn!(error = %e, "Failed to load customer for order page");
                    None
                });
            (Some(view), payment, customer)
        }
        None => (None, None, None),
    };

    Ok(OrderTemplate {
        page: PageContext::load(&state, &storage, &auth).await,
        order,
        customer,
        payment,
    })
}

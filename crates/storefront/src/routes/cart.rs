//! Cart route handlers.
//!
//! Cart operations use HTMX for dynamic updates without full page reloads.
//! Mutations go through [`CartService`](crate::services::cart::CartService),
//! which invalidates the cached cart first and caches whatever the backend
//! returns. Each mutation answers with an `HX-Trigger` header so the tab that
//! made it refreshes its badge; other tabs hear about it over `/events`.

use std::collections::BTreeMap;

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tracing::instrument;
use union_bakery_core::{DeliverySlot, format_thousands};

use crate::backend::{CartData, CartLine, LineInput};
use crate::error::AppError;
use crate::events::{StoreEvent, with_trigger};
use crate::filters;
use crate::middleware::OptionalAuth;
use crate::routes::PageContext;
use crate::services::cart::{CartError, LineEdit, RowShift};
use crate::services::checkout::{CheckoutForm, CheckoutOutcome};
use crate::services::flight::{Rect, plan_flight};
use crate::state::AppState;
use crate::storage::ClientStorage;

/// Longest cake wording the bakery will pipe.
pub const CAKE_WORDING_MAX: usize = 50;
/// Longest greeting card text.
pub const GREETING_WORDING_MAX: usize = 100;

const ADD_FAILED_MESSAGE: &str = "Unable to add to cart. Please try again.";
const UPDATE_FAILED_MESSAGE: &str = "Unable to update your cart. Please try again.";

/// Cart line display data for templates.
#[derive(Clone)]
pub struct CartLineView {
    pub id: String,
    pub title: String,
    pub subtitle: String,
    pub note: Option<String>,
    pub quantity: u32,
    pub price: String,
    pub line_price: String,
    pub image: Option<String>,
    pub cake_wording: String,
    pub greeting_wording: String,
}

impl From<&CartLine> for CartLineView {
    fn from(line: &CartLine) -> Self {
        Self {
            id: line.id.clone(),
            title: line.title().to_string(),
            subtitle: line.subtitle(),
            note: line.note(),
            quantity: line.quantity,
            price: line.merchandise.price.display(),
            line_price: line.line_total().display(),
            image: line.merchandise.image.as_ref().map(|image| image.url.clone()),
            cake_wording: line.cake_wording().unwrap_or_default().to_string(),
            greeting_wording: line.greeting_wording().unwrap_or_default().to_string(),
        }
    }
}

/// Cart display data for templates.
#[derive(Clone)]
pub struct CartView {
    pub lines: Vec<CartLineView>,
    pub subtotal: String,
    pub item_count: u32,
}

impl CartView {
    /// Create an empty cart.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            lines: Vec::new(),
            subtotal: format_thousands(rust_decimal::Decimal::ZERO),
            item_count: 0,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

impl From<&CartData> for CartView {
    fn from(cart: &CartData) -> Self {
        Self {
            lines: cart.lines().iter().map(CartLineView::from).collect(),
            subtotal: format_thousands(cart.subtotal()),
            item_count: cart.total_quantity(),
        }
    }
}

impl From<Option<&CartData>> for CartView {
    fn from(cart: Option<&CartData>) -> Self {
        cart.map_or_else(Self::empty, Self::from)
    }
}

/// A delivery slot option in the form.
pub struct SlotOption {
    pub label: &'static str,
    pub selected: bool,
}

fn slot_options(selected: &str) -> Vec<SlotOption> {
    DeliverySlot::ALL
        .iter()
        .map(|slot| SlotOption {
            label: slot.label(),
            selected: slot.label() == selected.trim(),
        })
        .collect()
}

// =============================================================================
// Forms
// =============================================================================

/// Add to cart form data.
///
/// The `start_*` fields describe the clicked button and the `anchor_*` fields
/// the cart icon, both in viewport pixels. The script fills them in.
#[derive(Debug, Deserialize)]
pub struct AddToCartForm {
    pub variant_id: String,
    pub quantity: Option<u32>,
    pub cake_wording: Option<String>,
    pub greeting_wording: Option<String>,
    pub start_left: Option<f64>,
    pub start_top: Option<f64>,
    pub start_width: Option<f64>,
    pub start_height: Option<f64>,
    pub anchor_left: Option<f64>,
    pub anchor_top: Option<f64>,
    pub anchor_width: Option<f64>,
    pub anchor_height: Option<f64>,
}

impl AddToCartForm {
    fn start(&self) -> Option<Rect> {
        Rect::from_parts(
            self.start_left,
            self.start_top,
            self.start_width,
            self.start_height,
        )
    }

    fn anchor(&self) -> Option<Rect> {
        Rect::from_parts(
            self.anchor_left,
            self.anchor_top,
            self.anchor_width,
            self.anchor_height,
        )
    }

    /// The line to add, or the message to show instead.
    fn line(&self) -> Result<LineInput, &'static str> {
        let variant_id = self.variant_id.trim();
        if variant_id.is_empty() {
            return Err("Please choose a size.");
        }
        let cake_wording = wording(self.cake_wording.as_deref(), CAKE_WORDING_MAX)
            .map_err(|()| "Cake wording must be 50 characters or fewer.")?;
        let greeting_wording = wording(self.greeting_wording.as_deref(), GREETING_WORDING_MAX)
            .map_err(|()| "Greeting card text must be 100 characters or fewer.")?;

        Ok(LineInput {
            variant_id: variant_id.to_string(),
            quantity: self.quantity.unwrap_or(1).max(1),
            cake_wording,
            greeting_wording,
        })
    }
}

/// Trim free text, dropping it when blank and rejecting it when too long.
fn wording(value: Option<&str>, max: usize) -> Result<Option<String>, ()> {
    let Some(text) = value.map(str::trim).filter(|text| !text.is_empty()) else {
        return Ok(None);
    };
    if text.chars().count() > max {
        return Err(());
    }
    Ok(Some(text.to_string()))
}

/// Update line form data.
#[derive(Debug, Deserialize)]
pub struct UpdateLineForm {
    pub line_id: String,
    pub quantity: u32,
    pub cake_wording: Option<String>,
    pub greeting_wording: Option<String>,
}

/// Remove line form data.
#[derive(Debug, Deserialize)]
pub struct RemoveLineForm {
    pub line_id: String,
}

// =============================================================================
// Templates
// =============================================================================

/// Cart page template.
#[derive(Template, WebTemplate)]
#[template(path = "pages/cart.html")]
pub struct CartShowTemplate {
    pub page: PageContext,
    pub cart: CartView,
    pub shifts: String,
    pub error: Option<String>,
    pub form: CheckoutForm,
    pub slots: Vec<SlotOption>,
    pub field_errors: BTreeMap<String, String>,
    pub message: Option<String>,
}

impl CartShowTemplate {
    fn field_error(&self, field: &str) -> Option<&str> {
        self.field_errors.get(field).map(String::as_str)
    }
}

/// Cart lines fragment template (for HTMX).
#[derive(Template, WebTemplate)]
#[template(path = "partials/cart_lines.html")]
pub struct CartLinesTemplate {
    pub cart: CartView,
    /// JSON array of row shifts for the reorder animation.
    pub shifts: String,
    pub error: Option<String>,
}

/// Line edit form fragment template (for HTMX).
#[derive(Template, WebTemplate)]
#[template(path = "partials/cart_line_edit.html")]
pub struct CartLineEditTemplate {
    pub line: CartLineView,
    pub cake_wording_max: usize,
    pub greeting_wording_max: usize,
}

/// Cart count badge fragment template (for HTMX).
#[derive(Template, WebTemplate)]
#[template(path = "partials/cart_count.html")]
pub struct CartCountTemplate {
    pub count: u32,
}

/// Add-to-cart result fragment template (for HTMX).
#[derive(Template, WebTemplate)]
#[template(path = "partials/add_feedback.html")]
pub struct AddFeedbackTemplate {
    pub success: bool,
    pub message: String,
}

fn shifts_json(shifts: &[RowShift]) -> String {
    serde_json::to_string(shifts).unwrap_or_else(|_| "[]".to_string())
}

/// Load the cart for display, degrading to empty.
async fn load_view(state: &AppState, storage: &ClientStorage) -> (CartView, Option<String>) {
    match state.cart(storage.clone()).load().await {
        Ok(loaded) => (CartView::from(loaded.cart.as_ref()), None),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to load cart");
            (
                CartView::empty(),
                Some("We couldn't load your cart. Please refresh.".to_string()),
            )
        }
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Display cart page.
#[instrument(skip(state, storage, auth))]
pub async fn show(
    State(state): State<AppState>,
    storage: ClientStorage,
    OptionalAuth(auth): OptionalAuth,
) -> impl IntoResponse {
    render_page(&state, &storage, &auth, CheckoutForm::default(), BTreeMap::new(), None).await
}

async fn render_page(
    state: &AppState,
    storage: &ClientStorage,
    auth: &crate::services::auth_store::AuthSnapshot,
    form: CheckoutForm,
    field_errors: BTreeMap<String, String>,
    message: Option<String>,
) -> CartShowTemplate {
    let (cart, error) = load_view(state, storage).await;
    let slots = slot_options(&form.delivery_time);
    CartShowTemplate {
        page: PageContext::load(state, storage, auth).await,
        cart,
        shifts: "[]".to_string(),
        error,
        form,
        slots,
        field_errors,
        message,
    }
}

/// Cart lines fragment (HTMX).
#[instrument(skip(state, storage))]
pub async fn lines(State(state): State<AppState>, storage: ClientStorage) -> impl IntoResponse {
    let (cart, error) = load_view(&state, &storage).await;
    CartLinesTemplate {
        cart,
        shifts: "[]".to_string(),
        error,
    }
}

/// Line edit form fragment (HTMX).
#[instrument(skip(state, storage))]
pub async fn edit_line(
    State(state): State<AppState>,
    Path(line_id): Path<String>,
    storage: ClientStorage,
) -> Result<CartLineEditTemplate, AppError> {
    let loaded = state.cart(storage).load().await?;
    let line = loaded
        .cart
        .as_ref()
        .and_then(|cart| cart.line(&line_id))
        .ok_or_else(|| AppError::NotFound(format!("cart line {line_id}")))?;

    Ok(CartLineEditTemplate {
        line: CartLineView::from(line),
        cake_wording_max: CAKE_WORDING_MAX,
        greeting_wording_max: GREETING_WORDING_MAX,
    })
}

/// Add item to cart (HTMX).
///
/// Creates a new cart if one doesn't exist, or adds to the existing cart.
/// Announces `cart-changed` and `cart:added`, the latter carrying the planned
/// fly-to-cart path.
#[instrument(skip(state, storage, auth, form), fields(variant_id = %form.variant_id))]
pub async fn add(
    State(state): State<AppState>,
    storage: ClientStorage,
    OptionalAuth(auth): OptionalAuth,
    Form(form): Form<AddToCartForm>,
) -> Response {
    let line = match form.line() {
        Ok(line) => line,
        Err(message) => {
            return AddFeedbackTemplate {
                success: false,
                message: message.to_string(),
            }
            .into_response();
        }
    };

    match state.cart(storage).add(line, auth.token()).await {
        Ok(update) => {
            tracing::info!(
                cart_id = %update.cart.id,
                count = update.cart.total_quantity(),
                "Added to cart"
            );
            let plan = plan_flight(form.start(), form.anchor());
            with_trigger(
                AddFeedbackTemplate {
                    success: true,
                    message: "Added to cart".to_string(),
                }
                .into_response(),
                &[StoreEvent::CartChanged, StoreEvent::CartAdded(plan)],
            )
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to add item to cart");
            AddFeedbackTemplate {
                success: false,
                message: ADD_FAILED_MESSAGE.to_string(),
            }
            .into_response()
        }
    }
}

/// Update a cart line (HTMX).
#[instrument(skip(state, storage, form), fields(line_id = %form.line_id))]
pub async fn update(
    State(state): State<AppState>,
    storage: ClientStorage,
    Form(form): Form<UpdateLineForm>,
) -> Response {
    let cake_wording = wording(form.cake_wording.as_deref(), CAKE_WORDING_MAX);
    let greeting_wording = wording(form.greeting_wording.as_deref(), GREETING_WORDING_MAX);
    let (Ok(cake_wording), Ok(greeting_wording)) = (cake_wording, greeting_wording) else {
        let (cart, _) = load_view(&state, &storage).await;
        return CartLinesTemplate {
            cart,
            shifts: "[]".to_string(),
            error: Some("That wording is too long.".to_string()),
        }
        .into_response();
    };

    let edit = LineEdit {
        line_id: form.line_id,
        quantity: form.quantity,
        cake_wording,
        greeting_wording,
    };
    let result = state.cart(storage.clone()).update_line(edit).await;
    mutation_response(&state, &storage, result).await
}

/// Remove item from cart (HTMX).
#[instrument(skip(state, storage, form), fields(line_id = %form.line_id))]
pub async fn remove(
    State(state): State<AppState>,
    storage: ClientStorage,
    Form(form): Form<RemoveLineForm>,
) -> Response {
    let result = state.cart(storage.clone()).remove_line(&form.line_id).await;
    mutation_response(&state, &storage, result).await
}

async fn mutation_response(
    state: &AppState,
    storage: &ClientStorage,
    result: Result<crate::services::cart::CartUpdate, CartError>,
) -> Response {
    match result {
        Ok(update) => with_trigger(
            CartLinesTemplate {
                cart: CartView::from(&update.cart),
                shifts: shifts_json(&update.shifts),
                error: None,
            }
            .into_response(),
            &[StoreEvent::CartChanged],
        ),
        Err(CartError::NoCart) => CartLinesTemplate {
            cart: CartView::empty(),
            shifts: "[]".to_string(),
            error: None,
        }
        .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Cart update failed");
            let (cart, _) = load_view(state, storage).await;
            CartLinesTemplate {
                cart,
                shifts: "[]".to_string(),
                error: Some(UPDATE_FAILED_MESSAGE.to_string()),
            }
            .into_response()
        }
    }
}

/// Get cart count badge (HTMX).
#[instrument(skip(state, storage))]
pub async fn count(State(state): State<AppState>, storage: ClientStorage) -> impl IntoResponse {
    let count = match state.cart(storage).load().await {
        Ok(loaded) => loaded.total_quantity(),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to load cart count");
            0
        }
    };
    CartCountTemplate { count }
}

/// Submit the delivery form and check out.
///
/// Without a valid token the request is stored and the visitor sent to log
/// in; it is replayed once they do.
#[instrument(skip(state, storage, auth, form))]
pub async fn checkout(
    State(state): State<AppState>,
    storage: ClientStorage,
    OptionalAuth(auth): OptionalAuth,
    Form(form): Form<CheckoutForm>,
) -> Result<Response, AppError> {
    let outcome = state.checkout(storage.clone()).submit(&form, &auth).await?;

    Ok(match outcome {
        CheckoutOutcome::Completed { .. } => Redirect::to("/checkout").into_response(),
        CheckoutOutcome::AwaitingAuth { login_url } => Redirect::to(login_url).into_response(),
        CheckoutOutcome::Invalid(field_errors) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            render_page(&state, &storage, &auth, form, field_errors, None).await,
        )
            .into_response(),
        CheckoutOutcome::Failed { message } => {
            render_page(&state, &storage, &auth, form, BTreeMap::new(), Some(message))
                .await
                .into_response()
        }
    })
}

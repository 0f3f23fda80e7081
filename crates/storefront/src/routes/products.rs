//! Product route handlers.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tracing::instrument;
use union_bakery_core::{format_optional, slugify};

use crate::backend::{BackendError, ProductDetail, ProductListItem, ProductVariant};
use crate::filters;
use crate::middleware::OptionalAuth;
use crate::routes::PageContext;
use crate::routes::cart::{CAKE_WORDING_MAX, CartLineView, GREETING_WORDING_MAX};
use crate::state::AppState;
use crate::storage::ClientStorage;

/// Product card shown in listings.
#[derive(Clone)]
pub struct ProductCardView {
    pub title: String,
    pub href: String,
    pub price: String,
    pub image: Option<String>,
    pub image_alt: String,
    pub badges: Vec<&'static str>,
}

impl From<&ProductListItem> for ProductCardView {
    fn from(product: &ProductListItem) -> Self {
        let slug = if product.handle.trim().is_empty() {
            slugify(&product.title)
        } else {
            product.handle.clone()
        };
        let image = product.preview_image();
        Self {
            title: product.title.clone(),
            href: format!("/product/{slug}"),
            price: format_optional(product.max_price().map(|money| money.amount)),
            image: image.map(|image| image.url.clone()),
            image_alt: image
                .and_then(|image| image.alt_text.clone())
                .unwrap_or_else(|| product.title.clone()),
            badges: product.flags().badge_labels(),
        }
    }
}

/// A selectable variant on the product page.
#[derive(Clone)]
pub struct VariantView {
    pub id: String,
    pub label: String,
    pub price: String,
    pub available: bool,
    pub selected: bool,
}

impl VariantView {
    fn new(variant: &ProductVariant, selected_id: &str) -> Self {
        let label = variant
            .option("size")
            .map_or_else(|| variant.title.clone(), str::to_string);
        Self {
            id: variant.id.clone(),
            label,
            price: variant.price.display(),
            available: variant.available_for_sale,
            selected: variant.id == selected_id,
        }
    }
}

/// Product detail display data.
#[derive(Clone)]
pub struct ProductView {
    pub title: String,
    pub description: String,
    pub images: Vec<String>,
    pub variants: Vec<VariantView>,
    pub selected: Option<VariantView>,
    pub show_sizes: bool,
    pub badges: Vec<&'static str>,
}

impl ProductView {
    fn new(detail: &ProductDetail, requested: Option<&str>, badges: Vec<&'static str>) -> Self {
        let selected = requested
            .and_then(|id| detail.variant(id))
            .or_else(|| detail.default_variant());
        let selected_id = selected.map(|variant| variant.id.as_str()).unwrap_or_default();

        Self {
            title: detail.title.clone(),
            description: detail.description.clone(),
            images: detail
                .images
                .nodes
                .iter()
                .map(|image| image.url.clone())
                .collect(),
            variants: detail
                .variants
                .nodes
                .iter()
                .map(|variant| VariantView::new(variant, selected_id))
                .collect(),
            selected: selected.map(|variant| VariantView::new(variant, selected_id)),
            show_sizes: detail.has_size_option(),
            badges,
        }
    }
}

/// Query parameters for the product page.
#[derive(Debug, Deserialize)]
pub struct ProductQuery {
    pub variant: Option<String>,
}

/// Catalog page template.
#[derive(Template, WebTemplate)]
#[template(path = "pages/shop.html")]
pub struct ShopTemplate {
    pub page: PageContext,
    pub products: Vec<ProductCardView>,
    pub unavailable: bool,
}

/// Product detail template.
#[derive(Template, WebTemplate)]
#[template(path = "pages/product.html")]
pub struct ProductShowTemplate {
    pub page: PageContext,
    pub slug: String,
    pub product: ProductView,
    pub in_cart: Vec<CartLineView>,
    pub cake_wording_max: usize,
    pub greeting_wording_max: usize,
}

/// Product not found template.
#[derive(Template, WebTemplate)]
#[template(path = "pages/not_found.html")]
pub struct NotFoundTemplate {
    pub page: PageContext,
    pub message: String,
}

/// Display the full catalog.
#[instrument(skip(state, storage, auth))]
pub async fn index(
    State(state): State<AppState>,
    storage: ClientStorage,
    OptionalAuth(auth): OptionalAuth,
) -> impl IntoResponse {
    let (products, unavailable) = match state.catalog().all_products().await {
        Ok(products) => (products.iter().map(ProductCardView::from).collect(), false),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to load products");
            (Vec::new(), true)
        }
    };

    ShopTemplate {
        page: PageContext::load(&state, &storage, &auth).await,
        products,
        unavailable,
    }
}

/// Display a product.
#[instrument(skip(state, storage, auth, query))]
pub async fn show(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Query(query): Query<ProductQuery>,
    storage: ClientStorage,
    OptionalAuth(auth): OptionalAuth,
) -> Response {
    let detail = match state.catalog().product(&slug).await {
        Ok(detail) => detail,
        Err(e) => {
            let status = match &e {
                BackendError::Api { status: 404, .. } | BackendError::Status { status: 404 } => {
                    StatusCode::NOT_FOUND
                }
                _ => {
                    tracing::warn!(error = %e, "Failed to load product");
                    StatusCode::BAD_GATEWAY
                }
            };
            let message = if status == StatusCode::NOT_FOUND {
                "We couldn't find that cake.".to_string()
            } else {
                e.user_message()
            };
            return (
                status,
                NotFoundTemplate {
                    page: PageContext::load(&state, &storage, &auth).await,
                    message,
                },
            )
                .into_response();
        }
    };

    let badges = state.catalog().product_flags(&slug).await.badge_labels();
    let product = ProductView::new(&detail, query.variant.as_deref(), badges);

    let in_cart = match state.cart(storage.clone()).load().await {
        Ok(loaded) => loaded
            .cart
            .as_ref()
            .map(|cart| {
                cart.lines_for_product(&detail.title)
                    .into_iter()
                    .map(CartLineView::from)
                    .collect()
            })
            .unwrap_or_default(),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to load cart for product page");
            Vec::new()
        }
    };

    ProductShowTemplate {
        page: PageContext::load(&state, &storage, &auth).await,
        slug,
        product,
        in_cart,
        cake_wording_max: CAKE_WORDING_MAX,
        greeting_wording_max: GREETING_WORDING_MAX,
    }
    .into_response()
}

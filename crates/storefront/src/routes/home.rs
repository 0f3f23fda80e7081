//! Home page route handler.

use askama::Template;
use askama_web::WebTemplate;
use axum::{extract::State, response::IntoResponse};
use tracing::instrument;

use crate::filters;
use crate::middleware::OptionalAuth;
use crate::routes::PageContext;
use crate::routes::products::ProductCardView;
use crate::state::AppState;
use crate::storage::ClientStorage;

/// Products shown in the home page's featured strip.
const FEATURED_COUNT: usize = 4;

/// Home page template.
#[derive(Template, WebTemplate)]
#[template(path = "pages/home.html")]
pub struct HomeTemplate {
    pub page: PageContext,
    pub featured: Vec<ProductCardView>,
    pub unavailable: bool,
}

/// Display the home page.
#[instrument(skip(state, storage, auth))]
pub async fn home(
    State(state): State<AppState>,
    storage: ClientStorage,
    OptionalAuth(auth): OptionalAuth,
) -> impl IntoResponse {
    let (featured, unavailable) = match state.catalog().featured(FEATURED_COUNT).await {
        Ok(products) => (products.iter().map(ProductCardView::from).collect(), false),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to load featured products");
            (Vec::new(), true)
        }
    };

    HomeTemplate {
        page: PageContext::load(&state, &storage, &auth).await,
        featured,
        unavailable,
    }
}

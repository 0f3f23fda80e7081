//! Product catalog with caching.
//!
//! The full product list is cached for a fixed TTL and shared by the home and
//! shop pages and by badge lookups on the product page. Concurrent callers
//! during a refresh wait for the one fetch already in flight. Nothing but the
//! TTL invalidates it.
//!
//! Product detail is cached per slug in a moka cache.

use std::sync::Arc;
use std::time::{Duration, Instant};

use moka::future::Cache;
use tokio::sync::Mutex;
use tracing::instrument;
use union_bakery_core::{normalize_handle, slugify};

use crate::backend::{BackendApi, BackendError, ProductDetail, ProductFlags, ProductListItem};

/// Default lifetime of the cached product list.
pub const DEFAULT_LIST_TTL: Duration = Duration::from_secs(10 * 60);

/// Lifetime of a cached product detail.
const DETAIL_TTL: Duration = Duration::from_secs(5 * 60);

struct CachedList {
    data: Arc<Vec<ProductListItem>>,
    expires_at: Instant,
}

/// The cached product list and its expiry.
pub struct ProductListCache {
    ttl: Duration,
    slot: Mutex<Option<CachedList>>,
}

impl ProductListCache {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slot: Mutex::new(None),
        }
    }

    /// Return the cached list if it is still fresh at `now`, otherwise run
    /// `fetch` and cache its result.
    ///
    /// The lock is held across the fetch so only one refresh runs at a time.
    /// A failed fetch leaves the previous entry untouched.
    ///
    /// # Errors
    ///
    /// Returns the fetch error.
    pub async fn get_or_fetch_at<F, Fut>(
        &self,
        now: Instant,
        fetch: F,
    ) -> Result<Arc<Vec<ProductListItem>>, BackendError>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<Vec<ProductListItem>, BackendError>> + Send,
    {
        let mut slot = self.slot.lock().await;
        if let Some(cached) = slot.as_ref().filter(|cached| now < cached.expires_at) {
            return Ok(Arc::clone(&cached.data));
        }

        let data = Arc::new(fetch().await?);
        tracing::debug!(count = data.len(), "Refreshed product list cache");
        *slot = Some(CachedList {
            data: Arc::clone(&data),
            expires_at: now + self.ttl,
        });
        Ok(data)
    }
}

/// Catalog reads backed by the bakery API.
#[derive(Clone)]
pub struct Catalog {
    backend: Arc<dyn BackendApi>,
    list: Arc<ProductListCache>,
    details: Cache<String, ProductDetail>,
}

impl Catalog {
    #[must_use]
    pub fn new(backend: Arc<dyn BackendApi>, list_ttl: Duration) -> Self {
        Self {
            backend,
            list: Arc::new(ProductListCache::new(list_ttl)),
            details: Cache::builder()
                .max_capacity(500)
                .time_to_live(DETAIL_TTL)
                .build(),
        }
    }

    /// All products, from cache while fresh.
    ///
    /// # Errors
    ///
    /// Returns an error if a refresh is needed and the backend fails.
    pub async fn all_products(&self) -> Result<Arc<Vec<ProductListItem>>, BackendError> {
        self.all_products_at(Instant::now()).await
    }

    /// [`Self::all_products`] against an explicit clock.
    ///
    /// # Errors
    ///
    /// Returns an error if a refresh is needed and the backend fails.
    pub async fn all_products_at(
        &self,
        now: Instant,
    ) -> Result<Arc<Vec<ProductListItem>>, BackendError> {
        let backend = Arc::clone(&self.backend);
        self.list
            .get_or_fetch_at(now, || async move { backend.all_products().await })
            .await
    }

    /// The first `count` products, for the home page.
    ///
    /// # Errors
    ///
    /// Returns an error if the product list cannot be loaded.
    pub async fn featured(&self, count: usize) -> Result<Vec<ProductListItem>, BackendError> {
        Ok(self.all_products().await?.iter().take(count).cloned().collect())
    }

    /// Product detail by slug.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    #[instrument(skip(self))]
    pub async fn product(&self, slug: &str) -> Result<ProductDetail, BackendError> {
        if let Some(detail) = self.details.get(slug).await {
            return Ok(detail);
        }
        let detail = self.backend.product(slug).await?;
        self.details.insert(slug.to_string(), detail.clone()).await;
        Ok(detail)
    }

    /// Bestseller/seasonal flags for the product at `slug`.
    ///
    /// Matches on the normalised handle or the slugified title. An unknown
    /// product, or a list that cannot be loaded, yields unflagged.
    pub async fn product_flags(&self, slug: &str) -> ProductFlags {
        match self.all_products().await {
            Ok(products) => find_flags(&products, slug),
            Err(e) => {
                tracing::warn!(error = %e, slug, "Could not load products for badge lookup");
                ProductFlags::default()
            }
        }
    }
}

fn find_flags(products: &[ProductListItem], slug: &str) -> ProductFlags {
    let wanted = normalize_handle(slug);
    if wanted.is_empty() {
        return ProductFlags::default();
    }
    products
        .iter()
        .find(|product| {
            normalize_handle(&product.handle) == wanted || slugify(&product.title) == wanted
        })
        .map(ProductListItem::flags)
        .unwrap_or_default()
}

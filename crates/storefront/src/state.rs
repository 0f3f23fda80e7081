//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;

use crate::backend::{BackendApi, BackendClient, BackendError};
use crate::config::StorefrontConfig;
use crate::events::EventHub;
use crate::services::auth_store::AuthStore;
use crate::services::cart::{CartGenerations, CartService};
use crate::services::catalog::Catalog;
use crate::services::checkout::{CheckoutFlow, ReplayGuard};
use crate::storage::ClientStorage;

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc`. Every cache the storefront
/// keeps lives here, never in a global.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    pool: Option<PgPool>,
    client: BackendClient,
    backend: Arc<dyn BackendApi>,
    catalog: Catalog,
    events: EventHub,
    generations: CartGenerations,
    replay: ReplayGuard,
}

impl AppState {
    /// Create a new application state talking to the configured backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: StorefrontConfig, pool: PgPool) -> Result<Self, BackendError> {
        let client = BackendClient::new(config.backend.base_url.clone(), config.backend.timeout)?;
        let backend: Arc<dyn BackendApi> = Arc::new(client.clone());
        Ok(Self::with_backend(config, Some(pool), client, backend))
    }

    /// Create a state with an explicit backend implementation.
    ///
    /// `client` is still used by the `/api` proxy, which forwards raw
    /// requests.
    #[must_use]
    pub fn with_backend(
        config: StorefrontConfig,
        pool: Option<PgPool>,
        client: BackendClient,
        backend: Arc<dyn BackendApi>,
    ) -> Self {
        let catalog = Catalog::new(Arc::clone(&backend), config.cache.product_list_ttl);
        Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                client,
                backend,
                catalog,
                events: EventHub::new(),
                generations: CartGenerations::new(),
                replay: ReplayGuard::new(),
            }),
        }
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// Get the session database pool, when one is attached.
    #[must_use]
    pub fn pool(&self) -> Option<&PgPool> {
        self.inner.pool.as_ref()
    }

    /// The raw HTTP client used by the `/api` proxy.
    #[must_use]
    pub fn client(&self) -> &BackendClient {
        &self.inner.client
    }

    #[must_use]
    pub fn backend(&self) -> &Arc<dyn BackendApi> {
        &self.inner.backend
    }

    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        &self.inner.catalog
    }

    #[must_use]
    pub fn events(&self) -> &EventHub {
        &self.inner.events
    }

    /// Auth store over a visitor's storage.
    #[must_use]
    pub fn auth_store(&self, storage: ClientStorage) -> AuthStore {
        AuthStore::new(storage, self.inner.events.clone())
    }

    /// Cart service over a visitor's storage.
    #[must_use]
    pub fn cart(&self, storage: ClientStorage) -> CartService {
        CartService::new(
            Arc::clone(&self.inner.backend),
            storage,
            self.inner.events.clone(),
            self.inner.generations.clone(),
        )
    }

    /// Checkout flow over a visitor's storage.
    #[must_use]
    pub fn checkout(&self, storage: ClientStorage) -> CheckoutFlow {
        CheckoutFlow::new(
            Arc::clone(&self.inner.backend),
            storage,
            self.inner.events.clone(),
            self.inner.replay.clone(),
            self.inner.config.cache.order_ttl_chrono(),
        )
    }
}

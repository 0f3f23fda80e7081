//! Cart synchronisation between the visitor's storage and the backend.
//!
//! The backend owns the cart. Locally the visitor keeps the cart id and a
//! cached copy of the last cart the backend returned:
//!
//! - Reads serve the cache when its cart id matches the stored cart id, and
//!   otherwise fetch from the backend and repopulate it.
//! - Every mutation removes the cache *before* calling the backend, then
//!   stores the cart the backend answered with.
//! - Each mutation takes a generation ticket. A response that arrives after a
//!   newer request was issued is still returned, but never written back.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use moka::future::Cache;
use serde::Serialize;
use thiserror::Error;
use tracing::instrument;
use uuid::Uuid;

use crate::backend::{
    AddCartLinePayload, BackendApi, BackendError, CartData, LineInput, RemoveCartItemPayload,
    UpdateCartLinePayload,
};
use crate::events::{EventHub, StoreEvent};
use crate::storage::{CartCache, CartIdRecord, ClientStorage, StorageError};

/// Errors from cart operations.
#[derive(Debug, Error)]
pub enum CartError {
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The operation needs a cart but the visitor has none.
    #[error("no cart for this visitor")]
    NoCart,
}

// =============================================================================
// Request generations
// =============================================================================

/// Per-visitor request counters used to recognise stale responses.
#[derive(Clone)]
pub struct CartGenerations {
    counters: Cache<Uuid, Arc<AtomicU64>>,
}

impl Default for CartGenerations {
    fn default() -> Self {
        Self::new()
    }
}

impl CartGenerations {
    #[must_use]
    pub fn new() -> Self {
        Self {
            counters: Cache::builder()
                .max_capacity(100_000)
                .time_to_idle(Duration::from_secs(60 * 60))
                .build(),
        }
    }

    async fn counter(&self, client: Uuid) -> Arc<AtomicU64> {
        self.counters
            .get_with(client, async { Arc::new(AtomicU64::new(0)) })
            .await
    }

    /// Start a new request, superseding every earlier one.
    pub async fn begin(&self, client: Uuid) -> CartTicket {
        let counter = self.counter(client).await;
        let generation = counter.fetch_add(1, Ordering::SeqCst) + 1;
        CartTicket {
            counter,
            generation,
        }
    }

    /// Observe the current generation without superseding anything.
    pub async fn observe(&self, client: Uuid) -> CartTicket {
        let counter = self.counter(client).await;
        let generation = counter.load(Ordering::SeqCst);
        CartTicket {
            counter,
            generation,
        }
    }
}

/// Proof of which request generation a response belongs to.
#[derive(Debug)]
pub struct CartTicket {
    counter: Arc<AtomicU64>,
    generation: u64,
}

impl CartTicket {
    /// Whether no newer request has started since this ticket was issued.
    #[must_use]
    pub fn is_current(&self) -> bool {
        self.counter.load(Ordering::SeqCst) == self.generation
    }
}

// =============================================================================
// Row shifts
// =============================================================================

/// How far a cart row moved, in rows, after a mutation.
///
/// Positive means the row used to sit lower. The browser offsets the row by
/// `rows` times its height and lets it slide back to zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowShift {
    pub line_id: String,
    pub rows: i64,
}

/// Compare line orders before and after a mutation.
///
/// Rows that kept their index, and rows that were added or removed, produce
/// no shift.
#[must_use]
pub fn row_shifts(before: &[String], after: &[String]) -> Vec<RowShift> {
    after
        .iter()
        .enumerate()
        .filter_map(|(new_index, id)| {
            let old_index = before.iter().position(|old| old == id)?;
            let rows = i64::try_from(old_index).ok()? - i64::try_from(new_index).ok()?;
            (rows != 0).then(|| RowShift {
                line_id: id.clone(),
                rows,
            })
        })
        .collect()
}

// =============================================================================
// Service
// =============================================================================

/// Where a loaded cart came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CartSource {
    /// The visitor has no cart.
    Empty,
    Cache,
    Backend,
}

/// Result of [`CartService::load`].
#[derive(Debug, Clone)]
pub struct LoadedCart {
    pub cart: Option<CartData>,
    pub source: CartSource,
}

impl LoadedCart {
    #[must_use]
    pub fn total_quantity(&self) -> u32 {
        self.cart.as_ref().map_or(0, CartData::total_quantity)
    }
}

/// Result of a cart mutation.
#[derive(Debug, Clone)]
pub struct CartUpdate {
    /// The cart as the backend returned it.
    pub cart: CartData,
    /// False when a newer request superseded this one and the cache was left
    /// untouched.
    pub cached: bool,
    pub shifts: Vec<RowShift>,
}

/// An edit to an existing line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineEdit {
    pub line_id: String,
    pub quantity: u32,
    pub cake_wording: Option<String>,
    pub greeting_wording: Option<String>,
}

/// Cart operations for one visitor.
#[derive(Clone)]
pub struct CartService {
    backend: Arc<dyn BackendApi>,
    storage: ClientStorage,
    events: EventHub,
    generations: CartGenerations,
}

impl CartService {
    #[must_use]
    pub fn new(
        backend: Arc<dyn BackendApi>,
        storage: ClientStorage,
        events: EventHub,
        generations: CartGenerations,
    ) -> Self {
        Self {
            backend,
            storage,
            events,
            generations,
        }
    }

    /// The stored cart id.
    ///
    /// # Errors
    ///
    /// Returns an error if the session store fails.
    pub async fn cart_id(&self) -> Result<Option<String>, StorageError> {
        Ok(self.storage.load::<CartIdRecord>().await?.map(|record| record.0))
    }

    /// Load the cart, from cache when possible.
    ///
    /// # Errors
    ///
    /// Returns an error if storage fails or the backend fetch fails.
    #[instrument(skip(self))]
    pub async fn load(&self) -> Result<LoadedCart, CartError> {
        let Some(cart_id) = self.cart_id().await? else {
            return Ok(LoadedCart {
                cart: None,
                source: CartSource::Empty,
            });
        };

        if let Some(cache) = self.storage.load::<CartCache>().await? {
            if cache.cart_id == cart_id {
                return Ok(LoadedCart {
                    cart: Some(cache.cart),
                    source: CartSource::Cache,
                });
            }
            tracing::debug!(cached = %cache.cart_id, stored = %cart_id, "Discarding cart cache for another cart");
            self.storage.remove::<CartCache>().await?;
        }

        let client = self.storage.client_id().await?;
        let ticket = self.generations.observe(client).await;

        let Some(cart) = self.backend.get_cart(&cart_id).await? else {
            tracing::info!(%cart_id, "Backend no longer knows this cart; forgetting it");
            self.storage.remove::<CartIdRecord>().await?;
            return Ok(LoadedCart {
                cart: None,
                source: CartSource::Empty,
            });
        };

        if ticket.is_current() {
            self.storage
                .save(&CartCache {
                    cart_id,
                    cart: cart.clone(),
                })
                .await?;
        }

        Ok(LoadedCart {
            cart: Some(cart),
            source: CartSource::Backend,
        })
    }

    /// Add a line, creating the cart first if the visitor has none.
    ///
    /// # Errors
    ///
    /// Returns an error if storage or the backend fails. The cache stays
    /// invalidated on failure.
    #[instrument(skip(self, line, token), fields(variant_id = %line.variant_id))]
    pub async fn add(&self, line: LineInput, token: Option<&str>) -> Result<CartUpdate, CartError> {
        let (ticket, before) = self.begin_mutation().await?;

        let cart = match self.cart_id().await? {
            Some(cart_id) => {
                let payload = AddCartLinePayload { cart_id, line };
                self.backend.add_cart_line(&payload, token).await?
            }
            None => self.backend.create_cart(&line, token).await?,
        };

        if cart.id.trim().is_empty() {
            return Err(BackendError::Malformed("cart without id".to_string()).into());
        }

        self.finish_mutation(ticket, before, cart).await
    }

    /// Change a line's quantity and wording.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::NoCart`] without a stored cart id, or an error if
    /// storage or the backend fails.
    #[instrument(skip(self, edit), fields(line_id = %edit.line_id))]
    pub async fn update_line(&self, edit: LineEdit) -> Result<CartUpdate, CartError> {
        let cart_id = self.cart_id().await?.ok_or(CartError::NoCart)?;
        let (ticket, before) = self.begin_mutation().await?;

        let payload = UpdateCartLinePayload {
            cart_id,
            line_id: edit.line_id,
            quantity: Some(edit.quantity.max(1)),
            cake_wording: non_blank(edit.cake_wording),
            greeting_wording: non_blank(edit.greeting_wording),
        };
        let cart = self.backend.update_cart_line(&payload).await?;

        self.finish_mutation(ticket, before, cart).await
    }

    /// Remove a line.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::NoCart`] without a stored cart id, or an error if
    /// storage or the backend fails.
    #[instrument(skip(self))]
    pub async fn remove_line(&self, line_id: &str) -> Result<CartUpdate, CartError> {
        let cart_id = self.cart_id().await?.ok_or(CartError::NoCart)?;
        let (ticket, before) = self.begin_mutation().await?;

        let payload = RemoveCartItemPayload {
            cart_id,
            line_ids: line_id.to_string(),
        };
        let cart = self.backend.remove_cart_line(&payload).await?;

        self.finish_mutation(ticket, before, cart).await
    }

    /// Drop the cached cart so the next read goes to the backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the session store fails.
    pub async fn invalidate(&self) -> Result<(), StorageError> {
        self.storage.remove::<CartCache>().await
    }

    /// Supersede earlier requests and invalidate the cache, remembering the
    /// line order it held.
    async fn begin_mutation(&self) -> Result<(CartTicket, Vec<String>), CartError> {
        let client = self.storage.client_id().await?;
        let ticket = self.generations.begin(client).await;
        let before = self
            .storage
            .load::<CartCache>()
            .await?
            .map(|cache| cache.cart.line_ids())
            .unwrap_or_default();
        self.invalidate().await?;
        Ok((ticket, before))
    }

    async fn finish_mutation(
        &self,
        ticket: CartTicket,
        before: Vec<String>,
        cart: CartData,
    ) -> Result<CartUpdate, CartError> {
        let cached = ticket.is_current();
        if cached {
            self.storage.save(&CartIdRecord(cart.id.clone())).await?;
            self.storage
                .save(&CartCache {
                    cart_id: cart.id.clone(),
                    cart: cart.clone(),
                })
                .await?;
        } else {
            tracing::debug!(cart_id = %cart.id, "Ignoring stale cart response");
            if self.cart_id().await?.is_none() {
                self.storage.save(&CartIdRecord(cart.id.clone())).await?;
            }
        }

        let client = self.storage.client_id().await?;
        self.events
            .publish(client, self.storage.tab(), StoreEvent::CartChanged)
            .await;

        let shifts = row_shifts(&before, &cart.line_ids());
        Ok(CartUpdate {
            cart,
            cached,
            shifts,
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::services::testing::{FakeBackend, sample_cart};
    use crate::storage::tests::memory_storage;

    fn service(backend: &Arc<FakeBackend>) -> (CartService, ClientStorage) {
        let storage = memory_storage();
        let service = CartService::new(
            backend.clone(),
            storage.clone(),
            EventHub::new(),
            CartGenerations::new(),
        );
        (service, storage)
    }

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_row_shifts() {
        let shifts = row_shifts(&ids(&["a", "b", "c"]), &ids(&["b", "c", "a"]));
        assert_eq!(
            shifts,
            vec![
                RowShift { line_id: "b".to_string(), rows: 1 },
                RowShift { line_id: "c".to_string(), rows: 1 },
                RowShift { line_id: "a".to_string(), rows: -2 },
            ]
        );
    }

    #[test]
    fn test_row_shifts_ignore_unmoved_and_new_rows() {
        assert!(row_shifts(&ids(&["a", "b"]), &ids(&["a", "b", "c"])).is_empty());
        assert_eq!(
            row_shifts(&ids(&["a", "b", "c"]), &ids(&["a", "c"])),
            vec![RowShift { line_id: "c".to_string(), rows: 1 }]
        );
    }

    #[tokio::test]
    async fn test_ticket_superseded_by_newer_request() {
        let generations = CartGenerations::new();
        let client = Uuid::new_v4();

        let first = generations.begin(client).await;
        assert!(first.is_current());
        let second = generations.begin(client).await;
        assert!(!first.is_current());
        assert!(second.is_current());

        let observed = generations.observe(client).await;
        assert!(observed.is_current());
        let _third = generations.begin(client).await;
        assert!(!observed.is_current());
    }

    #[tokio::test]
    async fn test_load_without_cart_id_is_empty() {
        let backend = Arc::new(FakeBackend::default());
        let (service, _) = service(&backend);

        let loaded = service.load().await.unwrap();
        assert_eq!(loaded.source, CartSource::Empty);
        assert_eq!(backend.calls("get_cart"), 0);
    }

    #[tokio::test]
    async fn test_load_serves_matching_cache_without_network() {
        let backend = Arc::new(FakeBackend::default());
        let (service, storage) = service(&backend);
        storage.save(&CartIdRecord("cart-1".to_string())).await.unwrap();
        storage
            .save(&CartCache {
                cart_id: "cart-1".to_string(),
                cart: sample_cart("cart-1", &["line-1"]),
            })
            .await
            .unwrap();

        let loaded = service.load().await.unwrap();
        assert_eq!(loaded.source, CartSource::Cache);
        assert_eq!(backend.calls("get_cart"), 0);
    }

    #[tokio::test]
    async fn test_load_refetches_when_cache_belongs_to_other_cart() {
        let backend = Arc::new(FakeBackend::default());
        backend.put_cart(sample_cart("cart-2", &["line-9"]));
        let (service, storage) = service(&backend);
        storage.save(&CartIdRecord("cart-2".to_string())).await.unwrap();
        storage
            .save(&CartCache {
                cart_id: "cart-1".to_string(),
                cart: sample_cart("cart-1", &["line-1"]),
            })
            .await
            .unwrap();

        let loaded = service.load().await.unwrap();
        assert_eq!(loaded.source, CartSource::Backend);
        assert_eq!(backend.calls("get_cart"), 1);

        let cache = storage.load::<CartCache>().await.unwrap().unwrap();
        assert_eq!(cache.cart_id, "cart-2");
    }

    #[tokio::test]
    async fn test_load_forgets_unknown_cart() {
        let backend = Arc::new(FakeBackend::default());
        let (service, storage) = service(&backend);
        storage.save(&CartIdRecord("gone".to_string())).await.unwrap();

        let loaded = service.load().await.unwrap();
        assert_eq!(loaded.source, CartSource::Empty);
        assert!(service.cart_id().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_add_without_cart_creates_one() {
        let backend = Arc::new(FakeBackend::default());
        let (service, storage) = service(&backend);

        let update = service
            .add(LineInput::new("variant-1", 1), None)
            .await
            .unwrap();

        assert_eq!(backend.calls("create_cart"), 1);
        assert_eq!(backend.calls("add_cart_line"), 0);
        assert_eq!(service.cart_id().await.unwrap(), Some(update.cart.id.clone()));
        assert!(update.cached);
        let cache = storage.load::<CartCache>().await.unwrap().unwrap();
        assert_eq!(cache.cart_id, update.cart.id);
    }

    #[tokio::test]
    async fn test_add_with_cart_appends_line() {
        let backend = Arc::new(FakeBackend::default());
        backend.put_cart(sample_cart("cart-1", &["line-1"]));
        let (service, storage) = service(&backend);
        storage.save(&CartIdRecord("cart-1".to_string())).await.unwrap();

        let update = service
            .add(LineInput::new("variant-2", 2), Some("tok"))
            .await
            .unwrap();

        assert_eq!(backend.calls("add_cart_line"), 1);
        assert_eq!(update.cart.lines().len(), 2);
    }

    #[tokio::test]
    async fn test_cart_changed_names_the_sending_tab() {
        let backend = Arc::new(FakeBackend::default());
        let storage = memory_storage().with_tab(Some("tab-a"));
        let events = EventHub::new();
        let service = CartService::new(
            backend.clone(),
            storage.clone(),
            events.clone(),
            CartGenerations::new(),
        );
        let mut rx = events.subscribe(storage.client_id().await.unwrap()).await;

        service.add(LineInput::new("variant-1", 1), None).await.unwrap();

        let published = rx.recv().await.unwrap();
        assert_eq!(published.event, StoreEvent::CartChanged);
        assert!(!published.is_for(Some("tab-a")));
        assert!(published.is_for(Some("tab-b")));
    }

    #[tokio::test]
    async fn test_failed_mutation_leaves_cache_invalidated() {
        let backend = Arc::new(FakeBackend::default());
        backend.put_cart(sample_cart("cart-1", &["line-1"]));
        backend.fail_next("remove_cart_line");
        let (service, storage) = service(&backend);
        storage.save(&CartIdRecord("cart-1".to_string())).await.unwrap();
        storage
            .save(&CartCache {
                cart_id: "cart-1".to_string(),
                cart: sample_cart("cart-1", &["line-1"]),
            })
            .await
            .unwrap();

        assert!(service.remove_line("line-1").await.is_err());
        assert!(!storage.contains::<CartCache>().await.unwrap());
    }

    #[tokio::test]
    async fn test_remove_reports_row_shifts() {
        let backend = Arc::new(FakeBackend::default());
        backend.put_cart(sample_cart("cart-1", &["a", "b", "c"]));
        let (service, storage) = service(&backend);
        storage.save(&CartIdRecord("cart-1".to_string())).await.unwrap();
        service.load().await.unwrap();

        let update = service.remove_line("a").await.unwrap();
        assert_eq!(update.cart.line_ids(), ids(&["b", "c"]));
        assert_eq!(update.shifts.len(), 2);
        assert!(update.shifts.iter().all(|shift| shift.rows == 1));
    }

    #[tokio::test]
    async fn test_update_without_cart_is_rejected() {
        let backend = Arc::new(FakeBackend::default());
        let (service, _) = service(&backend);
        let edit = LineEdit {
            line_id: "l".to_string(),
            quantity: 2,
            cake_wording: None,
            greeting_wording: None,
        };
        assert!(matches!(service.update_line(edit).await, Err(CartError::NoCart)));
    }

    #[tokio::test]
    async fn test_stale_response_not_written_to_cache() {
        let backend = Arc::new(FakeBackend::default());
        backend.put_cart(sample_cart("cart-1", &["line-1"]));
        let generations = CartGenerations::new();
        let storage = memory_storage();
        let service = CartService::new(
            backend.clone(),
            storage.clone(),
            EventHub::new(),
            generations.clone(),
        );
        storage.save(&CartIdRecord("cart-1".to_string())).await.unwrap();
        let client = storage.client_id().await.unwrap();

        // A newer request starts while this one is in flight.
        let newer = generations.clone();
        backend.before_next_call(Box::pin(async move {
            newer.begin(client).await;
        }));

        let update = service
            .add(LineInput::new("variant-2", 1), None)
            .await
            .unwrap();
        assert!(!update.cached);
        assert!(!storage.contains::<CartCache>().await.unwrap());
    }
}

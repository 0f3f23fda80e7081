//! Checkout, including resumption across a login redirect.
//!
//! An authenticated visitor checks out straight away. A visitor without a
//! valid token has the request stored as a [`PendingCheckout`] and is sent to
//! log in; once authenticated, the pending request is replayed exactly once
//! and then deleted whatever the outcome.
//!
//! ```text
//! Idle ─┬─ token ──▶ CheckingOut ─┬─▶ Completed
//!       │                         └─▶ Failed
//!       └─ no token ─▶ AwaitingAuth ── login ──▶ CheckingOut
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use moka::future::Cache;
use serde::Deserialize;
use tracing::instrument;
use union_bakery_core::DeliveryDetails;
use uuid::Uuid;

use crate::backend::{BackendApi, BackendError, CheckoutPayload};
use crate::events::{EventHub, StoreEvent};
use crate::services::auth_store::{AuthSnapshot, AuthStore};
use crate::storage::{
    CartCache, CartIdRecord, ClientStorage, LastOrder, OrderSnapshot, PendingCheckout,
    StorageError,
};

/// Where an unauthenticated checkout sends the visitor.
pub const LOGIN_FOR_CHECKOUT: &str = "/auth/login?ref=/cart";

/// Shown when checkout is attempted without a cart.
pub const EMPTY_CART_MESSAGE: &str = "Your cart is empty.";

/// How long a finished replay is remembered, to reject stale duplicates.
const REPLAY_MEMORY: Duration = Duration::from_secs(10 * 60);

/// How long a replay may hold its in-flight slot.
const REPLAY_SLOT: Duration = Duration::from_secs(2 * 60);

/// The delivery form on the cart page.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutForm {
    #[serde(default)]
    pub delivery_date: String,
    #[serde(default)]
    pub delivery_time: String,
    #[serde(default)]
    pub phone: String,
}

/// How a checkout attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutOutcome {
    /// The order was placed; its confirmation is stored as the last order.
    Completed { order: OrderSnapshot },
    /// The request was stored; the visitor must log in first.
    AwaitingAuth { login_url: &'static str },
    /// The backend refused or could not be reached.
    Failed { message: String },
    /// The delivery form has problems, keyed by field.
    Invalid(BTreeMap<String, String>),
}

impl CheckoutOutcome {
    fn failed(error: &BackendError) -> Self {
        let fields = error.field_errors();
        if fields.is_empty() {
            Self::Failed {
                message: error.user_message(),
            }
        } else {
            Self::Invalid(fields)
        }
    }
}

/// Keeps a pending checkout from being replayed twice for the same visitor.
///
/// A visitor holds at most one in-flight slot. A finished replay is also
/// remembered by payload, so a request still holding an older copy of the
/// session cannot replay it again.
#[derive(Clone)]
pub struct ReplayGuard {
    in_flight: Cache<Uuid, ()>,
    finished: Cache<(Uuid, String), ()>,
}

impl Default for ReplayGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl ReplayGuard {
    #[must_use]
    pub fn new() -> Self {
        Self {
            in_flight: Cache::builder()
                .max_capacity(100_000)
                .time_to_live(REPLAY_SLOT)
                .build(),
            finished: Cache::builder()
                .max_capacity(100_000)
                .time_to_live(REPLAY_MEMORY)
                .build(),
        }
    }

    /// Claim the visitor's replay slot. `false` if another replay holds it or
    /// this payload was already replayed.
    pub async fn try_begin(&self, client: Uuid, fingerprint: &str) -> bool {
        if self
            .finished
            .contains_key(&(client, fingerprint.to_string()))
        {
            return false;
        }
        self.in_flight.entry(client).or_insert(()).await.is_fresh()
    }

    /// Release the slot and remember the payload as replayed.
    pub async fn finish(&self, client: Uuid, fingerprint: &str) {
        self.finished
            .insert((client, fingerprint.to_string()), ())
            .await;
        self.in_flight.invalidate(&client).await;
    }

    /// Drop the memory of a finished replay once the visitor submits the
    /// same request again.
    pub async fn forget(&self, client: Uuid, fingerprint: &str) {
        self.finished
            .invalidate(&(client, fingerprint.to_string()))
            .await;
    }

    /// Whether `fingerprint` was already replayed for `client`.
    #[must_use]
    pub fn was_replayed(&self, client: Uuid, fingerprint: &str) -> bool {
        self.finished
            .contains_key(&(client, fingerprint.to_string()))
    }
}

fn fingerprint(payload: &CheckoutPayload) -> String {
    format!(
        "{}|{}|{}|{}",
        payload.cart_id, payload.phone, payload.delivery_date, payload.delivery_time
    )
}

/// Checkout for one visitor.
#[derive(Clone)]
pub struct CheckoutFlow {
    backend: Arc<dyn BackendApi>,
    storage: ClientStorage,
    events: EventHub,
    guard: ReplayGuard,
    order_ttl: chrono::Duration,
}

impl CheckoutFlow {
    #[must_use]
    pub fn new(
        backend: Arc<dyn BackendApi>,
        storage: ClientStorage,
        events: EventHub,
        guard: ReplayGuard,
        order_ttl: chrono::Duration,
    ) -> Self {
        Self {
            backend,
            storage,
            events,
            guard,
            order_ttl,
        }
    }

    /// Submit the delivery form.
    ///
    /// # Errors
    ///
    /// Returns an error only if the session store fails. Backend failures are
    /// reported as [`CheckoutOutcome::Failed`].
    #[instrument(skip(self, form, auth))]
    pub async fn submit(
        &self,
        form: &CheckoutForm,
        auth: &AuthSnapshot,
    ) -> Result<CheckoutOutcome, StorageError> {
        let details =
            match DeliveryDetails::parse(&form.delivery_date, &form.delivery_time, &form.phone) {
                Ok(details) => details,
                Err(errors) => {
                    let fields = errors
                        .iter()
                        .map(|error| (error.field().to_string(), error.to_string()))
                        .collect();
                    return Ok(CheckoutOutcome::Invalid(fields));
                }
            };

        let Some(CartIdRecord(cart_id)) = self.storage.load::<CartIdRecord>().await? else {
            return Ok(CheckoutOutcome::Failed {
                message: EMPTY_CART_MESSAGE.to_string(),
            });
        };

        let payload = CheckoutPayload {
            cart_id,
            phone: details.phone.clone(),
            delivery_time: details.slot.label().to_string(),
            delivery_date: details.date_string(),
        };

        let Some(token) = auth.token() else {
            return self.await_auth(payload).await;
        };

        match self.run(&payload, token).await? {
            Ok(order) => Ok(CheckoutOutcome::Completed { order }),
            Err(e) if e.is_auth_failure() => {
                tracing::info!("Token rejected during checkout; asking to log in again");
                AuthStore::new(self.storage.clone(), self.events.clone())
                    .clear_auth()
                    .await?;
                self.await_auth(payload).await
            }
            Err(e) => Ok(CheckoutOutcome::failed(&e)),
        }
    }

    /// Replay a stored checkout after the visitor authenticated.
    ///
    /// Returns `None` when there is nothing to replay: no token, no record, a
    /// record without a cart id, or another replay for this visitor already
    /// running or done.
    ///
    /// # Errors
    ///
    /// Returns an error only if the session store fails.
    #[instrument(skip(self, auth))]
    pub async fn resume_pending(
        &self,
        auth: &AuthSnapshot,
    ) -> Result<Option<CheckoutOutcome>, StorageError> {
        let Some(token) = auth.token() else {
            return Ok(None);
        };
        let Some(PendingCheckout(payload)) = self.storage.load::<PendingCheckout>().await? else {
            return Ok(None);
        };
        if payload.cart_id.trim().is_empty() {
            tracing::debug!("Pending checkout has no cart id; leaving it in place");
            return Ok(None);
        }

        let client = self.storage.client_id().await?;
        let key = fingerprint(&payload);
        if self.guard.was_replayed(client, &key) {
            self.storage.remove::<PendingCheckout>().await?;
            return Ok(None);
        }
        if !self.guard.try_begin(client, &key).await {
            tracing::debug!(%client, "Pending checkout replay already running");
            return Ok(None);
        }

        tracing::info!(cart_id = %payload.cart_id, "Replaying pending checkout");
        let removed = self.storage.remove::<PendingCheckout>().await;
        let result = match removed {
            Ok(()) => self.run(&payload, token).await,
            Err(e) => Err(e),
        };
        self.guard.finish(client, &key).await;

        Ok(Some(match result? {
            Ok(order) => CheckoutOutcome::Completed { order },
            Err(e) => {
                tracing::warn!(error = %e, "Pending checkout replay failed");
                CheckoutOutcome::failed(&e)
            }
        }))
    }

    async fn await_auth(&self, payload: CheckoutPayload) -> Result<CheckoutOutcome, StorageError> {
        let client = self.storage.client_id().await?;
        self.guard.forget(client, &fingerprint(&payload)).await;
        self.storage.save(&PendingCheckout(payload)).await?;
        Ok(CheckoutOutcome::AwaitingAuth {
            login_url: LOGIN_FOR_CHECKOUT,
        })
    }

    /// Attach the buyer, place the order and record the confirmation.
    ///
    /// The outer error is storage, the inner one the backend.
    async fn run(
        &self,
        payload: &CheckoutPayload,
        token: &str,
    ) -> Result<Result<OrderSnapshot, BackendError>, StorageError> {
        self.storage.remove::<CartCache>().await?;

        let cart = match self
            .backend
            .update_buyer_identity(&payload.cart_id, token)
            .await
        {
            Ok(cart) => cart,
            Err(e) => {
                tracing::warn!(error = %e, cart_id = %payload.cart_id, "Buyer identity update failed");
                return Ok(Err(e));
            }
        };

        if let Err(e) = self.backend.checkout(payload, token).await {
            tracing::warn!(error = %e, cart_id = %payload.cart_id, "Checkout failed");
            return Ok(Err(e));
        }

        let order = OrderSnapshot::from_checkout(&cart, payload);
        self.storage.remove::<PendingCheckout>().await?;
        self.storage.remove::<CartCache>().await?;
        self.storage
            .save(&LastOrder::new(order.clone(), Utc::now(), self.order_ttl))
            .await?;

        let client = self.storage.client_id().await?;
        self.events
            .publish(client, self.storage.tab(), StoreEvent::CartChanged)
            .await;
        tracing::info!(cart_id = %payload.cart_id, lines = order.lines.len(), "Order placed");

        Ok(Ok(order))
    }
}

/// Read the last order as of `now`.
///
/// An expired record is deleted and reads as `None`. A record stored without
/// an expiry is given one, `ttl` from `now`.
///
/// # Errors
///
/// Returns an error if the session store fails.
pub async fn load_last_order(
    storage: &ClientStorage,
    now: DateTime<Utc>,
    ttl: chrono::Duration,
) -> Result<Option<LastOrder>, StorageError> {
    let Some(record) = storage.load::<LastOrder>().await? else {
        return Ok(None);
    };

    match record {
        LastOrder::Bare(order) => {
            let wrapped = LastOrder::new(order, now, ttl);
            storage.save(&wrapped).await?;
            Ok(Some(wrapped))
        }
        expiring if expiring.is_expired_at(now) => {
            tracing::debug!("Last order expired");
            storage.remove::<LastOrder>().await?;
            Ok(None)
        }
        expiring => Ok(Some(expiring)),
    }
}

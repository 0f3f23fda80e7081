//! Store change notifications.
//!
//! When auth or cart state changes, other views need to know:
//!
//! - The tab that caused the change learns through an `HX-Trigger` response
//!   header, which htmx turns into DOM events.
//! - Other tabs of the same visitor learn through the `/events` SSE stream.
//!
//! Both carry the same event names.

use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderName, HeaderValue};
use axum::response::Response;
use chrono::{DateTime, Utc};
use moka::future::Cache;
use serde_json::{Map, Value, json};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::services::flight::FlightPlan;

/// Response header htmx reads to dispatch client-side events.
pub const HX_TRIGGER: HeaderName = HeaderName::from_static("hx-trigger");

/// Channels idle this long are dropped.
const CHANNEL_IDLE: Duration = Duration::from_secs(60 * 60);

/// Buffered events per visitor before slow subscribers start lagging.
const CHANNEL_CAPACITY: usize = 32;

/// A change another view may need to react to.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    /// The visitor logged in, logged out, or their token expired. Carries
    /// the new token's expiry, `None` when signed out.
    AuthChanged(Option<DateTime<Utc>>),
    /// The cart's contents changed.
    CartChanged,
    /// An item was added; carries the fly-to-cart animation plan.
    CartAdded(FlightPlan),
}

impl StoreEvent {
    /// DOM/SSE event name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::AuthChanged(_) => "auth-changed",
            Self::CartChanged => "cart-changed",
            Self::CartAdded(_) => "cart:added",
        }
    }

    /// Event payload, `null` when there is none.
    #[must_use]
    pub fn detail(&self) -> Value {
        match self {
            Self::CartAdded(plan) => serde_json::to_value(plan).unwrap_or(Value::Null),
            Self::AuthChanged(Some(expires_at)) => {
                json!({ "expiresAt": expires_at.timestamp_millis() })
            }
            Self::AuthChanged(None) | Self::CartChanged => Value::Null,
        }
    }
}

/// Build an `HX-Trigger` header value announcing `events`.
///
/// Returns `None` when there is nothing to announce.
#[must_use]
pub fn hx_trigger(events: &[StoreEvent]) -> Option<HeaderValue> {
    if events.is_empty() {
        return None;
    }
    let object: Map<String, Value> = events
        .iter()
        .map(|event| (event.name().to_string(), event.detail()))
        .collect();
    HeaderValue::from_str(&Value::Object(object).to_string()).ok()
}

/// Attach an `HX-Trigger` header announcing `events` to `response`.
#[must_use]
pub fn with_trigger(mut response: Response, events: &[StoreEvent]) -> Response {
    if let Some(value) = hx_trigger(events) {
        response.headers_mut().insert(HX_TRIGGER, value);
    }
    response
}

/// An event as it travels to the visitor's streams.
#[derive(Debug, Clone, PartialEq)]
pub struct Published {
    /// The tab whose request caused the event. That tab already heard about
    /// it through `HX-Trigger`.
    pub origin: Option<String>,
    pub event: StoreEvent,
}

impl Published {
    /// Whether the stream of `tab` should relay this event.
    #[must_use]
    pub fn is_for(&self, tab: Option<&str>) -> bool {
        match (self.origin.as_deref(), tab) {
            (Some(origin), Some(tab)) => origin != tab,
            _ => true,
        }
    }
}

/// Fan-out of store events to every open tab of a visitor.
///
/// Cheap to clone.
#[derive(Clone)]
pub struct EventHub {
    channels: Arc<Cache<Uuid, broadcast::Sender<Published>>>,
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}

impl EventHub {
    #[must_use]
    pub fn new() -> Self {
        let channels = Cache::builder()
            .max_capacity(100_000)
            .time_to_idle(CHANNEL_IDLE)
            .build();
        Self {
            channels: Arc::new(channels),
        }
    }

    /// Publish an event to every subscriber of `client`, noting the tab it
    /// came from.
    ///
    /// Publishing with no subscribers is a no-op.
    pub async fn publish(&self, client: Uuid, origin: Option<&str>, event: StoreEvent) {
        if let Some(sender) = self.channels.get(&client).await {
            let name = event.name();
            let delivered = sender
                .send(Published {
                    origin: origin.map(str::to_string),
                    event,
                })
                .unwrap_or(0);
            tracing::debug!(%client, event = name, ?origin, delivered, "Published store event");
        }
    }

    /// Subscribe to `client`'s events.
    pub async fn subscribe(&self, client: Uuid) -> broadcast::Receiver<Published> {
        self.channels
            .get_with(client, async { broadcast::channel(CHANNEL_CAPACITY).0 })
            .await
            .subscribe()
    }
}

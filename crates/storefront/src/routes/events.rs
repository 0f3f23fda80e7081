//! Server-sent store events.
//!
//! Each open tab keeps one `/events` stream. It relays the visitor's
//! [`StoreEvent`]s as they are published and, while the visitor holds a
//! token, arms a timer that announces `auth-changed` the moment the token
//! lapses. The timer is re-armed from every `auth-changed` and dropped with
//! the stream.
//!
//! A tab opens its stream with `?tab=<id>` and sends the same id in the
//! `x-tab-id` header of its htmx requests. Events its own requests caused
//! are not echoed back, since the `HX-Trigger` header already delivered them.

use std::convert::Infallible;
use std::time::Duration;

use async_stream::stream;
use axum::{
    extract::{Query, State},
    response::sse::{Event, KeepAlive, Sse},
};
use chrono::{DateTime, Utc};
use futures::Stream;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::broadcast::error::RecvError;
use tokio::time::Instant;

use crate::error::AppError;
use crate::events::{Published, StoreEvent};
use crate::middleware::OptionalAuth;
use crate::state::AppState;
use crate::storage::ClientStorage;

/// Query of the `/events` request.
#[derive(Debug, Default, Deserialize)]
pub struct StreamQuery {
    pub tab: Option<String>,
}

/// What woke the stream up.
enum Wake {
    Event(Published),
    /// Events were dropped; the tab should refetch everything.
    Lagged(u64),
    Expired,
    Closed,
}

/// SSE `data` for an event. `remote` tells the tab the change came from
/// elsewhere, so it refreshes without replaying local effects.
fn event_payload(event: &StoreEvent) -> Value {
    json!({ "remote": true, "detail": event.detail() })
}

fn sse_event(event: &StoreEvent) -> Event {
    Event::default()
        .event(event.name())
        .data(event_payload(event).to_string())
}

/// Time left before `expires_at`, zero once passed.
fn time_left(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (expires_at - now).to_std().unwrap_or(Duration::ZERO)
}

fn deadline(expires_at: Option<DateTime<Utc>>) -> Option<Instant> {
    expires_at.map(|at| Instant::now() + time_left(at, Utc::now()))
}

/// Stream the visitor's store events.
pub async fn stream(
    State(state): State<AppState>,
    storage: ClientStorage,
    OptionalAuth(auth): OptionalAuth,
    Query(query): Query<StreamQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let storage = storage.with_tab(query.tab.as_deref());
    let tab = storage.tab().map(str::to_string);
    let client = storage.client_id().await?;
    let mut rx = state.events().subscribe(client).await;
    let mut expires_at = if auth.is_auth() { auth.expires_at() } else { None };
    tracing::debug!(%client, ?tab, ?expires_at, "Event stream opened");

    let events = stream! {
        let mut timer = deadline(expires_at);
        loop {
            let expiry = async move {
                match timer {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            };

            let wake = tokio::select! {
                received = rx.recv() => match received {
                    Ok(event) => Wake::Event(event),
                    Err(RecvError::Lagged(missed)) => Wake::Lagged(missed),
                    Err(RecvError::Closed) => Wake::Closed,
                },
                () = expiry => Wake::Expired,
            };

            match wake {
                Wake::Event(published) => {
                    if let StoreEvent::AuthChanged(next) = &published.event {
                        expires_at = *next;
                        timer = deadline(expires_at);
                    }
                    if published.is_for(tab.as_deref()) {
                        yield Ok(sse_event(&published.event));
                    }
                }
                Wake::Lagged(missed) => {
                    tracing::warn!(%client, missed, "Event stream lagged; asking tab to resync");
                    yield Ok(sse_event(&StoreEvent::AuthChanged(expires_at)));
                    yield Ok(sse_event(&StoreEvent::CartChanged));
                }
                Wake::Expired => {
                    tracing::debug!(%client, "Token expired while stream open");
                    expires_at = None;
                    timer = None;
                    yield Ok(sse_event(&StoreEvent::AuthChanged(None)));
                }
                Wake::Closed => break,
            }
        }
    };

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_time_left_never_negative() {
        let now = Utc::now();
        assert_eq!(time_left(now - chrono::Duration::seconds(5), now), Duration::ZERO);
        assert_eq!(
            time_left(now + chrono::Duration::seconds(5), now),
            Duration::from_secs(5)
        );
    }

    #[test]
    fn test_payload_marks_remote() {
        let payload = event_payload(&StoreEvent::CartChanged);
        assert_eq!(payload["remote"], true);
        assert!(payload["detail"].is_null());
    }

    #[test]
    fn test_no_deadline_without_expiry() {
        assert!(deadline(None).is_none());
        assert!(deadline(Some(Utc::now() + chrono::Duration::minutes(1))).is_some());
    }
}

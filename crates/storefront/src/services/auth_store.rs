//! Visitor authentication state.
//!
//! The access token and its expiry live in the visitor's storage under
//! `auth_state`. Validity is recomputed from the expiry on every read, and an
//! expired or malformed record is purged the first time it is seen. Every
//! transition is announced as [`StoreEvent::AuthChanged`].

use chrono::{DateTime, Utc};
use union_bakery_core::AuthPayload;
use uuid::Uuid;

use crate::events::{EventHub, StoreEvent};
use crate::storage::{ClientStorage, StorageError};

/// Errors when storing a new auth payload.
#[derive(Debug, thiserror::Error)]
pub enum AuthStoreError {
    #[error("invalid auth payload: {0}")]
    Invalid(#[from] union_bakery_core::AuthPayloadError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// A point-in-time read of the auth state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthSnapshot {
    payload: Option<AuthPayload>,
}

impl AuthSnapshot {
    /// A snapshot with no token.
    #[must_use]
    pub const fn anonymous() -> Self {
        Self { payload: None }
    }

    #[must_use]
    pub const fn from_payload(payload: AuthPayload) -> Self {
        Self {
            payload: Some(payload),
        }
    }

    /// Whether the visitor is authenticated at `now`.
    #[must_use]
    pub fn is_auth_at(&self, now: DateTime<Utc>) -> bool {
        self.payload
            .as_ref()
            .is_some_and(|payload| payload.is_valid_at(now))
    }

    /// Whether the visitor is authenticated right now.
    #[must_use]
    pub fn is_auth(&self) -> bool {
        self.is_auth_at(Utc::now())
    }

    /// The bearer token, only while it is still valid.
    #[must_use]
    pub fn token(&self) -> Option<&str> {
        self.payload
            .as_ref()
            .filter(|payload| payload.is_valid())
            .map(|payload| payload.access_token.as_str())
    }

    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.payload.as_ref()?.expiry()
    }
}

/// Read and write a visitor's auth state.
#[derive(Clone)]
pub struct AuthStore {
    storage: ClientStorage,
    events: EventHub,
}

impl AuthStore {
    #[must_use]
    pub const fn new(storage: ClientStorage, events: EventHub) -> Self {
        Self { storage, events }
    }

    /// Current auth state, purging an expired record.
    ///
    /// # Errors
    ///
    /// Returns an error if the session store fails.
    pub async fn snapshot(&self) -> Result<AuthSnapshot, StorageError> {
        self.snapshot_at(Utc::now()).await
    }

    /// [`Self::snapshot`] against an explicit clock.
    ///
    /// # Errors
    ///
    /// Returns an error if the session store fails.
    pub async fn snapshot_at(&self, now: DateTime<Utc>) -> Result<AuthSnapshot, StorageError> {
        let Some(payload) = self.storage.load::<AuthPayload>().await? else {
            return Ok(AuthSnapshot::anonymous());
        };

        if payload.is_valid_at(now) {
            return Ok(AuthSnapshot::from_payload(payload));
        }

        tracing::info!(expires_at = %payload.expires_at, "Purging expired auth state");
        self.storage.remove::<AuthPayload>().await?;
        self.notify(None).await?;
        Ok(AuthSnapshot::anonymous())
    }

    /// Persist a new token and announce the change.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is malformed or storage fails.
    pub async fn set_auth(&self, payload: AuthPayload) -> Result<AuthSnapshot, AuthStoreError> {
        payload.validate()?;
        self.storage.save(&payload).await?;
        let snapshot = AuthSnapshot::from_payload(payload);
        self.notify(snapshot.expires_at()).await?;
        Ok(snapshot)
    }

    /// Forget the token and announce the change.
    ///
    /// # Errors
    ///
    /// Returns an error if the session store fails.
    pub async fn clear_auth(&self) -> Result<(), StorageError> {
        self.storage.remove::<AuthPayload>().await?;
        self.notify(None).await
    }

    async fn notify(&self, expires_at: Option<DateTime<Utc>>) -> Result<(), StorageError> {
        let client: Uuid = self.storage.client_id().await?;
        self.events
            .publish(client, self.storage.tab(), StoreEvent::AuthChanged(expires_at))
            .await;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::storage::tests::memory_storage;

    fn store() -> (AuthStore, ClientStorage, EventHub) {
        let storage = memory_storage();
        let events = EventHub::new();
        (
            AuthStore::new(storage.clone(), events.clone()),
            storage,
            events,
        )
    }

    fn payload(expires_in: Duration) -> AuthPayload {
        AuthPayload::new("tok-123", (Utc::now() + expires_in).to_rfc3339())
    }

    #[tokio::test]
    async fn test_set_auth_then_snapshot() {
        let (store, _, _) = store();
        store.set_auth(payload(Duration::hours(1))).await.unwrap();

        let snapshot = store.snapshot().await.unwrap();
        assert!(snapshot.is_auth());
        assert_eq!(snapshot.token(), Some("tok-123"));
    }

    #[tokio::test]
    async fn test_expired_record_is_purged_on_read() {
        let (store, storage, _) = store();
        storage.save(&payload(Duration::seconds(-5))).await.unwrap();

        let snapshot = store.snapshot().await.unwrap();
        assert!(!snapshot.is_auth());
        assert!(!storage.contains::<AuthPayload>().await.unwrap());
    }

    #[tokio::test]
    async fn test_validity_is_recomputed_against_clock() {
        let (store, _, _) = store();
        let snapshot = store.set_auth(payload(Duration::minutes(10))).await.unwrap();
        let later = Utc::now() + Duration::minutes(11);

        assert!(snapshot.is_auth());
        assert!(!snapshot.is_auth_at(later));
        assert!(!store.snapshot_at(later).await.unwrap().is_auth());
    }

    #[tokio::test]
    async fn test_set_auth_rejects_unparseable_expiry() {
        let (store, storage, _) = store();
        let result = store.set_auth(AuthPayload::new("tok", "soon")).await;
        assert!(matches!(result, Err(AuthStoreError::Invalid(_))));
        assert!(!storage.contains::<AuthPayload>().await.unwrap());
    }

    #[tokio::test]
    async fn test_set_and_clear_publish_auth_changed() {
        let (store, storage, events) = store();
        let client = storage.client_id().await.unwrap();
        let mut rx = events.subscribe(client).await;

        let snapshot = store.set_auth(payload(Duration::hours(1))).await.unwrap();
        store.clear_auth().await.unwrap();

        assert_eq!(
            rx.recv().await.unwrap().event,
            StoreEvent::AuthChanged(snapshot.expires_at())
        );
        assert_eq!(rx.recv().await.unwrap().event, StoreEvent::AuthChanged(None));
        assert!(!store.snapshot().await.unwrap().is_auth());
    }
}

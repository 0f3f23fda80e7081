//! Per-visitor durable storage.
//!
//! Every visitor gets a set of named records kept in their session: the auth
//! payload, the cart id, a cached copy of the cart, delivery info and so on.
//! Records cross this boundary as JSON and are validated on the way in. A
//! record that no longer parses, or fails its own validation, is removed and
//! reported as absent so one corrupt entry never takes a page down.

mod records;

use axum::extract::FromRequestParts;
use axum::http::StatusCode;
use axum::http::request::Parts;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tower_sessions::Session;
use uuid::Uuid;

pub use records::{
    CartCache, CartIdRecord, CheckoutInfo, DeliveryAddress, LastOrder, OrderLine, OrderSnapshot,
    PaymentMethod, PendingCheckout, ShippingMethod,
};

/// Session key of the per-visitor client id.
pub const CLIENT_ID_KEY: &str = "clientId";

/// Request header carrying the id of the browser tab that sent it.
pub const TAB_ID_HEADER: &str = "x-tab-id";

const MAX_TAB_ID_LEN: usize = 64;

/// Accept a tab id only if it is short and plain.
fn parse_tab_id(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let plain = raw
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    (!raw.is_empty() && raw.len() <= MAX_TAB_ID_LEN && plain).then(|| raw.to_string())
}

/// Errors from the storage layer.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The session store failed.
    #[error("session error: {0}")]
    Session(#[from] tower_sessions::session::Error),

    /// A record could not be serialized.
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// A typed record kept under a fixed key.
pub trait StorageRecord: Serialize + DeserializeOwned + Send + Sync {
    /// Storage key.
    const KEY: &'static str;

    /// Check invariants serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns a description of the problem.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

/// Typed access to one visitor's records.
///
/// Cheap to clone; clones share the same session.
#[derive(Clone, Debug)]
pub struct ClientStorage {
    session: Session,
    tab: Option<String>,
}

impl ClientStorage {
    #[must_use]
    pub const fn new(session: Session) -> Self {
        Self { session, tab: None }
    }

    /// Same storage, acting for the browser tab `tab`.
    #[must_use]
    pub fn with_tab(mut self, tab: Option<&str>) -> Self {
        self.tab = tab.and_then(parse_tab_id);
        self
    }

    /// The tab the current request came from, when it said so.
    #[must_use]
    pub fn tab(&self) -> Option<&str> {
        self.tab.as_deref()
    }

    /// The underlying session.
    #[must_use]
    pub const fn session(&self) -> &Session {
        &self.session
    }

    /// Load a record, discarding it if it fails schema validation.
    ///
    /// # Errors
    ///
    /// Returns an error only if the session store itself fails.
    pub async fn load<R: StorageRecord>(&self) -> Result<Option<R>, StorageError> {
        let Some(raw) = self.session.get_value(R::KEY).await? else {
            return Ok(None);
        };

        let problem = match serde_json::from_value::<R>(raw) {
            Ok(record) => match record.validate() {
                Ok(()) => return Ok(Some(record)),
                Err(problem) => problem,
            },
            Err(e) => e.to_string(),
        };

        tracing::warn!(key = R::KEY, %problem, "Discarding malformed stored record");
        self.session.remove_value(R::KEY).await?;
        Ok(None)
    }

    /// Store a record, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the session store fails.
    pub async fn save<R: StorageRecord>(&self, record: &R) -> Result<(), StorageError> {
        let value = serde_json::to_value(record)?;
        self.session.insert_value(R::KEY, value).await?;
        Ok(())
    }

    /// Remove a record. Removing an absent record is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the session store fails.
    pub async fn remove<R: StorageRecord>(&self) -> Result<(), StorageError> {
        self.session.remove_value(R::KEY).await?;
        Ok(())
    }

    /// Whether a raw value exists under the record's key, valid or not.
    ///
    /// # Errors
    ///
    /// Returns an error if the session store fails.
    pub async fn contains<R: StorageRecord>(&self) -> Result<bool, StorageError> {
        Ok(self.session.get_value(R::KEY).await?.is_some())
    }

    /// Stable id for this visitor, created on first use.
    ///
    /// Used to key per-visitor event channels and in-flight guards.
    ///
    /// # Errors
    ///
    /// Returns an error if the session store fails.
    pub async fn client_id(&self) -> Result<Uuid, StorageError> {
        if let Some(id) = self.session.get::<Uuid>(CLIENT_ID_KEY).await? {
            return Ok(id);
        }
        let id = Uuid::new_v4();
        self.session.insert(CLIENT_ID_KEY, id).await?;
        Ok(id)
    }
}

impl<S> FromRequestParts<S> for ClientStorage
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let session = Session::from_request_parts(parts, state).await?;
        let tab = parts
            .headers
            .get(TAB_ID_HEADER)
            .and_then(|value| value.to_str().ok());
        Ok(Self::new(session).with_tab(tab))
    }
}

//! The records a visitor keeps between requests.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use union_bakery_core::AuthPayload;

use super::StorageRecord;
use crate::backend::{CartData, CheckoutPayload};

impl StorageRecord for AuthPayload {
    const KEY: &'static str = "auth_state";

    fn validate(&self) -> Result<(), String> {
        Self::validate(self).map_err(|e| e.to_string())
    }
}

/// Id of the visitor's backend cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CartIdRecord(pub String);

impl StorageRecord for CartIdRecord {
    const KEY: &'static str = "cartId";

    fn validate(&self) -> Result<(), String> {
        if self.0.trim().is_empty() {
            return Err("empty cart id".to_string());
        }
        Ok(())
    }
}

/// Last cart snapshot, valid only while `cart_id` matches the stored cart id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartCache {
    pub cart_id: String,
    pub cart: CartData,
}

impl StorageRecord for CartCache {
    const KEY: &'static str = "cartCache";

    fn validate(&self) -> Result<(), String> {
        if self.cart_id.trim().is_empty() {
            return Err("cart cache without cart id".to_string());
        }
        Ok(())
    }
}

/// A checkout captured while the visitor was logged out.
///
/// Replayed once after the visitor authenticates. An empty `cart_id` is kept
/// as-is and never replayed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PendingCheckout(pub CheckoutPayload);

impl StorageRecord for PendingCheckout {
    const KEY: &'static str = "pendingCheckout";
}

/// A purchased line as shown on the order page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub id: String,
    pub title: String,
    pub quantity: u32,
    /// Unit price in rupiah.
    pub price: Decimal,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
}

impl OrderLine {
    /// Unit price times quantity.
    #[must_use]
    pub fn total(&self) -> Decimal {
        self.price * Decimal::from(self.quantity)
    }
}

/// What was ordered and when it will arrive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSnapshot {
    pub delivery_date: String,
    pub delivery_time: String,
    pub phone: String,
    #[serde(default)]
    pub lines: Vec<OrderLine>,
    pub subtotal: Decimal,
}

impl OrderSnapshot {
    /// Build a snapshot from the cart that was checked out.
    #[must_use]
    pub fn from_checkout(cart: &CartData, payload: &CheckoutPayload) -> Self {
        Self {
            delivery_date: payload.delivery_date.clone(),
            delivery_time: payload.delivery_time.clone(),
            phone: payload.phone.clone(),
            lines: cart
                .lines()
                .iter()
                .map(|line| OrderLine {
                    id: line.id.clone(),
                    title: line.title().to_string(),
                    quantity: line.quantity,
                    price: line.merchandise.price.amount,
                    note: line.note(),
                    image: line.merchandise.image.as_ref().map(|image| image.url.clone()),
                })
                .collect(),
            subtotal: cart.subtotal(),
        }
    }
}

/// The most recent order, with an expiry in epoch milliseconds.
///
/// Older records stored the snapshot bare; those are accepted and given a
/// fresh expiry when first read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LastOrder {
    Expiring {
        data: OrderSnapshot,
        #[serde(rename = "expiresAt")]
        expires_at: i64,
    },
    Bare(OrderSnapshot),
}

impl LastOrder {
    /// A record expiring `ttl` after `now`.
    #[must_use]
    pub fn new(data: OrderSnapshot, now: DateTime<Utc>, ttl: Duration) -> Self {
        Self::Expiring {
            data,
            expires_at: (now + ttl).timestamp_millis(),
        }
    }

    #[must_use]
    pub const fn order(&self) -> &OrderSnapshot {
        match self {
            Self::Expiring { data, .. } | Self::Bare(data) => data,
        }
    }

    /// Expiry in epoch milliseconds; `None` for bare records.
    #[must_use]
    pub const fn expires_at_millis(&self) -> Option<i64> {
        match self {
            Self::Expiring { expires_at, .. } => Some(*expires_at),
            Self::Bare(_) => None,
        }
    }

    /// Whether the record has expired at `now`. Bare records never expire.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at_millis()
            .is_some_and(|expires_at| now.timestamp_millis() >= expires_at)
    }

    /// Milliseconds left before expiry, zero once expired.
    #[must_use]
    pub fn remaining_millis(&self, now: DateTime<Utc>) -> Option<i64> {
        self.expires_at_millis()
            .map(|expires_at| (expires_at - now.timestamp_millis()).max(0))
    }
}

impl StorageRecord for LastOrder {
    const KEY: &'static str = "lastOrder";
}

/// Shipping method offered by the mock payment page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingMethod {
    pub id: String,
    pub label: String,
    pub price: Decimal,
}

impl ShippingMethod {
    /// The bakery's own courier, the only method offered.
    #[must_use]
    pub fn internal_courier() -> Self {
        Self {
            id: "internal_courier".to_string(),
            label: "Internal Courier".to_string(),
            price: Decimal::from(25_000),
        }
    }
}

/// Delivery address captured on the mock payment page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryAddress {
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub province: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub postal_code: String,
    #[serde(default)]
    pub phone: String,
}

/// Payment methods offered by the mock payment page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    #[default]
    Qris,
    BankTransfer,
}

impl PaymentMethod {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Qris => "QRIS",
            Self::BankTransfer => "Bank transfer",
        }
    }

    /// Form value, matching the serialized name.
    #[must_use]
    pub const fn value(self) -> &'static str {
        match self {
            Self::Qris => "qris",
            Self::BankTransfer => "bank_transfer",
        }
    }
}

/// Details captured by the mock payment page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutInfo {
    #[serde(default)]
    pub contact_email: String,
    #[serde(default)]
    pub delivery: DeliveryAddress,
    pub shipping_method: ShippingMethod,
    #[serde(default)]
    pub payment_method: PaymentMethod,
}

impl StorageRecord for CheckoutInfo {
    const KEY: &'static str = "checkoutInfo";
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    fn snapshot() -> OrderSnapshot {
        OrderSnapshot {
            delivery_date: "2030-02-14".to_string(),
            delivery_time: "3PM - 5PM".to_string(),
            phone: "0812".to_string(),
            lines: Vec::new(),
            subtotal: Decimal::from(150_000),
        }
    }

    #[test]
    fn test_last_order_expiry() {
        let now = Utc::now();
        let order = LastOrder::new(snapshot(), now, Duration::seconds(300));

        assert!(!order.is_expired_at(now + Duration::seconds(299)));
        assert!(order.is_expired_at(now + Duration::seconds(300)));
        assert!(order.is_expired_at(now + Duration::minutes(6)));
        assert_eq!(order.remaining_millis(now + Duration::minutes(6)), Some(0));
    }

    #[test]
    fn test_last_order_accepts_bare_snapshot() {
        let raw = json!({
            "deliveryDate": "2030-02-14",
            "deliveryTime": "3PM - 5PM",
            "phone": "0812",
            "lines": [],
            "subtotal": 150_000
        });
        let order: LastOrder = serde_json::from_value(raw).unwrap();
        assert!(matches!(order, LastOrder::Bare(_)));
        assert!(!order.is_expired_at(Utc::now()));
    }

    #[test]
    fn test_last_order_wrapped_round_trip_shape() {
        let now = Utc::now();
        let order = LastOrder::new(snapshot(), now, Duration::seconds(300));
        let value = serde_json::to_value(&order).unwrap();
        assert!(value.get("data").is_some());
        assert!(value.get("expiresAt").is_some());
        let back: LastOrder = serde_json::from_value(value).unwrap();
        assert_eq!(back, order);
    }

    #[test]
    fn test_cart_id_record_rejects_blank() {
        assert!(CartIdRecord("  ".to_string()).validate().is_err());
        assert!(CartIdRecord("cart-1".to_string()).validate().is_ok());
    }

    #[test]
    fn test_pending_checkout_uses_camel_case() {
        let pending: PendingCheckout = serde_json::from_value(json!({
            "cartId": "c1",
            "phone": "0812",
            "deliveryTime": "6PM - 8PM",
            "deliveryDate": "2030-01-01"
        }))
        .unwrap();
        assert_eq!(pending.0.cart_id, "c1");
    }

    #[test]
    fn test_payment_method_serde() {
        let json = serde_json::to_string(&PaymentMethod::BankTransfer).unwrap();
        assert_eq!(json, "\"bank_transfer\"");
    }
}

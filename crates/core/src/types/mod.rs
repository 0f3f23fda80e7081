//! Core types for Union Bakery.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod auth;
pub mod delivery;
pub mod email;
pub mod money;
pub mod slug;

pub use auth::{AuthPayload, AuthPayloadError};
pub use delivery::{DeliveryDetails, DeliveryError, DeliverySlot, digits_only};
pub use email::{Email, EmailError};
pub use money::{Money, format_optional, format_thousands};
pub use slug::{normalize_handle, slugify};

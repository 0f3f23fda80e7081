//! Bakery backend API client.
//!
//! # Architecture
//!
//! - JSON over HTTP, every response wrapped in a `{ success, data }` envelope
//! - Failures carry `{ success: false, message, code?, errors? }`
//! - The bearer token is sent verbatim in the `Authorization` header
//! - A response that was redirected to a login page is reported as
//!   [`BackendError::AuthRedirect`], never as data
//!
//! Handlers talk to the backend through the [`BackendApi`] trait so tests can
//! substitute an in-memory implementation.
//!
//! # Example
//!
//! ```rust,ignore
//! use union_bakery_storefront::backend::{BackendClient, LineInput};
//!
//! let client = BackendClient::new(Some(api_base_url), timeout)?;
//! let cart = client.create_cart(&LineInput::new("gid://variant/1", 1), None).await?;
//! ```

mod client;
pub mod types;

use std::collections::BTreeMap;

use async_trait::async_trait;
use thiserror::Error;
use union_bakery_core::AuthPayload;

pub use client::{
    BackendClient, NOT_CONFIGURED_MESSAGE, extract_auth_payload, redirected_to_login,
};
pub use types::*;

/// Fallback shown to users when the backend gives no usable message.
pub const GENERIC_FAILURE_MESSAGE: &str = "Something went wrong. Please try again.";

/// Errors that can occur when talking to the bakery backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// `API_BASE_URL` is missing.
    #[error("API base URL is not configured.")]
    NotConfigured,

    /// HTTP request failed (network, timeout, TLS).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The request was bounced to a login page.
    #[error("Authentication required")]
    AuthRedirect,

    /// The backend answered with a structured failure.
    #[error("Backend rejected request ({status}): {}", .body.message)]
    Api {
        /// HTTP status of the response.
        status: u16,
        /// Decoded error envelope.
        body: ApiErrorBody,
    },

    /// Non-success status without a readable error envelope.
    #[error("Unexpected status {status}")]
    Status {
        /// HTTP status of the response.
        status: u16,
    },

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// The envelope parsed but required data was missing.
    #[error("Malformed response: {0}")]
    Malformed(String),
}

impl BackendError {
    /// Whether the error means the visitor must (re)authenticate.
    #[must_use]
    pub const fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            Self::AuthRedirect | Self::Api { status: 401, .. } | Self::Status { status: 401 }
        )
    }

    /// Whether a later retry could plausibly succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(_) => true,
            Self::Api { status, .. } | Self::Status { status } => *status >= 500,
            _ => false,
        }
    }

    /// Field-level validation messages keyed by field name.
    #[must_use]
    pub fn field_errors(&self) -> BTreeMap<String, String> {
        match self {
            Self::Api { body, .. } => body.field_errors(),
            _ => BTreeMap::new(),
        }
    }

    /// A message safe to show to the visitor.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::NotConfigured => NOT_CONFIGURED_MESSAGE.to_string(),
            Self::AuthRedirect => "Please log in to continue.".to_string(),
            Self::Api { body, .. } if !body.message.trim().is_empty() => body.message.clone(),
            _ => GENERIC_FAILURE_MESSAGE.to_string(),
        }
    }
}

/// Operations the storefront needs from the bakery backend.
#[async_trait]
pub trait BackendApi: Send + Sync {
    /// `POST /login`.
    async fn login(&self, payload: &LoginPayload) -> Result<AuthPayload, BackendError>;

    /// `POST /register`. Returns a token when the backend logs the new
    /// customer in straight away.
    async fn register(&self, payload: &RegisterPayload)
    -> Result<Option<AuthPayload>, BackendError>;

    /// `GET /customer`.
    async fn customer(&self, token: &str) -> Result<CustomerProfile, BackendError>;

    /// `GET /all-products`.
    async fn all_products(&self) -> Result<Vec<ProductListItem>, BackendError>;

    /// `GET /product/{slug}`.
    async fn product(&self, slug: &str) -> Result<ProductDetail, BackendError>;

    /// `POST /createCart` with the first line.
    async fn create_cart(
        &self,
        line: &LineInput,
        token: Option<&str>,
    ) -> Result<CartData, BackendError>;

    /// `POST /cart-line-add`.
    async fn add_cart_line(
        &self,
        payload: &AddCartLinePayload,
        token: Option<&str>,
    ) -> Result<CartData, BackendError>;

    /// `POST /get-cart`. `None` when the backend no longer knows the cart.
    async fn get_cart(&self, cart_id: &str) -> Result<Option<CartData>, BackendError>;

    /// `POST /update-cart-line`.
    async fn update_cart_line(
        &self,
        payload: &UpdateCartLinePayload,
    ) -> Result<CartData, BackendError>;

    /// `POST /remove-cart-item`.
    async fn remove_cart_line(
        &self,
        payload: &RemoveCartItemPayload,
    ) -> Result<CartData, BackendError>;

    /// `POST /update-cart-buyer-identity`.
    async fn update_buyer_identity(
        &self,
        cart_id: &str,
        token: &str,
    ) -> Result<CartData, BackendError>;

    /// `POST /checkout`.
    async fn checkout(
        &self,
        payload: &CheckoutPayload,
        token: &str,
    ) -> Result<CheckoutResult, BackendError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api_error(status: u16, message: &str) -> BackendError {
        BackendError::Api {
            status,
            body: ApiErrorBody {
                success: false,
                message: message.to_string(),
                code: None,
                errors: vec![ApiFieldError {
                    error: "email".to_string(),
                    message: "Email is taken".to_string(),
                }],
            },
        }
    }

    #[test]
    fn test_auth_failure_detection() {
        assert!(BackendError::AuthRedirect.is_auth_failure());
        assert!(api_error(401, "expired").is_auth_failure());
        assert!(BackendError::Status { status: 401 }.is_auth_failure());
        assert!(!api_error(422, "bad").is_auth_failure());
    }

    #[test]
    fn test_transient_classification() {
        assert!(BackendError::Status { status: 503 }.is_transient());
        assert!(!api_error(400, "bad").is_transient());
        assert!(!BackendError::NotConfigured.is_transient());
    }

    #[test]
    fn test_user_message_prefers_backend_message() {
        assert_eq!(api_error(400, "Cart is closed").user_message(), "Cart is closed");
        assert_eq!(api_error(400, "  ").user_message(), GENERIC_FAILURE_MESSAGE);
        assert_eq!(
            BackendError::NotConfigured.user_message(),
            NOT_CONFIGURED_MESSAGE
        );
    }

    #[test]
    fn test_field_errors_only_for_api_errors() {
        let errors = api_error(422, "invalid").field_errors();
        assert_eq!(errors.get("email").map(String::as_str), Some("Email is taken"));
        assert!(BackendError::AuthRedirect.field_errors().is_empty());
    }
}

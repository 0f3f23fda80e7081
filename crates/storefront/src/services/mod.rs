//! Business logic services for the storefront.
//!
//! Each service works on one visitor's [`ClientStorage`](crate::storage::ClientStorage)
//! and talks to the backend through [`BackendApi`](crate::backend::BackendApi):
//!
//! - `auth_store` - access token persistence and validity
//! - `cart` - cart cache, mutations and request generations
//! - `catalog` - cached product list, product detail and badges
//! - `checkout` - checkout and pending checkout replay
//! - `flight` - add-to-cart animation path

pub mod auth_store;
pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod flight;

#[cfg(test)]
pub(crate) mod testing;

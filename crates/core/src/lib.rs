//! Union Bakery Core - Shared types library.
//!
//! This crate provides common types used across the Union Bakery components:
//! - `storefront` - Public-facing bakery shop
//! - `cli` - Command-line tools for migrations
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no
//! sessions, no HTTP clients. This keeps it lightweight and allows it to be
//! used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Auth payloads, emails, money formatting, slugs and delivery slots

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;

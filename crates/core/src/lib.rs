//! Vending Core - Shared types library.
//!
//! This crate provides common types used across the vending storefront:
//! - `storefront` - Terminal storefront and client library for the machine
//! - `integration-tests` - Fake backend and end-to-end tests
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no HTTP clients, no
//! real-time channels. This keeps it lightweight and allows it to be used
//! anywhere, including the fake backend in tests.
//!
//! # Modules
//!
//! - [`types`] - Newtype IDs, money, coins, catalog entities, cart rows and
//!   the session token

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;

//! Vending machine storefront library.
//!
//! Client side of the drinks vending machine: catalog browsing, a persisted
//! cart, coin payment, and the machine lock that gives one session at a
//! time exclusive use of the physical machine. The `vending-storefront`
//! binary is a terminal front-end over this crate.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod api;
pub mod cart;
pub mod catalog;
pub mod config;
pub mod error;
pub mod machine_lock;
pub mod payment;
pub mod render;
pub mod session;
pub mod state;
pub mod storage;

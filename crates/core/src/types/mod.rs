//! Core types for the vending storefront.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod cart;
pub mod catalog;
pub mod coin;
pub mod id;
pub mod money;
pub mod session;

pub use cart::{CartDrink, CartItem};
pub use catalog::{Brand, Drink};
pub use coin::{ACCEPTED_NOMINALS, CoinCount, Nominal, NominalError};
pub use id::*;
pub use money::{CURRENCY_SUFFIX, Money, format_money};
pub use session::SessionId;

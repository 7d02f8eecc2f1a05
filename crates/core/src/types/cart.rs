//! Cart rows as persisted in local storage.
//!
//! The stored snapshot is a JSON array of
//! `{id, quantity, drink: {id, name, price, imageUrl, brand, stock}}`.
//! The row `id` is always the drink's id, which keeps rows unique per drink.

use serde::{Deserialize, Serialize};

use super::catalog::Drink;
use super::id::DrinkId;
use super::money::Money;

/// Snapshot of a drink taken when it was added to the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartDrink {
    pub id: DrinkId,
    pub name: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Money,
    #[serde(default)]
    pub image_url: String,
    #[serde(default)]
    pub brand: String,
    pub stock: u32,
}

impl From<&Drink> for CartDrink {
    fn from(drink: &Drink) -> Self {
        Self {
            id: drink.id,
            name: drink.name.clone(),
            price: drink.price,
            image_url: drink.image_url.clone(),
            brand: drink.brand_name().to_string(),
            stock: drink.available(),
        }
    }
}

/// One line of the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub id: DrinkId,
    pub quantity: u32,
    pub drink: CartDrink,
}

impl CartItem {
    /// Start a new line with quantity 1.
    #[must_use]
    pub const fn new(drink: CartDrink) -> Self {
        Self {
            id: drink.id,
            quantity: 1,
            drink,
        }
    }

    /// Price of the whole line.
    #[must_use]
    pub fn line_price(&self) -> Money {
        self.drink.price * Money::from(self.quantity)
    }
}

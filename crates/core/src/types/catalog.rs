//! Catalog entities as served by the backend.

use serde::{Deserialize, Serialize};

use super::id::{BrandId, DrinkId};
use super::money::Money;

/// A drink brand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Brand {
    pub id: BrandId,
    pub name: String,
}

/// A drink offered by the machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Drink {
    pub id: DrinkId,
    pub name: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Money,
    #[serde(default)]
    pub image_url: String,
    /// Embedded brand; some endpoints only send `brand_id`.
    #[serde(default)]
    pub brand: Option<Brand>,
    pub brand_id: BrandId,
    /// Units currently loaded in the machine.
    #[serde(default)]
    pub quantity: u32,
    /// Sellable stock, when the backend reports it separately.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stock: Option<u32>,
}

impl Drink {
    /// Units that can be put in a cart.
    #[must_use]
    pub fn available(&self) -> u32 {
        self.stock.unwrap_or(self.quantity)
    }

    /// Brand name, or an empty string when the brand was not embedded.
    #[must_use]
    pub fn brand_name(&self) -> &str {
        self.brand.as_ref().map_or("", |b| b.name.as_str())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;

    #[test]
    fn test_drink_from_backend_json() {
        let json = r#"{
            "id": 3,
            "name": "Cola",
            "price": 45.5,
            "imageUrl": "https://img/cola.png",
            "brand": {"id": 1, "name": "Coca-Cola"},
            "brandId": 1,
            "quantity": 12
        }"#;
        let drink: Drink = serde_json::from_str(json).unwrap();

        assert_eq!(drink.id, DrinkId::new(3));
        assert_eq!(drink.price, Decimal::new(455, 1));
        assert_eq!(drink.brand_name(), "Coca-Cola");
        assert_eq!(drink.available(), 12);
    }

    #[test]
    fn test_stock_overrides_quantity() {
        let json = r#"{"id":1,"name":"Tea","price":30,"brandId":2,"quantity":9,"stock":4}"#;
        let drink: Drink = serde_json::from_str(json).unwrap();

        assert_eq!(drink.available(), 4);
        assert_eq!(drink.brand_name(), "");
    }
}

//! Request and response bodies of the vending REST API.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use vending_core::{BrandId, CartItem, CoinCount, DrinkId, Money};

/// Catalog filter for `GET /Drinks/filter`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct DrinkFilter {
    /// Upper price bound, inclusive.
    pub max_price: Option<Money>,
    /// Only drinks of this brand.
    pub brand_id: Option<BrandId>,
}

/// Cheapest and most expensive price within a selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceRange {
    #[serde(with = "rust_decimal::serde::float")]
    pub min_price: Money,
    #[serde(with = "rust_decimal::serde::float")]
    pub max_price: Money,
}

impl PriceRange {
    /// Range spanned by a set of prices; `0..0` when the set is empty.
    pub fn spanning(prices: impl IntoIterator<Item = Money>) -> Self {
        prices
            .into_iter()
            .fold(None, |range: Option<Self>, price| {
                Some(range.map_or(
                    Self {
                        min_price: price,
                        max_price: price,
                    },
                    |r| Self {
                        min_price: r.min_price.min(price),
                        max_price: r.max_price.max(price),
                    },
                ))
            })
            .unwrap_or(Self {
                min_price: Decimal::ZERO,
                max_price: Decimal::ZERO,
            })
    }

    /// Whether the range holds no prices (`0..0`).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.min_price.is_zero() && self.max_price.is_zero()
    }
}

/// One ordered drink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLine {
    pub drink_id: DrinkId,
    pub quantity: u32,
}

impl From<&CartItem> for OrderLine {
    fn from(item: &CartItem) -> Self {
        Self {
            drink_id: item.drink.id,
            quantity: item.quantity,
        }
    }
}

/// Body of `POST /Orders`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRequest {
    pub items: Vec<OrderLine>,
    pub inserted_coins: Vec<CoinCount>,
}

/// Successful order outcome: the change handed back by the machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderReceipt {
    #[serde(default)]
    pub change_coins: Vec<CoinCount>,
    #[serde(with = "rust_decimal::serde::float")]
    pub change_amount: Money,
    #[serde(default)]
    pub message: String,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use vending_core::Nominal;

    use super::*;

    #[test]
    fn test_price_range_spanning() {
        let range = PriceRange::spanning([Decimal::from(45), Decimal::from(30), Decimal::from(80)]);
        assert_eq!(range.min_price, Decimal::from(30));
        assert_eq!(range.max_price, Decimal::from(80));
    }

    #[test]
    fn test_price_range_of_nothing_is_zero() {
        assert_eq!(PriceRange::spanning([]), PriceRange::default());
    }

    #[test]
    fn test_order_request_wire_format() {
        let request = OrderRequest {
            items: vec![OrderLine {
                drink_id: DrinkId::new(3),
                quantity: 2,
            }],
            inserted_coins: vec![CoinCount {
                nominal: Nominal::TEN,
                quantity: 1,
            }],
        };

        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            serde_json::json!({
                "items": [{"drinkId": 3, "quantity": 2}],
                "insertedCoins": [{"nominal": 10, "quantity": 1}]
            })
        );
    }

    #[test]
    fn test_order_receipt_parses_backend_response() {
        let receipt: OrderReceipt = serde_json::from_str(
            r#"{"changeCoins":[{"nominal":5,"quantity":1}],"changeAmount":5,"message":"ok"}"#,
        )
        .unwrap();

        assert_eq!(receipt.change_amount, Decimal::from(5));
        assert_eq!(receipt.change_coins.len(), 1);
        assert_eq!(receipt.message, "ok");
    }
}

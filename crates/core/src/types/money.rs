//! Money amounts using decimal arithmetic.
//!
//! The machine works in a single currency (roubles), so an amount is a plain
//! [`Decimal`] with a display helper. The backend sends prices as JSON
//! numbers; fields holding money use `rust_decimal::serde::float` so they
//! round-trip as numbers rather than strings.

use rust_decimal::Decimal;

/// A monetary amount in the machine's currency.
pub type Money = Decimal;

/// Currency suffix used when rendering amounts.
pub const CURRENCY_SUFFIX: &str = "руб.";

/// Format an amount for display (e.g., "130 руб.").
///
/// Trailing zeros are dropped so whole amounts render without decimals.
#[must_use]
pub fn format_money(amount: Money) -> String {
    format!("{} {CURRENCY_SUFFIX}", amount.normalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_money_whole_amount() {
        assert_eq!(format_money(Decimal::new(13000, 2)), "130 руб.");
    }

    #[test]
    fn test_format_money_fractional_amount() {
        assert_eq!(format_money(Decimal::new(4550, 2)), "45.5 руб.");
    }
}

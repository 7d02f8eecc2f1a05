//! Plain-text views written to any `io::Write`.

use std::io::{self, Write};

use vending_core::{ACCEPTED_NOMINALS, Brand, CoinCount, Money, format_money};

use crate::api::{OrderReceipt, PriceRange};
use crate::cart::CartStore;
use crate::catalog::Catalog;
use crate::machine_lock::LockSnapshot;
use crate::payment::CoinPurse;

/// Catalog listing. Drinks already in the cart are marked `[x]`.
///
/// # Errors
///
/// Returns any error from the writer.
pub fn drinks(out: &mut impl Write, catalog: &Catalog, cart: &CartStore) -> io::Result<()> {
    let range = catalog.price_range();
    writeln!(
        out,
        "Price: up to {} (range {} - {})",
        format_money(catalog.max_price()),
        format_money(range.min_price),
        format_money(range.max_price)
    )?;
    writeln!(out, "Selected: {}", cart.total_count())?;

    let mut shown = 0usize;
    for drink in catalog.visible() {
        let marker = if cart.contains(drink.id) { "[x]" } else { "[ ]" };
        let brand = catalog
            .brand_name(drink.brand_id)
            .unwrap_or_else(|| drink.brand_name());
        writeln!(
            out,
            "{marker} #{:<4} {:<24} {:<16} {:>10}  stock {}",
            drink.id.as_i32(),
            drink.name,
            brand,
            format_money(drink.price),
            drink.available()
        )?;
        shown += 1;
    }
    if shown == 0 {
        writeln!(out, "No drinks match the current filter.")?;
    }
    Ok(())
}

/// Brand list.
///
/// # Errors
///
/// Returns any error from the writer.
pub fn brands(out: &mut impl Write, brands: &[Brand]) -> io::Result<()> {
    for brand in brands {
        writeln!(out, "#{:<4} {}", brand.id.as_i32(), brand.name)?;
    }
    Ok(())
}

/// # Errors
///
/// Returns any error from the writer.
pub fn price_range(out: &mut impl Write, range: PriceRange) -> io::Result<()> {
    writeln!(
        out,
        "{} - {}",
        format_money(range.min_price),
        format_money(range.max_price)
    )
}

/// Cart contents and totals.
///
/// # Errors
///
/// Returns any error from the writer.
pub fn cart(out: &mut impl Write, cart: &CartStore) -> io::Result<()> {
    if cart.is_empty() {
        return writeln!(out, "Your cart is empty.");
    }
    for item in cart.items() {
        writeln!(
            out,
            "#{:<4} {:<24} {:>3} x {:>10} = {:>10}",
            item.id.as_i32(),
            item.drink.name,
            item.quantity,
            format_money(item.drink.price),
            format_money(item.line_price())
        )?;
    }
    writeln!(
        out,
        "Total: {} item(s), {}",
        cart.total_count(),
        format_money(cart.total_price())
    )
}

/// Coins inserted against the amount due.
///
/// # Errors
///
/// Returns any error from the writer.
pub fn payment_summary(out: &mut impl Write, total_price: Money, purse: &CoinPurse) -> io::Result<()> {
    writeln!(out, "Amount due: {}", format_money(total_price))?;
    for nominal in ACCEPTED_NOMINALS {
        writeln!(out, "  {:>2} coin(s): {}", nominal.value(), purse.count(nominal))?;
    }
    writeln!(out, "Inserted: {}", format_money(purse.total_inserted()))?;
    if purse.is_enough(total_price) {
        writeln!(out, "Enough inserted.")
    } else {
        writeln!(out, "Still missing: {}", format_money(purse.remaining(total_price)))
    }
}

/// Change handed back after a successful order.
///
/// # Errors
///
/// Returns any error from the writer.
pub fn receipt(out: &mut impl Write, receipt: &OrderReceipt) -> io::Result<()> {
    if !receipt.message.is_empty() {
        writeln!(out, "{}", receipt.message)?;
    }
    writeln!(out, "Change: {}", format_money(receipt.change_amount))?;
    for CoinCount { nominal, quantity } in &receipt.change_coins {
        writeln!(out, "  {quantity} x {nominal}")?;
    }
    Ok(())
}

/// One line per lock state change.
///
/// # Errors
///
/// Returns any error from the writer.
pub fn lock_snapshot(out: &mut impl Write, snapshot: &LockSnapshot) -> io::Result<()> {
    let busy = if snapshot.status.is_busy { "busy" } else { "available" };
    match snapshot.status.message {
        Some(message) => writeln!(out, "[{}] {busy}: {message}", snapshot.state),
        None => writeln!(out, "[{}] {busy}", snapshot.state),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use rust_decimal::Decimal;
    use vending_core::{BrandId, Drink, DrinkId, Nominal};

    use super::*;
    use crate::machine_lock::{LockState, LockStatus, MESSAGE_BUSY};
    use crate::storage::MemoryStore;

    fn render(f: impl FnOnce(&mut Vec<u8>) -> io::Result<()>) -> String {
        let mut out = Vec::new();
        f(&mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    fn drink(id: i32, price: i64) -> Drink {
        Drink {
            id: DrinkId::new(id),
            name: format!("Drink {id}"),
            price: Decimal::from(price),
            image_url: String::new(),
            brand: None,
            brand_id: BrandId::new(1),
            quantity: 3,
            stock: None,
        }
    }

    #[test]
    fn test_drinks_marks_selected() {
        let catalog = Catalog::new(
            vec![drink(1, 40), drink(2, 60)],
            vec![Brand {
                id: BrandId::new(1),
                name: "Coca-Cola".to_string(),
            }],
        );
        let mut cart = CartStore::load(Arc::new(MemoryStore::new())).unwrap();
        cart.add_drink(&drink(2, 60)).unwrap();

        let text = render(|out| drinks(out, &catalog, &cart));
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].contains("40 руб."));
        assert_eq!(lines[1], "Selected: 1");
        assert!(lines[2].starts_with("[ ] #1"));
        assert!(lines[3].starts_with("[x] #2"));
        assert!(lines[3].contains("Coca-Cola"));
    }

    #[test]
    fn test_empty_cart() {
        let cart = CartStore::load(Arc::new(MemoryStore::new())).unwrap();
        assert_eq!(render(|out| super::cart(out, &cart)), "Your cart is empty.\n");
    }

    #[test]
    fn test_payment_summary_shows_missing_amount() {
        let mut purse = CoinPurse::new();
        purse.set_count(Nominal::TEN, 4).unwrap();

        let text = render(|out| payment_summary(out, Decimal::from(55), &purse));
        assert!(text.contains("Inserted: 40 руб."));
        assert!(text.contains("Still missing: 15 руб."));
    }

    #[test]
    fn test_lock_snapshot_line() {
        let snapshot = LockSnapshot {
            state: LockState::BusyOtherHolder,
            status: LockStatus {
                is_busy: true,
                message: Some(MESSAGE_BUSY),
            },
            connect_failed: false,
        };
        let text = render(|out| lock_snapshot(out, &snapshot));
        assert_eq!(text, format!("[busy (another session)] busy: {MESSAGE_BUSY}\n"));
    }
}

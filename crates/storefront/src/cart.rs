//! Cart store.
//!
//! An in-memory list of cart lines mirrored to local storage. Every mutation
//! rewrites the full snapshot under [`CART_KEY`] before returning, and the
//! snapshot is read back verbatim by [`CartStore::load`]. Totals are derived
//! from the current lines on every read.
//!
//! The store does not validate quantities: keeping a line within
//! `[1, stock]` is the caller's job (see [`checked_quantity`]).

use tokio::sync::watch;
use tracing::debug;
use vending_core::{CartDrink, CartItem, Drink, DrinkId, Money};

use crate::storage::{CART_KEY, SharedStore, StorageError};

/// Errors from the cart store.
#[derive(Debug, thiserror::Error)]
pub enum CartError {
    #[error("cart storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("malformed cart snapshot: {0}")]
    Parse(#[source] serde_json::Error),
    #[error("failed to serialize cart: {0}")]
    Serialize(#[source] serde_json::Error),
}

/// Derived cart totals, as published to observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CartTotals {
    pub count: u32,
    pub price: Money,
}

/// Cart lines plus their persisted snapshot.
pub struct CartStore {
    store: SharedStore,
    items: Vec<CartItem>,
    totals_tx: watch::Sender<CartTotals>,
}

impl std::fmt::Debug for CartStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CartStore")
            .field("items", &self.items)
            .finish_non_exhaustive()
    }
}

impl CartStore {
    /// Load the cart from storage. A missing or empty snapshot gives an
    /// empty cart.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Parse` if the stored snapshot is not a valid cart,
    /// or `CartError::Storage` if it cannot be read.
    pub fn load(store: SharedStore) -> Result<Self, CartError> {
        let items = match store.get(CART_KEY)? {
            Some(snapshot) if !snapshot.trim().is_empty() => {
                serde_json::from_str::<Vec<CartItem>>(&snapshot).map_err(CartError::Parse)?
            }
            _ => Vec::new(),
        };
        debug!(lines = items.len(), "Cart loaded");

        let totals = compute_totals(&items);
        let (totals_tx, _) = watch::channel(totals);
        Ok(Self {
            store,
            items,
            totals_tx,
        })
    }

    /// Current lines, in insertion order.
    #[must_use]
    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    /// Line for a drink, if present.
    #[must_use]
    pub fn get(&self, id: DrinkId) -> Option<&CartItem> {
        self.items.iter().find(|item| item.id == id)
    }

    /// Whether the drink is in the cart.
    #[must_use]
    pub fn contains(&self, id: DrinkId) -> bool {
        self.get(id).is_some()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Add one unit of a drink: bumps the quantity of an existing line, or
    /// appends a new line with quantity 1.
    ///
    /// # Errors
    ///
    /// Returns `CartError` if the snapshot cannot be persisted. The in-memory
    /// change is kept either way.
    pub fn add_item(&mut self, drink: CartDrink) -> Result<(), CartError> {
        if let Some(item) = self.items.iter_mut().find(|item| item.id == drink.id) {
            item.quantity = item.quantity.saturating_add(1);
        } else {
            self.items.push(CartItem::new(drink));
        }
        self.commit()
    }

    /// [`add_item`](Self::add_item) from a catalog drink.
    ///
    /// # Errors
    ///
    /// See [`add_item`](Self::add_item).
    pub fn add_drink(&mut self, drink: &Drink) -> Result<(), CartError> {
        self.add_item(CartDrink::from(drink))
    }

    /// Remove a line. Unknown ids are a no-op.
    ///
    /// # Errors
    ///
    /// Returns `CartError` if the snapshot cannot be persisted.
    pub fn remove_item(&mut self, id: DrinkId) -> Result<(), CartError> {
        self.items.retain(|item| item.id != id);
        self.commit()
    }

    /// Set a line's quantity as given. Unknown ids are a no-op.
    ///
    /// # Errors
    ///
    /// Returns `CartError` if the snapshot cannot be persisted.
    pub fn update_item_quantity(&mut self, id: DrinkId, quantity: u32) -> Result<(), CartError> {
        if let Some(item) = self.items.iter_mut().find(|item| item.id == id) {
            item.quantity = quantity;
        }
        self.commit()
    }

    /// Empty the cart.
    ///
    /// # Errors
    ///
    /// Returns `CartError` if the snapshot cannot be persisted.
    pub fn clear_cart(&mut self) -> Result<(), CartError> {
        self.items.clear();
        self.commit()
    }

    /// Sum of line quantities.
    #[must_use]
    pub fn total_count(&self) -> u32 {
        compute_totals(&self.items).count
    }

    /// Sum of quantity × price over all lines.
    #[must_use]
    pub fn total_price(&self) -> Money {
        compute_totals(&self.items).price
    }

    #[must_use]
    pub fn totals(&self) -> CartTotals {
        compute_totals(&self.items)
    }

    /// Observe totals after every mutation.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<CartTotals> {
        self.totals_tx.subscribe()
    }

    fn commit(&mut self) -> Result<(), CartError> {
        let totals = compute_totals(&self.items);
        self.totals_tx.send_replace(totals);

        let snapshot = serde_json::to_string(&self.items).map_err(CartError::Serialize)?;
        self.store.set(CART_KEY, &snapshot)?;
        debug!(lines = self.items.len(), count = totals.count, "Cart persisted");
        Ok(())
    }
}

fn compute_totals(items: &[CartItem]) -> CartTotals {
    items.iter().fold(CartTotals::default(), |acc, item| CartTotals {
        count: acc.count.saturating_add(item.quantity),
        price: acc.price + item.line_price(),
    })
}

/// Caller-side quantity check for a line: `Some(requested)` when it lies in
/// `[1, stock]`, `None` when the change should be ignored.
#[must_use]
pub fn checked_quantity(item: &CartItem, requested: u32) -> Option<u32> {
    (1..=item.drink.stock).contains(&requested).then_some(requested)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use rust_decimal::Decimal;

    use super::*;
    use crate::storage::{KeyValueStore, MemoryStore};

    fn drink(id: i32, price: i64, stock: u32) -> CartDrink {
        CartDrink {
            id: DrinkId::new(id),
            name: format!("Drink {id}"),
            price: Decimal::from(price),
            image_url: String::new(),
            brand: "Brand".to_string(),
            stock,
        }
    }

    fn empty_cart() -> (Arc<MemoryStore>, CartStore) {
        let store = Arc::new(MemoryStore::new());
        let cart = CartStore::load(store.clone()).unwrap();
        (store, cart)
    }

    #[test]
    fn test_add_same_drink_twice_increments() {
        let (_, mut cart) = empty_cart();
        cart.add_item(drink(1, 50, 10)).unwrap();
        cart.add_item(drink(1, 50, 10)).unwrap();

        assert_eq!(cart.items().len(), 1);
        assert_eq!(cart.get(DrinkId::new(1)).unwrap().quantity, 2);
    }

    #[test]
    fn test_two_line_totals_then_remove() {
        let (_, mut cart) = empty_cart();
        cart.add_item(drink(1, 50, 10)).unwrap();
        cart.add_item(drink(1, 50, 10)).unwrap();
        cart.add_item(drink(2, 30, 10)).unwrap();

        assert_eq!(cart.total_count(), 3);
        assert_eq!(cart.total_price(), Decimal::from(130));

        cart.remove_item(DrinkId::new(2)).unwrap();
        assert_eq!(cart.total_count(), 2);
        assert_eq!(cart.total_price(), Decimal::from(100));
    }

    #[test]
    fn test_totals_follow_mixed_mutations() {
        let (_, mut cart) = empty_cart();
        cart.add_item(drink(1, 15, 5)).unwrap();
        cart.add_item(drink(2, 40, 5)).unwrap();
        cart.update_item_quantity(DrinkId::new(1), 4).unwrap();
        cart.add_item(drink(3, 7, 5)).unwrap();
        cart.remove_item(DrinkId::new(2)).unwrap();
        cart.add_item(drink(3, 7, 5)).unwrap();

        let expected_count: u32 = cart.items().iter().map(|i| i.quantity).sum();
        let expected_price: Decimal = cart.items().iter().map(CartItem::line_price).sum();
        assert_eq!(cart.total_count(), expected_count);
        assert_eq!(cart.total_price(), expected_price);
        assert_eq!(cart.total_price(), Decimal::from(15 * 4 + 7 * 2));
    }

    #[test]
    fn test_update_quantity_passes_through_out_of_range_values() {
        let (_, mut cart) = empty_cart();
        cart.add_item(drink(1, 10, 3)).unwrap();

        cart.update_item_quantity(DrinkId::new(1), 2).unwrap();
        assert_eq!(cart.get(DrinkId::new(1)).unwrap().quantity, 2);

        cart.update_item_quantity(DrinkId::new(1), 99).unwrap();
        assert_eq!(cart.get(DrinkId::new(1)).unwrap().quantity, 99);

        cart.update_item_quantity(DrinkId::new(1), 0).unwrap();
        assert_eq!(cart.get(DrinkId::new(1)).unwrap().quantity, 0);
        assert_eq!(cart.total_count(), 0);
    }

    #[test]
    fn test_huge_quantity_saturates_count() {
        let (_, mut cart) = empty_cart();
        cart.add_item(drink(1, 10, 3)).unwrap();
        cart.add_item(drink(2, 20, 3)).unwrap();

        cart.update_item_quantity(DrinkId::new(1), u32::MAX).unwrap();
        assert_eq!(cart.total_count(), u32::MAX);
        assert_eq!(
            cart.total_price(),
            Decimal::from(u32::MAX) * Decimal::from(10) + Decimal::from(20)
        );

        cart.add_item(drink(1, 10, 3)).unwrap();
        assert_eq!(cart.get(DrinkId::new(1)).unwrap().quantity, u32::MAX);
        assert_eq!(cart.totals().count, u32::MAX);
    }

    #[test]
    fn test_remove_and_update_unknown_ids_are_noops() {
        let (_, mut cart) = empty_cart();
        cart.add_item(drink(1, 10, 3)).unwrap();

        cart.remove_item(DrinkId::new(9)).unwrap();
        cart.update_item_quantity(DrinkId::new(9), 5).unwrap();

        assert_eq!(cart.items().len(), 1);
        assert_eq!(cart.total_count(), 1);
    }

    #[test]
    fn test_every_mutation_persists_snapshot() {
        let (store, mut cart) = empty_cart();
        cart.add_item(drink(1, 50, 10)).unwrap();

        let reloaded = CartStore::load(store.clone()).unwrap();
        assert_eq!(reloaded.items(), cart.items());

        cart.clear_cart().unwrap();
        assert_eq!(store.get(CART_KEY).unwrap().as_deref(), Some("[]"));
        assert!(CartStore::load(store).unwrap().is_empty());
    }

    #[test]
    fn test_snapshot_wire_format() {
        let store = Arc::new(MemoryStore::new());
        store
            .set(
                CART_KEY,
                r#"[{"id":4,"quantity":2,"drink":{"id":4,"name":"Fanta","price":55,"imageUrl":"f.png","brand":"Coca-Cola","stock":6}}]"#,
            )
            .unwrap();

        let cart = CartStore::load(store).unwrap();
        let item = cart.get(DrinkId::new(4)).unwrap();
        assert_eq!(item.drink.image_url, "f.png");
        assert_eq!(cart.total_price(), Decimal::from(110));
    }

    #[test]
    fn test_malformed_snapshot_fails_load() {
        let store = Arc::new(MemoryStore::new());
        store.set(CART_KEY, "{not json").unwrap();

        assert!(matches!(
            CartStore::load(store),
            Err(CartError::Parse(_))
        ));
    }

    #[test]
    fn test_observers_see_new_totals() {
        let (_, mut cart) = empty_cart();
        let rx = cart.subscribe();

        cart.add_item(drink(1, 25, 4)).unwrap();
        assert_eq!(
            *rx.borrow(),
            CartTotals {
                count: 1,
                price: Decimal::from(25)
            }
        );
    }

    #[test]
    fn test_checked_quantity_bounds() {
        let item = CartItem::new(drink(1, 10, 3));

        assert_eq!(checked_quantity(&item, 1), Some(1));
        assert_eq!(checked_quantity(&item, 3), Some(3));
        assert_eq!(checked_quantity(&item, 0), None);
        assert_eq!(checked_quantity(&item, 4), None);
    }
}

//! Cart commands.

use std::io::Write;

use vending_core::DrinkId;
use vending_storefront::cart::checked_quantity;
use vending_storefront::error::{Result, StorefrontError};
use vending_storefront::render;
use vending_storefront::state::AppState;

use super::gated;

pub fn show(state: &AppState) -> Result<()> {
    let cart = state.load_cart()?;
    render::cart(&mut std::io::stdout().lock(), &cart)?;
    Ok(())
}

/// Add one unit of a catalog drink.
pub async fn add(state: &AppState, id: DrinkId) -> Result<()> {
    gated(state, async {
        let drinks = state.api().drinks().await?;
        let drink = drinks
            .iter()
            .find(|drink| drink.id == id)
            .ok_or_else(|| StorefrontError::NotFound(format!("drink #{id}")))?;

        let mut cart = state.load_cart()?;
        cart.add_drink(drink)?;

        let mut out = std::io::stdout().lock();
        writeln!(out, "Added {}.", drink.name)?;
        render::cart(&mut out, &cart)?;
        Ok::<_, StorefrontError>(())
    })
    .await
}

pub fn remove(state: &AppState, id: DrinkId) -> Result<()> {
    let mut cart = state.load_cart()?;
    cart.remove_item(id)?;
    render::cart(&mut std::io::stdout().lock(), &cart)?;
    Ok(())
}

/// Set a line's quantity, keeping it within `[1, stock]`.
pub fn set(state: &AppState, id: DrinkId, quantity: u32) -> Result<()> {
    let mut cart = state.load_cart()?;
    let item = cart
        .get(id)
        .ok_or_else(|| StorefrontError::NotFound(format!("drink #{id} is not in the cart")))?;
    let quantity = checked_quantity(item, quantity).ok_or_else(|| {
        StorefrontError::BadRequest(format!(
            "quantity must be between 1 and {}",
            item.drink.stock
        ))
    })?;

    cart.update_item_quantity(id, quantity)?;
    render::cart(&mut std::io::stdout().lock(), &cart)?;
    Ok(())
}

pub fn clear(state: &AppState) -> Result<()> {
    let mut cart = state.load_cart()?;
    cart.clear_cart()?;
    writeln!(std::io::stdout().lock(), "Cart cleared.")?;
    Ok(())
}

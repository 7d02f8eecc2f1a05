//! Payment command.

use vending_core::Nominal;
use vending_storefront::error::Result;
use vending_storefront::payment::{Checkout, CoinPurse};
use vending_storefront::render;
use vending_storefront::state::AppState;

/// Show what is due against the inserted coins and submit the order when
/// enough is inserted.
pub async fn pay(state: &AppState, coins: &[(Nominal, u32)]) -> Result<()> {
    let mut purse = CoinPurse::new();
    for &(nominal, count) in coins {
        let current = purse.count(nominal);
        purse.set_count(nominal, current.saturating_add(count))?;
    }

    let mut cart = state.load_cart()?;
    render::payment_summary(&mut std::io::stdout().lock(), cart.total_price(), &purse)?;

    let receipt = Checkout::submit(state.api(), &mut cart, &purse).await?;
    render::receipt(&mut std::io::stdout().lock(), &receipt)?;
    Ok(())
}

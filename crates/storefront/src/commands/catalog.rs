//! Catalog commands.

use std::io::Write;
use std::path::Path;

use vending_core::{BrandId, Money};
use vending_storefront::catalog::Catalog;
use vending_storefront::error::{Result, StorefrontError};
use vending_storefront::render;
use vending_storefront::state::AppState;

use super::gated;

/// List drinks, filtered by brand and max price.
pub async fn drinks(state: &AppState, brand: Option<BrandId>, max_price: Option<Money>) -> Result<()> {
    gated(state, async {
        let mut catalog = Catalog::load(state.api()).await?;
        catalog.select_brand(brand);
        if let Some(price) = max_price {
            catalog.set_max_price(price);
        }

        let cart = state.load_cart()?;
        let mut out = std::io::stdout().lock();
        render::drinks(&mut out, &catalog, &cart)?;
        Ok::<_, StorefrontError>(())
    })
    .await
}

pub async fn brands(state: &AppState) -> Result<()> {
    let brands = state.api().brands().await?;
    render::brands(&mut std::io::stdout().lock(), &brands)?;
    Ok(())
}

pub async fn price_range(state: &AppState, brand: Option<BrandId>) -> Result<()> {
    let range = state.api().price_range(brand).await?;
    render::price_range(&mut std::io::stdout().lock(), range)?;
    Ok(())
}

/// Upload a catalog file, then reload the catalog.
pub async fn import(state: &AppState, file: &Path) -> Result<()> {
    let mut catalog = Catalog::load(state.api()).await?;
    let response = state.api().import_drinks(file).await?;
    tracing::info!(file = %file.display(), response = %response, "Catalog imported");

    // The import invalidated the drinks cache; brands are unchanged
    catalog.set_drinks(state.api().drinks().await?);
    let mut out = std::io::stdout().lock();
    writeln!(
        out,
        "Imported {}. The catalog now lists {} drink(s) from {} brand(s).",
        file.display(),
        catalog.drinks().len(),
        catalog.brands().len()
    )?;
    Ok(())
}

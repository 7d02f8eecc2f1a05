//! Catalog view model: brand selection and the price slider.

use vending_core::{Brand, BrandId, Drink, Money};

use crate::api::{ApiClient, ApiError, PriceRange};

/// Drinks and brands plus the user's current filter.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    drinks: Vec<Drink>,
    brands: Vec<Brand>,
    selected_brand: Option<BrandId>,
    price_range: PriceRange,
    max_price: Money,
}

impl Catalog {
    /// Build a catalog showing every brand, with the max price at the top of
    /// the range.
    #[must_use]
    pub fn new(drinks: Vec<Drink>, brands: Vec<Brand>) -> Self {
        let mut catalog = Self {
            drinks,
            brands,
            ..Self::default()
        };
        catalog.reset_price_range();
        catalog
    }

    /// Fetch drinks and brands.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` if either request fails.
    pub async fn load(api: &ApiClient) -> Result<Self, ApiError> {
        let (drinks, brands) = tokio::try_join!(api.drinks(), api.brands())?;
        Ok(Self::new(drinks, brands))
    }

    /// Replace the drink list (after an import), keeping the brand
    /// selection.
    pub fn set_drinks(&mut self, drinks: Vec<Drink>) {
        self.drinks = drinks;
        self.reset_price_range();
    }

    #[must_use]
    pub fn drinks(&self) -> &[Drink] {
        &self.drinks
    }

    #[must_use]
    pub fn brands(&self) -> &[Brand] {
        &self.brands
    }

    #[must_use]
    pub const fn selected_brand(&self) -> Option<BrandId> {
        self.selected_brand
    }

    /// Range of the slider for the current brand selection.
    #[must_use]
    pub const fn price_range(&self) -> PriceRange {
        self.price_range
    }

    #[must_use]
    pub const fn max_price(&self) -> Money {
        self.max_price
    }

    /// Select a brand (`None` for all brands). Recomputes the price range
    /// over that brand's drinks and moves the max price to its top.
    pub fn select_brand(&mut self, brand: Option<BrandId>) {
        self.selected_brand = brand;
        self.reset_price_range();
    }

    /// Move the slider, clamped to the current range.
    pub fn set_max_price(&mut self, price: Money) {
        self.max_price = price.clamp(self.price_range.min_price, self.price_range.max_price);
    }

    /// Drinks of the selected brand priced at or below the max price.
    pub fn visible(&self) -> impl Iterator<Item = &Drink> {
        self.of_selected_brand()
            .filter(move |drink| drink.price <= self.max_price)
    }

    /// Brand name by id.
    #[must_use]
    pub fn brand_name(&self, id: BrandId) -> Option<&str> {
        self.brands
            .iter()
            .find(|brand| brand.id == id)
            .map(|brand| brand.name.as_str())
    }

    fn of_selected_brand(&self) -> impl Iterator<Item = &Drink> {
        self.drinks
            .iter()
            .filter(move |drink| self.selected_brand.is_none_or(|brand| drink.brand_id == brand))
    }

    fn reset_price_range(&mut self) {
        self.price_range = PriceRange::spanning(self.of_selected_brand().map(|drink| drink.price));
        self.max_price = self.price_range.max_price;
    }
}

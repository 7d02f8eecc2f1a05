//! Cache types for catalog API responses.

use vending_core::{Brand, BrandId, Drink};

/// Cache key for catalog reads.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub enum CacheKey {
    Drinks,
    /// Filter values as sent on the wire, so equal queries share an entry.
    FilteredDrinks {
        max_price: Option<String>,
        brand_id: Option<BrandId>,
    },
    Brands,
}

/// Cached value types.
#[derive(Debug, Clone)]
pub enum CacheValue {
    Drinks(Vec<Drink>),
    Brands(Vec<Brand>),
}

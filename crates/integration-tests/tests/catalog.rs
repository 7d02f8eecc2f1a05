//! Integration tests for catalog reads, caching and import.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use std::io::Write;
use std::time::Duration;

use rust_decimal::Decimal;
use vending_core::{BrandId, DrinkId};
use vending_integration_tests::{FakeBackend, drink};
use vending_storefront::api::{ApiClient, ApiError, DrinkFilter, PriceRange};
use vending_storefront::catalog::Catalog;

fn client(backend: &FakeBackend) -> ApiClient {
    ApiClient::new(&backend.api_url(), Duration::from_secs(60)).unwrap()
}

fn ids<'a>(drinks: impl IntoIterator<Item = &'a vending_core::Drink>) -> Vec<i32> {
    drinks.into_iter().map(|d| d.id.as_i32()).collect()
}

fn range(min: i64, max: i64) -> PriceRange {
    PriceRange {
        min_price: Decimal::from(min),
        max_price: Decimal::from(max),
    }
}

// =============================================================================
// Reads and caching
// =============================================================================

#[tokio::test]
async fn test_drinks_are_served_from_cache() {
    let backend = FakeBackend::start().await.unwrap();
    let api = client(&backend);

    let first = api.drinks().await.unwrap();
    let second = api.drinks().await.unwrap();

    assert_eq!(first, second);
    assert_eq!(ids(&first), vec![1, 2, 3, 4]);
    assert_eq!(backend.request_count("GET /Drinks"), 1);
}

#[tokio::test]
async fn test_invalidate_forces_refetch() {
    let backend = FakeBackend::start().await.unwrap();
    let api = client(&backend);

    api.brands().await.unwrap();
    api.invalidate_catalog();
    let brands = api.brands().await.unwrap();

    assert_eq!(brands.len(), 2);
    assert_eq!(backend.request_count("GET /Brands"), 2);
}

#[tokio::test]
async fn test_filtered_drinks() {
    let backend = FakeBackend::start().await.unwrap();
    let api = client(&backend);

    let cheap_cola = api
        .filtered_drinks(&DrinkFilter {
            max_price: Some(Decimal::from(50)),
            brand_id: Some(BrandId::new(1)),
        })
        .await
        .unwrap();
    assert_eq!(ids(&cheap_cola), vec![1, 2]);

    // Brand 0 stands for every brand
    let cheap = api
        .filtered_drinks(&DrinkFilter {
            max_price: Some(Decimal::from(50)),
            brand_id: Some(BrandId::new(0)),
        })
        .await
        .unwrap();
    assert_eq!(ids(&cheap), vec![1, 2, 3]);

    // Same filter again is a cache hit
    api.filtered_drinks(&DrinkFilter {
        max_price: Some(Decimal::from(50)),
        brand_id: None,
    })
    .await
    .unwrap();
    assert_eq!(backend.request_count("GET /Drinks/filter"), 2);
}

// =============================================================================
// Price range
// =============================================================================

#[tokio::test]
async fn test_price_range_from_backend() {
    let backend = FakeBackend::start().await.unwrap();
    let api = client(&backend);

    assert_eq!(api.price_range(None).await.unwrap(), range(30, 80));
    assert_eq!(
        api.price_range(Some(BrandId::new(2))).await.unwrap(),
        range(50, 80)
    );
    assert_eq!(backend.request_count("GET /Drinks/filter"), 0);
}

#[tokio::test]
async fn test_price_range_falls_back_to_filtered_drinks() {
    let backend = FakeBackend::start().await.unwrap();
    backend.disable_price_range();
    let api = client(&backend);

    let range_of_brand = api.price_range(Some(BrandId::new(1))).await.unwrap();

    assert_eq!(range_of_brand, range(30, 45));
    assert_eq!(backend.request_count("GET /Drinks/price-range"), 1);
    assert_eq!(backend.request_count("GET /Drinks/filter"), 1);
}

#[tokio::test]
async fn test_price_range_of_empty_brand_is_zero() {
    let backend = FakeBackend::start().await.unwrap();
    let api = client(&backend);

    let empty = api.price_range(Some(BrandId::new(9))).await.unwrap();
    assert!(empty.is_empty());
}

// =============================================================================
// Catalog view
// =============================================================================

#[tokio::test]
async fn test_catalog_load_and_filter() {
    let backend = FakeBackend::start().await.unwrap();
    let api = client(&backend);

    let mut catalog = Catalog::load(&api).await.unwrap();
    assert_eq!(catalog.drinks().len(), 4);
    assert_eq!(catalog.brand_name(BrandId::new(2)), Some("Pepsi"));
    assert_eq!(catalog.price_range(), range(30, 80));

    catalog.select_brand(Some(BrandId::new(2)));
    assert_eq!(catalog.price_range(), range(50, 80));
    assert_eq!(catalog.max_price(), Decimal::from(80));
    assert_eq!(ids(catalog.visible()), vec![3, 4]);

    catalog.set_max_price(Decimal::from(60));
    assert_eq!(ids(catalog.visible()), vec![3]);

    // Clamped to the bottom of the range
    catalog.set_max_price(Decimal::from(5));
    assert_eq!(catalog.max_price(), Decimal::from(50));
}

// =============================================================================
// Import
// =============================================================================

#[tokio::test]
async fn test_import_replaces_catalog_and_invalidates_cache() {
    let backend = FakeBackend::start().await.unwrap();
    let api = client(&backend);
    api.drinks().await.unwrap();

    let mut file = tempfile::NamedTempFile::new().unwrap();
    let upload = vec![drink(10, "Fanta", 1, 35, 6)];
    file.write_all(serde_json::to_string(&upload).unwrap().as_bytes())
        .unwrap();

    let report = api.import_drinks(file.path()).await.unwrap();
    assert_eq!(report, serde_json::json!({"imported": 1}));

    let drinks = api.drinks().await.unwrap();
    assert_eq!(drinks.len(), 1);
    assert_eq!(drinks[0].id, DrinkId::new(10));
    assert_eq!(backend.request_count("GET /Drinks"), 2);
}

#[tokio::test]
async fn test_plain_text_import_report_is_accepted() {
    let backend = FakeBackend::start().await.unwrap();
    backend.set_import_text_reply("Imported 1 drinks");
    let api = client(&backend);
    api.drinks().await.unwrap();

    let mut file = tempfile::NamedTempFile::new().unwrap();
    let upload = vec![drink(11, "Schweppes", 1, 40, 3)];
    file.write_all(serde_json::to_string(&upload).unwrap().as_bytes())
        .unwrap();

    let report = api.import_drinks(file.path()).await.unwrap();
    assert_eq!(report, serde_json::Value::String("Imported 1 drinks".to_string()));

    let drinks = api.drinks().await.unwrap();
    assert_eq!(ids(&drinks), vec![11]);
    assert_eq!(backend.request_count("GET /Drinks"), 2);
}

#[tokio::test]
async fn test_loaded_catalog_takes_imported_drinks() {
    let backend = FakeBackend::start().await.unwrap();
    let api = client(&backend);
    let mut catalog = Catalog::load(&api).await.unwrap();
    catalog.select_brand(Some(BrandId::new(2)));

    let mut file = tempfile::NamedTempFile::new().unwrap();
    let upload = vec![drink(12, "7 Up", 2, 55, 4), drink(13, "Fanta", 1, 35, 2)];
    file.write_all(serde_json::to_string(&upload).unwrap().as_bytes())
        .unwrap();
    api.import_drinks(file.path()).await.unwrap();

    catalog.set_drinks(api.drinks().await.unwrap());
    assert_eq!(catalog.brands().len(), 2);
    assert_eq!(catalog.price_range(), range(55, 55));
    assert_eq!(ids(catalog.visible()), vec![12]);
    assert_eq!(backend.request_count("GET /Brands"), 1);
}

#[tokio::test]
async fn test_rejected_import_keeps_server_message() {
    let backend = FakeBackend::start().await.unwrap();
    let api = client(&backend);

    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(b"not a catalog").unwrap();

    let err = api.import_drinks(file.path()).await.unwrap_err();
    assert!(err.is_rejection());
    match err {
        ApiError::Status { status, message } => {
            assert_eq!(status, 400);
            assert!(message.starts_with("unreadable catalog"));
        }
        other => panic!("expected a status error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_import_of_missing_file_fails_locally() {
    let backend = FakeBackend::start().await.unwrap();
    let api = client(&backend);
    let dir = tempfile::tempdir().unwrap();

    let err = api
        .import_drinks(&dir.path().join("missing.xlsx"))
        .await
        .unwrap_err();

    assert!(matches!(err, ApiError::Io { .. }));
    assert_eq!(backend.request_count("POST /Drinks/ImportDrinks"), 0);
}

//! Vending machine REST API client.
//!
//! # Architecture
//!
//! - Plain JSON over `reqwest`; the backend owns catalog, orders and
//!   change-making, the storefront never computes them itself
//! - In-memory caching via `moka` for catalog reads (drinks, brands)
//! - A successful import invalidates the whole catalog cache
//!
//! # Endpoints
//!
//! - `GET /Drinks`, `GET /Drinks/filter?MaxPrice=&BrandId=`, `GET /Brands`
//! - `GET /Drinks/price-range?BrandId=` (optional on the backend)
//! - `POST /Drinks/ImportDrinks` (multipart, field `file`)
//! - `POST /Orders`

mod cache;
pub mod types;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, instrument};
use url::Url;
use vending_core::{Brand, BrandId, Drink};

use cache::{CacheKey, CacheValue};
pub use types::{DrinkFilter, OrderLine, OrderReceipt, OrderRequest, PriceRange};

/// Longest response excerpt kept in errors and logs.
const BODY_EXCERPT_CHARS: usize = 500;

/// Errors that can occur when calling the vending API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// HTTP request failed (connection refused, TLS, timeout...).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with a non-success status.
    #[error("API error: {status} - {message}")]
    Status { status: u16, message: String },

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Could not read a file to upload.
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Endpoint URL could not be built.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl ApiError {
    /// HTTP status carried by the error, if the server answered.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The server rejected the request itself (4xx).
    #[must_use]
    pub const fn is_rejection(&self) -> bool {
        matches!(self, Self::Status { status, .. } if *status >= 400 && *status < 500)
    }
}

// =============================================================================
// ApiClient
// =============================================================================

/// Client for the vending REST API.
///
/// Cheaply cloneable; clones share the HTTP connection pool and the cache.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ApiClientInner>,
}

struct ApiClientInner {
    client: reqwest::Client,
    base_url: String,
    cache: Cache<CacheKey, CacheValue>,
}

impl ApiClient {
    /// Create a client for the API rooted at `base_url` (e.g.
    /// `https://localhost:7153/api`).
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(base_url: &Url, cache_ttl: Duration) -> Result<Self, ApiError> {
        let cache = Cache::builder()
            .max_capacity(100)
            .time_to_live(cache_ttl)
            .build();

        let client = reqwest::Client::builder()
            .user_agent(concat!("vending-storefront/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            inner: Arc::new(ApiClientInner {
                client,
                base_url: base_url.as_str().trim_end_matches('/').to_string(),
                cache,
            }),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        let raw = format!("{}/{path}", self.inner.base_url);
        Url::parse(&raw).map_err(|e| ApiError::InvalidUrl(format!("{raw}: {e}")))
    }

    /// Drop every cached catalog response.
    pub fn invalidate_catalog(&self) {
        self.inner.cache.invalidate_all();
    }

    // =========================================================================
    // Catalog
    // =========================================================================

    /// List all drinks.
    ///
    /// # Errors
    ///
    /// Returns error if the API request fails.
    #[instrument(skip(self))]
    pub async fn drinks(&self) -> Result<Vec<Drink>, ApiError> {
        if let Some(CacheValue::Drinks(drinks)) = self.inner.cache.get(&CacheKey::Drinks).await {
            debug!("Cache hit for drinks");
            return Ok(drinks);
        }

        let drinks: Vec<Drink> = self.get_json(self.endpoint("Drinks")?).await?;
        self.inner
            .cache
            .insert(CacheKey::Drinks, CacheValue::Drinks(drinks.clone()))
            .await;
        Ok(drinks)
    }

    /// List drinks matching a filter, evaluated by the backend.
    ///
    /// # Errors
    ///
    /// Returns error if the API request fails.
    #[instrument(skip(self))]
    pub async fn filtered_drinks(&self, filter: &DrinkFilter) -> Result<Vec<Drink>, ApiError> {
        let max_price = filter.max_price.map(|p| p.normalize().to_string());
        // A zero brand id means "all brands" on the wire
        let brand_id = filter.brand_id.filter(|id| id.as_i32() != 0);

        let key = CacheKey::FilteredDrinks {
            max_price: max_price.clone(),
            brand_id,
        };
        if let Some(CacheValue::Drinks(drinks)) = self.inner.cache.get(&key).await {
            debug!("Cache hit for filtered drinks");
            return Ok(drinks);
        }

        let mut url = self.endpoint("Drinks/filter")?;
        {
            let mut query = url.query_pairs_mut();
            if let Some(max_price) = &max_price {
                query.append_pair("MaxPrice", max_price);
            }
            if let Some(brand_id) = brand_id {
                query.append_pair("BrandId", &brand_id.to_string());
            }
        }
        if url.query() == Some("") {
            url.set_query(None);
        }

        let drinks: Vec<Drink> = self.get_json(url).await?;
        self.inner
            .cache
            .insert(key, CacheValue::Drinks(drinks.clone()))
            .await;
        Ok(drinks)
    }

    /// List all brands.
    ///
    /// # Errors
    ///
    /// Returns error if the API request fails.
    #[instrument(skip(self))]
    pub async fn brands(&self) -> Result<Vec<Brand>, ApiError> {
        if let Some(CacheValue::Brands(brands)) = self.inner.cache.get(&CacheKey::Brands).await {
            debug!("Cache hit for brands");
            return Ok(brands);
        }

        let brands: Vec<Brand> = self.get_json(self.endpoint("Brands")?).await?;
        self.inner
            .cache
            .insert(CacheKey::Brands, CacheValue::Brands(brands.clone()))
            .await;
        Ok(brands)
    }

    /// Price range of the catalog, optionally for a single brand.
    ///
    /// Uses the backend's `price-range` endpoint; when the backend does not
    /// have it (404), the range is computed from the filtered drink list.
    ///
    /// # Errors
    ///
    /// Returns error if the API request fails.
    #[instrument(skip(self))]
    pub async fn price_range(&self, brand_id: Option<BrandId>) -> Result<PriceRange, ApiError> {
        let brand_id = brand_id.filter(|id| id.as_i32() != 0);

        let mut url = self.endpoint("Drinks/price-range")?;
        if let Some(brand_id) = brand_id {
            url.query_pairs_mut()
                .append_pair("BrandId", &brand_id.to_string());
        }

        match self.get_json::<PriceRange>(url).await {
            Ok(range) => Ok(range),
            Err(e) if e.status() == Some(StatusCode::NOT_FOUND.as_u16()) => {
                debug!("price-range endpoint unavailable, computing from drinks");
                let drinks = self
                    .filtered_drinks(&DrinkFilter {
                        max_price: None,
                        brand_id,
                    })
                    .await?;
                Ok(PriceRange::spanning(drinks.iter().map(|d| d.price)))
            }
            Err(e) => Err(e),
        }
    }

    /// Upload a catalog file for bulk import.
    ///
    /// Returns the backend's import report: parsed JSON, or the body as a
    /// string when it is not JSON. Invalidates the catalog cache on success.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or the backend rejects it.
    #[instrument(skip(self), fields(path = %path.display()))]
    pub async fn import_drinks(&self, path: &Path) -> Result<serde_json::Value, ApiError> {
        let bytes = tokio::fs::read(path).await.map_err(|source| ApiError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let file_name = path
            .file_name()
            .map_or_else(|| "drinks.xlsx".to_string(), |n| n.to_string_lossy().into_owned());

        let part = reqwest::multipart::Part::bytes(bytes).file_name(file_name);
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .inner
            .client
            .post(self.endpoint("Drinks/ImportDrinks")?)
            .multipart(form)
            .send()
            .await?;
        let body = check_response(response).await?;

        self.invalidate_catalog();
        tracing::info!("Catalog import accepted, cache invalidated");

        // The report is free-form: JSON when the backend sends JSON, the raw
        // text otherwise
        if body.trim().is_empty() {
            Ok(serde_json::Value::Null)
        } else {
            Ok(serde_json::from_str(&body).unwrap_or(serde_json::Value::String(body)))
        }
    }

    // =========================================================================
    // Orders
    // =========================================================================

    /// Submit an order with the inserted coins.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Status` when the backend refuses the order (for
    /// example when it cannot make change), or a transport/parse error.
    #[instrument(skip(self, order), fields(lines = order.items.len()))]
    pub async fn create_order(&self, order: &OrderRequest) -> Result<OrderReceipt, ApiError> {
        let response = self
            .inner
            .client
            .post(self.endpoint("Orders")?)
            .json(order)
            .send()
            .await?;
        let body = check_response(response).await?;

        parse_body(&body)
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, ApiError> {
        debug!(url = %url, "GET");
        let response = self.inner.client.get(url).send().await?;
        let body = check_response(response).await?;
        parse_body(&body)
    }
}

/// Read the body and turn non-success statuses into `ApiError::Status`.
async fn check_response(response: reqwest::Response) -> Result<String, ApiError> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        let excerpt = excerpt(&body);
        tracing::warn!(
            status = %status,
            body = %excerpt,
            "Vending API returned non-success status"
        );
        return Err(ApiError::Status {
            status: status.as_u16(),
            message: error_message(&excerpt),
        });
    }

    Ok(body)
}

fn parse_body<T: DeserializeOwned>(body: &str) -> Result<T, ApiError> {
    serde_json::from_str(body).map_err(|e| {
        tracing::error!(
            error = %e,
            body = %excerpt(body),
            "Failed to parse vending API response"
        );
        ApiError::Parse(e)
    })
}

fn excerpt(body: &str) -> String {
    body.chars().take(BODY_EXCERPT_CHARS).collect()
}

/// Pull a human-readable message out of an error body.
///
/// Accepts `{"message": ...}`, problem-details `{"title"/"detail": ...}`,
/// a bare JSON string, or falls back to the raw text.
fn error_message(body: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(serde_json::Value::String(s)) => s,
        Ok(serde_json::Value::Object(map)) => ["message", "detail", "title", "error"]
            .iter()
            .find_map(|k| map.get(*k).and_then(serde_json::Value::as_str))
            .map_or_else(|| body.to_string(), str::to_string),
        _ => body.trim().to_string(),
    }
}

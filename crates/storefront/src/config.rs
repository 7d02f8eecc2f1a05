//! Storefront configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! All variables are optional.
//! - `VENDING_API_URL` - REST API base URL (default: `https://localhost:7153/api`)
//! - `VENDING_HUB_URL` - Machine lock hub URL (default: `https://localhost:7153/vendingMachineHub`)
//! - `VENDING_DATA_DIR` - Local storage directory (default: `.vending`)
//! - `VENDING_SKIP_NEGOTIATION` - Connect the hub socket directly, without negotiate (default: false)
//! - `VENDING_CATALOG_CACHE_TTL_SECS` - Catalog cache lifetime (default: 300)
//! - `VENDING_LOCK_SETTLE_TIMEOUT_MS` - How long gated commands wait for the lock outcome (default: 3000)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::machine_lock::ReconnectPolicy;

const DEFAULT_API_URL: &str = "https://localhost:7153/api";
const DEFAULT_HUB_URL: &str = "https://localhost:7153/vendingMachineHub";
const DEFAULT_DATA_DIR: &str = ".vending";

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Storefront application configuration.
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    /// REST API base URL (e.g., `https://localhost:7153/api`)
    pub api_url: Url,
    /// Directory backing local storage (cart snapshot, session token)
    pub data_dir: PathBuf,
    /// Lifetime of cached catalog responses
    pub catalog_cache_ttl: Duration,
    /// How long gated commands wait for the first lock outcome
    pub lock_settle_timeout: Duration,
    /// Machine lock hub configuration
    pub machine_lock: MachineLockConfig,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name
    pub sentry_environment: Option<String>,
}

/// Machine lock hub configuration.
#[derive(Debug, Clone)]
pub struct MachineLockConfig {
    /// Hub endpoint (http/https; the socket URL is derived from it)
    pub hub_url: Url,
    /// Skip the negotiate round-trip and open the socket directly
    pub skip_negotiation: bool,
    /// Interval between client pings
    pub keep_alive_interval: Duration,
    /// Silence on the channel longer than this counts as transport loss
    pub server_timeout: Duration,
    /// Upper bound on negotiate + socket open + handshake
    pub handshake_timeout: Duration,
    /// Transport-level reconnect policy
    pub reconnect: ReconnectPolicy,
}

impl MachineLockConfig {
    /// Defaults for a given hub URL.
    #[must_use]
    pub fn new(hub_url: Url) -> Self {
        Self {
            hub_url,
            skip_negotiation: false,
            keep_alive_interval: Duration::from_secs(15),
            server_timeout: Duration::from_secs(30),
            handshake_timeout: Duration::from_secs(15),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl StorefrontConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is present but invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is present but invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get_or = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let api_url = parse_http_url("VENDING_API_URL", &get_or("VENDING_API_URL", DEFAULT_API_URL))?;
        let hub_url = parse_http_url("VENDING_HUB_URL", &get_or("VENDING_HUB_URL", DEFAULT_HUB_URL))?;
        let data_dir = PathBuf::from(get_or("VENDING_DATA_DIR", DEFAULT_DATA_DIR));
        let skip_negotiation = parse_bool(
            "VENDING_SKIP_NEGOTIATION",
            &get_or("VENDING_SKIP_NEGOTIATION", "false"),
        )?;
        let catalog_cache_ttl = Duration::from_secs(parse_u64(
            "VENDING_CATALOG_CACHE_TTL_SECS",
            &get_or("VENDING_CATALOG_CACHE_TTL_SECS", "300"),
        )?);
        let lock_settle_timeout = Duration::from_millis(parse_u64(
            "VENDING_LOCK_SETTLE_TIMEOUT_MS",
            &get_or("VENDING_LOCK_SETTLE_TIMEOUT_MS", "3000"),
        )?);

        let machine_lock = MachineLockConfig {
            skip_negotiation,
            ..MachineLockConfig::new(hub_url)
        };

        Ok(Self {
            api_url,
            data_dir,
            catalog_cache_ttl,
            lock_settle_timeout,
            machine_lock,
            sentry_dsn: lookup("SENTRY_DSN").filter(|v| !v.is_empty()),
            sentry_environment: lookup("SENTRY_ENVIRONMENT").filter(|v| !v.is_empty()),
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Parse an absolute http(s) URL.
fn parse_http_url(key: &str, value: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(value)
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            format!("unsupported scheme '{other}' (expected http or https)"),
        )),
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            format!("expected a boolean, got '{other}'"),
        )),
    }
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

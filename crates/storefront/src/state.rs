//! Application state shared across commands.

use std::sync::Arc;

use vending_core::SessionId;

use crate::api::ApiClient;
use crate::cart::CartStore;
use crate::config::StorefrontConfig;
use crate::error::Result;
use crate::machine_lock::MachineLockClient;
use crate::session::get_or_create_session_id;
use crate::storage::{FileStore, SharedStore};

/// Application state shared across all commands.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// shared resources like the API client, local storage and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    api: ApiClient,
    store: SharedStore,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl AppState {
    /// Create state backed by a file store under `config.data_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the API client cannot be built.
    pub fn new(config: StorefrontConfig) -> Result<Self> {
        let store: SharedStore = Arc::new(FileStore::new(config.data_dir.clone()));
        Self::with_store(config, store)
    }

    /// Create state over an arbitrary store.
    ///
    /// # Errors
    ///
    /// Returns an error if the API client cannot be built.
    pub fn with_store(config: StorefrontConfig, store: SharedStore) -> Result<Self> {
        let api = ApiClient::new(&config.api_url, config.catalog_cache_ttl)?;
        Ok(Self {
            inner: Arc::new(AppStateInner { config, api, store }),
        })
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// Get a reference to the REST API client.
    #[must_use]
    pub fn api(&self) -> &ApiClient {
        &self.inner.api
    }

    /// Get a handle to local storage.
    #[must_use]
    pub fn store(&self) -> SharedStore {
        Arc::clone(&self.inner.store)
    }

    /// This profile's session token.
    #[must_use]
    pub fn session_id(&self) -> SessionId {
        get_or_create_session_id(self.inner.store.as_ref())
    }

    /// Load the persisted cart.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored snapshot is malformed or unreadable.
    pub fn load_cart(&self) -> Result<CartStore> {
        Ok(CartStore::load(self.store())?)
    }

    /// Start the lock client for this profile's session.
    ///
    /// # Errors
    ///
    /// Returns an error if the client cannot be created.
    pub fn start_lock_client(&self) -> Result<MachineLockClient> {
        Ok(MachineLockClient::start(
            &self.inner.config.machine_lock,
            self.session_id(),
        )?)
    }
}

//! Session identity provider.
//!
//! Hands out one stable token per storage profile. The first call generates
//! and stores a token; every later call returns the stored value. Storage
//! failures never surface to the caller: reads that fail fall back to a
//! fresh token, and writes that fail are logged (the token then lives only
//! as long as the process).

use tracing::{debug, warn};
use vending_core::SessionId;

use crate::storage::{KeyValueStore, SESSION_KEY, StorageError};

/// Return the profile's session token, creating it on first use.
pub fn get_or_create_session_id(store: &dyn KeyValueStore) -> SessionId {
    match store.get(SESSION_KEY) {
        Ok(Some(stored)) => {
            if let Some(id) = SessionId::from_stored(&stored) {
                return id;
            }
            debug!("Stored session token is blank, generating a new one");
        }
        Ok(None) => {}
        Err(e) => warn!(error = %e, "Failed to read session token, generating a new one"),
    }

    let id = SessionId::generate();
    if let Err(e) = store.set(SESSION_KEY, id.as_str()) {
        warn!(error = %e, "Failed to persist session token");
    }
    debug!(session_id = %id, "Created session token");
    id
}

/// Forget the stored token so the next call generates a new one.
///
/// # Errors
///
/// Returns `StorageError` if the key cannot be removed.
pub fn reset_session_id(store: &dyn KeyValueStore) -> Result<(), StorageError> {
    store.remove(SESSION_KEY)
}

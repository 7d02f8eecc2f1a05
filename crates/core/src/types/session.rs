//! Per-profile session token.
//!
//! The token correlates one storefront profile with its machine lock on the
//! server. New tokens are UUID v4 in simple (hyphen-less) form. Tokens read
//! back from storage keep their format, so older short tokens stay valid.
//! Only surrounding whitespace (such as a trailing newline) is dropped.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque session token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Generate a fresh random token.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Wrap a stored token, trimming surrounding whitespace. Returns `None`
    /// for blank values.
    #[must_use]
    pub fn from_stored(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.is_empty() {
            None
        } else {
            Some(Self(value.to_string()))
        }
    }

    /// Token as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

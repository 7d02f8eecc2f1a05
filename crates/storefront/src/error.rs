//! Storefront-level error type.
//!
//! Every front-end operation returns `Result<T, StorefrontError>`. Errors
//! are scoped to the operation that raised them; [`user_message`] gives the
//! inline text a view shows for each category.
//!
//! [`user_message`]: StorefrontError::user_message

use thiserror::Error;

use crate::api::ApiError;
use crate::cart::CartError;
use crate::config::ConfigError;
use crate::machine_lock::LockError;
use crate::payment::{MESSAGE_CHANGE_UNAVAILABLE, PaymentError};
use crate::storage::StorageError;

/// Application-level error type for the storefront.
#[derive(Debug, Error)]
pub enum StorefrontError {
    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Local storage failed.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Cart could not be loaded or persisted.
    #[error(transparent)]
    Cart(#[from] CartError),

    /// Backend call failed.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// Lock client could not be started.
    #[error(transparent)]
    Lock(#[from] LockError),

    /// Payment was refused or could not be submitted.
    #[error(transparent)]
    Payment(#[from] PaymentError),

    /// The machine is held by another session.
    #[error("{0}")]
    MachineBusy(String),

    /// Requested item does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input from the user.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Writing output failed.
    #[error("Output error: {0}")]
    Output(#[from] std::io::Error),
}

impl StorefrontError {
    /// Inline text for the user.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Api(ApiError::Parse(_)) => "The server sent data we could not read.".to_string(),
            Self::Api(ApiError::Io { path, .. }) => {
                format!("Could not read {}. Choose the file again.", path.display())
            }
            Self::Api(e) if e.is_rejection() => format!("The request was rejected: {e}"),
            Self::Api(_) | Self::Payment(PaymentError::Api(_)) => {
                "Network error. Please try again.".to_string()
            }
            Self::Payment(PaymentError::ChangeUnavailable(_)) => {
                MESSAGE_CHANGE_UNAVAILABLE.to_string()
            }
            Self::Payment(PaymentError::InsufficientFunds { inserted, required }) => format!(
                "Not enough coins: inserted {}, need {}.",
                vending_core::format_money(*inserted),
                vending_core::format_money(*required)
            ),
            Self::Cart(CartError::Parse(_)) => {
                "The saved cart is damaged. Run `cart clear` to start over.".to_string()
            }
            Self::MachineBusy(message) => format!("Sorry, the machine is not available: {message}"),
            other => other.to_string(),
        }
    }

    /// Whether the error is worth reporting to error tracking.
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        matches!(
            self,
            Self::Storage(_) | Self::Cart(CartError::Storage(_) | CartError::Serialize(_))
        )
    }
}

/// Result type alias for storefront operations.
pub type Result<T, E = StorefrontError> = std::result::Result<T, E>;

//! Coin payment.
//!
//! [`CoinPurse`] counts the coins inserted so far; [`Checkout::submit`]
//! turns the cart and the purse into an order. Change-making happens on
//! the backend: the client only sends what was inserted and shows what
//! comes back.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{info, instrument, warn};
use vending_core::{ACCEPTED_NOMINALS, CoinCount, Money, Nominal, NominalError};

use crate::api::{ApiClient, ApiError, OrderLine, OrderReceipt, OrderRequest};
use crate::cart::{CartError, CartStore};

/// Shown when the machine cannot hand out change for the inserted coins.
pub const MESSAGE_CHANGE_UNAVAILABLE: &str =
    "Sorry, the machine cannot give you the required change right now";

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("the cart is empty")]
    EmptyCart,

    #[error("inserted {inserted}, but the order costs {required}")]
    InsufficientFunds { inserted: Money, required: Money },

    #[error(transparent)]
    UnknownNominal(#[from] NominalError),

    #[error("{}", MESSAGE_CHANGE_UNAVAILABLE)]
    ChangeUnavailable(#[source] ApiError),

    #[error("order submission failed: {0}")]
    Api(#[source] ApiError),

    /// The order went through but the cart could not be cleared.
    #[error("failed to clear the cart: {0}")]
    Cart(#[from] CartError),
}

/// Coins inserted so far, per accepted nominal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoinPurse {
    counts: BTreeMap<Nominal, u32>,
}

impl Default for CoinPurse {
    fn default() -> Self {
        Self {
            counts: ACCEPTED_NOMINALS.iter().map(|&n| (n, 0)).collect(),
        }
    }
}

impl CoinPurse {
    /// An empty purse: every accepted nominal at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert one coin.
    ///
    /// # Errors
    ///
    /// Returns `PaymentError::UnknownNominal` for coins the machine does not
    /// accept.
    pub fn insert(&mut self, nominal: Nominal) -> Result<(), PaymentError> {
        *self.slot(nominal)? += 1;
        Ok(())
    }

    /// Take one coin back; a nominal at zero stays at zero.
    ///
    /// # Errors
    ///
    /// Returns `PaymentError::UnknownNominal` for coins the machine does not
    /// accept.
    pub fn take_back(&mut self, nominal: Nominal) -> Result<(), PaymentError> {
        let slot = self.slot(nominal)?;
        *slot = slot.saturating_sub(1);
        Ok(())
    }

    /// Set the count of a nominal directly.
    ///
    /// # Errors
    ///
    /// Returns `PaymentError::UnknownNominal` for coins the machine does not
    /// accept.
    pub fn set_count(&mut self, nominal: Nominal, count: u32) -> Result<(), PaymentError> {
        *self.slot(nominal)? = count;
        Ok(())
    }

    /// Count of a nominal (zero for unaccepted ones).
    #[must_use]
    pub fn count(&self, nominal: Nominal) -> u32 {
        self.counts.get(&nominal).copied().unwrap_or(0)
    }

    /// Value of all inserted coins.
    #[must_use]
    pub fn total_inserted(&self) -> Money {
        self.counts
            .iter()
            .map(|(nominal, &count)| nominal.times(count))
            .sum()
    }

    /// Non-zero stacks, in ascending nominal order.
    #[must_use]
    pub fn inserted_coins(&self) -> Vec<CoinCount> {
        self.counts
            .iter()
            .filter(|&(_, &quantity)| quantity > 0)
            .map(|(&nominal, &quantity)| CoinCount { nominal, quantity })
            .collect()
    }

    /// Whether enough has been inserted to pay `total_price`.
    #[must_use]
    pub fn is_enough(&self, total_price: Money) -> bool {
        self.total_inserted() >= total_price
    }

    /// How much is still missing (zero once enough is inserted).
    #[must_use]
    pub fn remaining(&self, total_price: Money) -> Money {
        (total_price - self.total_inserted()).max(Decimal::ZERO)
    }

    fn slot(&mut self, nominal: Nominal) -> Result<&mut u32, PaymentError> {
        self.counts
            .get_mut(&nominal)
            .ok_or(PaymentError::UnknownNominal(NominalError::NotAccepted(
                nominal.value(),
            )))
    }
}

/// Order submission.
#[derive(Debug, Clone, Copy)]
pub struct Checkout;

impl Checkout {
    /// Build the order body for a cart and a purse.
    #[must_use]
    pub fn order_for(cart: &CartStore, purse: &CoinPurse) -> OrderRequest {
        OrderRequest {
            items: cart.items().iter().map(OrderLine::from).collect(),
            inserted_coins: purse.inserted_coins(),
        }
    }

    /// Submit the order. On success the cart is cleared; on any failure it
    /// is left as it was.
    ///
    /// # Errors
    ///
    /// - `EmptyCart` / `InsufficientFunds`: nothing is sent.
    /// - `ChangeUnavailable`: the backend refused the order (4xx).
    /// - `Api`: transport or server failure.
    /// - `Cart`: the order succeeded but the cleared cart could not be
    ///   persisted.
    #[instrument(skip_all, fields(total = %cart.total_price()))]
    pub async fn submit(
        api: &ApiClient,
        cart: &mut CartStore,
        purse: &CoinPurse,
    ) -> Result<OrderReceipt, PaymentError> {
        if cart.is_empty() {
            return Err(PaymentError::EmptyCart);
        }

        let required = cart.total_price();
        let inserted = purse.total_inserted();
        if !purse.is_enough(required) {
            return Err(PaymentError::InsufficientFunds { inserted, required });
        }

        let order = Self::order_for(cart, purse);
        let receipt = match api.create_order(&order).await {
            Ok(receipt) => receipt,
            Err(e) if e.is_rejection() => {
                warn!(error = %e, "Order refused");
                return Err(PaymentError::ChangeUnavailable(e));
            }
            Err(e) => return Err(PaymentError::Api(e)),
        };

        info!(change = %receipt.change_amount, "Order accepted");
        cart.clear_cart()?;
        Ok(receipt)
    }
}

//! Coin denominations and counted coin stacks.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::money::Money;

/// Error returned when a coin value is not accepted by the machine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NominalError {
    #[error("coin nominal {0} is not accepted (expected one of 1, 2, 5, 10)")]
    NotAccepted(u32),
    #[error("invalid coin nominal: {0}")]
    Invalid(String),
}

/// Face value of a coin, in whole currency units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Nominal(u32);

impl Nominal {
    pub const ONE: Self = Self(1);
    pub const TWO: Self = Self(2);
    pub const FIVE: Self = Self(5);
    pub const TEN: Self = Self(10);

    /// Validate a raw value against the accepted denominations.
    ///
    /// # Errors
    ///
    /// Returns [`NominalError::NotAccepted`] for any value outside
    /// [`ACCEPTED_NOMINALS`].
    pub fn accepted(value: u32) -> Result<Self, NominalError> {
        ACCEPTED_NOMINALS
            .iter()
            .copied()
            .find(|n| n.0 == value)
            .ok_or(NominalError::NotAccepted(value))
    }

    /// Raw face value.
    #[must_use]
    pub const fn value(self) -> u32 {
        self.0
    }

    /// Value of `count` coins of this nominal.
    #[must_use]
    pub fn times(self, count: u32) -> Money {
        Money::from(u64::from(self.0) * u64::from(count))
    }
}

impl std::fmt::Display for Nominal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for Nominal {
    type Err = NominalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s
            .trim()
            .parse::<u32>()
            .map_err(|_| NominalError::Invalid(s.to_string()))?;
        Self::accepted(value)
    }
}

/// Denominations the coin acceptor takes, in ascending order.
pub const ACCEPTED_NOMINALS: [Nominal; 4] = [Nominal::ONE, Nominal::TWO, Nominal::FIVE, Nominal::TEN];

/// A stack of identical coins.
///
/// Used both for coins inserted by the user and for change returned by
/// the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoinCount {
    pub nominal: Nominal,
    pub quantity: u32,
}

impl CoinCount {
    /// Total value of the stack.
    #[must_use]
    pub fn amount(&self) -> Money {
        self.nominal.times(self.quantity)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_accepted_nominals() {
        for value in [1, 2, 5, 10] {
            assert_eq!(Nominal::accepted(value).unwrap().value(), value);
        }
        assert_eq!(Nominal::accepted(3), Err(NominalError::NotAccepted(3)));
    }

    #[test]
    fn test_nominal_from_str() {
        assert_eq!("5".parse::<Nominal>().unwrap(), Nominal::FIVE);
        assert!(matches!(
            "five".parse::<Nominal>(),
            Err(NominalError::Invalid(_))
        ));
        assert!(matches!(
            "50".parse::<Nominal>(),
            Err(NominalError::NotAccepted(50))
        ));
    }

    #[test]
    fn test_coin_count_wire_format() {
        let coins: Vec<CoinCount> =
            serde_json::from_str(r#"[{"nominal":10,"quantity":2},{"nominal":1,"quantity":3}]"#)
                .unwrap();
        assert_eq!(coins[0].amount(), Money::from(20));
        assert_eq!(coins[1].amount(), Money::from(3));
    }
}

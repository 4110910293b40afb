//! Amount type for handling monetary values with optional dollar signs.
//!
//! This module provides the `Amount` type which wraps `Decimal` and handles parsing values that
//! may or may not include a dollar sign and commas, which is how the ledger renders its
//! `Effective Amount` column.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::error::Error;
use std::fmt;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Represents a dollar amount.
///
/// # Examples
///
/// ```
/// # use ledger_exporter::model::Amount;
/// # use std::str::FromStr;
/// let amount = Amount::from_str("-$1,250.50").unwrap();
/// assert_eq!(amount.to_cents().unwrap(), -125050);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Amount {
    value: Decimal,
}

impl Amount {
    pub const fn new(value: Decimal) -> Self {
        Self { value }
    }

    /// Returns the underlying Decimal value.
    pub fn value(&self) -> Decimal {
        self.value
    }

    /// Scales the amount to cents, rounding half to even, so `12.345` becomes `1234` and `12.355`
    /// becomes `1236`.
    pub fn to_cents(&self) -> Result<i64, AmountError> {
        self.value
            .checked_mul(Decimal::ONE_HUNDRED)
            .map(|v| v.round_dp_with_strategy(0, RoundingStrategy::MidpointNearestEven))
            .and_then(|v| v.to_i64())
            .ok_or(AmountError::OutOfRange(self.value))
    }
}

/// An error that can occur when parsing strings into `Amount` values.
#[derive(Debug)]
pub enum AmountError {
    Empty,
    Invalid {
        text: String,
        source: rust_decimal::Error,
    },
    OutOfRange(Decimal),
}

impl Display for AmountError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            AmountError::Empty => f.write_str("An empty string is not a valid amount"),
            AmountError::Invalid { text, source } => {
                write!(f, "Unable to parse '{text}' as an amount: {source}")
            }
            AmountError::OutOfRange(value) => {
                write!(f, "The amount {value} cannot be represented in cents")
            }
        }
    }
}

impl Error for AmountError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            AmountError::Invalid { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(AmountError::Empty);
        }

        // "-$50.00", "$50.00" or a bare number
        let without_dollar = if let Some(after_minus) = trimmed.strip_prefix('-') {
            match after_minus.strip_prefix('$') {
                Some(after_dollar) => format!("-{after_dollar}"),
                None => trimmed.to_string(),
            }
        } else if let Some(after_dollar) = trimmed.strip_prefix('$') {
            after_dollar.to_string()
        } else {
            trimmed.to_string()
        };

        let without_commas = without_dollar.replace(',', "");
        let value = Decimal::from_str(&without_commas).map_err(|source| AmountError::Invalid {
            text: s.to_string(),
            source,
        })?;
        Ok(Amount { value })
    }
}

impl Display for Amount {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.value, f)
    }
}

impl Serialize for Amount {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Amount::from_str(&s).map_err(serde::de::Error::custom)
    }
}

impl From<Decimal> for Amount {
    fn from(value: Decimal) -> Self {
        Amount::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cents(s: &str) -> i64 {
        Amount::from_str(s).unwrap().to_cents().unwrap()
    }

    #[test]
    fn test_parse_without_dollar_sign() {
        let amount = Amount::from_str("3.50").unwrap();
        assert_eq!(amount.value(), Decimal::from_str("3.50").unwrap());
    }

    #[test]
    fn test_parse_with_dollar_sign_and_commas() {
        let amount = Amount::from_str("-$60,000.00").unwrap();
        assert_eq!(amount.value(), Decimal::from_str("-60000.00").unwrap());
    }

    #[test]
    fn test_parse_whitespace() {
        let amount = Amount::from_str("  $50.00  ").unwrap();
        assert_eq!(amount.value(), Decimal::from_str("50.00").unwrap());
    }

    #[test]
    fn test_parse_empty_string_is_an_error() {
        assert!(matches!(Amount::from_str(""), Err(AmountError::Empty)));
        assert!(matches!(Amount::from_str("   "), Err(AmountError::Empty)));
    }

    #[test]
    fn test_parse_garbage_is_an_error() {
        let err = Amount::from_str("twelve dollars").unwrap_err();
        assert!(err.to_string().contains("twelve dollars"));
    }

    #[test]
    fn test_to_cents() {
        assert_eq!(cents("3.50"), 350);
        assert_eq!(cents("-$5.25"), -525);
        assert_eq!(cents("$1,234.56"), 123456);
        assert_eq!(cents("7"), 700);
    }

    #[test]
    fn test_to_cents_rounds_half_to_even() {
        assert_eq!(cents("12.345"), 1234);
        assert_eq!(cents("12.355"), 1236);
        assert_eq!(cents("0.125"), 12);
        assert_eq!(cents("-0.125"), -12);
        assert_eq!(cents("12.3451"), 1235);
    }

    #[test]
    fn test_serialize() {
        let amount = Amount::from_str("$50.10").unwrap();
        let json = serde_json::to_string(&amount).unwrap();
        assert_eq!(json, "\"50.10\"");
    }
}

//! Human-readable currency amount parsing.
//!
//! This module provides [`MoneyAmount`], a type for parsing human-readable
//! currency strings into precise decimal values suitable for conversion to
//! on-chain token amounts.
//!
//! # Supported Formats
//!
//! - Plain numbers: `"100"`, `"0.01"`
//! - With currency symbols: `"$10.50"`
//! - With thousand separators: `"1,000"`, `"1,000,000.50"`
//!
//! # Example
//!
//! ```rust
//! use forward_x402_types::util::MoneyAmount;
//!
//! let amount = MoneyAmount::parse("$0.123456789").unwrap();
//! assert_eq!(amount.to_minor_units(6), "123456");
//! ```

use regex::Regex;
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::borrow::Cow;
use std::fmt;
use std::fmt::Display;
use std::str::FromStr;
use std::sync::LazyLock;

/// A parsed, strictly positive monetary amount with decimal precision.
///
/// The value keeps the precision of its input. Conversion to token minor units
/// happens only through [`MoneyAmount::to_minor_units`], which truncates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd)]
pub struct MoneyAmount(pub Decimal);

impl MoneyAmount {
    /// Returns the number of decimal places in the original input.
    pub fn scale(&self) -> u32 {
        self.0.scale()
    }

    /// Returns the value as an unsigned integer (without decimal point).
    ///
    /// For example, `"12.34"` returns `1234`.
    pub fn mantissa(&self) -> u128 {
        self.0.mantissa().unsigned_abs()
    }

    /// Scales the amount by `10^decimals` and truncates toward zero.
    ///
    /// The result is an integer string with no decimal point, e.g. `0.123456789`
    /// with 6 decimals gives `"123456"`. Excess precision is dropped, never rounded.
    pub fn to_minor_units(&self, decimals: u32) -> String {
        let factor = Decimal::from(10u64.pow(decimals));
        let scaled = (self.0 * factor).trunc();
        scaled.normalize().to_string()
    }
}

/// Errors that can occur when parsing a monetary amount.
#[derive(Debug, thiserror::Error)]
pub enum MoneyAmountParseError {
    /// The input string could not be parsed as a number.
    #[error("Invalid number format")]
    InvalidFormat,
    /// The value is outside the allowed range.
    #[error(
        "Amount must be between {} and {}",
        constants::MIN_STR,
        constants::MAX_STR
    )]
    OutOfRange,
    /// Negative values are not allowed.
    #[error("Negative value is not allowed")]
    Negative,
}

mod constants {
    use super::*;

    pub const MIN_STR: &str = "0.000000001";
    pub const MAX_STR: &str = "999999999";

    pub static MIN: LazyLock<Decimal> =
        LazyLock::new(|| Decimal::from_str(MIN_STR).expect("valid decimal"));
    pub static MAX: LazyLock<Decimal> =
        LazyLock::new(|| Decimal::from_str(MAX_STR).expect("valid decimal"));
}

static NON_NUMERIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\d\.\-]+").expect("valid regex"));

/// Significant digits a [`Decimal`] always holds exactly.
const MAX_DIGITS: usize = 28;

/// Drops the fractional digits a [`Decimal`] cannot hold.
///
/// `Decimal::from_str` rounds them away instead, which could push a price up to the
/// next minor unit.
fn truncate_fraction(cleaned: &str) -> Cow<'_, str> {
    let Some((int_part, fraction)) = cleaned.split_once('.') else {
        return Cow::Borrowed(cleaned);
    };
    let int_digits = int_part
        .trim_start_matches('-')
        .trim_start_matches('0')
        .len();
    let keep = MAX_DIGITS.saturating_sub(int_digits);
    if fraction.len() <= keep {
        Cow::Borrowed(cleaned)
    } else if keep == 0 {
        Cow::Owned(int_part.to_string())
    } else {
        Cow::Owned(format!("{int_part}.{}", &fraction[..keep]))
    }
}

impl MoneyAmount {
    /// Parses a human-readable currency string into a [`MoneyAmount`].
    ///
    /// Currency symbols, thousand separators, and whitespace are stripped
    /// before parsing. Digits beyond what a [`Decimal`] can hold are truncated.
    /// The result must be a positive number within the allowed range.
    pub fn parse(input: &str) -> Result<Self, MoneyAmountParseError> {
        let cleaned = NON_NUMERIC.replace_all(input, "");
        let parsed = Decimal::from_str(&truncate_fraction(&cleaned))
            .map_err(|_| MoneyAmountParseError::InvalidFormat)?;
        Self::try_from(parsed)
    }
}

impl TryFrom<Decimal> for MoneyAmount {
    type Error = MoneyAmountParseError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        if value.is_sign_negative() && !value.is_zero() {
            return Err(MoneyAmountParseError::Negative);
        }
        if value < *constants::MIN || value > *constants::MAX {
            return Err(MoneyAmountParseError::OutOfRange);
        }
        Ok(MoneyAmount(value))
    }
}

impl FromStr for MoneyAmount {
    type Err = MoneyAmountParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MoneyAmount::parse(s)
    }
}

impl TryFrom<&str> for MoneyAmount {
    type Error = MoneyAmountParseError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        MoneyAmount::from_str(value)
    }
}

impl TryFrom<f64> for MoneyAmount {
    type Error = MoneyAmountParseError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        // from_f64_retain would keep binary noise like 0.1000000000000000055...
        let decimal = Decimal::from_f64(value).ok_or(MoneyAmountParseError::OutOfRange)?;
        Self::try_from(decimal)
    }
}

impl Display for MoneyAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.normalize())
    }
}

impl Serialize for MoneyAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Accepts either `"0.05"` or `0.05` in configuration files.
impl<'de> Deserialize<'de> for MoneyAmount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Wire {
            Text(String),
            Number(f64),
        }

        match Wire::deserialize(deserializer)? {
            Wire::Text(s) => MoneyAmount::parse(&s).map_err(serde::de::Error::custom),
            Wire::Number(n) => MoneyAmount::try_from(n).map_err(serde::de::Error::custom),
        }
    }
}

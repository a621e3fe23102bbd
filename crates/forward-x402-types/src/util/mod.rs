//! Utility types and functions for x402.
//!
//! - [`b64`] - Base64 transport codec for payment headers
//! - [`money_amount`] - Human-readable currency amount parsing and minor-unit conversion

pub mod b64;
pub mod money_amount;

pub use b64::*;
pub use money_amount::MoneyAmount;

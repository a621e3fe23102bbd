//! Protocol types for x402 payment messages.
//!
//! This module defines the wire format exchanged between buyers, the payment gate,
//! and the facilitator. Only protocol version 1 is spoken, see [`v1`].
//!
//! # Wire Format
//!
//! All types serialize to JSON using camelCase field names. The protocol version
//! is indicated by the `x402Version` field on payloads, facilitator requests and
//! 402 response bodies.

pub mod v1;

pub use v1::*;

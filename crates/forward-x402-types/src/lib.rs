//! Core types for the x402 payment gate used by forward-x402.
//!
//! The x402 protocol enables micropayments over HTTP by leveraging the 402 Payment Required
//! status code. When a client requests a paid resource, the server responds with payment
//! requirements. The client signs a payment authorization, which is verified and settled
//! by a remote facilitator.
//!
//! # Modules
//!
//! - [`config`] - Environment variable resolution for configuration values
//! - [`facilitator`] - Core trait for payment verification and settlement
//! - [`networks`] - Supported networks, schemes and their USDC deployments
//! - [`proto`] - Wire format types for protocol messages (V1)
//! - [`util`] - Helper types (base64 codec, money amounts)

pub mod config;
pub mod facilitator;
pub mod networks;
pub mod proto;
pub mod util;

//! Forward x402: a pay-to-email forwarding server.
//!
//! Every published endpoint has a short URL. Anyone can `POST` a message to
//! `/forward/{short_url}`, but it is delivered to the owner's inbox only after an
//! [x402](https://www.x402.org) payment for the endpoint's price has been verified and
//! settled by a facilitator. Unpaid requests receive `402 Payment Required` with the
//! payment terms, or an HTML paywall when they come from a browser.
//!
//! # Modules
//!
//! - [`config`]: JSON file and environment configuration.
//! - [`handlers`]: HTTP routes.
//! - [`mailer`]: The [`Mailer`](mailer::Mailer) seam used to deliver paid messages.
//! - [`run`]: Server start-up and graceful shutdown.
//! - [`state`]: State shared by the handlers.
//! - [`store`]: Endpoint storage and counters.
//!
//! The payment gate itself lives in the `forward-x402-axum` crate, protocol types in
//! `forward-x402-types`.

pub mod config;
pub mod handlers;
pub mod mailer;
pub mod run;
pub mod sig_down;
pub mod state;
pub mod store;
#[cfg(feature = "telemetry")]
pub mod telemetry;

//! Axum helpers for enforcing [x402](https://www.x402.org) payments.
//!
//! This crate provides the [`Paygate`] that decides whether a request has been paid for,
//! a [`FacilitatorClient`] for communicating with a remote x402 facilitator, and the
//! [`auth`] module that signs facilitator calls with Coinbase CDP credentials.
//!
//! ## Quickstart
//!
//! ```rust,no_run
//! use axum::{Router, routing::post, Json};
//! use axum::http::{HeaderMap, Uri};
//! use axum::response::{IntoResponse, Response};
//! use serde_json::json;
//! use forward_x402_axum::{FacilitatorClient, Paygate, PaygateConfig};
//! use forward_x402_types::util::MoneyAmount;
//!
//! async fn paid(headers: HeaderMap, uri: Uri) -> Response {
//!     let facilitator = FacilitatorClient::try_from("https://facilitator.example.com/").unwrap();
//!     let gate = Paygate::new(
//!         facilitator,
//!         MoneyAmount::parse("0.025").unwrap(),
//!         "0xd8dA6BF26964aF9D7eEd9e03E53415D37aA96045",
//!         PaygateConfig { description: "Premium Content".into(), ..Default::default() },
//!     );
//!     match gate.handle_request(&headers, uri.path()).await {
//!         Ok(authorized) => authorized.apply(Json(json!({ "hello": "world" }))),
//!         Err(rejection) => rejection.into_response(),
//!     }
//! }
//!
//! let app: Router = Router::new().route("/paywall", post(paid));
//! ```
//!
//! For tests, [`stub::StubFacilitator`] stands in for a real facilitator.

pub mod auth;
pub mod facilitator_client;
pub mod paygate;
pub mod stub;

pub use facilitator_client::FacilitatorClient;
pub use paygate::{Authorized, Paygate, PaygateConfig, PaygateError, PaymentRejection};

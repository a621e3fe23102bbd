//! Forward x402 HTTP entrypoint.
//!
//! Endpoints:
//! - `GET /health` – Liveness probe
//! - `GET /forward/{short_url}` – Price and usage of an endpoint
//! - `POST /forward/{short_url}` – Deliver a message after an x402 payment settles
//!
//! Environment:
//! - `.env` values loaded at startup
//! - `HOST`, `PORT` control binding address
//! - `X402_PAYMENT_ADDRESS` receives the payments
//! - `CDP_KEY_NAME`, `CDP_PRIVATE_KEY` sign requests to the hosted facilitator
//! - `OTEL_*` variables enable trace export

use std::process;

use forward_x402::run::run;

#[tokio::main]
async fn main() {
    let result = run().await;
    if let Err(e) = result {
        eprintln!("{e}");
        process::exit(1)
    }
}

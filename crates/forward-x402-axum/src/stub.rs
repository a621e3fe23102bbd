//! An in-memory [`Facilitator`] with scripted answers.
//!
//! [`StubFacilitator`] lets the payment gate and its callers be exercised without a network:
//! verify and settle outcomes are set up front, every call is counted, and the last payload
//! and requirements seen are kept for assertions.
//!
//! ```rust
//! use forward_x402_axum::stub::StubFacilitator;
//! use serde_json::json;
//!
//! let facilitator = StubFacilitator::approving().with_settle_response(json!({"txHash": "abc"}));
//! assert_eq!(facilitator.verify_calls(), 0);
//! ```

use forward_x402_types::facilitator::{Facilitator, FacilitatorError};
use forward_x402_types::proto::{
    PaymentPayload, PaymentRequirements, SettleResponse, VerifyResponse,
};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Failure reported by a [`StubFacilitator`] in place of a real one.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct StubError {
    pub message: String,
    /// Reported as a seller-side configuration failure instead of a transport one.
    pub configuration: bool,
}

impl StubError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            configuration: false,
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            configuration: true,
        }
    }
}

impl FacilitatorError for StubError {
    fn is_configuration(&self) -> bool {
        self.configuration
    }
}

#[derive(Debug, Default)]
struct Seen {
    payload: Option<PaymentPayload>,
    requirements: Option<PaymentRequirements>,
}

#[derive(Debug)]
pub struct StubFacilitator {
    verify: Result<VerifyResponse, StubError>,
    settle: Result<SettleResponse, StubError>,
    verify_delay: Option<Duration>,
    settle_delay: Option<Duration>,
    verify_calls: AtomicUsize,
    settle_calls: AtomicUsize,
    seen: Mutex<Seen>,
}

impl StubFacilitator {
    /// Accepts every payment and settles with a fixed receipt.
    pub fn approving() -> Self {
        Self {
            verify: Ok(VerifyResponse::valid("0x857b06519E91e3A54538791bDbb0E22373e36b66")),
            settle: Ok(SettleResponse(json!({
                "success": true,
                "transaction": "0x0000000000000000000000000000000000000000000000000000000000000001",
                "network": "base-sepolia",
            }))),
            verify_delay: None,
            settle_delay: None,
            verify_calls: AtomicUsize::new(0),
            settle_calls: AtomicUsize::new(0),
            seen: Mutex::new(Seen::default()),
        }
    }

    /// Reports every payment as invalid with `reason`.
    pub fn rejecting(reason: impl Into<String>) -> Self {
        Self::approving().with_verify_response(VerifyResponse::invalid(reason))
    }

    pub fn with_verify_response(mut self, response: VerifyResponse) -> Self {
        self.verify = Ok(response);
        self
    }

    pub fn with_settle_response(mut self, receipt: serde_json::Value) -> Self {
        self.settle = Ok(SettleResponse(receipt));
        self
    }

    /// Makes `verify` fail as if the facilitator were unreachable.
    pub fn with_verify_error(mut self, message: impl Into<String>) -> Self {
        self.verify = Err(StubError::transport(message));
        self
    }

    /// Makes `settle` fail as if the facilitator were unreachable.
    pub fn with_settle_error(mut self, message: impl Into<String>) -> Self {
        self.settle = Err(StubError::transport(message));
        self
    }

    /// Makes `settle` fail before reaching the facilitator, as a request signer would.
    pub fn with_settle_configuration_error(mut self, message: impl Into<String>) -> Self {
        self.settle = Err(StubError::configuration(message));
        self
    }

    pub fn with_verify_delay(mut self, delay: Duration) -> Self {
        self.verify_delay = Some(delay);
        self
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = Some(delay);
        self
    }

    pub fn verify_calls(&self) -> usize {
        self.verify_calls.load(Ordering::SeqCst)
    }

    pub fn settle_calls(&self) -> usize {
        self.settle_calls.load(Ordering::SeqCst)
    }

    /// The payload of the most recent verify or settle call.
    pub fn last_payload(&self) -> Option<PaymentPayload> {
        self.seen().payload.clone()
    }

    /// The requirements of the most recent verify or settle call.
    pub fn last_requirements(&self) -> Option<PaymentRequirements> {
        self.seen().requirements.clone()
    }

    fn seen(&self) -> MutexGuard<'_, Seen> {
        self.seen.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, payload: &PaymentPayload, requirements: &PaymentRequirements) {
        let mut seen = self.seen();
        seen.payload = Some(payload.clone());
        seen.requirements = Some(requirements.clone());
    }
}

impl Facilitator for StubFacilitator {
    type Error = StubError;

    async fn verify(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> Result<VerifyResponse, StubError> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        self.record(payload, requirements);
        if let Some(delay) = self.verify_delay {
            tokio::time::sleep(delay).await;
        }
        self.verify.clone()
    }

    async fn settle(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> Result<SettleResponse, StubError> {
        self.settle_calls.fetch_add(1, Ordering::SeqCst);
        self.record(payload, requirements);
        if let Some(delay) = self.settle_delay {
            tokio::time::sleep(delay).await;
        }
        self.settle.clone()
    }
}

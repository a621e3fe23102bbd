//! Core trait defining the verification and settlement interface for x402 facilitators.
//!
//! The payment gate only talks to a facilitator through [`Facilitator`], so the remote
//! HTTP client and in-memory test doubles are interchangeable.

use std::fmt::{Debug, Display};
use std::sync::Arc;

use crate::proto::{PaymentPayload, PaymentRequirements, SettleResponse, VerifyResponse};

/// Failure of a facilitator call, as the payment gate classifies it.
pub trait FacilitatorError: Debug + Display {
    /// The call failed on the seller's side before reaching the facilitator,
    /// e.g. the request could not be signed. Anything else is a transport failure.
    fn is_configuration(&self) -> bool {
        false
    }
}

/// Trait defining the asynchronous interface for x402 payment facilitators.
pub trait Facilitator {
    /// The error type returned by this facilitator.
    type Error: FacilitatorError;

    /// Checks that `payload` is well-formed and funded against `requirements`
    /// without moving funds.
    fn verify(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> impl Future<Output = Result<VerifyResponse, Self::Error>> + Send;

    /// Executes the payment, producing a facilitator-defined receipt.
    ///
    /// Callers must only settle a payload that has passed [`Facilitator::verify`].
    fn settle(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> impl Future<Output = Result<SettleResponse, Self::Error>> + Send;
}

impl<T: Facilitator> Facilitator for Arc<T> {
    type Error = T::Error;

    fn verify(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> impl Future<Output = Result<VerifyResponse, Self::Error>> + Send {
        self.as_ref().verify(payload, requirements)
    }

    fn settle(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> impl Future<Output = Result<SettleResponse, Self::Error>> + Send {
        self.as_ref().settle(payload, requirements)
    }
}

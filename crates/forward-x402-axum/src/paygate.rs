//! The x402 payment gate.
//!
//! A [`Paygate`] decides whether one request has been paid for. It builds the
//! [`PaymentRequirements`] for the requested resource, decodes the `X-PAYMENT` header,
//! asks the facilitator to verify and then settle the payment, and either returns
//! [`Authorized`] or a [`PaymentRejection`] that renders as the right 402 or 500 response.
//!
//! The gate does not run the protected action itself. The caller performs it after an
//! [`Authorized`] outcome and attaches the settlement receipt with [`Authorized::apply`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use axum::{Json, http::{HeaderMap, Uri}, response::{IntoResponse, Response}};
//! use forward_x402_axum::facilitator_client::FacilitatorClient;
//! use forward_x402_axum::paygate::{Paygate, PaygateConfig};
//! use forward_x402_types::util::MoneyAmount;
//! use serde_json::json;
//!
//! async fn paid(headers: HeaderMap, uri: Uri) -> Response {
//!     let facilitator = FacilitatorClient::try_from("https://facilitator.example/").unwrap();
//!     let paygate = Paygate::new(
//!         facilitator,
//!         MoneyAmount::parse("0.01").unwrap(),
//!         "0xd8dA6BF26964aF9D7eEd9e03E53415D37aA96045",
//!         PaygateConfig::default(),
//!     );
//!     match paygate.handle_request(&headers, uri.path()).await {
//!         Ok(authorized) => authorized.apply(Json(json!({"ok": true}))),
//!         Err(rejection) => rejection.into_response(),
//!     }
//! }
//! ```

use axum_core::response::{IntoResponse, Response};
use forward_x402_types::facilitator::{Facilitator, FacilitatorError};
use forward_x402_types::networks::Network;
use forward_x402_types::proto::{
    ErrorResponse, PaymentPayload, PaymentRequired, PaymentRequirements, PriceTag, ResourceInfo,
    SettleResponse, ValidationError, X402Version1,
};
use forward_x402_types::util::{MoneyAmount, encode_json};
use http::header::{ACCEPT, CONTENT_TYPE, USER_AGENT};
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use serde::Serialize;
use std::time::Duration;
use tokio::time::{Instant, timeout_at};

#[cfg(feature = "telemetry")]
use tracing::instrument;

/// Request header carrying the base64 payment proof.
pub const PAYMENT_HEADER: HeaderName = HeaderName::from_static("x-payment");
/// Response header carrying the base64 settlement receipt.
pub const PAYMENT_RESPONSE_HEADER: HeaderName = HeaderName::from_static("x-payment-response");

pub const DEFAULT_PAYWALL_HTML: &str = "<html><body>Payment Required</body></html>";
pub const DEFAULT_MAX_TIMEOUT_SECONDS: u64 = 300;

/// Options of a gate, resolved once per request.
#[derive(Debug, Clone, PartialEq)]
pub struct PaygateConfig {
    /// Human-readable description of the resource.
    pub description: String,
    /// MIME type of the resource.
    pub mime_type: String,
    /// Bound on the whole verify+settle exchange, also advertised to payers.
    pub max_timeout_seconds: u64,
    pub output_schema: Option<serde_json::Value>,
    /// Settle on Base Sepolia with test USDC instead of Base mainnet.
    pub testnet: bool,
    /// HTML served to browsers instead of [`DEFAULT_PAYWALL_HTML`].
    pub custom_paywall_html: Option<String>,
    /// Explicit resource identifier. Wins over `resource_root_url`.
    pub resource: Option<String>,
    /// Prefix joined with the request path when `resource` is unset.
    pub resource_root_url: Option<String>,
}

impl Default for PaygateConfig {
    fn default() -> Self {
        Self {
            description: String::new(),
            mime_type: String::new(),
            max_timeout_seconds: DEFAULT_MAX_TIMEOUT_SECONDS,
            output_schema: None,
            testnet: true,
            custom_paywall_html: None,
            resource: None,
            resource_root_url: None,
        }
    }
}

impl PaygateConfig {
    pub fn network(&self) -> Network {
        Network::from_testnet(self.testnet)
    }

    /// Resource identifier for a request to `request_path`.
    pub fn resource_url(&self, request_path: &str) -> String {
        match (&self.resource, &self.resource_root_url) {
            (Some(resource), _) => resource.clone(),
            (None, Some(root)) => format!("{root}{request_path}"),
            (None, None) => request_path.to_string(),
        }
    }

    pub fn resource_info(&self, request_path: &str) -> ResourceInfo {
        ResourceInfo {
            url: self.resource_url(request_path),
            description: self.description.clone(),
            mime_type: self.mime_type.clone(),
            output_schema: self.output_schema.clone(),
        }
    }

    pub fn paywall_html(&self) -> &str {
        match self.custom_paywall_html.as_deref() {
            Some(html) if !html.is_empty() => html,
            _ => DEFAULT_PAYWALL_HTML,
        }
    }
}

/// Why a request was not authorized.
#[derive(Debug, thiserror::Error)]
pub enum PaygateError {
    /// The seller side is misconfigured, e.g. the payee address is invalid.
    #[error(transparent)]
    Configuration(#[from] ValidationError),
    /// A facilitator call failed on the seller's side, e.g. it could not be signed.
    /// Answers 500 whether it happens during verification or settlement.
    #[error("{0}")]
    FacilitatorConfiguration(String),
    #[error("X-PAYMENT header is required")]
    MissingPayment,
    /// The facilitator could not be reached for verification, or did not answer in time.
    #[error("{0}")]
    VerifyTransport(String),
    /// The facilitator checked the payment and refused it.
    #[error("{0}")]
    InvalidPayment(String),
    /// The facilitator could not be reached for settlement, or did not answer in time.
    #[error("{0}")]
    SettleTransport(String),
    #[error("Settlement header encoding failed: {0}")]
    Encoding(String),
}

/// A failed gate outcome, ready to be sent back to the payer.
#[derive(Debug, Clone)]
pub enum PaymentRejection {
    /// 402 with an HTML paywall, for browsers.
    Paywall(String),
    /// 402 with the payment terms.
    PaymentRequired(PaymentRequired),
    /// 500 raised by the gate or the facilitator exchange.
    Internal(ErrorResponse),
}

impl PaymentRejection {
    pub fn payment_required(error: impl Into<String>, requirements: PaymentRequirements) -> Self {
        PaymentRejection::PaymentRequired(PaymentRequired {
            error: error.into(),
            accepts: vec![requirements],
            x402_version: X402Version1,
        })
    }

    pub fn internal(error: impl Into<String>) -> Self {
        PaymentRejection::Internal(ErrorResponse {
            error: error.into(),
            x402_version: X402Version1,
        })
    }

    pub fn status(&self) -> StatusCode {
        match self {
            PaymentRejection::Paywall(_) | PaymentRejection::PaymentRequired(_) => {
                StatusCode::PAYMENT_REQUIRED
            }
            PaymentRejection::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response {
    match serde_json::to_vec(body) {
        Ok(bytes) => (status, [(CONTENT_TYPE, "application/json")], bytes).into_response(),
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

impl IntoResponse for PaymentRejection {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            PaymentRejection::Paywall(html) => {
                (status, [(CONTENT_TYPE, "text/html; charset=utf-8")], html).into_response()
            }
            PaymentRejection::PaymentRequired(body) => json_response(status, &body),
            PaymentRejection::Internal(body) => json_response(status, &body),
        }
    }
}

/// A verified and settled payment.
#[derive(Debug, Clone)]
pub struct Authorized {
    /// Value for the `X-PAYMENT-RESPONSE` header.
    pub payment_response: HeaderValue,
    pub payer: Option<String>,
    pub settlement: SettleResponse,
}

impl Authorized {
    /// Attaches the settlement receipt header to the response of the paid action.
    pub fn apply<R: IntoResponse>(self, response: R) -> Response {
        let mut response = response.into_response();
        response
            .headers_mut()
            .insert(PAYMENT_RESPONSE_HEADER, self.payment_response);
        response
    }
}

/// Payment gate for a single priced resource.
#[derive(Debug, Clone)]
pub struct Paygate<F> {
    pub facilitator: F,
    pub amount: MoneyAmount,
    pub pay_to: String,
    pub config: PaygateConfig,
}

impl<F> Paygate<F> {
    pub fn new(
        facilitator: F,
        amount: MoneyAmount,
        pay_to: impl Into<String>,
        config: PaygateConfig,
    ) -> Self {
        Self {
            facilitator,
            amount,
            pay_to: pay_to.into(),
            config,
        }
    }

    /// Builds the payment terms for a request to `request_path`.
    pub fn requirements(&self, request_path: &str) -> Result<PaymentRequirements, ValidationError> {
        PriceTag {
            amount: self.amount,
            pay_to: self.pay_to.clone(),
            network: self.config.network(),
            max_timeout_seconds: self.config.max_timeout_seconds,
        }
        .to_requirements(&self.config.resource_info(request_path))
    }

    /// Maps a gate error onto what the payer sees.
    ///
    /// Settlement failures answer 402 while verification failures answer 500.
    pub fn reject(
        &self,
        err: &PaygateError,
        headers: &HeaderMap,
        requirements: PaymentRequirements,
    ) -> PaymentRejection {
        match err {
            PaygateError::MissingPayment if is_browser(headers) => {
                PaymentRejection::Paywall(self.config.paywall_html().to_string())
            }
            PaygateError::MissingPayment
            | PaygateError::InvalidPayment(_)
            | PaygateError::SettleTransport(_) => {
                PaymentRejection::payment_required(err.to_string(), requirements)
            }
            PaygateError::Configuration(_)
            | PaygateError::FacilitatorConfiguration(_)
            | PaygateError::VerifyTransport(_)
            | PaygateError::Encoding(_) => PaymentRejection::internal(err.to_string()),
        }
    }
}

impl<F> Paygate<F>
where
    F: Facilitator + Sync,
{
    /// Runs the gate for one request.
    ///
    /// Every failure is turned into a [`PaymentRejection`]; nothing escapes as an error.
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "x402.handle_request", skip_all, fields(path = %request_path))
    )]
    pub async fn handle_request(
        &self,
        headers: &HeaderMap,
        request_path: &str,
    ) -> Result<Authorized, PaymentRejection> {
        #[cfg(feature = "telemetry")]
        tracing::info!(path = request_path, "payment gate checking request");

        let requirements = match self.requirements(request_path) {
            Ok(requirements) => requirements,
            Err(err) => {
                #[cfg(feature = "telemetry")]
                tracing::error!(error = %err, "payment requirements rejected");
                return Err(PaymentRejection::internal(
                    PaygateError::from(err).to_string(),
                ));
            }
        };

        self.handle_request_fallible(headers, &requirements)
            .await
            .map_err(|err| self.reject(&err, headers, requirements))
    }

    /// Runs the gate against prepared `requirements`, returning the raw [`PaygateError`].
    pub async fn handle_request_fallible(
        &self,
        headers: &HeaderMap,
        requirements: &PaymentRequirements,
    ) -> Result<Authorized, PaygateError> {
        let payload = extract_payment_payload(headers).ok_or(PaygateError::MissingPayment)?;

        let deadline = Instant::now()
            .checked_add(Duration::from_secs(self.config.max_timeout_seconds));

        let verify_response = before(deadline, self.facilitator.verify(&payload, requirements))
            .await
            .ok_or_else(|| {
                PaygateError::VerifyTransport(format!(
                    "Facilitator verification timed out after {}s",
                    self.config.max_timeout_seconds
                ))
            })
            .and_then(|result| result.map_err(|e| classify(e, PaygateError::VerifyTransport)));
        let verify_response = match verify_response {
            Ok(response) => response,
            Err(err) => {
                #[cfg(feature = "telemetry")]
                tracing::error!(error = %err, "failed to verify");
                return Err(err);
            }
        };

        if !verify_response.is_valid {
            let reason = verify_response
                .invalid_reason
                .unwrap_or_else(|| "Invalid payment".to_string());
            #[cfg(feature = "telemetry")]
            tracing::warn!(invalid_reason = %reason, "invalid payment");
            return Err(PaygateError::InvalidPayment(reason));
        }

        #[cfg(feature = "telemetry")]
        tracing::info!(payer = ?verify_response.payer, "payment verified");

        let settlement = before(deadline, self.facilitator.settle(&payload, requirements))
            .await
            .ok_or_else(|| {
                PaygateError::SettleTransport(format!(
                    "Facilitator settlement timed out after {}s",
                    self.config.max_timeout_seconds
                ))
            })
            .and_then(|result| result.map_err(|e| classify(e, PaygateError::SettleTransport)));
        let settlement = match settlement {
            Ok(settlement) => settlement,
            Err(err) => {
                #[cfg(feature = "telemetry")]
                tracing::error!(error = %err, "settlement failed");
                return Err(err);
            }
        };

        let payment_response = match settlement_to_header(&settlement) {
            Ok(header) => header,
            Err(err) => {
                #[cfg(feature = "telemetry")]
                tracing::error!(error = %err, "settlement header encoding failed");
                return Err(err);
            }
        };

        Ok(Authorized {
            payment_response,
            payer: verify_response.payer,
            settlement,
        })
    }
}

/// Separates seller-side facilitator failures from transport ones.
fn classify<E: FacilitatorError>(err: E, transport: fn(String) -> PaygateError) -> PaygateError {
    if err.is_configuration() {
        PaygateError::FacilitatorConfiguration(err.to_string())
    } else {
        transport(err.to_string())
    }
}

/// Awaits `fut` unless `deadline` passes first. `None` means no deadline.
async fn before<T>(deadline: Option<Instant>, fut: impl Future<Output = T>) -> Option<T> {
    match deadline {
        Some(deadline) => timeout_at(deadline, fut).await.ok(),
        None => Some(fut.await),
    }
}

/// `Accept` mentions `text/html` and the `User-Agent` looks like a browser.
pub fn is_browser(headers: &HeaderMap) -> bool {
    let header_contains = |name: HeaderName, needle: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.contains(needle))
    };
    header_contains(ACCEPT, "text/html") && header_contains(USER_AGENT, "Mozilla")
}

/// Decodes the `X-PAYMENT` header. Absent and malformed headers both yield `None`.
fn extract_payment_payload(headers: &HeaderMap) -> Option<PaymentPayload> {
    let header = headers.get(PAYMENT_HEADER)?;
    match PaymentPayload::decode(header.as_bytes()) {
        Ok(payload) => Some(payload),
        Err(_err) => {
            #[cfg(feature = "telemetry")]
            tracing::debug!(error = %_err, "malformed payment header");
            None
        }
    }
}

fn settlement_to_header(settlement: &SettleResponse) -> Result<HeaderValue, PaygateError> {
    let encoded = encode_json(&settlement.0).map_err(|e| PaygateError::Encoding(e.to_string()))?;
    HeaderValue::from_str(&encoded).map_err(|e| PaygateError::Encoding(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stub::StubFacilitator;
    use forward_x402_types::proto::VerifyResponse;
    use serde_json::{Value, json};
    use std::sync::Arc;

    const PAYEE: &str = "0xd8dA6BF26964aF9D7eEd9e03E53415D37aA96045";
    const PATH: &str = "/forward/abc123";

    fn paygate(facilitator: StubFacilitator) -> Paygate<Arc<StubFacilitator>> {
        Paygate::new(
            Arc::new(facilitator),
            MoneyAmount::parse("0.01").unwrap(),
            PAYEE,
            PaygateConfig {
                description: "Send email to Alice".to_string(),
                mime_type: "application/json".to_string(),
                resource: Some(PATH.to_string()),
                ..Default::default()
            },
        )
    }

    fn paid_headers() -> HeaderMap {
        let header = encode_json(&json!({
            "scheme": "exact",
            "network": "base-sepolia",
            "payload": {"signature": "0xdead"}
        }))
        .unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(PAYMENT_HEADER, header.parse().unwrap());
        headers
    }

    fn json_client_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, "application/json".parse().unwrap());
        headers
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_missing_payment_returns_terms() {
        let gate = paygate(StubFacilitator::approving());
        let rejection = gate
            .handle_request(&json_client_headers(), PATH)
            .await
            .unwrap_err();
        let response = rejection.into_response();
        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
        let body = body_json(response).await;
        assert_eq!(body["error"], "X-PAYMENT header is required");
        assert_eq!(body["x402Version"], 1);
        let accepts = body["accepts"].as_array().unwrap();
        assert_eq!(accepts.len(), 1);
        assert_eq!(accepts[0]["resource"], PATH);
        assert_eq!(accepts[0]["maxAmountRequired"], "10000");
        assert_eq!(accepts[0]["network"], "base-sepolia");
        assert_eq!(gate.facilitator.verify_calls(), 0);
    }

    #[tokio::test]
    async fn test_browser_gets_paywall() {
        let mut gate = paygate(StubFacilitator::approving());
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, "text/html,application/xhtml+xml".parse().unwrap());
        headers.insert(
            USER_AGENT,
            "Mozilla/5.0 (X11; Linux x86_64)".parse().unwrap(),
        );

        let response = gate
            .handle_request(&headers, PATH)
            .await
            .unwrap_err()
            .into_response();
        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
        assert!(
            response.headers()[CONTENT_TYPE]
                .to_str()
                .unwrap()
                .starts_with("text/html")
        );
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&bytes[..], DEFAULT_PAYWALL_HTML.as_bytes());

        gate.config.custom_paywall_html = Some("<p>pay me</p>".to_string());
        match gate.handle_request(&headers, PATH).await.unwrap_err() {
            PaymentRejection::Paywall(html) => assert_eq!(html, "<p>pay me</p>"),
            other => panic!("expected paywall, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_html_without_mozilla_is_not_a_browser() {
        let gate = paygate(StubFacilitator::approving());
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, "text/html".parse().unwrap());
        headers.insert(USER_AGENT, "curl/8.5.0".parse().unwrap());
        let rejection = gate.handle_request(&headers, PATH).await.unwrap_err();
        assert!(matches!(rejection, PaymentRejection::PaymentRequired(_)));
    }

    #[tokio::test]
    async fn test_malformed_payment_is_treated_as_missing() {
        let gate = paygate(StubFacilitator::approving());
        let mut headers = json_client_headers();
        headers.insert(PAYMENT_HEADER, "%%%not-base64%%%".parse().unwrap());
        let rejection = gate.handle_request(&headers, PATH).await.unwrap_err();
        assert_eq!(rejection.status(), StatusCode::PAYMENT_REQUIRED);
        match rejection {
            PaymentRejection::PaymentRequired(body) => {
                assert_eq!(body.error, "X-PAYMENT header is required");
            }
            other => panic!("expected payment required, got {other:?}"),
        }
        assert_eq!(gate.facilitator.verify_calls(), 0);
    }

    #[tokio::test]
    async fn test_invalid_payment_carries_reason() {
        let gate = paygate(StubFacilitator::rejecting("insufficient funds"));
        let response = gate
            .handle_request(&paid_headers(), PATH)
            .await
            .unwrap_err()
            .into_response();
        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
        let body = body_json(response).await;
        assert_eq!(body["error"], "insufficient funds");
        assert_eq!(body["accepts"].as_array().unwrap().len(), 1);
        assert_eq!(gate.facilitator.settle_calls(), 0);
    }

    #[tokio::test]
    async fn test_invalid_payment_without_reason() {
        let gate = paygate(StubFacilitator::approving().with_verify_response(VerifyResponse {
            is_valid: false,
            ..Default::default()
        }));
        let err = gate
            .handle_request_fallible(&paid_headers(), &gate.requirements(PATH).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, PaygateError::InvalidPayment(reason) if reason == "Invalid payment"));
    }

    #[tokio::test]
    async fn test_settled_payment_is_authorized() {
        let gate = paygate(
            StubFacilitator::approving().with_settle_response(json!({"txHash": "abc"})),
        );
        let authorized = gate.handle_request(&paid_headers(), PATH).await.unwrap();
        assert_eq!(authorized.payment_response, "eyJ0eEhhc2giOiJhYmMifQ==");

        let response = authorized.apply((StatusCode::OK, "sent"));
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[PAYMENT_RESPONSE_HEADER],
            "eyJ0eEhhc2giOiJhYmMifQ=="
        );
        assert_eq!(gate.facilitator.verify_calls(), 1);
        assert_eq!(gate.facilitator.settle_calls(), 1);
    }

    #[tokio::test]
    async fn test_facilitator_sees_versioned_payload_and_requirements() {
        let gate = paygate(StubFacilitator::approving());
        gate.handle_request(&paid_headers(), PATH).await.unwrap();
        let payload = gate.facilitator.last_payload().unwrap();
        assert_eq!(payload.get("x402Version"), Some(&json!(1)));
        let requirements = gate.facilitator.last_requirements().unwrap();
        assert_eq!(requirements, gate.requirements(PATH).unwrap());
        assert_eq!(requirements.description, "Send email to Alice");
    }

    #[tokio::test]
    async fn test_verify_transport_error_is_internal() {
        let gate = paygate(StubFacilitator::approving().with_verify_error("connection refused"));
        let response = gate
            .handle_request(&paid_headers(), PATH)
            .await
            .unwrap_err()
            .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["error"], "connection refused");
        assert_eq!(body["x402Version"], 1);
        assert!(body.get("accepts").is_none());
        assert_eq!(gate.facilitator.settle_calls(), 0);
    }

    #[tokio::test]
    async fn test_settle_transport_error_is_payment_required() {
        let gate = paygate(StubFacilitator::approving().with_settle_error("gateway timeout"));
        let response = gate
            .handle_request(&paid_headers(), PATH)
            .await
            .unwrap_err()
            .into_response();
        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
        let body = body_json(response).await;
        assert_eq!(body["error"], "gateway timeout");
        assert_eq!(body["accepts"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_settle_signing_failure_is_internal() {
        let gate = paygate(
            StubFacilitator::approving().with_settle_configuration_error("missing credentials"),
        );
        let err = gate
            .handle_request_fallible(&paid_headers(), &gate.requirements(PATH).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, PaygateError::FacilitatorConfiguration(_)));

        let response = gate
            .handle_request(&paid_headers(), PATH)
            .await
            .unwrap_err()
            .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["error"], "missing credentials");
        assert!(body.get("accepts").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_verify_deadline() {
        let mut gate = paygate(
            StubFacilitator::approving().with_verify_delay(Duration::from_secs(5)),
        );
        gate.config.max_timeout_seconds = 1;
        let rejection = gate.handle_request(&paid_headers(), PATH).await.unwrap_err();
        assert_eq!(rejection.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(gate.facilitator.settle_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_spans_verify_and_settle() {
        let mut gate = paygate(
            StubFacilitator::approving()
                .with_verify_delay(Duration::from_millis(600))
                .with_settle_delay(Duration::from_millis(600)),
        );
        gate.config.max_timeout_seconds = 1;
        let err = gate
            .handle_request_fallible(&paid_headers(), &gate.requirements(PATH).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, PaygateError::SettleTransport(_)));
        assert_eq!(gate.facilitator.settle_calls(), 1);
    }

    #[tokio::test]
    async fn test_invalid_payee_is_internal() {
        let mut gate = paygate(StubFacilitator::approving());
        gate.pay_to = String::new();
        let rejection = gate.handle_request(&paid_headers(), PATH).await.unwrap_err();
        assert_eq!(rejection.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(gate.facilitator.verify_calls(), 0);
    }

    #[test]
    fn test_resource_resolution() {
        let mut config = PaygateConfig::default();
        assert_eq!(config.resource_url("/forward/x"), "/forward/x");
        config.resource_root_url = Some("https://forward.example".to_string());
        assert_eq!(
            config.resource_url("/forward/x"),
            "https://forward.example/forward/x"
        );
        config.resource = Some("/fixed".to_string());
        assert_eq!(config.resource_url("/forward/x"), "/fixed");
    }

    #[test]
    fn test_mainnet_requirements() {
        let mut gate = paygate(StubFacilitator::approving());
        gate.config.testnet = false;
        let requirements = gate.requirements(PATH).unwrap();
        assert_eq!(requirements.network, Network::Base);
        assert_eq!(requirements.max_timeout_seconds, DEFAULT_MAX_TIMEOUT_SECONDS);
    }

    #[test]
    fn test_encoding_failure_is_internal() {
        let gate = paygate(StubFacilitator::approving());
        let rejection = gate.reject(
            &PaygateError::Encoding("boom".to_string()),
            &HeaderMap::new(),
            gate.requirements(PATH).unwrap(),
        );
        assert_eq!(rejection.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}

//! A [`Facilitator`] implementation that talks to a _remote_ x402 facilitator over HTTP.
//!
//! [`FacilitatorClient`] handles the `/verify` and `/settle` endpoints of a remote facilitator.
//! When credentials are configured through [`FacilitatorClient::with_auth`], every call carries
//! freshly signed headers scoped to that call.
//!
//! ## Example
//!
//! ```rust
//! use forward_x402_axum::facilitator_client::FacilitatorClient;
//!
//! let facilitator = FacilitatorClient::try_from("https://api.cdp.coinbase.com/platform/v2/x402").unwrap();
//! assert_eq!(
//!     facilitator.verify_url().as_str(),
//!     "https://api.cdp.coinbase.com/platform/v2/x402/verify"
//! );
//! ```
//!
//! ## Error Handling
//!
//! [`FacilitatorClientError`] captures where a call failed:
//! - URL construction
//! - Header signing
//! - HTTP transport failures
//! - JSON deserialization errors
//! - Non-success HTTP status responses

use forward_x402_types::facilitator::{Facilitator, FacilitatorError};
use forward_x402_types::proto::{
    PaymentPayload, PaymentRequirements, SettleRequest, SettleResponse, VerifyRequest,
    VerifyResponse,
};
use http::{HeaderMap, StatusCode};
use reqwest::Client;
use std::fmt::{self, Display};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::auth::{ConfigurationError, FacilitatorAction, FacilitatorAuth};

#[cfg(feature = "telemetry")]
use tracing::{Instrument, Span};

/// Default location of the hosted Coinbase CDP facilitator.
pub const DEFAULT_FACILITATOR_URL: &str = "https://api.cdp.coinbase.com/platform/v2/x402";

/// A client for communicating with a remote x402 facilitator.
#[derive(Clone)]
pub struct FacilitatorClient {
    /// Base URL of the facilitator, always with a trailing slash
    base_url: Url,
    /// Full URL to `POST /verify` requests
    verify_url: Url,
    /// Full URL to `POST /settle` requests
    settle_url: Url,
    client: Client,
    /// Static headers sent with each request
    headers: HeaderMap,
    /// Per-call signed headers
    auth: Option<Arc<dyn FacilitatorAuth>>,
    timeout: Option<Duration>,
}

impl fmt::Debug for FacilitatorClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FacilitatorClient")
            .field("base_url", &self.base_url)
            .field("headers", &self.headers)
            .field("auth", &self.auth.is_some())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Facilitator for FacilitatorClient {
    type Error = FacilitatorClientError;

    #[cfg(feature = "telemetry")]
    async fn verify(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> Result<VerifyResponse, FacilitatorClientError> {
        with_span(
            FacilitatorClient::verify(self, &VerifyRequest::new(payload, requirements)),
            tracing::info_span!(
                "x402.facilitator_client.verify",
                timeout = ?self.timeout,
                otel.status_code = tracing::field::Empty,
                error.message = tracing::field::Empty,
            ),
        )
        .await
    }

    #[cfg(not(feature = "telemetry"))]
    async fn verify(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> Result<VerifyResponse, FacilitatorClientError> {
        FacilitatorClient::verify(self, &VerifyRequest::new(payload, requirements)).await
    }

    #[cfg(feature = "telemetry")]
    async fn settle(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> Result<SettleResponse, FacilitatorClientError> {
        with_span(
            FacilitatorClient::settle(self, &SettleRequest::new(payload, requirements)),
            tracing::info_span!(
                "x402.facilitator_client.settle",
                timeout = ?self.timeout,
                otel.status_code = tracing::field::Empty,
                error.message = tracing::field::Empty,
            ),
        )
        .await
    }

    #[cfg(not(feature = "telemetry"))]
    async fn settle(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> Result<SettleResponse, FacilitatorClientError> {
        FacilitatorClient::settle(self, &SettleRequest::new(payload, requirements)).await
    }
}

/// Errors that can occur while interacting with a remote facilitator.
#[derive(Debug, thiserror::Error)]
pub enum FacilitatorClientError {
    #[error("URL parse error: {context}: {source}")]
    UrlParse {
        context: &'static str,
        #[source]
        source: url::ParseError,
    },
    #[error("Failed to sign request: {context}: {source}")]
    Auth {
        context: &'static str,
        #[source]
        source: ConfigurationError,
    },
    #[error("HTTP error: {context}: {source}")]
    Http {
        context: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("Failed to deserialize JSON: {context}: {source}")]
    JsonDeserialization {
        context: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("Unexpected HTTP status {status}: {context}: {body}")]
    HttpStatus {
        context: &'static str,
        status: StatusCode,
        body: String,
    },
    #[error("Failed to read response body as text: {context}: {source}")]
    ResponseBodyRead {
        context: &'static str,
        #[source]
        source: reqwest::Error,
    },
}

/// Signing failures are seller configuration; the rest happen on the wire.
impl FacilitatorError for FacilitatorClientError {
    fn is_configuration(&self) -> bool {
        matches!(self, FacilitatorClientError::Auth { .. })
    }
}

impl FacilitatorClient {
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Returns the computed `./verify` URL relative to [`FacilitatorClient::base_url`].
    pub fn verify_url(&self) -> &Url {
        &self.verify_url
    }

    /// Returns the computed `./settle` URL relative to [`FacilitatorClient::base_url`].
    pub fn settle_url(&self) -> &Url {
        &self.settle_url
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn timeout(&self) -> &Option<Duration> {
        &self.timeout
    }

    /// Constructs a new [`FacilitatorClient`] from a base URL.
    ///
    /// `./verify` and `./settle` are resolved relative to the base, so the base should end
    /// with a slash. [`TryFrom<&str>`] normalizes this.
    pub fn try_new(base_url: Url) -> Result<Self, FacilitatorClientError> {
        let verify_url =
            base_url
                .join("./verify")
                .map_err(|e| FacilitatorClientError::UrlParse {
                    context: "Failed to construct ./verify URL",
                    source: e,
                })?;
        let settle_url =
            base_url
                .join("./settle")
                .map_err(|e| FacilitatorClientError::UrlParse {
                    context: "Failed to construct ./settle URL",
                    source: e,
                })?;
        Ok(Self {
            client: Client::new(),
            base_url,
            verify_url,
            settle_url,
            headers: HeaderMap::new(),
            auth: None,
            timeout: None,
        })
    }

    /// Attaches static headers to all future requests.
    pub fn with_headers(&self, headers: HeaderMap) -> Self {
        let mut this = self.clone();
        this.headers = headers;
        this
    }

    /// Signs every future request with `auth`.
    pub fn with_auth(&self, auth: impl FacilitatorAuth + 'static) -> Self {
        let mut this = self.clone();
        this.auth = Some(Arc::new(auth));
        this
    }

    /// Sets a timeout for each individual request.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let mut this = self.clone();
        this.timeout = Some(timeout);
        this
    }

    /// Sends a `POST /verify` request to the facilitator.
    pub async fn verify(
        &self,
        request: &VerifyRequest<'_>,
    ) -> Result<VerifyResponse, FacilitatorClientError> {
        self.post_json(
            &self.verify_url,
            FacilitatorAction::Verify,
            "POST /verify",
            request,
        )
        .await
    }

    /// Sends a `POST /settle` request to the facilitator.
    pub async fn settle(
        &self,
        request: &SettleRequest<'_>,
    ) -> Result<SettleResponse, FacilitatorClientError> {
        self.post_json(
            &self.settle_url,
            FacilitatorAction::Settle,
            "POST /settle",
            request,
        )
        .await
    }

    /// Generic POST helper that handles JSON serialization, signing, error mapping,
    /// timeout application, and telemetry integration.
    ///
    /// `context` is a human-readable identifier used in tracing and error messages (e.g. `"POST /verify"`).
    async fn post_json<T, R>(
        &self,
        url: &Url,
        action: FacilitatorAction,
        context: &'static str,
        payload: &T,
    ) -> Result<R, FacilitatorClientError>
    where
        T: serde::Serialize + ?Sized,
        R: serde::de::DeserializeOwned,
    {
        let mut req = self.client.post(url.clone()).json(payload);
        for (key, value) in self.headers.iter() {
            req = req.header(key, value);
        }
        if let Some(auth) = &self.auth {
            let signed = auth
                .headers(action)
                .map_err(|e| FacilitatorClientError::Auth { context, source: e })?;
            for (key, value) in signed.iter() {
                req = req.header(key, value);
            }
        }
        if let Some(timeout) = self.timeout {
            req = req.timeout(timeout);
        }
        let http_response = req
            .send()
            .await
            .map_err(|e| FacilitatorClientError::Http { context, source: e })?;

        let result = if http_response.status().is_success() {
            http_response
                .json::<R>()
                .await
                .map_err(|e| FacilitatorClientError::JsonDeserialization { context, source: e })
        } else {
            let status = http_response.status();
            let body = http_response
                .text()
                .await
                .map_err(|e| FacilitatorClientError::ResponseBodyRead { context, source: e })?;
            Err(FacilitatorClientError::HttpStatus {
                context,
                status,
                body,
            })
        };

        record_result_on_span(&result);

        result
    }
}

/// Converts a string URL into a `FacilitatorClient`, parsing the URL and calling `try_new`.
impl TryFrom<&str> for FacilitatorClient {
    type Error = FacilitatorClientError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let mut normalized = value.trim_end_matches('/').to_string();
        normalized.push('/');
        let url = Url::parse(&normalized).map_err(|e| FacilitatorClientError::UrlParse {
            context: "Failed to parse base url",
            source: e,
        })?;
        FacilitatorClient::try_new(url)
    }
}

impl TryFrom<String> for FacilitatorClient {
    type Error = FacilitatorClientError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        FacilitatorClient::try_from(value.as_str())
    }
}

/// Records the outcome of a request on a tracing span, including status and errors.
#[cfg(feature = "telemetry")]
fn record_result_on_span<R, E: Display>(result: &Result<R, E>) {
    let span = Span::current();
    match result {
        Ok(_) => {
            span.record("otel.status_code", "OK");
        }
        Err(err) => {
            span.record("otel.status_code", "ERROR");
            span.record("error.message", tracing::field::display(err));
            tracing::event!(tracing::Level::ERROR, error = %err, "Request to facilitator failed");
        }
    }
}

/// Noop if telemetry feature is off.
#[cfg(not(feature = "telemetry"))]
fn record_result_on_span<R, E: Display>(_result: &Result<R, E>) {}

#[cfg(feature = "telemetry")]
fn with_span<F: Future>(fut: F, span: Span) -> impl Future<Output = F::Output> {
    fut.instrument(span)
}

#[cfg(test)]
mod tests {
    use super::*;
    use forward_x402_types::networks::Network;
    use forward_x402_types::proto::{PriceTag, ResourceInfo};
    use forward_x402_types::util::MoneyAmount;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct StaticAuth;

    impl FacilitatorAuth for StaticAuth {
        fn headers(&self, action: FacilitatorAction) -> Result<HeaderMap, ConfigurationError> {
            let mut headers = HeaderMap::new();
            headers.insert(
                http::header::AUTHORIZATION,
                format!("Bearer {action}").parse()?,
            );
            Ok(headers)
        }
    }

    struct BrokenAuth;

    impl FacilitatorAuth for BrokenAuth {
        fn headers(&self, _action: FacilitatorAction) -> Result<HeaderMap, ConfigurationError> {
            Err(ConfigurationError::MissingCredentials)
        }
    }

    fn fixtures() -> (PaymentPayload, PaymentRequirements) {
        let mut map = serde_json::Map::new();
        map.insert("scheme".to_string(), json!("exact"));
        let requirements = PriceTag {
            amount: MoneyAmount::parse("0.01").unwrap(),
            pay_to: "0xd8dA6BF26964aF9D7eEd9e03E53415D37aA96045".to_string(),
            network: Network::BaseSepolia,
            max_timeout_seconds: 300,
        }
        .to_requirements(&ResourceInfo {
            url: "/forward/abc".to_string(),
            ..Default::default()
        })
        .unwrap();
        (PaymentPayload::from(map), requirements)
    }

    #[test]
    fn test_base_url_is_normalized() {
        let client = FacilitatorClient::try_from("https://facilitator.example/x402///").unwrap();
        assert_eq!(client.base_url().as_str(), "https://facilitator.example/x402/");
        assert_eq!(
            client.settle_url().as_str(),
            "https://facilitator.example/x402/settle"
        );
        assert!(FacilitatorClient::try_from("not a url").is_err());
    }

    #[tokio::test]
    async fn test_verify_posts_versioned_body() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/verify"))
            .and(body_partial_json(json!({
                "x402Version": 1,
                "paymentPayload": {"x402Version": 1, "scheme": "exact"},
                "paymentRequirements": {"maxAmountRequired": "10000", "network": "base-sepolia"}
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"isValid": true, "payer": "0xabc"})),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = FacilitatorClient::try_from(mock_server.uri()).unwrap();
        let (payload, requirements) = fixtures();
        let response = Facilitator::verify(&client, &payload, &requirements)
            .await
            .unwrap();
        assert_eq!(response, VerifyResponse::valid("0xabc"));
    }

    #[tokio::test]
    async fn test_settle_returns_opaque_receipt() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/settle"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"success": true, "transaction": "0xfeed"})),
            )
            .mount(&mock_server)
            .await;

        let client = FacilitatorClient::try_from(mock_server.uri()).unwrap();
        let (payload, requirements) = fixtures();
        let receipt = Facilitator::settle(&client, &payload, &requirements)
            .await
            .unwrap();
        assert_eq!(receipt.0["transaction"], "0xfeed");
    }

    #[tokio::test]
    async fn test_signed_headers_are_scoped_per_action() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/verify"))
            .and(header("authorization", "Bearer verify"))
            .and(header("x-static", "yes"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"isValid": true})))
            .expect(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("POST"))
            .and(path("/settle"))
            .and(header("authorization", "Bearer settle"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&mock_server)
            .await;

        let mut static_headers = HeaderMap::new();
        static_headers.insert("x-static", "yes".parse().unwrap());
        let client = FacilitatorClient::try_from(mock_server.uri())
            .unwrap()
            .with_headers(static_headers)
            .with_auth(StaticAuth);
        let (payload, requirements) = fixtures();
        Facilitator::verify(&client, &payload, &requirements)
            .await
            .unwrap();
        Facilitator::settle(&client, &payload, &requirements)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_cdp_auth_sends_bearer_and_correlation() {
        use base64::Engine;
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/verify"))
            .and(header_exists("authorization"))
            .and(header_exists("correlation-context"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"isValid": true})))
            .expect(1)
            .mount(&mock_server)
            .await;

        let secret = base64::engine::general_purpose::STANDARD.encode([3u8; 32]);
        let client = FacilitatorClient::try_from(mock_server.uri()).unwrap();
        let auth = crate::auth::CdpAuth::try_new("key", secret)
            .unwrap()
            .with_base_url(client.base_url());
        let client = client.with_auth(auth);
        let (payload, requirements) = fixtures();
        Facilitator::verify(&client, &payload, &requirements)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_non_success_status_is_an_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/verify"))
            .respond_with(ResponseTemplate::new(401).set_body_string("unauthorized"))
            .mount(&mock_server)
            .await;

        let client = FacilitatorClient::try_from(mock_server.uri()).unwrap();
        let (payload, requirements) = fixtures();
        let err = Facilitator::verify(&client, &payload, &requirements)
            .await
            .unwrap_err();
        match err {
            FacilitatorClientError::HttpStatus { status, body, .. } => {
                assert_eq!(status, StatusCode::UNAUTHORIZED);
                assert_eq!(body, "unauthorized");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_unparseable_body_is_an_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/verify"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&mock_server)
            .await;

        let client = FacilitatorClient::try_from(mock_server.uri()).unwrap();
        let (payload, requirements) = fixtures();
        let err = Facilitator::verify(&client, &payload, &requirements)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            FacilitatorClientError::JsonDeserialization { .. }
        ));
    }

    #[tokio::test]
    async fn test_signing_failure_skips_the_request() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&mock_server)
            .await;

        let client = FacilitatorClient::try_from(mock_server.uri())
            .unwrap()
            .with_auth(BrokenAuth);
        let (payload, requirements) = fixtures();
        let err = Facilitator::settle(&client, &payload, &requirements)
            .await
            .unwrap_err();
        assert!(matches!(err, FacilitatorClientError::Auth { .. }));
        assert!(err.is_configuration());
    }
}

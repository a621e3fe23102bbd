//! Signed authorization headers for calls to the facilitator.
//!
//! Hosted facilitators (Coinbase CDP) require every `/verify` and `/settle` call to carry a
//! short-lived bearer JWT scoped to that exact method, host and path. [`FacilitatorAuth`] is
//! the strategy the [`FacilitatorClient`](crate::facilitator_client::FacilitatorClient) asks
//! for headers before each call; [`CdpAuth`] is the CDP implementation.
//!
//! ## Example
//!
//! ```rust,no_run
//! use forward_x402_axum::auth::{CdpAuth, FacilitatorAction, FacilitatorAuth};
//!
//! let auth = CdpAuth::try_new("organizations/org/apiKeys/key", "<base64 ed25519 key>").unwrap();
//! let headers = auth.headers(FacilitatorAction::Verify).unwrap();
//! assert!(headers.contains_key("authorization"));
//! ```

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use ed25519_dalek::{Signer, SigningKey};
use http::{HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use url::Url;

/// Host of the Coinbase CDP facilitator.
pub const CDP_FACILITATOR_HOST: &str = "api.cdp.coinbase.com";
/// Route prefix of the x402 API on the CDP facilitator.
pub const CDP_FACILITATOR_ROUTE: &str = "/platform/v2/x402";
/// Lifetime of a signed token, in seconds.
pub const JWT_EXPIRES_IN_SECONDS: u64 = 120;

pub const CORRELATION_CONTEXT: HeaderName = HeaderName::from_static("correlation-context");

/// The facilitator operation a header set is scoped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FacilitatorAction {
    Verify,
    Settle,
}

impl FacilitatorAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            FacilitatorAction::Verify => "verify",
            FacilitatorAction::Settle => "settle",
        }
    }
}

impl fmt::Display for FacilitatorAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Facilitator credentials are absent or unusable.
#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    #[error("Missing credentials: CDP key name and CDP private key must be set")]
    MissingCredentials,
    #[error("Invalid CDP private key: {0}")]
    InvalidKey(String),
    #[error("Invalid header value: {0}")]
    InvalidHeader(#[from] http::header::InvalidHeaderValue),
    #[error("Failed to encode token: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Signs `verify` and `settle` requests sent to a facilitator.
///
/// Implementations must produce fresh headers on every call; the facilitator treats
/// each action as an independently authorized sub-resource.
pub trait FacilitatorAuth: Send + Sync {
    fn headers(&self, action: FacilitatorAction) -> Result<HeaderMap, ConfigurationError>;
}

/// Inputs of a single signed token.
#[derive(Debug, Clone, Copy)]
pub struct JwtOptions<'a> {
    pub key_id: &'a str,
    pub key_secret: &'a str,
    pub request_method: &'a str,
    pub request_host: &'a str,
    pub request_path: &'a str,
}

#[derive(Serialize)]
struct JwtHeader<'a> {
    alg: &'static str,
    kid: &'a str,
    typ: &'static str,
    nonce: String,
}

#[derive(Serialize)]
struct JwtClaims<'a> {
    sub: &'a str,
    iss: &'static str,
    nbf: u64,
    exp: u64,
    uri: String,
}

/// Parses a base64 Ed25519 key: either a 32-byte seed or a 64-byte seed+public keypair.
fn signing_key(key_secret: &str) -> Result<SigningKey, ConfigurationError> {
    let bytes = STANDARD
        .decode(key_secret.trim())
        .map_err(|e| ConfigurationError::InvalidKey(e.to_string()))?;
    match bytes.len() {
        32 => {
            let seed: [u8; 32] = bytes
                .as_slice()
                .try_into()
                .map_err(|_| ConfigurationError::InvalidKey("bad seed length".to_string()))?;
            Ok(SigningKey::from_bytes(&seed))
        }
        64 => {
            let keypair: [u8; 64] = bytes
                .as_slice()
                .try_into()
                .map_err(|_| ConfigurationError::InvalidKey("bad keypair length".to_string()))?;
            SigningKey::from_keypair_bytes(&keypair)
                .map_err(|e| ConfigurationError::InvalidKey(e.to_string()))
        }
        n => Err(ConfigurationError::InvalidKey(format!(
            "expected 32 or 64 key bytes, got {n}"
        ))),
    }
}

fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// Generates an EdDSA-signed JWT for one facilitator request.
///
/// Every call yields a new token with its own nonce and validity window.
pub fn generate_jwt(options: &JwtOptions<'_>) -> Result<String, ConfigurationError> {
    if options.key_id.is_empty() || options.key_secret.is_empty() {
        return Err(ConfigurationError::MissingCredentials);
    }
    let key = signing_key(options.key_secret)?;

    let header = JwtHeader {
        alg: "EdDSA",
        kid: options.key_id,
        typ: "JWT",
        nonce: hex::encode(rand::random::<[u8; 16]>()),
    };
    let nbf = now_unix();
    let claims = JwtClaims {
        sub: options.key_id,
        iss: "cdp",
        nbf,
        exp: nbf + JWT_EXPIRES_IN_SECONDS,
        uri: format!(
            "{} {}{}",
            options.request_method, options.request_host, options.request_path
        ),
    };

    let signing_input = format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header)?),
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims)?)
    );
    let signature = key.sign(signing_input.as_bytes());
    Ok(format!(
        "{signing_input}.{}",
        URL_SAFE_NO_PAD.encode(signature.to_bytes())
    ))
}

/// Builds an `Authorization` header value (`Bearer <jwt>`).
pub fn create_auth_header(
    key_id: &str,
    key_secret: &str,
    request_method: &str,
    request_host: &str,
    request_path: &str,
) -> Result<String, ConfigurationError> {
    let jwt = generate_jwt(&JwtOptions {
        key_id,
        key_secret,
        request_method,
        request_host,
        request_path,
    })?;
    Ok(format!("Bearer {jwt}"))
}

/// Static SDK/source identification sent as `Correlation-Context`.
pub fn create_correlation_header() -> String {
    let data = [
        ("sdk_version", "0.0.0"),
        ("sdk_language", "rust"),
        ("source", env!("CARGO_PKG_NAME")),
        ("source_version", env!("CARGO_PKG_VERSION")),
    ];
    data.iter()
        .map(|(k, v)| {
            let encoded: String = url::form_urlencoded::byte_serialize(v.as_bytes()).collect();
            format!("{k}={encoded}")
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Coinbase CDP credentials bound to one facilitator host and route.
#[derive(Clone)]
pub struct CdpAuth {
    key_id: String,
    key_secret: String,
    host: String,
    route: String,
}

impl CdpAuth {
    /// Credentials for the default CDP facilitator.
    ///
    /// Fails immediately when either value is empty or the secret is not an Ed25519 key,
    /// rather than on the first payment.
    pub fn try_new(
        key_id: impl Into<String>,
        key_secret: impl Into<String>,
    ) -> Result<Self, ConfigurationError> {
        let key_id = key_id.into();
        let key_secret = key_secret.into();
        if key_id.is_empty() || key_secret.is_empty() {
            return Err(ConfigurationError::MissingCredentials);
        }
        signing_key(&key_secret)?;
        Ok(Self {
            key_id,
            key_secret,
            host: CDP_FACILITATOR_HOST.to_string(),
            route: CDP_FACILITATOR_ROUTE.to_string(),
        })
    }

    /// Scopes tokens to the host and path of `base_url` instead of the CDP default.
    pub fn with_base_url(mut self, base_url: &Url) -> Self {
        if let Some(host) = base_url.host_str() {
            self.host = match base_url.port() {
                Some(port) => format!("{host}:{port}"),
                None => host.to_string(),
            };
        }
        self.route = base_url.path().trim_end_matches('/').to_string();
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Path the token for `action` is scoped to, e.g. `/platform/v2/x402/verify`.
    pub fn path_for(&self, action: FacilitatorAction) -> String {
        format!("{}/{}", self.route, action.as_str())
    }
}

impl fmt::Debug for CdpAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CdpAuth")
            .field("key_id", &self.key_id)
            .field("key_secret", &"<redacted>")
            .field("host", &self.host)
            .field("route", &self.route)
            .finish()
    }
}

impl FacilitatorAuth for CdpAuth {
    fn headers(&self, action: FacilitatorAction) -> Result<HeaderMap, ConfigurationError> {
        let token = create_auth_header(
            &self.key_id,
            &self.key_secret,
            "POST",
            &self.host,
            &self.path_for(action),
        )?;
        let mut headers = HeaderMap::new();
        headers.insert(http::header::AUTHORIZATION, HeaderValue::from_str(&token)?);
        headers.insert(
            CORRELATION_CONTEXT,
            HeaderValue::from_str(&create_correlation_header())?,
        );
        Ok(headers)
    }
}

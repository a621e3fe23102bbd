//! Protocol version 1 (V1) types for x402.
//!
//! V1 identifies networks by name (e.g. `"base-sepolia"`) and carries the payment
//! proof in the `X-PAYMENT` header.
//!
//! # Key Types
//!
//! - [`X402Version1`] - Version marker that serializes as `1`
//! - [`PaymentPayload`] - Signed payment authorization from the buyer, kept opaque
//! - [`PaymentRequirements`] - Payment terms set by the seller
//! - [`PriceTag`] / [`ResourceInfo`] - Inputs that build [`PaymentRequirements`]
//! - [`PaymentRequired`] - HTTP 402 response body
//! - [`VerifyRequest`] / [`VerifyResponse`] / [`SettleResponse`] - Facilitator messages

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::fmt::Display;
use std::sync::LazyLock;

use crate::networks::{Network, Scheme, UsdcDeployment};
use crate::util::b64::{PayloadError, decode_json};
use crate::util::money_amount::MoneyAmount;

/// Version marker for x402 protocol version 1.
///
/// This type serializes as the integer `1` and is used to identify V1 protocol
/// messages in the wire format.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct X402Version1;

impl X402Version1 {
    pub const VALUE: u8 = 1;
}

impl PartialEq<u8> for X402Version1 {
    fn eq(&self, other: &u8) -> bool {
        *other == Self::VALUE
    }
}

impl From<X402Version1> for u8 {
    fn from(_: X402Version1) -> Self {
        X402Version1::VALUE
    }
}

impl Serialize for X402Version1 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(Self::VALUE)
    }
}

impl<'de> Deserialize<'de> for X402Version1 {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let num = u8::deserialize(deserializer)?;
        if num == Self::VALUE {
            Ok(X402Version1)
        } else {
            Err(serde::de::Error::custom(format!(
                "expected version {}, got {}",
                Self::VALUE,
                num
            )))
        }
    }
}

impl Display for X402Version1 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Self::VALUE)
    }
}

/// A signed payment authorization from the buyer.
///
/// The gate never interprets the proof itself; the facilitator does. The payload is
/// kept as a JSON object so that unknown scheme fields pass through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentPayload(serde_json::Map<String, serde_json::Value>);

impl PaymentPayload {
    pub const VERSION_FIELD: &'static str = "x402Version";

    /// Decodes a transport-encoded payment header (base64 over JSON).
    ///
    /// The protocol version field is always set to [`X402Version1`], overwriting
    /// whatever the payer sent.
    pub fn decode(header: &[u8]) -> Result<Self, PayloadError> {
        let value: serde_json::Value = decode_json(header)?;
        let serde_json::Value::Object(map) = value else {
            return Err(PayloadError::Malformed(
                "payment payload must be a JSON object".to_string(),
            ));
        };
        Ok(PaymentPayload::from(map))
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }
}

impl From<serde_json::Map<String, serde_json::Value>> for PaymentPayload {
    fn from(mut map: serde_json::Map<String, serde_json::Value>) -> Self {
        map.insert(
            Self::VERSION_FIELD.to_string(),
            serde_json::Value::from(X402Version1::VALUE),
        );
        PaymentPayload(map)
    }
}

/// Payment requirements set by the seller.
///
/// Defines the terms under which a payment will be accepted, including
/// the amount, recipient, asset, and timing constraints. Built once per request
/// through [`PriceTag::to_requirements`] and never mutated afterwards.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirements {
    /// The payment scheme.
    pub scheme: Scheme,
    /// The network name.
    pub network: Network,
    /// The maximum amount required, in token minor units.
    pub max_amount_required: String,
    /// The resource URL or path being paid for.
    pub resource: String,
    /// Human-readable description of the resource.
    pub description: String,
    /// MIME type of the resource.
    pub mime_type: String,
    /// Optional JSON schema for the resource output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<serde_json::Value>,
    /// The recipient address for payment.
    pub pay_to: String,
    /// Maximum time in seconds for payment settlement.
    pub max_timeout_seconds: u64,
    /// The token asset address.
    pub asset: String,
    /// Token metadata (EIP-712 name and version).
    #[serde(default)]
    pub extra: serde_json::Value,
}

/// Reasons a [`PriceTag`] cannot become [`PaymentRequirements`].
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid payTo address: {0:?}")]
    InvalidPayTo(String),
}

/// Either a 0x-prefixed 20-byte hex address, or an alphanumeric token of 1 to 36
/// characters that may contain inner hyphens.
static MIXED_ADDRESS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:0x[a-fA-F0-9]{40}|[A-Za-z0-9](?:[A-Za-z0-9-]{0,34}[A-Za-z0-9])?)$")
        .expect("valid regex")
});

/// Checks `address` against the accepted payee address pattern.
pub fn is_valid_address(address: &str) -> bool {
    MIXED_ADDRESS.is_match(address)
}

/// Describes the protected resource, independent of its price.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceInfo {
    /// Canonical path or URL of the resource.
    pub url: String,
    pub description: String,
    pub mime_type: String,
    pub output_schema: Option<serde_json::Value>,
}

/// What the seller asks for: amount, payee, and which network to settle on.
///
/// # Example
///
/// ```rust
/// use forward_x402_types::networks::Network;
/// use forward_x402_types::proto::v1::{PriceTag, ResourceInfo};
/// use forward_x402_types::util::MoneyAmount;
///
/// let price_tag = PriceTag {
///     amount: MoneyAmount::parse("0.01").unwrap(),
///     pay_to: "0xd8dA6BF26964aF9D7eEd9e03E53415D37aA96045".to_string(),
///     network: Network::BaseSepolia,
///     max_timeout_seconds: 300,
/// };
/// let resource = ResourceInfo {
///     url: "/forward/abc".to_string(),
///     ..Default::default()
/// };
/// let requirements = price_tag.to_requirements(&resource).unwrap();
/// assert_eq!(requirements.max_amount_required, "10000");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct PriceTag {
    pub amount: MoneyAmount,
    pub pay_to: String,
    pub network: Network,
    pub max_timeout_seconds: u64,
}

impl PriceTag {
    /// Builds the requirements for `resource`, choosing the USDC deployment that
    /// matches the network.
    pub fn to_requirements(
        &self,
        resource: &ResourceInfo,
    ) -> Result<PaymentRequirements, ValidationError> {
        if !is_valid_address(&self.pay_to) {
            return Err(ValidationError::InvalidPayTo(self.pay_to.clone()));
        }
        let usdc = UsdcDeployment::by_network(self.network);
        Ok(PaymentRequirements {
            scheme: Scheme::Exact,
            network: usdc.network,
            max_amount_required: self.amount.to_minor_units(usdc.decimals),
            resource: resource.url.clone(),
            description: resource.description.clone(),
            mime_type: resource.mime_type.clone(),
            output_schema: resource.output_schema.clone(),
            pay_to: self.pay_to.clone(),
            max_timeout_seconds: self.max_timeout_seconds,
            asset: usdc.address.to_string(),
            extra: usdc.extra(),
        })
    }
}

/// Request body for the facilitator `/verify` and `/settle` endpoints.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest<'a> {
    /// Protocol version (always 1).
    pub x402_version: X402Version1,
    /// The signed payment authorization.
    pub payment_payload: &'a PaymentPayload,
    /// The payment requirements to verify against.
    pub payment_requirements: &'a PaymentRequirements,
}

/// Settlement uses the same body as verification.
pub type SettleRequest<'a> = VerifyRequest<'a>;

impl<'a> VerifyRequest<'a> {
    pub fn new(
        payment_payload: &'a PaymentPayload,
        payment_requirements: &'a PaymentRequirements,
    ) -> Self {
        Self {
            x402_version: X402Version1,
            payment_payload,
            payment_requirements,
        }
    }
}

/// Result returned by a facilitator after verifying a [`PaymentPayload`] against
/// the provided [`PaymentRequirements`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub is_valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invalid_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payer: Option<String>,
}

impl VerifyResponse {
    pub fn valid(payer: impl Into<String>) -> Self {
        Self {
            is_valid: true,
            invalid_reason: None,
            payer: Some(payer.into()),
        }
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            invalid_reason: Some(reason.into()),
            payer: None,
        }
    }
}

/// Response from a payment settlement request.
///
/// Facilitator-defined JSON, typically including the transaction hash. The gate
/// only forwards it to the payer in the `X-PAYMENT-RESPONSE` header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettleResponse(pub serde_json::Value);

/// HTTP 402 Payment Required response body for V1.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequired {
    /// Why the request was not served.
    pub error: String,
    /// Acceptable payment methods for the requested resource.
    pub accepts: Vec<PaymentRequirements>,
    /// Protocol version (always 1).
    pub x402_version: X402Version1,
}

/// Body of a 500 response raised by the gate itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error: String,
    pub x402_version: X402Version1,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::b64::encode_json;
    use serde_json::json;

    fn price_tag(pay_to: &str, network: Network) -> PriceTag {
        PriceTag {
            amount: MoneyAmount::parse("0.123456789").unwrap(),
            pay_to: pay_to.to_string(),
            network,
            max_timeout_seconds: 60,
        }
    }

    fn resource() -> ResourceInfo {
        ResourceInfo {
            url: "/forward/abc123".to_string(),
            description: "Send email to Alice".to_string(),
            mime_type: "application/json".to_string(),
            output_schema: None,
        }
    }

    const PAYEE: &str = "0xd8dA6BF26964aF9D7eEd9e03E53415D37aA96045";

    #[test]
    fn test_requirements_on_testnet() {
        let requirements = price_tag(PAYEE, Network::BaseSepolia)
            .to_requirements(&resource())
            .unwrap();
        assert_eq!(requirements.network, Network::BaseSepolia);
        assert_eq!(
            requirements.asset,
            "0x036CbD53842c5426634e7929541eC2318f3dCF7e"
        );
        assert_eq!(requirements.max_amount_required, "123456");
        assert_eq!(requirements.extra, json!({"name": "USDC", "version": "2"}));
    }

    #[test]
    fn test_requirements_on_mainnet() {
        let requirements = price_tag(PAYEE, Network::Base)
            .to_requirements(&resource())
            .unwrap();
        assert_eq!(requirements.network, Network::Base);
        assert_eq!(
            requirements.asset,
            "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913"
        );
        assert_eq!(
            requirements.extra,
            json!({"name": "USD Coin", "version": "2"})
        );
    }

    #[test]
    fn test_usdc_assets_are_well_formed_addresses() {
        for network in Network::variants() {
            let usdc = UsdcDeployment::by_network(*network);
            assert_eq!(usdc.network, *network);
            assert!(is_valid_address(usdc.address), "{network}: {}", usdc.address);
        }
    }

    #[test]
    fn test_requirements_wire_field_names() {
        let requirements = price_tag(PAYEE, Network::Base)
            .to_requirements(&resource())
            .unwrap();
        let wire = serde_json::to_value(&requirements).unwrap();
        let keys: Vec<&str> = wire.as_object().unwrap().keys().map(|k| k.as_str()).collect();
        for key in [
            "scheme",
            "network",
            "maxAmountRequired",
            "resource",
            "description",
            "mimeType",
            "payTo",
            "maxTimeoutSeconds",
            "asset",
            "extra",
        ] {
            assert!(keys.contains(&key), "missing {key}");
        }
        assert!(!keys.contains(&"outputSchema"), "unset field must be omitted");
        assert_eq!(wire["scheme"], "exact");
        assert_eq!(wire["network"], "base");
    }

    #[test]
    fn test_output_schema_serialized_when_set() {
        let mut info = resource();
        info.output_schema = Some(json!({"type": "object"}));
        let requirements = price_tag(PAYEE, Network::Base)
            .to_requirements(&info)
            .unwrap();
        let wire = serde_json::to_value(&requirements).unwrap();
        assert_eq!(wire["outputSchema"], json!({"type": "object"}));
    }

    #[test]
    fn test_pay_to_validation() {
        let longest = "x".repeat(36);
        let too_long = "x".repeat(37);
        for ok in [PAYEE, "a", "merchant-01", "A1B2", "0x1234", longest.as_str()] {
            assert!(is_valid_address(ok), "{ok} should be accepted");
        }
        for bad in [
            "",
            "-merchant",
            "merchant-",
            "0x12345678901234567890123456789012345678zz",
            "has space",
            "under_score",
            too_long.as_str(),
        ] {
            assert!(!is_valid_address(bad), "{bad} should be rejected");
        }
        let err = price_tag("not valid!", Network::Base)
            .to_requirements(&resource())
            .unwrap_err();
        assert!(matches!(err, ValidationError::InvalidPayTo(_)));
    }

    #[test]
    fn test_payload_decode_stamps_version() {
        let header = encode_json(&json!({
            "x402Version": 7,
            "scheme": "exact",
            "network": "base-sepolia",
            "payload": {"signature": "0xdead"}
        }))
        .unwrap();
        let payload = PaymentPayload::decode(header.as_bytes()).unwrap();
        assert_eq!(payload.get("x402Version"), Some(&json!(1)));
        assert_eq!(payload.get("payload"), Some(&json!({"signature": "0xdead"})));

        let header = encode_json(&json!({"scheme": "exact"})).unwrap();
        let payload = PaymentPayload::decode(header.as_bytes()).unwrap();
        assert_eq!(payload.get("x402Version"), Some(&json!(1)));
    }

    #[test]
    fn test_payload_decode_rejects_non_objects() {
        let header = encode_json(&json!([1, 2, 3])).unwrap();
        assert!(matches!(
            PaymentPayload::decode(header.as_bytes()),
            Err(PayloadError::Malformed(_))
        ));
        assert!(PaymentPayload::decode(b"not base64 at all!").is_err());
    }

    #[test]
    fn test_verify_request_body() {
        let requirements = price_tag(PAYEE, Network::Base)
            .to_requirements(&resource())
            .unwrap();
        let payload = PaymentPayload::from(serde_json::Map::new());
        let body = serde_json::to_value(VerifyRequest::new(&payload, &requirements)).unwrap();
        assert_eq!(body["x402Version"], 1);
        assert_eq!(body["paymentPayload"]["x402Version"], 1);
        assert_eq!(body["paymentRequirements"]["payTo"], PAYEE);
    }

    #[test]
    fn test_verify_response_accepts_missing_optionals() {
        let response: VerifyResponse =
            serde_json::from_value(json!({"isValid": true})).unwrap();
        assert_eq!(response, VerifyResponse { is_valid: true, ..Default::default() });

        let response: VerifyResponse = serde_json::from_value(json!({
            "isValid": false,
            "invalidReason": "insufficient_funds",
            "payer": null
        }))
        .unwrap();
        assert_eq!(response.invalid_reason.as_deref(), Some("insufficient_funds"));
        assert_eq!(response.payer, None);
    }
}

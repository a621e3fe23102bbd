//! Configuration module for the forwarding server.

use clap::Parser;
use forward_x402_axum::FacilitatorClient;
use forward_x402_axum::auth::{CdpAuth, ConfigurationError};
use forward_x402_axum::facilitator_client::FacilitatorClientError;
use forward_x402_types::config::LiteralOrEnv;
use forward_x402_types::util::MoneyAmount;
use serde::Deserialize;
use std::fs;
use std::io;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::state::ForwardSettings;
use crate::store::NewEndpoint;

/// CLI arguments for the forwarding server.
#[derive(Parser, Debug)]
#[command(name = "forward-x402")]
#[command(about = "Pay-to-email forwarding server gated by x402 payments")]
struct CliArgs {
    /// Path to the JSON configuration file
    #[arg(long, short, env = "CONFIG", default_value = "config.json")]
    config: PathBuf,
}

/// Server configuration.
///
/// Fields use serde defaults that fall back to environment variables,
/// then to hardcoded defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "config_defaults::default_host")]
    host: IpAddr,
    #[serde(default = "config_defaults::default_port")]
    port: u16,
    #[serde(default = "config_defaults::default_server_url")]
    server_url: String,
    #[serde(default = "config_defaults::default_pay_to")]
    pay_to: String,
    #[serde(default = "config_defaults::default_max_timeout_seconds")]
    max_timeout_seconds: u64,
    #[serde(default = "config_defaults::default_testnet")]
    testnet: bool,
    #[serde(default)]
    facilitator: FacilitatorConfig,
    #[serde(default)]
    paywall_html: Option<String>,
    #[serde(default)]
    endpoints: Vec<EndpointSeed>,
}

/// Where and how to reach the facilitator.
///
/// CDP credentials may be given as `"$CDP_KEY_NAME"` references. When omitted they are
/// read from the `CDP_KEY_NAME` and `CDP_PRIVATE_KEY` environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct FacilitatorConfig {
    #[serde(default = "config_defaults::default_facilitator_url")]
    pub url: String,
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
    #[serde(default = "config_defaults::default_cdp_key_name")]
    pub cdp_key_name: Option<LiteralOrEnv<String>>,
    #[serde(default = "config_defaults::default_cdp_private_key")]
    pub cdp_private_key: Option<LiteralOrEnv<String>>,
}

/// An endpoint created at start-up.
#[derive(Debug, Clone, Deserialize)]
pub struct EndpointSeed {
    pub email: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub short_url: Option<String>,
    pub base_price: MoneyAmount,
}

impl From<EndpointSeed> for NewEndpoint {
    fn from(seed: EndpointSeed) -> Self {
        NewEndpoint {
            email: seed.email,
            label: seed.label,
            base_price: seed.base_price,
            short_url: seed.short_url,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            host: config_defaults::default_host(),
            port: config_defaults::default_port(),
            server_url: config_defaults::default_server_url(),
            pay_to: config_defaults::default_pay_to(),
            max_timeout_seconds: config_defaults::default_max_timeout_seconds(),
            testnet: config_defaults::default_testnet(),
            facilitator: FacilitatorConfig::default(),
            paywall_html: None,
            endpoints: Vec::new(),
        }
    }
}

impl Default for FacilitatorConfig {
    fn default() -> Self {
        FacilitatorConfig {
            url: config_defaults::default_facilitator_url(),
            timeout_seconds: None,
            cdp_key_name: config_defaults::default_cdp_key_name(),
            cdp_private_key: config_defaults::default_cdp_private_key(),
        }
    }
}

pub mod config_defaults {
    use forward_x402_axum::facilitator_client::DEFAULT_FACILITATOR_URL;
    use forward_x402_types::config::LiteralOrEnv;
    use std::env;
    use std::net::{IpAddr, Ipv4Addr};

    pub const DEFAULT_PORT: u16 = 5001;
    pub const DEFAULT_HOST: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);
    pub const DEFAULT_SERVER_URL: &str = "http://localhost:5001";
    pub const DEFAULT_MAX_TIMEOUT_SECONDS: u64 = 300;
    pub const DEFAULT_ENV: &str = "dev";

    fn non_empty_var(name: &str) -> Option<String> {
        env::var(name).ok().filter(|value| !value.is_empty())
    }

    /// $PORT env var -> 5001
    pub fn default_port() -> u16 {
        non_empty_var("PORT")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_PORT)
    }

    /// $HOST env var -> "0.0.0.0"
    pub fn default_host() -> IpAddr {
        non_empty_var("HOST")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_HOST)
    }

    /// $SERVER_URL env var -> "http://localhost:5001"
    pub fn default_server_url() -> String {
        non_empty_var("SERVER_URL").unwrap_or_else(|| DEFAULT_SERVER_URL.to_string())
    }

    /// $X402_PAYMENT_ADDRESS env var -> empty, which the payment gate rejects.
    pub fn default_pay_to() -> String {
        non_empty_var("X402_PAYMENT_ADDRESS").unwrap_or_default()
    }

    /// $X402_MAX_TIMEOUT_SECONDS env var -> 300
    pub fn default_max_timeout_seconds() -> u64 {
        non_empty_var("X402_MAX_TIMEOUT_SECONDS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_MAX_TIMEOUT_SECONDS)
    }

    /// Testnet unless $ENV names another environment than "dev".
    pub fn default_testnet() -> bool {
        non_empty_var("ENV").unwrap_or_else(|| DEFAULT_ENV.to_string()) == DEFAULT_ENV
    }

    /// $FACILITATOR_URL env var -> the hosted CDP facilitator
    pub fn default_facilitator_url() -> String {
        non_empty_var("FACILITATOR_URL").unwrap_or_else(|| DEFAULT_FACILITATOR_URL.to_string())
    }

    pub fn default_cdp_key_name() -> Option<LiteralOrEnv<String>> {
        non_empty_var("CDP_KEY_NAME").map(LiteralOrEnv::from_literal)
    }

    pub fn default_cdp_private_key() -> Option<LiteralOrEnv<String>> {
        non_empty_var("CDP_PRIVATE_KEY").map(LiteralOrEnv::from_literal)
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {0}: {1}")]
    FileRead(PathBuf, io::Error),
    #[error("Failed to parse config file: {0}")]
    JsonParse(#[from] serde_json::Error),
    #[error("Invalid facilitator configuration: {0}")]
    Facilitator(#[from] FacilitatorClientError),
    #[error("Invalid facilitator credentials: {0}")]
    Credentials(#[from] ConfigurationError),
}

impl Config {
    /// Load configuration from CLI arguments and JSON file.
    ///
    /// The config file path is determined by:
    /// 1. `--config <path>` CLI argument, or the `CONFIG` env var
    /// 2. `./config.json`
    ///
    /// A missing file is not an error: every value then comes from the environment
    /// or the defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let cli_args = CliArgs::parse();
        Self::load_from_path(&cli_args.config)
    }

    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        match fs::read_to_string(path) {
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Config::default()),
            Err(e) => Err(ConfigError::FileRead(path.to_path_buf(), e)),
        }
    }

    pub fn host(&self) -> IpAddr {
        self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn facilitator(&self) -> &FacilitatorConfig {
        &self.facilitator
    }

    pub fn endpoints(&self) -> &[EndpointSeed] {
        &self.endpoints
    }

    /// Per-request settings shared by the forwarding handlers.
    pub fn forward_settings(&self) -> ForwardSettings {
        ForwardSettings {
            server_url: self.server_url.trim_end_matches('/').to_string(),
            pay_to: self.pay_to.clone(),
            max_timeout_seconds: self.max_timeout_seconds,
            testnet: self.testnet,
            paywall_html: self.paywall_html.clone(),
        }
    }
}

impl FacilitatorConfig {
    /// Builds the HTTP facilitator client.
    ///
    /// Requests are signed only when both CDP credentials are present; exactly one of
    /// them is a configuration error.
    pub fn client(&self) -> Result<FacilitatorClient, ConfigError> {
        let client = FacilitatorClient::try_from(self.url.as_str())?;
        let client = match self.timeout_seconds {
            Some(seconds) => client.with_timeout(Duration::from_secs(seconds)),
            None => client,
        };
        match (&self.cdp_key_name, &self.cdp_private_key) {
            (Some(key_name), Some(private_key)) => {
                let auth = CdpAuth::try_new(key_name.as_str(), private_key.as_str())?
                    .with_base_url(client.base_url());
                Ok(client.with_auth(auth))
            }
            (None, None) => Ok(client),
            _ => Err(ConfigurationError::MissingCredentials.into()),
        }
    }

    pub fn signs_requests(&self) -> bool {
        self.cdp_key_name.is_some() && self.cdp_private_key.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;
    use serde_json::json;

    fn parse(value: serde_json::Value) -> Config {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_file_values_win() {
        let config = parse(json!({
            "host": "127.0.0.1",
            "port": 8080,
            "server_url": "https://forward.example/",
            "pay_to": "0xd8dA6BF26964aF9D7eEd9e03E53415D37aA96045",
            "max_timeout_seconds": 60,
            "testnet": false,
            "paywall_html": "<h1>Pay</h1>",
            "facilitator": {
                "url": "https://facilitator.example/x402",
                "timeout_seconds": 5
            },
            "endpoints": [
                {"email": "alice@example.com", "label": "Alice", "short_url": "alice", "base_price": "0.01"}
            ]
        }));
        assert_eq!(config.host(), "127.0.0.1".parse::<IpAddr>().unwrap());
        assert_eq!(config.port(), 8080);
        let settings = config.forward_settings();
        assert_eq!(settings.server_url, "https://forward.example");
        assert_eq!(settings.max_timeout_seconds, 60);
        assert!(!settings.testnet);
        assert_eq!(settings.paywall_html.as_deref(), Some("<h1>Pay</h1>"));
        assert_eq!(config.facilitator().timeout_seconds, Some(5));
        assert_eq!(config.endpoints().len(), 1);
        assert_eq!(
            config.endpoints()[0].base_price,
            MoneyAmount::parse("0.01").unwrap()
        );
    }

    #[test]
    fn test_endpoint_seed_accepts_numeric_price() {
        let seed: EndpointSeed =
            serde_json::from_value(json!({"email": "bob@example.com", "base_price": 0.5})).unwrap();
        assert_eq!(seed.label, "");
        assert_eq!(seed.short_url, None);
        assert_eq!(seed.base_price.to_minor_units(6), "500000");
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let path = std::env::temp_dir().join("forward-x402-surely-missing-config.json");
        let config = Config::load_from_path(&path).unwrap();
        assert!(config.endpoints().is_empty());
    }

    #[test]
    fn test_unparseable_file_is_an_error() {
        let path = std::env::temp_dir().join(format!(
            "forward-x402-config-test-{}.json",
            std::process::id()
        ));
        fs::write(&path, "{ not json").unwrap();
        let result = Config::load_from_path(&path);
        fs::remove_file(&path).unwrap();
        assert!(matches!(result, Err(ConfigError::JsonParse(_))));
    }

    #[test]
    fn test_facilitator_client_without_credentials() {
        let facilitator = FacilitatorConfig {
            url: "https://facilitator.example/x402".to_string(),
            timeout_seconds: Some(3),
            cdp_key_name: None,
            cdp_private_key: None,
        };
        let client = facilitator.client().unwrap();
        assert_eq!(
            client.verify_url().as_str(),
            "https://facilitator.example/x402/verify"
        );
        assert_eq!(client.timeout(), &Some(Duration::from_secs(3)));
        assert!(!facilitator.signs_requests());
    }

    #[test]
    fn test_facilitator_client_with_credentials() {
        let secret = base64::engine::general_purpose::STANDARD.encode([5u8; 32]);
        let facilitator = FacilitatorConfig {
            url: "https://facilitator.example/x402".to_string(),
            timeout_seconds: None,
            cdp_key_name: Some(LiteralOrEnv::from_literal("organizations/o/apiKeys/k".into())),
            cdp_private_key: Some(LiteralOrEnv::from_literal(secret)),
        };
        assert!(facilitator.client().is_ok());
        assert!(facilitator.signs_requests());
    }

    #[test]
    fn test_half_configured_credentials_fail_fast() {
        let facilitator = FacilitatorConfig {
            url: "https://facilitator.example/x402".to_string(),
            timeout_seconds: None,
            cdp_key_name: Some(LiteralOrEnv::from_literal("key".into())),
            cdp_private_key: None,
        };
        assert!(matches!(
            facilitator.client(),
            Err(ConfigError::Credentials(ConfigurationError::MissingCredentials))
        ));
    }
}

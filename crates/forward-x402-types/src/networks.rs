//! Supported networks, payment schemes and known USDC deployments.
//!
//! The gate prices resources in USDC on Base. Whether it asks for mainnet or
//! testnet funds is a single switch: [`Network::from_testnet`] picks the network,
//! and [`UsdcDeployment::by_network`] picks the matching token contract. The two
//! are always selected together so a mainnet network never points at the testnet
//! token or vice versa.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Payment scheme advertised in payment requirements.
#[derive(Debug, Hash, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Scheme {
    /// Pay exactly the requested amount.
    #[serde(rename = "exact")]
    Exact,
}

impl Display for Scheme {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Scheme::Exact => write!(f, "exact"),
        }
    }
}

/// Supported Ethereum-compatible networks.
///
/// Used to differentiate between testnet and mainnet environments for the x402 protocol.
#[derive(Debug, Hash, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Network {
    /// Base Sepolia testnet (chain ID 84532).
    #[serde(rename = "base-sepolia")]
    BaseSepolia,
    /// Base mainnet (chain ID 8453).
    #[serde(rename = "base")]
    Base,
}

impl Network {
    /// Return all known [`Network`] variants.
    pub fn variants() -> &'static [Network] {
        &[Network::BaseSepolia, Network::Base]
    }

    /// Selects the testnet or the production network.
    pub fn from_testnet(testnet: bool) -> Self {
        if testnet {
            Network::BaseSepolia
        } else {
            Network::Base
        }
    }
}

impl Display for Network {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Network::BaseSepolia => write!(f, "base-sepolia"),
            Network::Base => write!(f, "base"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown network: {0}")]
pub struct UnknownNetwork(String);

impl FromStr for Network {
    type Err = UnknownNetwork;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "base-sepolia" => Ok(Network::BaseSepolia),
            "base" => Ok(Network::Base),
            other => Err(UnknownNetwork(other.to_string())),
        }
    }
}

/// EIP-712 domain information of a token, sent to payers in `extra`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenEip712 {
    pub name: &'static str,
    pub version: &'static str,
}

/// A USDC contract deployment on a given network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsdcDeployment {
    pub network: Network,
    pub address: &'static str,
    pub decimals: u32,
    pub eip712: TokenEip712,
}

static USDC_BASE_SEPOLIA: UsdcDeployment = UsdcDeployment {
    network: Network::BaseSepolia,
    address: "0x036CbD53842c5426634e7929541eC2318f3dCF7e",
    decimals: 6,
    eip712: TokenEip712 {
        name: "USDC",
        version: "2",
    },
};

static USDC_BASE: UsdcDeployment = UsdcDeployment {
    network: Network::Base,
    address: "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913",
    decimals: 6,
    eip712: TokenEip712 {
        name: "USD Coin",
        version: "2",
    },
};

impl UsdcDeployment {
    /// Returns the known USDC deployment for the given network.
    pub fn by_network(network: Network) -> &'static UsdcDeployment {
        match network {
            Network::BaseSepolia => &USDC_BASE_SEPOLIA,
            Network::Base => &USDC_BASE,
        }
    }

    /// The `extra` object advertised with payment requirements for this token.
    pub fn extra(&self) -> serde_json::Value {
        serde_json::json!({
            "name": self.eip712.name,
            "version": self.eip712.version,
        })
    }
}

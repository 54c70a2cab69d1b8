//! Network constants and startup configuration.
//!
//! Contract addresses default to the official EAS deployments of the chosen
//! network and can be overridden from the command line.

use clap::ValueEnum;
use ethers::types::{Address, H256};
use serde::Serialize;

use crate::error::{Error, Result};

/// Field layout every attestation produced by this server conforms to.
pub const SCHEMA: &str = "uint8 Hours, uint32 NFCID, uint32 EventID, uint32 OrganizerID";

pub const SEPOLIA_EAS_ADDRESS: &str = "0xC2679fBD37d54388Ce493F1DB75320D236e1815e";
pub const SEPOLIA_SCHEMA_REGISTRY_ADDRESS: &str = "0x0a7E2Ff54e76B8E6659aedc9103FB21c038050D0";
pub const MAINNET_EAS_ADDRESS: &str = "0xA1207F3BBa224E2c9c3c6D5aF63D816e6e1f8e4b";
pub const MAINNET_SCHEMA_REGISTRY_ADDRESS: &str = "0xA7b39296258348C78294F95B872b282326A97BDF";

/// Human readable description of [`SCHEMA`], shown before registration.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SchemaDetails {
    pub schema_name: &'static str,
    pub hours: &'static str,
    pub nfc_id: &'static str,
    pub event_id: &'static str,
    pub organizer_id: &'static str,
}

pub const SCHEMA_DETAILS: SchemaDetails = SchemaDetails {
    schema_name: "Volunteer Hours",
    hours: "uint8, number of hours volunteered at the event",
    nfc_id: "uint32, id of the volunteer's NFC badge",
    event_id: "uint32, id of the event the hours were spent at",
    organizer_id: "uint32, id of the organizer vouching for the hours",
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    Sepolia,
}

impl Network {
    pub fn chain_id(self) -> u64 {
        match self {
            Network::Mainnet => 1,
            Network::Sepolia => 11_155_111,
        }
    }

    pub fn alchemy_url(self, api_key: &str) -> String {
        let subdomain = match self {
            Network::Mainnet => "eth-mainnet",
            Network::Sepolia => "eth-sepolia",
        };
        format!("https://{subdomain}.g.alchemy.com/v2/{api_key}")
    }

    fn default_eas_address(self) -> &'static str {
        match self {
            Network::Mainnet => MAINNET_EAS_ADDRESS,
            Network::Sepolia => SEPOLIA_EAS_ADDRESS,
        }
    }

    fn default_schema_registry_address(self) -> &'static str {
        match self {
            Network::Mainnet => MAINNET_SCHEMA_REGISTRY_ADDRESS,
            Network::Sepolia => SEPOLIA_SCHEMA_REGISTRY_ADDRESS,
        }
    }
}

/// Where and against which contracts transactions are sent.
#[derive(Debug, Clone)]
pub struct ChainConfig {
    pub network: Network,
    pub rpc_url: String,
    pub eas_address: Address,
    pub schema_registry_address: Address,
}

impl ChainConfig {
    /// Resolve the endpoint and contract addresses for `network`.
    ///
    /// An explicit `rpc_url` wins over the Alchemy endpoint; one of the two
    /// must be present.
    pub fn resolve(
        network: Network,
        rpc_url: Option<&str>,
        alchemy_api_key: Option<&str>,
        eas_address: Option<&str>,
        schema_registry_address: Option<&str>,
    ) -> Result<Self> {
        let rpc_url = match (non_empty(rpc_url), non_empty(alchemy_api_key)) {
            (Some(url), _) => url.to_string(),
            (None, Some(key)) => network.alchemy_url(key),
            (None, None) => {
                return Err(Error::Config(
                    "either an rpc url or an alchemy api key is required".into(),
                ))
            }
        };

        let eas_address = parse_address(
            "eas address",
            non_empty(eas_address).unwrap_or(network.default_eas_address()),
        )?;
        let schema_registry_address = parse_address(
            "schema registry address",
            non_empty(schema_registry_address).unwrap_or(network.default_schema_registry_address()),
        )?;

        Ok(Self {
            network,
            rpc_url,
            eas_address,
            schema_registry_address,
        })
    }
}

/// Settings of the attestation flow itself.
#[derive(Debug, Clone)]
pub struct FlowConfig {
    pub schema: String,
    pub recipient: Address,
    pub schema_uid: Option<H256>,
    pub attestation_uid: Option<H256>,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            schema: SCHEMA.to_string(),
            recipient: Address::zero(),
            schema_uid: None,
            attestation_uid: None,
        }
    }
}

pub fn parse_address(what: &str, value: &str) -> Result<Address> {
    value
        .trim()
        .parse()
        .map_err(|e| Error::Config(format!("invalid {what} {value:?}: {e}")))
}

pub fn parse_uid(what: &str, value: &str) -> Result<H256> {
    let value = value.trim();
    let hex_part = value.strip_prefix("0x").unwrap_or(value);
    if hex_part.len() != 64 {
        return Err(Error::Config(format!(
            "invalid {what} {value:?}: expected 32 bytes of hex"
        )));
    }
    hex_part
        .parse()
        .map_err(|e| Error::Config(format!("invalid {what} {value:?}: {e}")))
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

//! Wallet connection and client binding.
//!
//! A [`Session`] resolves the signer once and keeps the two contract clients
//! bound to it. Without a wallet nothing is ever bound and every flow action
//! stays a no-op.

use std::sync::Arc;

use async_trait::async_trait;
use ethers::middleware::SignerMiddleware;
use ethers::providers::{Http, JsonRpcClient, Middleware, Provider};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::Address;
use parking_lot::RwLock;

use crate::config::ChainConfig;
use crate::eas::{AttestationService, EasContract, SchemaRegistryContract, SchemaRegistryService};
use crate::error::{Error, Result};

/// Clients bound to a resolved signer.
#[derive(Clone)]
pub struct Connection {
    pub eas: Arc<dyn AttestationService>,
    pub schema_registry: Arc<dyn SchemaRegistryService>,
    pub address: Address,
}

#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Connection>;
}

/// Connects a local wallet to the configured RPC endpoint.
pub struct EthersConnector {
    chain: ChainConfig,
    wallet: LocalWallet,
}

impl EthersConnector {
    pub fn new(chain: ChainConfig, wallet: LocalWallet) -> Self {
        Self { chain, wallet }
    }

    /// Parse a hex encoded secp256k1 private key, with or without `0x`.
    pub fn wallet_from_hex(key: &str) -> Result<LocalWallet> {
        let key = key.trim();
        let bytes = hex::decode(key.strip_prefix("0x").unwrap_or(key))
            .map_err(|e| Error::Config(format!("invalid wallet key: {e}")))?;
        LocalWallet::from_bytes(&bytes)
            .map_err(|e| Error::Config(format!("invalid wallet key: {e}")))
    }

    /// Check the endpoint's chain and bind both contract clients to the wallet.
    async fn bind<P>(&self, provider: Provider<P>) -> Result<Connection>
    where
        P: JsonRpcClient + 'static,
    {
        let chain_id = provider
            .get_chainid()
            .await
            .map_err(|e| Error::Provider(e.to_string()))?
            .as_u64();
        if chain_id != self.chain.network.chain_id() {
            return Err(Error::Config(format!(
                "endpoint serves chain {chain_id}, expected {:?} ({})",
                self.chain.network,
                self.chain.network.chain_id()
            )));
        }

        let wallet = self.wallet.clone().with_chain_id(chain_id);
        let address = wallet.address();
        let client = Arc::new(SignerMiddleware::new(provider, wallet));

        Ok(Connection {
            eas: Arc::new(EasContract::new(self.chain.eas_address, client.clone())),
            schema_registry: Arc::new(SchemaRegistryContract::new(
                self.chain.schema_registry_address,
                client,
            )),
            address,
        })
    }
}

#[async_trait]
impl Connector for EthersConnector {
    async fn connect(&self) -> Result<Connection> {
        let provider = Provider::<Http>::try_from(self.chain.rpc_url.as_str())
            .map_err(|e| Error::Config(format!("invalid rpc url: {e}")))?;
        self.bind(provider).await
    }
}

#[derive(Clone, Default)]
pub struct Clients {
    pub eas: Option<Arc<dyn AttestationService>>,
    pub schema_registry: Option<Arc<dyn SchemaRegistryService>>,
    pub address: Option<Address>,
}

pub struct Session {
    connector: Option<Arc<dyn Connector>>,
    clients: RwLock<Clients>,
}

impl Session {
    /// `connector` is `None` when no wallet was supplied.
    pub fn new(connector: Option<Arc<dyn Connector>>) -> Self {
        Self {
            connector,
            clients: RwLock::new(Clients::default()),
        }
    }

    /// Bind the clients to the wallet's signer, unless already done.
    pub async fn bootstrap(&self) -> Result<()> {
        if self.clients.read().address.is_some() {
            return Ok(());
        }
        let Some(connector) = self.connector.as_ref() else {
            tracing::error!("Ethereum provider not found");
            return Ok(());
        };

        let connection = connector.connect().await?;

        let mut clients = self.clients.write();
        if clients.address.is_none() {
            tracing::info!(current_address = ?connection.address, "wallet connected");
            *clients = Clients {
                eas: Some(connection.eas),
                schema_registry: Some(connection.schema_registry),
                address: Some(connection.address),
            };
        }
        Ok(())
    }

    pub fn clients(&self) -> Clients {
        self.clients.read().clone()
    }

    pub fn address(&self) -> Option<Address> {
        self.clients.read().address
    }
}

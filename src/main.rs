mod config;
mod eas;
mod error;
mod flow;
mod handler;
mod schema;
mod session;
mod types;

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};
use clap::Parser;

use config::{ChainConfig, FlowConfig, Network};
use flow::FlowController;
use session::{Connector, EthersConnector, Session};
use types::AppState;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// network the EAS contracts are deployed on
    #[arg(long, value_enum, default_value_t = Network::Sepolia, env = "EAS_NETWORK")]
    network: Network,

    /// alchemy api key used to build the rpc endpoint
    #[arg(long, env = "ALCHEMY_API_KEY", hide_env_values = true)]
    alchemy_api_key: Option<String>,

    /// rpc endpoint, overrides the alchemy endpoint
    #[arg(long, env = "EAS_RPC_URL")]
    rpc_url: Option<String>,

    /// path to hex encoded wallet private key file
    #[arg(short, long, env = "EAS_WALLET_KEY_FILE")]
    wallet_key_file: Option<PathBuf>,

    /// EAS contract address, defaults to the network deployment
    #[arg(long)]
    eas_address: Option<String>,

    /// SchemaRegistry contract address, defaults to the network deployment
    #[arg(long)]
    schema_registry_address: Option<String>,

    /// previously registered schema uid
    #[arg(long)]
    schema_uid: Option<String>,

    /// previously created attestation uid
    #[arg(long)]
    attestation_uid: Option<String>,

    /// attestation recipient, zero address if unset
    #[arg(long)]
    recipient: Option<String>,

    /// server ip
    #[arg(short, long, default_value = "127.0.0.1")]
    ip: String,

    /// server port
    #[arg(short, long, default_value_t = 3000)]
    port: u16,
}

/// Build the wallet connector. Without a key file there is nothing to connect
/// and the chain settings are not needed.
fn wallet_connector(cli: &Cli) -> Result<Option<Arc<dyn Connector>>> {
    let Some(path) = cli.wallet_key_file.as_ref() else {
        tracing::info!("no wallet key file given, running without a wallet");
        return Ok(None);
    };

    let chain = ChainConfig::resolve(
        cli.network,
        cli.rpc_url.as_deref(),
        cli.alchemy_api_key.as_deref(),
        cli.eas_address.as_deref(),
        cli.schema_registry_address.as_deref(),
    )
    .context("invalid chain configuration")?;
    tracing::info!(
        network = ?chain.network,
        eas_address = ?chain.eas_address,
        schema_registry_address = ?chain.schema_registry_address,
        "chain configured"
    );

    let key = fs::read_to_string(path)
        .with_context(|| format!("Failed to read wallet key from {}", path.display()))?;
    let wallet = EthersConnector::wallet_from_hex(&key)?;
    let connector: Arc<dyn Connector> = Arc::new(EthersConnector::new(chain, wallet));
    Ok(Some(connector))
}

#[actix_web::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut flow_config = FlowConfig::default();
    if let Some(uid) = cli.schema_uid.as_deref() {
        flow_config.schema_uid = Some(config::parse_uid("schema uid", uid)?);
    }
    if let Some(uid) = cli.attestation_uid.as_deref() {
        flow_config.attestation_uid = Some(config::parse_uid("attestation uid", uid)?);
    }
    if let Some(recipient) = cli.recipient.as_deref() {
        flow_config.recipient = config::parse_address("recipient", recipient)?;
    }

    let connector = wallet_connector(&cli)?;

    let session = Arc::new(Session::new(connector));
    if let Err(err) = session.bootstrap().await {
        tracing::error!(error = %err, "wallet connection failed, retrying on next page load");
    }

    let state = web::Data::new(AppState {
        flow: FlowController::new(session, flow_config).context("invalid schema")?,
    });

    let server = HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .configure(handler::configure)
    })
    .bind((cli.ip.clone(), cli.port))
    .context("unable to start the server")?
    .run();
    tracing::info!("eas-attestation-server running at {}:{}", cli.ip, cli.port);
    server.await.context("error while running server")?;
    Ok(())
}

//! Gateway binary entry point.
//!
//! Resolves `Settings` from the environment, wires the broker and result
//! backend adapters, and runs the axum server — the thin composition root
//! the `chemgate-core`/`chemgate-web` library crates are built to plug
//! into, the way `oya`'s root binary composes its library crates.

use std::sync::Arc;

use anyhow::Result;
use chemgate_core::{
    BackendConfig, BrokerClient, ReqwestBrokerClient, ResultBackendClient, Settings,
    SurrealResultBackend,
};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "chemcloud-gateway", about = "Authenticated compute gateway")]
struct Cli {
    /// Increase log verbosity (info -> debug).
    #[arg(long, env = "CHEMGATE_VERBOSE")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let settings = Settings::resolve()?;
    let settings = Arc::new(settings);

    let broker: Arc<dyn BrokerClient> = Arc::new(ReqwestBrokerClient::new(settings.broker_url.clone()));
    let backend: Arc<dyn ResultBackendClient> = Arc::new(build_backend(&settings).await?);

    chemgate_web::run_server(broker, backend, settings).await
}

async fn build_backend(settings: &Settings) -> Result<SurrealResultBackend> {
    let config = BackendConfig {
        url: settings.backend_url.clone(),
        namespace: settings
            .backend_namespace
            .clone()
            .unwrap_or_else(|| "chemgate".to_string()),
        database: settings
            .backend_database
            .clone()
            .unwrap_or_else(|| "gateway".to_string()),
        credentials: None,
    };
    SurrealResultBackend::connect(config)
        .await
        .map_err(anyhow::Error::from)
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "debug,chemgate_core=trace,chemgate_web=trace"
    } else {
        "info"
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::info;

use keygate_core::{
    AuthProvider, GatewayClientConfig, NoopAuth, Orchestrator, StaticTokenAuth, WreqModelGateway,
};
use keygate_pool::{KeyPoolConfig, KeyStore, TieredKeySource};
use keygate_router::AppState;

mod cli;

use crate::cli::Cli;

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(err) = run().await {
        eprintln!("keygate failed: {err}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn Error + Send + Sync>> {
    let cli = Cli::parse();

    let store = Arc::new(KeyStore::new(
        TieredKeySource::new(cli.key_files.clone()),
        KeyPoolConfig {
            cooldown: Duration::from_secs(cli.cooldown_secs),
            staleness: Duration::from_secs(cli.staleness_secs),
        },
    ));
    store.reload().await;
    let stats = store.stats();
    info!(
        total = stats.total,
        available = stats.available,
        "key pool loaded"
    );

    let mut gateway_config = GatewayClientConfig::new(cli.upstream_url.clone());
    gateway_config.proxy = cli.proxy.clone();
    let gateway = Arc::new(WreqModelGateway::new(gateway_config)?);
    let orchestrator = Arc::new(Orchestrator::new(store.clone(), gateway));

    let auth: Arc<dyn AuthProvider> = match cli.auth_token.as_deref() {
        Some(token) if !token.is_empty() => Arc::new(StaticTokenAuth::new(token)),
        _ => Arc::new(NoopAuth),
    };

    let app = keygate_router::router(AppState {
        auth,
        orchestrator,
        store,
    });

    let bind = format!("{}:{}", cli.host, cli.port);
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    info!(addr = %bind, upstream = %cli.upstream_url, "listening");
    axum::serve(listener, app).await?;

    Ok(())
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("keygate=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

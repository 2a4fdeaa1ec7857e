use clap::Parser;
use dotenv::dotenv;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing_subscriber::EnvFilter;

use netcheck::{
    agent::AgentIdentity,
    api,
    cli::Cli,
    config::ProbeConfig,
    dispatch::Dispatcher,
    error::AppError,
    models::AppState,
    probe::ProbeSet,
    registry::Registry,
    service::CheckService,
    store::{MemoryBackend, RedisBackend, ResultStore, StoreBackend, Sweeper, SystemClock},
};

/// Redis when configured and reachable, memory otherwise
async fn store_backend(redis_url: Option<&str>) -> Arc<dyn StoreBackend> {
    match redis_url {
        Some(url) => match RedisBackend::new(url).await {
            Ok(backend) => Arc::new(backend),
            Err(e) => {
                tracing::warn!("Failed to initialize Redis result store: {}", e);
                tracing::info!("Continuing with in-memory result store");
                Arc::new(MemoryBackend::new())
            }
        },
        None => {
            tracing::info!("No REDIS_URL provided, keeping results in memory");
            Arc::new(MemoryBackend::new())
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // Initialize environment
    dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let probe_config = ProbeConfig::from_cli(&cli);
    let probes = ProbeSet::from_config(&probe_config)?;
    let registry = Registry::load(cli.nodes_file.as_deref(), &cli.node_domain);

    let backend = store_backend(cli.redis_url.as_deref()).await;
    let store = Arc::new(ResultStore::new(
        backend,
        Arc::new(SystemClock),
        cli.result_ttl(),
    )?);
    tracing::info!(
        "Results kept for {:?} in the {} store",
        cli.result_ttl(),
        store.backend_name()
    );

    let sweeper = Sweeper::spawn(store.clone(), cli.sweep_interval());

    let service = Arc::new(CheckService::new(
        registry,
        Dispatcher::new(probes),
        store,
    ));
    let agent = AgentIdentity::from_cli(&cli).map(Arc::new);
    match &agent {
        Some(agent) => tracing::info!("Accepting tasks as agent {}", agent.node_id()),
        None => tracing::info!("No AGENT_ID set, task execution disabled"),
    }

    let app = api::router(AppState {
        service,
        base_url: cli.base_url.clone(),
        agent,
    });

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", cli.port)).await?;
    tracing::info!("Server started at http://0.0.0.0:{}", cli.port);

    let sweeper_token = sweeper.token();
    let shutdown = async move {
        // Wait for CTRL+C signal
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!("Error handling shutdown signal: {}", err);
            return;
        }

        tracing::info!("Received shutdown signal, beginning graceful shutdown...");

        // Background tasks stop alongside the server
        sweeper_token.cancel();
    };

    let server_result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await;

    tracing::info!("Waiting for the result sweeper to stop...");
    match tokio::time::timeout(Duration::from_secs(5), sweeper.stop()).await {
        Ok(Ok(())) => tracing::debug!("Result sweeper stopped"),
        Ok(Err(e)) => tracing::warn!("Result sweeper ended with error: {}", e),
        Err(_) => tracing::warn!("Result sweeper did not stop within timeout"),
    }

    tracing::info!("Shutdown complete");
    server_result.map_err(AppError::from)
}

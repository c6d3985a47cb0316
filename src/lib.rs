pub mod api;
pub mod charting;
pub mod config;
pub mod core_state; // Shared state: database path, generation client, sync
pub mod db;
pub mod intake;
pub mod models;
pub mod pipeline;
pub mod reports;

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("Could not initialise application state: {0}")]
    Core(#[from] core_state::CoreError),
    #[error("Could not start async runtime: {0}")]
    Runtime(std::io::Error),
    #[error("Server error: {0}")]
    Server(#[from] api::ServerError),
}

/// Initialise logging, build shared state, and serve the API until Ctrl-C.
pub fn run() -> Result<(), StartupError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    let config = config::AppConfig::from_env()?;
    tracing::info!(
        version = config::APP_VERSION,
        db_path = %config.db_path.display(),
        model = %config.llm.model,
        "{} starting",
        config::APP_NAME
    );

    // The blocking HTTP client must be built before the async runtime exists.
    let core = Arc::new(core_state::CoreState::from_config(&config)?);
    // Run migrations up front so a broken database fails at startup.
    drop(core.open_db()?);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(StartupError::Runtime)?;

    // `core` outlives the runtime: the blocking client must not be dropped on an async thread.
    let served = core.clone();
    runtime.block_on(async move {
        let server = api::start_api_server(served, config.bind_addr).await?;
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Could not listen for shutdown signal");
        }
        server.shutdown().await;
        Ok::<(), StartupError>(())
    })
}

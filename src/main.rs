use cloud_manager::{
    api::{create_router, AppState},
    billing::HttpBillingGateway,
    config::Config,
    db::{create_pool, run_migrations},
    observability::init_tracing,
    query::ProcessQueryExecutor,
    store::PgInventoryStore,
};
use std::net::SocketAddr;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = Config::load()?;
    config.validate()?;

    // Initialize tracing/logging
    init_tracing(&config.observability);

    tracing::info!("Starting Cloud Manager service");
    tracing::info!(
        host = %config.server.host,
        port = config.server.port,
        workspace_root = %config.workspace.root_dir.display(),
        engine = %config.query_engine.binary,
        "Configuration loaded"
    );

    // Create database connection pool
    let db_pool = create_pool(&config.database).await?;
    tracing::info!("Database connection pool created");

    // Run database migrations
    run_migrations(&db_pool).await?;
    tracing::info!("Database migrations completed");

    tokio::fs::create_dir_all(&config.workspace.root_dir).await?;

    let store = Arc::new(PgInventoryStore::new(db_pool));
    let query_runner = Arc::new(ProcessQueryExecutor::from_config(&config.query_engine));
    let billing_gateway = Arc::new(HttpBillingGateway::new(&config.billing)?);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;

    // Create router
    let state = AppState::new(config, store, query_runner, billing_gateway)?;
    let app = create_router(state);

    tracing::info!("Listening on http://{}", addr);

    // Start server
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("Cloud Manager service is ready to accept requests");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

use std::sync::Arc;

use dotenv::dotenv;
use ledgerdesk_core::api::{create_router, AppState, GateRegistry};
use ledgerdesk_core::config::AppConfig;
use ledgerdesk_core::db;
use ledgerdesk_core::store::PgDocumentStore;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenv().ok();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"))
        .add_directive(LevelFilter::INFO.into());

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(filter)
        .init();

    info!("Starting Ledgerdesk Core Server...");

    let config = AppConfig::from_env()?;
    info!("Tax rate precedence: {:?}", config.tax_precedence);

    let db_pool = db::create_pool(&config.database_url)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to connect to database: {}", e))?;
    db::run_migrations(&db_pool).await?;

    let app_state = AppState {
        db: db_pool.clone(),
        store: Arc::new(PgDocumentStore::new(db_pool)),
        gates: GateRegistry::new(),
        config: Arc::new(config.clone()),
    };

    let app = create_router(app_state);

    let addr = format!("{}:{}", config.server_host, config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", addr, e))?;

    info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Received Ctrl+C, shutting down gracefully...");
            }
        })
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    Ok(())
}

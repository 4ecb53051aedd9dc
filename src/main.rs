use std::sync::Arc;

use reelmatch::{
    db::{create_pool, run_migrations, PgStore},
    routes::{create_router, AppState},
    telemetry, Config,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init_tracing();

    let config = Config::from_env()?;
    let pool = create_pool(&config.database_url, config.database_max_connections).await?;
    run_migrations(&pool).await?;

    // Initialize application state
    let state = AppState::new(Arc::new(PgStore::new(pool)), config.recommender());

    // Create the router with all routes
    let app = create_router(state);

    // Start the server
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "Server listening");
    axum::serve(listener, app).await?;

    Ok(())
}

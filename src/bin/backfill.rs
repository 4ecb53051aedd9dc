use reelmatch::{
    db::{create_pool, run_migrations, PgStore},
    services::backfill_interactions,
    telemetry, Config,
};

/// Rebuilds the interaction log from existing ratings, watches and list entries
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init_tracing();

    let config = Config::from_env()?;
    let pool = create_pool(&config.database_url, config.database_max_connections).await?;
    run_migrations(&pool).await?;

    let store = PgStore::new(pool);
    let report = backfill_interactions(&store).await?;

    println!(
        "Created {} rated, {} watched and {} listed interactions",
        report.rated, report.watched, report.listed
    );
    Ok(())
}

use relgraph::api::RelationshipServer;
use relgraph::db::{Db, migrate};
use relgraph::{Config, RelationshipSchema};
use std::path::Path;
use std::sync::Arc;
use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;

    env_logger::Builder::from_env(
        env_logger::Env::default().filter_or("RUST_LOG", config.relgraph.log_level.as_str()),
    )
    .init();

    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("verify");

    match command {
        "serve" => run_http_server(config).await?,
        _ => run_verification(config).await?,
    }

    Ok(())
}

/// Migrate the store and load the relationship schema
async fn prepare(config: &Config) -> Result<(Db, Arc<RelationshipSchema>)> {
    let db = Db::new(config.db_path());
    db.with_connection(|conn| migrate::run_migrations(conn, Path::new("migrations")))
        .await?;
    log::info!("Database initialized: {}", config.db_path().display());

    let schema = RelationshipSchema::load_or_builtin(config.relgraph.schema_path.as_deref())?;
    log::info!(
        "Relationship schema loaded ({} resource types, {})",
        schema.resource_types().count(),
        config
            .relgraph
            .schema_path
            .as_deref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "built-in".to_string())
    );

    Ok((db, Arc::new(schema)))
}

/// Run the relationship HTTP API
async fn run_http_server(config: Config) -> Result<()> {
    log::info!("Starting relgraph v{}", env!("CARGO_PKG_VERSION"));
    let (db, schema) = prepare(&config).await?;

    let server = RelationshipServer::new(db, schema, &config);
    server.run(config.http_server.port).await?;

    Ok(())
}

/// Check that the store and schema are usable, then exit
async fn run_verification(config: Config) -> Result<()> {
    log::info!("Verifying relgraph v{} setup", env!("CARGO_PKG_VERSION"));
    let (db, _schema) = prepare(&config).await?;

    let stats = db
        .with_connection(|conn| {
            let integrity: String = conn.query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
            if integrity != "ok" {
                return Err(relgraph::RelgraphError::Config(format!(
                    "Database integrity check failed: {}",
                    integrity
                )));
            }
            relgraph::store::link_statistics(conn)
        })
        .await?;

    log::info!("✓ Database integrity: OK");
    log::info!(
        "✓ {} live resources, {} indexed links",
        stats.total_resources,
        stats.total_links
    );
    Ok(())
}

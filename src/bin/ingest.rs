use clap::Parser;
use relgraph::db::{Db, migrate};
use relgraph::ingest::{discover_files, ingest_file};
use relgraph::{Config, RelationshipSchema};
use std::path::{Path, PathBuf};
use std::time::Instant;
use anyhow::Result;

#[derive(Parser, Debug)]
#[command(name = "ingest")]
#[command(about = "Load FHIR-style JSON resources and bundles into the relgraph store")]
struct Args {
    /// Directory to scan for *.json files
    path: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(
        env_logger::Env::default()
            .filter_or("RUST_LOG", "info")
    ).init();

    let args = Args::parse();
    let config = Config::load()?;
    let schema = RelationshipSchema::load_or_builtin(config.relgraph.schema_path.as_deref())?;

    let db = Db::new(config.db_path());
    db.with_connection(|conn| migrate::run_migrations(conn, Path::new("migrations")))
        .await?;

    let files = discover_files(&args.path)?;
    if files.is_empty() {
        log::warn!("No .json files found under {}", args.path.display());
        return Ok(());
    }

    let start = Instant::now();
    let (loaded, failed) = db
        .with_connection(move |conn| {
            let mut loaded = 0usize;
            let mut failed = 0usize;
            for file in &files {
                match ingest_file(conn, &schema, file) {
                    Ok(count) => {
                        log::debug!("{}: {} resources", file.display(), count);
                        loaded += count;
                    }
                    Err(e) => {
                        log::error!("Skipping {}: {}", file.display(), e);
                        failed += 1;
                    }
                }
            }
            Ok((loaded, failed))
        })
        .await?;

    println!("\n=== relgraph ingestion ===");
    println!("Resources loaded: {}", loaded);
    println!("Files skipped:    {}", failed);
    println!("Elapsed:          {:?}", start.elapsed());

    Ok(())
}

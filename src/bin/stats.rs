use relgraph::{config::Config, db::Db, store};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::load()?;
    let db = Db::new(config.db_path());

    let stats = db.with_connection(|conn| store::link_statistics(conn)).await?;

    println!("\n=== relgraph Relationship Statistics ===\n");

    if stats.total_resources == 0 {
        println!("The store is empty.");
        println!("\nRun `ingest <dir>` to load resources.");
        return Ok(());
    }

    println!("Live resources by type:\n");
    println!("{:-<50}", "");
    println!("{:<30} {:>12}", "Type", "Count");
    println!("{:-<50}", "");
    for row in &stats.resources {
        println!("{:<30} {:>12}", row.resource_type, row.count);
    }
    println!("{:-<50}", "");
    println!("{:<30} {:>12}", "Total", stats.total_resources);

    println!("\nIndexed references by field:\n");
    println!("{:-<80}", "");
    println!("{:<24} {:<24} {:<20} {:>8}", "Source", "Field", "Target", "Count");
    println!("{:-<80}", "");
    for row in &stats.links {
        println!(
            "{:<24} {:<24} {:<20} {:>8}",
            row.source_type, row.field, row.target_type, row.count
        );
    }
    println!("{:-<80}", "");
    println!("{:<70} {:>8}", "Total", stats.total_links);
    println!();

    Ok(())
}

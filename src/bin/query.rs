use clap::{Parser, Subcommand};
use relgraph::cache::ResolveCache;
use relgraph::db::Db;
use relgraph::graph::Deadline;
use relgraph::store::SqliteStore;
use relgraph::{Config, GraphBuilder, NodeId, PathFinder, RelationshipSchema, RelgraphError};
use anyhow::Result;

#[derive(Parser, Debug)]
#[command(name = "query")]
#[command(about = "Run relationship discovery or path search against the local store")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Graph around one resource, e.g. `query discover Patient/P1 --depth 2`
    Discover {
        resource: String,
        #[arg(long)]
        depth: Option<usize>,
        /// Skip backlinks from the reverse index
        #[arg(long)]
        forward_only: bool,
    },
    /// Paths between two resources, e.g. `query paths Encounter/E1 Organization/O1`
    Paths {
        source: String,
        target: String,
        #[arg(long)]
        max_depth: Option<usize>,
    },
}

fn parse_key(key: &str) -> Result<NodeId> {
    NodeId::parse(key).ok_or_else(|| anyhow::anyhow!("expected Type/id, got {:?}", key))
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = Args::parse();
    let config = Config::load()?;
    let schema = RelationshipSchema::load_or_builtin(config.relgraph.schema_path.as_deref())?;
    let traversal = config.traversal.clone();
    let db = Db::new(config.db_path());

    let output = match args.command {
        Command::Discover { resource, depth, forward_only } => {
            let root = parse_key(&resource)?;
            let depth = depth.unwrap_or(traversal.default_discover_depth);
            db.with_connection(move |conn| {
                let store = SqliteStore::new(conn);
                let resolver = ResolveCache::new(&store, traversal.resolve_cache_capacity);
                let graph = GraphBuilder::new(&schema, &resolver, &store)
                    .with_reverse_limit(traversal.reverse_limit)
                    .with_deadline(Deadline::after(traversal.deadline()))
                    .discover(&root.resource_type, &root.id, depth, !forward_only)?;
                Ok::<_, RelgraphError>(serde_json::to_value(&graph)?)
            })
            .await?
        }
        Command::Paths { source, target, max_depth } => {
            let source = parse_key(&source)?;
            let target = parse_key(&target)?;
            let max_depth = max_depth.unwrap_or(traversal.default_path_depth);
            db.with_connection(move |conn| {
                let store = SqliteStore::new(conn);
                let resolver = ResolveCache::new(&store, traversal.resolve_cache_capacity);
                let found = PathFinder::new(&schema, &resolver, &store)
                    .with_reverse_limit(traversal.reverse_limit)
                    .with_result_cap(traversal.path_result_cap)
                    .with_deadline(Deadline::after(traversal.deadline()))
                    .find_paths(&source, &target, max_depth)?;
                Ok::<_, RelgraphError>(serde_json::to_value(&found)?)
            })
            .await?
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

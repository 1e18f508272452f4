use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub relgraph: RelgraphConfig,
    #[serde(default)]
    pub traversal: TraversalConfig,
    #[serde(default)]
    pub http_server: HttpServerConfig,
}

/// Store and schema locations
#[derive(Debug, Clone, Deserialize)]
pub struct RelgraphConfig {
    pub db_path: PathBuf,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Relationship schema JSON. The built-in schema is used when absent.
    #[serde(default)]
    pub schema_path: Option<PathBuf>,
}

/// Bounds applied to every discovery and path search
#[derive(Debug, Clone, Deserialize)]
pub struct TraversalConfig {
    #[serde(default = "default_reverse_limit")]
    pub reverse_limit: usize,
    #[serde(default = "default_discover_depth")]
    pub default_discover_depth: usize,
    #[serde(default = "default_path_depth")]
    pub default_path_depth: usize,
    #[serde(default = "default_path_result_cap")]
    pub path_result_cap: usize,
    #[serde(default = "default_deadline_ms")]
    pub deadline_ms: u64,
    /// Per-request resolver memo size; 0 disables it.
    #[serde(default = "default_resolve_cache_capacity")]
    pub resolve_cache_capacity: usize,
}

impl Default for TraversalConfig {
    fn default() -> Self {
        Self {
            reverse_limit: default_reverse_limit(),
            default_discover_depth: default_discover_depth(),
            default_path_depth: default_path_depth(),
            path_result_cap: default_path_result_cap(),
            deadline_ms: default_deadline_ms(),
            resolve_cache_capacity: default_resolve_cache_capacity(),
        }
    }
}

impl TraversalConfig {
    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HttpServerConfig {
    #[serde(default = "default_http_port")]
    pub port: u16,
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            port: default_http_port(),
            allowed_origins: Vec::new(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_reverse_limit() -> usize {
    200
}

fn default_discover_depth() -> usize {
    2
}

fn default_path_depth() -> usize {
    3
}

fn default_path_result_cap() -> usize {
    10
}

fn default_deadline_ms() -> u64 {
    5000
}

fn default_resolve_cache_capacity() -> usize {
    1024
}

fn default_http_port() -> u16 {
    8080
}

impl Config {
    /// Load configuration from file
    ///
    /// Loads environment variables from .env file (if present) before loading config.
    /// Looks for config file in this order:
    /// 1. Path specified in RELGRAPH_CONFIG environment variable
    /// 2. ./config.toml in current directory
    pub fn load() -> Result<Self> {
        // .env is optional
        let _ = dotenv::dotenv();

        let config_path = std::env::var("RELGRAPH_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config.toml"));

        Self::from_path(&config_path)
    }

    /// Load and validate a specific configuration file
    pub fn from_path(config_path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: Config = toml::from_str(&config_str)
            .with_context(|| format!("Failed to parse {}", config_path.display()))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        if let Some(schema_path) = &self.relgraph.schema_path {
            if !schema_path.is_file() {
                anyhow::bail!(
                    "schema_path does not exist or is not a file: {}",
                    schema_path.display()
                );
            }
        }

        let t = &self.traversal;
        if t.reverse_limit == 0 {
            anyhow::bail!("traversal.reverse_limit must be greater than 0");
        }

        if !(1..=3).contains(&t.default_discover_depth) {
            anyhow::bail!("traversal.default_discover_depth must be between 1 and 3");
        }

        if !(1..=5).contains(&t.default_path_depth) {
            anyhow::bail!("traversal.default_path_depth must be between 1 and 5");
        }

        if t.path_result_cap == 0 {
            anyhow::bail!("traversal.path_result_cap must be greater than 0");
        }

        if t.deadline_ms == 0 {
            anyhow::bail!("traversal.deadline_ms must be greater than 0");
        }

        Ok(())
    }

    /// Get database path
    pub fn db_path(&self) -> &Path {
        &self.relgraph.db_path
    }
}

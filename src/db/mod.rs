use rusqlite::Connection;
use std::path::{Path, PathBuf};
use tokio::task;
use crate::error::{Result, RelgraphError};

pub mod migrate;

const PRAGMAS: &str = "PRAGMA journal_mode = WAL; \
     PRAGMA synchronous = NORMAL; \
     PRAGMA foreign_keys = ON; \
     PRAGMA temp_store = MEMORY; \
     PRAGMA cache_size = -65536; \
     PRAGMA mmap_size = 268435456;";

/// Database connection wrapper
#[derive(Debug, Clone)]
pub struct Db {
    path: PathBuf,
}

impl Db {
    /// Create a new database connection manager
    pub fn new<P: AsRef<Path>>(db_path: P) -> Self {
        Self {
            path: db_path.as_ref().to_path_buf(),
        }
    }

    /// Open a new database connection with the standard pragmas
    pub fn open_connection(&self) -> Result<Connection> {
        let conn = Connection::open(&self.path).map_err(RelgraphError::Database)?;
        conn.execute_batch(PRAGMAS)?;
        Ok(conn)
    }

    /// Execute a closure with a database connection in a blocking task.
    ///
    /// The closure gets one connection for its whole run; traversals thread it
    /// through every lookup instead of reopening per step.
    pub async fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.clone();
        task::spawn_blocking(move || {
            let mut conn = db.open_connection()?;
            f(&mut conn)
        })
        .await
        .map_err(|e| {
            RelgraphError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("database task failed: {}", e),
            ))
        })?
    }
}

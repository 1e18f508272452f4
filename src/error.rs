use thiserror::Error;

/// Main error type for relgraph
#[derive(Error, Debug)]
pub enum RelgraphError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// File system I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed JSON (resources, schema files)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Relationship schema could not be loaded
    #[error("Schema error: {0}")]
    Schema(String),

    /// Root, source or target resource does not exist
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Convenient Result type using RelgraphError
pub type Result<T> = std::result::Result<T, RelgraphError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RelgraphError::NotFound("Patient/P1".to_string());
        assert!(err.to_string().contains("Resource not found"));
        assert!(err.to_string().contains("Patient/P1"));
    }

    #[test]
    fn test_error_from_rusqlite() {
        let rusqlite_err = rusqlite::Error::InvalidQuery;
        let err: RelgraphError = rusqlite_err.into();
        assert!(matches!(err, RelgraphError::Database(_)));
    }

    #[test]
    fn test_error_from_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: RelgraphError = json_err.into();
        assert!(matches!(err, RelgraphError::Json(_)));
    }
}

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TicDatError {
    /// Raised by every schema-engine operation: bad schema definitions,
    /// mutation after the schema is locked, structural mismatches, frozen
    /// data, invalid repair values and malformed obfuscation arguments.
    #[error("Schema error: {0}")]
    Schema(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[cfg(feature = "sql")]
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[cfg(feature = "csv")]
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl TicDatError {
    /// True for the schema-engine error kind, false for adapter I/O failures.
    pub fn is_schema(&self) -> bool {
        matches!(self, TicDatError::Schema(_))
    }
}

pub type Result<T> = std::result::Result<T, TicDatError>;

/// Return a `TicDatError::Schema` unless `condition` holds.
pub(crate) fn verify(condition: bool, message: impl FnOnce() -> String) -> Result<()> {
    if condition {
        Ok(())
    } else {
        Err(TicDatError::Schema(message()))
    }
}

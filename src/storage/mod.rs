// Storage module - the durable history of analysis records
//
// The history is an append log: records go in, full snapshots come out.
// Nothing above this module can update or delete a record in place. The only
// policy choice is what happens when a producer reuses an id on purpose,
// which is controlled by `DuplicatePolicy`.
//
// Backends:
// - sqlite: durable store (WAL mode, pooled connections)
// - memory: process-local store for ephemeral runs and tests

pub mod import;
pub mod memory;
pub mod sqlite;

use crate::config::Config;
use crate::model::{AnalysisRecord, RecordError};
use anyhow::{Context, Result};
use std::sync::Arc;

/// db_path value that selects the in-memory backend
pub const IN_MEMORY: &str = ":memory:";

/// What `append` does when a record's id is already present
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DuplicatePolicy {
    /// The new record replaces the old one (default)
    #[default]
    Overwrite,
    /// Both records are kept
    Append,
}

impl DuplicatePolicy {
    /// Parse policy string from config
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "append" | "keep" => Self::Append,
            _ => Self::Overwrite, // Default to overwrite for unknown values
        }
    }

    /// Convert to string for TOML serialization
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Overwrite => "overwrite",
            Self::Append => "append",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("corrupt history row: {0}")]
    Corrupt(String),
    #[error("invalid record: {0}")]
    Invalid(#[from] RecordError),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

impl From<r2d2::Error> for StoreError {
    fn from(err: r2d2::Error) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

/// Durable keyed record of analyses
///
/// Implementations are owned by the background dispatcher, which serializes
/// all calls; they still must be `Send + Sync` to live behind an `Arc`.
pub trait HistoryStore: Send + Sync {
    /// Human-readable backend name for logging
    fn name(&self) -> &'static str;

    /// Add a record. Returns only after the record is durable.
    fn append(&self, record: &AnalysisRecord) -> Result<(), StoreError>;

    /// Consistent snapshot of every record.
    ///
    /// Backends return insertion order, but callers that care about time
    /// order must sort by `analyzed_at` themselves.
    fn read_all(&self) -> Result<Vec<AnalysisRecord>, StoreError>;
}

/// Open the backend selected by `config.db_path`
pub fn open(config: &Config) -> Result<Arc<dyn HistoryStore>> {
    if config.db_path.as_os_str() == IN_MEMORY {
        tracing::info!("Using in-memory history (nothing is persisted)");
        return Ok(Arc::new(memory::MemoryHistoryStore::new(
            config.duplicate_policy,
        )));
    }

    let store = sqlite::SqliteHistoryStore::open(&config.db_path, config.duplicate_policy)
        .with_context(|| format!("Failed to open history at {}", config.db_path.display()))?;
    tracing::info!("History store opened (SQLite: {})", config.db_path.display());
    Ok(Arc::new(store))
}

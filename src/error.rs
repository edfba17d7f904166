//! Error types for the Storyloom turn engine.

use thiserror::Error;

/// Storage-related errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Record not found in {table}: {id}")]
    NotFound { table: &'static str, id: String },

    #[error("Checkpoint {checkpoint_id} digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch {
        checkpoint_id: String,
        expected: String,
        actual: String,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Storage I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<sled::Error> for StorageError {
    fn from(err: sled::Error) -> Self {
        StorageError::IoError(std::io::Error::new(
            std::io::ErrorKind::Other,
            format!("sled: {}", err),
        ))
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

/// Branch and checkpoint errors
#[derive(Debug, Error)]
pub enum BranchError {
    #[error("Story not found: {0}")]
    StoryNotFound(String),

    #[error("Entry not found: {0}")]
    EntryNotFound(String),

    #[error("Branch not found: {0}")]
    BranchNotFound(String),

    #[error("Checkpoint not found: {0}")]
    CheckpointNotFound(String),

    /// The entry a branch was forked from no longer exists. Positions on this branch
    /// cannot be computed without colliding with the parent timeline.
    #[error("Branch {branch_id} references missing fork entry {fork_entry_id}")]
    ForkEntryMissing {
        branch_id: String,
        fork_entry_id: String,
    },

    #[error("Record {id} belongs to story {actual}, not {expected}")]
    StoryMismatch {
        id: String,
        expected: String,
        actual: String,
    },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Generation pipeline errors
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{phase} phase failed: {message}")]
    Phase { phase: String, message: String },

    #[error("Dependency error: {0}")]
    Dependency(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Branch error: {0}")]
    Branch(#[from] BranchError),
}

impl PipelineError {
    pub fn phase(phase: impl std::fmt::Display, message: impl Into<String>) -> Self {
        PipelineError::Phase {
            phase: phase.to_string(),
            message: message.into(),
        }
    }
}

/// Import errors. Returned as values, never panicked across the import boundary.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("Malformed export JSON: {0}")]
    MalformedJson(String),

    #[error("Export is missing required field '{0}'")]
    MissingField(&'static str),

    #[error("Export contains no entries")]
    EmptyEntries,

    #[error("Unsupported export version {found} (max supported {supported})")]
    UnsupportedVersion { found: u32, supported: u32 },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Branch error: {0}")]
    Branch(#[from] BranchError),
}

/// Top-level errors surfaced by the CLI and configuration layers
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Storage error: {0}")]
    StorageError(#[from] StorageError),

    #[error("Branch error: {0}")]
    BranchError(#[from] BranchError),

    #[error("Import failed: {0}")]
    ImportError(#[from] ImportError),

    #[error("Generation failed: {0}")]
    GenerationFailed(#[from] PipelineError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for ApiError {
    fn from(err: config::ConfigError) -> Self {
        ApiError::ConfigError(err.to_string())
    }
}

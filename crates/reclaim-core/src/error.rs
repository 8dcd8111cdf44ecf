//! Error types for Reclaim.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    // Usage errors
    #[error("Invalid job: {0}")]
    InvalidJob(String),

    #[error("Invalid priority {0}: must be between 1 and 10")]
    InvalidPriority(u8),

    #[error("Batch processing is already running")]
    AlreadyRunning,

    // Worker errors
    #[error("Failed to spawn worker: {0}")]
    WorkerSpawn(String),

    #[error("Worker exited with code {exit_code}: {message}")]
    WorkerFailed { exit_code: i32, message: String },

    #[error("Worker stopped before completion")]
    WorkerStopped,

    #[error("Job timeout after {seconds} seconds")]
    JobTimeout { seconds: u64 },

    // Cache errors
    #[error("Invalid cache snapshot: {0}")]
    InvalidSnapshot(String),

    // Infrastructure errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    // Generic
    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

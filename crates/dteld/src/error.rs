//! Error types for dteld

use sonic_dtel::DtelError;
use thiserror::Error;

/// DTEL daemon errors
#[derive(Error, Debug)]
pub enum DteldError {
    /// Configuration file could not be parsed or failed validation
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Engine rejected part of the configuration
    #[error("Engine error: {0}")]
    Engine(#[from] DtelError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Worker pool is gone
    #[error("Worker {0} stopped")]
    WorkerStopped(usize),
}

/// Result type for dteld operations
pub type Result<T> = std::result::Result<T, DteldError>;

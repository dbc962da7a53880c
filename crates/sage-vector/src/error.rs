//! Error types for sage-vector.

use thiserror::Error;

/// Result type for sage-vector operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in sage-vector operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Collection already exists.
    #[error("Collection '{0}' already exists")]
    CollectionExists(String),

    /// Collection not found.
    #[error("Collection '{0}' not found")]
    CollectionNotFound(String),

    /// Dimension mismatch between a vector and the collection it targets.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimensions the collection was created with.
        expected: usize,
        /// Dimensions of the vector actually provided.
        actual: usize,
    },

    /// Invalid vector (e.g., empty, contains NaN or infinity).
    #[error("Invalid vector: {0}")]
    InvalidVector(String),

    /// Configuration error (e.g., reopening a collection with a different
    /// dimension than it was created with).
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Persistence error (serialization, snapshot layout).
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

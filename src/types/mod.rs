//! Core types (chunks, search results, store stats, errors).

use serde::Serialize;

// ============= Pipeline Types =============

/// A bounded, overlapping slice of a source document, sized for embedding.
///
/// Chunks are ephemeral: they exist between the chunker and the store within
/// one ingestion pass and are never persisted without their embedding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// The chunk text.
    pub text: String,
    /// Identifier of the originating source (a file path).
    pub source: String,
    /// Position of this chunk within its source, starting at 0.
    pub sequence_index: usize,
}

/// A search hit returned by the knowledge store.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    /// Similarity score (higher is more relevant).
    pub score: f32,
    /// The stored chunk text.
    pub text: String,
    /// Source identifier the chunk came from.
    pub source: String,
}

// ============= Store Status =============

/// Health of the knowledge store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreStatus {
    /// Collection is reachable and holds points.
    Green,
    /// Collection is reachable but empty.
    Yellow,
    /// Collection is missing or unusable.
    Red,
}

impl std::fmt::Display for StoreStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            StoreStatus::Green => "green",
            StoreStatus::Yellow => "yellow",
            StoreStatus::Red => "red",
        };
        write!(f, "{}", name)
    }
}

/// Snapshot of the knowledge store's state.
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    /// Number of stored points.
    pub points: usize,
    /// Vector dimensionality of the collection.
    pub dimensions: usize,
    /// Distance metric in force.
    pub metric: String,
    /// Overall health.
    pub status: StoreStatus,
}

// ============= Ingestion Failure Reasons =============

/// Why a file or chunk was not ingested.
///
/// These render into the final report's histogram with the same snake_case
/// labels the checkpoint and logs use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FailureReason {
    /// The source file had no content after trimming whitespace.
    EmptyFile,
    /// The source file could not be read.
    ReadFailed,
    /// The embedding service failed to produce a vector after retries.
    EmbeddingFailed,
    /// The vector store rejected or failed the upsert.
    StorageFailed,
}

impl FailureReason {
    /// Stable label used in reports and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::EmptyFile => "empty_file",
            FailureReason::ReadFailed => "read_failed",
            FailureReason::EmbeddingFailed => "embedding_failed",
            FailureReason::StorageFailed => "storage_failed",
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============= Error Types =============

/// Application-level error taxonomy.
///
/// Component-local failures (a single chunk, a single file) are converted to
/// [`FailureReason`]s by the ingestion orchestrator and never surface here;
/// `AppError` is for failures the caller has to act on.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A run-aborting misconfiguration (missing paths, dimension conflicts).
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A source had no usable content.
    #[error("Empty source: {0}")]
    EmptySource(String),

    /// The embedding service failed to produce a usable vector.
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// The embedding or generation backend is unreachable.
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// A vector's length disagrees with the collection dimension.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimensions the collection was configured with.
        expected: usize,
        /// Dimensions actually produced.
        actual: usize,
    },

    /// A vector store operation failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// The generation endpoint returned an error.
    #[error("Generation error: {0}")]
    Generation(String),

    /// Caller-supplied parameters were invalid.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for application operations.
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_reason_labels() {
        assert_eq!(FailureReason::EmptyFile.as_str(), "empty_file");
        assert_eq!(FailureReason::EmbeddingFailed.as_str(), "embedding_failed");
        assert_eq!(FailureReason::StorageFailed.as_str(), "storage_failed");
        assert_eq!(FailureReason::ReadFailed.to_string(), "read_failed");
    }

    #[test]
    fn store_status_display() {
        assert_eq!(StoreStatus::Green.to_string(), "green");
        assert_eq!(StoreStatus::Yellow.to_string(), "yellow");
        assert_eq!(StoreStatus::Red.to_string(), "red");
    }

    #[test]
    fn dimension_mismatch_message_names_both_sizes() {
        let err = AppError::DimensionMismatch {
            expected: 768,
            actual: 384,
        };
        let message = err.to_string();
        assert!(message.contains("768"));
        assert!(message.contains("384"));
    }
}

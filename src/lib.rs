//! # S.A.G.E - Semantic Archive & Generation Engine
//!
//! A local transcript knowledge base: ingest a directory tree of plain-text
//! files, chunk and embed them via a local Ollama server, store the vectors
//! in an embedded store, and answer questions with retrieval-augmented
//! generation.
//!
//! ## Pipeline
//!
//! ```text
//! ingestion:  files → TextChunker → EmbeddingClient → KnowledgeStore
//! query:      question → EmbeddingClient → KnowledgeStore.search
//!                      → ContextBuilder → OllamaClient.generate
//! ```
//!
//! ## Quick Start (Library Usage)
//!
//! ```rust,ignore
//! use sage::{
//!     config::Settings, embedding::EmbeddingClient, rag::ContextBuilder,
//!     store::KnowledgeStore,
//! };
//!
//! #[tokio::main]
//! async fn main() -> sage::Result<()> {
//!     let settings = Settings::load(None)?;
//!     let store = KnowledgeStore::open(&settings.store, settings.embedding.dimensions).await?;
//!     let embedder = EmbeddingClient::new(&settings.embedding);
//!
//!     let builder = ContextBuilder::new(&settings.retrieval);
//!     let outcome = builder.answer_context(&embedder, &store, "what was said?").await?;
//!     Ok(())
//! }
//! ```
//!
//! Every component is constructed explicitly and passed down; there are no
//! process-wide singletons.

#![warn(missing_docs)]

/// Configuration loading and validation.
pub mod config;
/// Retrying client for the Ollama embedding endpoint.
pub mod embedding;
/// Batch ingestion orchestration and checkpointing.
pub mod ingest;
/// Client for the Ollama generation endpoint.
pub mod llm;
/// Chunking and retrieval context assembly.
pub mod rag;
/// Handle to the embedded vector store.
pub mod store;
/// Core types (chunks, stats, errors).
pub mod types;

// Re-export commonly used types
pub use config::Settings;
pub use embedding::{EmbeddingClient, RetryPolicy, Sleeper, TokioSleeper};
pub use ingest::{BatchPolicy, Checkpoint, IngestReport, IngestionPipeline};
pub use llm::{GenerationOptions, OllamaClient};
pub use rag::{ContextBuilder, RetrievalOutcome, TextChunker};
pub use store::KnowledgeStore;
pub use types::{AppError, Chunk, Result, ScoredChunk, StoreStats, StoreStatus};

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

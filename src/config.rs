//! Configuration.
//!
//! Settings are read from `sage.toml` (every section optional, every field
//! defaulted), then overridden by environment variables. Defaults mirror the
//! original deployment: a local Ollama server, `nomic-embed-text` embeddings
//! at 768 dimensions, and a `./transcripts` corpus.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::{AppError, Result};

/// Top-level settings for the whole pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Vector store location and collection name.
    pub store: StoreSettings,
    /// Embedding endpoint and retry policy.
    pub embedding: EmbeddingSettings,
    /// Generation endpoint and sampling options.
    pub generation: GenerationSettings,
    /// Chunk window geometry.
    pub chunking: ChunkingSettings,
    /// Retrieval and context assembly bounds.
    pub retrieval: RetrievalSettings,
    /// Batch ingestion throttling.
    pub ingest: IngestSettings,
}

/// Where the vector store lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    /// Data directory for the embedded vector store.
    pub path: PathBuf,
    /// Collection name inside the store.
    pub collection: String,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/vectors"),
            collection: "transcripts".to_string(),
        }
    }
}

/// Embedding service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    /// Base URL of the Ollama server.
    pub base_url: String,
    /// Embedding model name.
    pub model: String,
    /// Expected vector dimensionality for the model. Must match the
    /// collection; changing it requires clearing the store.
    pub dimensions: usize,
    /// Maximum characters sent per embedding request; longer text is
    /// truncated before the request is made.
    pub max_text_length: usize,
    /// Maximum attempts per embedding call.
    pub max_attempts: u32,
    /// Timeout of the first attempt, in seconds. Grows by `backoff_factor`
    /// per attempt.
    pub base_timeout_secs: u64,
    /// Multiplier applied to timeout and inter-attempt sleep per retry.
    pub backoff_factor: f64,
    /// Upper bound of the random jitter added to each attempt's timeout,
    /// as a fraction of that timeout.
    pub max_jitter: f64,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "nomic-embed-text".to_string(),
            dimensions: 768,
            max_text_length: 5000,
            max_attempts: 5,
            base_timeout_secs: 90,
            backoff_factor: 1.5,
            max_jitter: 0.2,
        }
    }
}

/// Generation service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    /// Base URL of the Ollama server.
    pub base_url: String,
    /// Generation model name.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Maximum tokens to generate per answer.
    pub num_predict: i32,
    /// Request timeout in seconds (non-streaming calls).
    pub timeout_secs: u64,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "deepseek-r1:8b".to_string(),
            temperature: 0.7,
            num_predict: 256,
            timeout_secs: 90,
        }
    }
}

/// Chunk window geometry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingSettings {
    /// Words per chunk.
    pub chunk_size: usize,
    /// Words shared between consecutive chunks. Must be smaller than
    /// `chunk_size`.
    pub overlap: usize,
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        Self {
            chunk_size: 300,
            overlap: 50,
        }
    }
}

/// Retrieval and context assembly bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    /// Number of chunks to retrieve per query.
    pub top_k: usize,
    /// Minimum similarity score for a chunk to count as relevant.
    pub score_threshold: f32,
    /// Maximum characters of assembled context handed to the generator.
    pub max_context_chars: usize,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            top_k: 3,
            score_threshold: 0.7,
            max_context_chars: 1500,
        }
    }
}

/// Batch ingestion throttling.
///
/// The pauses are a deliberate backpressure policy for embedding servers that
/// degrade under sustained load, not a correctness requirement; set them to
/// zero for a healthy backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestSettings {
    /// Directory tree of `.txt` sources to ingest.
    pub corpus_dir: PathBuf,
    /// Files per batch.
    pub batch_size: usize,
    /// Seconds to wait between files within a batch.
    pub file_pause_secs: u64,
    /// Seconds to wait between batches.
    pub batch_pause_secs: u64,
    /// Upper bound on files processed in one run (0 = no limit).
    pub max_files: usize,
    /// Where the advisory progress checkpoint is written.
    pub checkpoint_path: PathBuf,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            corpus_dir: PathBuf::from("./transcripts"),
            batch_size: 3,
            file_pause_secs: 15,
            batch_pause_secs: 60,
            max_files: 0,
            checkpoint_path: PathBuf::from("./data/ingest_checkpoint.json"),
        }
    }
}

impl Settings {
    /// Load settings from a TOML file, falling back to `sage.toml` in the
    /// working directory and then to defaults, and finally applying
    /// environment overrides.
    pub fn load(path: Option<&PathBuf>) -> Result<Self> {
        let config_path = path.cloned().or_else(|| {
            let default = PathBuf::from("sage.toml");
            default.exists().then_some(default)
        });

        let mut settings = match config_path {
            Some(path) => {
                let content = std::fs::read_to_string(&path).map_err(|e| {
                    AppError::Configuration(format!("Failed to read {}: {}", path.display(), e))
                })?;
                toml::from_str(&content).map_err(|e| {
                    AppError::Configuration(format!("Failed to parse {}: {}", path.display(), e))
                })?
            }
            None => Self::default(),
        };

        settings.apply_env();
        settings.validate()?;
        Ok(settings)
    }

    /// Apply environment variable overrides.
    pub fn apply_env(&mut self) {
        if let Ok(url) = env::var("OLLAMA_URL") {
            if !url.is_empty() {
                self.embedding.base_url = url.clone();
                self.generation.base_url = url;
            }
        }
        if let Ok(dir) = env::var("SAGE_CORPUS_DIR") {
            if !dir.is_empty() {
                self.ingest.corpus_dir = PathBuf::from(dir);
            }
        }
        if let Ok(path) = env::var("SAGE_STORE_PATH") {
            if !path.is_empty() {
                self.store.path = PathBuf::from(path);
            }
        }
        if let Ok(model) = env::var("SAGE_EMBED_MODEL") {
            if !model.is_empty() {
                self.embedding.model = model;
            }
        }
        if let Ok(dimensions) = env::var("SAGE_EMBED_DIMENSIONS") {
            if let Ok(parsed) = dimensions.parse() {
                self.embedding.dimensions = parsed;
            }
        }
        if let Ok(model) = env::var("SAGE_GEN_MODEL") {
            if !model.is_empty() {
                self.generation.model = model;
            }
        }
    }

    /// Reject configurations that would misbehave at runtime.
    pub fn validate(&self) -> Result<()> {
        if self.chunking.chunk_size == 0 {
            return Err(AppError::Configuration(
                "chunking.chunk_size must be greater than zero".to_string(),
            ));
        }
        if self.chunking.overlap >= self.chunking.chunk_size {
            return Err(AppError::Configuration(format!(
                "chunking.overlap ({}) must be smaller than chunking.chunk_size ({})",
                self.chunking.overlap, self.chunking.chunk_size
            )));
        }
        if self.embedding.dimensions == 0 {
            return Err(AppError::Configuration(
                "embedding.dimensions must be greater than zero".to_string(),
            ));
        }
        if self.embedding.max_attempts == 0 {
            return Err(AppError::Configuration(
                "embedding.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.ingest.batch_size == 0 {
            return Err(AppError::Configuration(
                "ingest.batch_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}


/// Convenience conversions used when wiring components from settings.
impl EmbeddingSettings {
    /// The base timeout as a [`Duration`].
    pub fn base_timeout(&self) -> Duration {
        Duration::from_secs(self.base_timeout_secs)
    }
}

impl GenerationSettings {
    /// The request timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl IngestSettings {
    /// Pause between files as a [`Duration`].
    pub fn file_pause(&self) -> Duration {
        Duration::from_secs(self.file_pause_secs)
    }

    /// Pause between batches as a [`Duration`].
    pub fn batch_pause(&self) -> Duration {
        Duration::from_secs(self.batch_pause_secs)
    }
}

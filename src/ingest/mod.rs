//! Batch ingestion orchestrator.
//!
//! One run walks `Scanning → Filtering → per-file (Chunking → Embedding →
//! Storing) → Checkpointing → Reporting`. Component-local failures (one
//! chunk, one file) become typed reasons in the report; only configuration
//! problems abort the run.

mod checkpoint;

pub use checkpoint::Checkpoint;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use crate::config::IngestSettings;
use crate::embedding::{EmbeddingClient, Sleeper, TokioSleeper};
use crate::rag::TextChunker;
use crate::store::KnowledgeStore;
use crate::types::{AppError, FailureReason, Result};

/// Throttling policy for a batch run.
///
/// The embedding backend degrades under sustained load, so files are
/// processed in small batches with a pause between files and a longer pause
/// between batches. This is deliberate backpressure, not a correctness
/// requirement: every knob is caller-configurable and zero disables it.
#[derive(Debug, Clone)]
pub struct BatchPolicy {
    /// Files per batch.
    pub batch_size: usize,
    /// Pause between files within a batch.
    pub file_pause: Duration,
    /// Pause between batches.
    pub batch_pause: Duration,
    /// Upper bound on files processed this run (0 = no limit).
    pub max_files: usize,
}

impl BatchPolicy {
    /// Build from settings.
    pub fn from_settings(settings: &IngestSettings) -> Self {
        Self {
            batch_size: settings.batch_size.max(1),
            file_pause: settings.file_pause(),
            batch_pause: settings.batch_pause(),
            max_files: settings.max_files,
        }
    }

    /// A policy with no pauses and no file limit (tests, healthy backends).
    pub fn unthrottled() -> Self {
        Self {
            batch_size: usize::MAX,
            file_pause: Duration::ZERO,
            batch_pause: Duration::ZERO,
            max_files: 0,
        }
    }
}

/// Final summary of one ingestion run.
#[derive(Debug, Clone, Default)]
pub struct IngestReport {
    /// Candidate files found under the corpus root.
    pub scanned: usize,
    /// Candidates skipped because their source was already in the store.
    pub skipped_existing: usize,
    /// Files actually processed this run.
    pub processed: usize,
    /// Files whose chunks were stored without failures.
    pub successful: usize,
    /// Files with at least one failure.
    pub failed: usize,
    /// Chunks stored across all files.
    pub chunks_stored: usize,
    /// Failure events by reason (a file can contribute several).
    pub reasons: BTreeMap<FailureReason, usize>,
}

impl IngestReport {
    fn record_failure(&mut self, reason: FailureReason) {
        *self.reasons.entry(reason).or_insert(0) += 1;
    }
}

impl std::fmt::Display for IngestReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Ingestion complete")?;
        writeln!(f, "  scanned:   {} files", self.scanned)?;
        writeln!(f, "  skipped:   {} already ingested", self.skipped_existing)?;
        writeln!(f, "  processed: {}", self.processed)?;
        writeln!(f, "  succeeded: {}", self.successful)?;
        writeln!(f, "  failed:    {}", self.failed)?;
        writeln!(f, "  chunks:    {}", self.chunks_stored)?;
        if !self.reasons.is_empty() {
            writeln!(f, "  failure reasons:")?;
            for (reason, count) in &self.reasons {
                writeln!(f, "    {}: {}", reason, count)?;
            }
        }
        Ok(())
    }
}

/// Per-file outcome, folded into the report.
#[derive(Debug)]
enum FileOutcome {
    /// At least one chunk stored and nothing failed.
    Success { chunks_stored: usize },
    /// Nothing usable was stored.
    Failed(FailureReason),
    /// Chunks stored but some failed along the way.
    Partial {
        chunks_stored: usize,
        failures: Vec<FailureReason>,
    },
}

/// Drives one batch ingestion run end to end.
pub struct IngestionPipeline<'a> {
    chunker: &'a TextChunker,
    embedder: &'a EmbeddingClient,
    store: &'a KnowledgeStore,
    policy: BatchPolicy,
    checkpoint_path: Option<PathBuf>,
    sleeper: Arc<dyn Sleeper>,
}

impl<'a> IngestionPipeline<'a> {
    /// Create a pipeline over the given components.
    pub fn new(
        chunker: &'a TextChunker,
        embedder: &'a EmbeddingClient,
        store: &'a KnowledgeStore,
        policy: BatchPolicy,
    ) -> Self {
        Self {
            chunker,
            embedder,
            store,
            policy,
            checkpoint_path: None,
            sleeper: Arc::new(TokioSleeper),
        }
    }

    /// Write a progress checkpoint to this path after every file.
    pub fn with_checkpoint(mut self, path: PathBuf) -> Self {
        self.checkpoint_path = Some(path);
        self
    }

    /// Replace the sleeper (tests skip real pauses with this).
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Run a full ingestion pass over the corpus root.
    ///
    /// Re-running over an unchanged corpus is a no-op: sources already
    /// present in the store are filtered out before any work happens.
    pub async fn run(&self, corpus_root: &Path) -> Result<IngestReport> {
        if !corpus_root.is_dir() {
            return Err(AppError::Configuration(format!(
                "corpus directory '{}' does not exist",
                corpus_root.display()
            )));
        }

        // Scanning.
        let candidates = scan_text_files(corpus_root)?;
        let mut report = IngestReport {
            scanned: candidates.len(),
            ..Default::default()
        };
        info!(count = candidates.len(), root = %corpus_root.display(), "Scanned corpus");

        // Filtering: the store, not the checkpoint, is the source of truth
        // for what is already ingested.
        let existing = self.store.ingested_sources().await;
        let mut new_files: Vec<PathBuf> = candidates
            .into_iter()
            .filter(|path| !existing.contains(&path.to_string_lossy().to_string()))
            .collect();
        report.skipped_existing = report.scanned - new_files.len();

        if self.policy.max_files > 0 && new_files.len() > self.policy.max_files {
            info!(limit = self.policy.max_files, "Limiting files this run");
            new_files.truncate(self.policy.max_files);
        }

        if new_files.is_empty() {
            info!("No new files to ingest");
            return Ok(report);
        }
        info!(count = new_files.len(), "Ingesting new files");

        let total = new_files.len();
        for (index, path) in new_files.iter().enumerate() {
            let source = path.to_string_lossy().to_string();
            info!(file = index + 1, total, source = %source, "Processing file");

            match self.process_file(path, &source).await {
                FileOutcome::Success { chunks_stored } => {
                    report.successful += 1;
                    report.chunks_stored += chunks_stored;
                }
                FileOutcome::Partial {
                    chunks_stored,
                    failures,
                } => {
                    report.failed += 1;
                    report.chunks_stored += chunks_stored;
                    for reason in failures {
                        report.record_failure(reason);
                    }
                }
                FileOutcome::Failed(reason) => {
                    report.failed += 1;
                    report.record_failure(reason);
                }
            }
            report.processed += 1;

            // Durability before throttling: flush the snapshot so an
            // interrupted run loses at most the in-flight file.
            self.store.persist().await;

            if let Some(ref checkpoint_path) = self.checkpoint_path {
                let checkpoint = Checkpoint {
                    processed: report.processed,
                    total,
                    successful: report.successful,
                    failed: report.failed,
                    last_source: source.clone(),
                    timestamp: Utc::now(),
                };
                if let Err(e) = checkpoint.write(checkpoint_path) {
                    warn!(error = %e, "Failed to write checkpoint");
                }
            }

            let is_last = index + 1 == total;
            if !is_last {
                if (index + 1) % self.policy.batch_size == 0 {
                    if !self.policy.batch_pause.is_zero() {
                        info!(
                            pause_secs = self.policy.batch_pause.as_secs(),
                            "Batch complete; pausing to let the embedding service recover"
                        );
                        self.sleeper.sleep(self.policy.batch_pause).await;
                    }
                } else if !self.policy.file_pause.is_zero() {
                    self.sleeper.sleep(self.policy.file_pause).await;
                }
            }
        }

        info!(
            successful = report.successful,
            failed = report.failed,
            "Ingestion run finished"
        );
        Ok(report)
    }

    /// Chunk, embed and store one file. A single chunk's failure never
    /// aborts the file; remaining chunks are still processed.
    async fn process_file(&self, path: &Path, source: &str) -> FileOutcome {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) => {
                warn!(source = %source, error = %e, "Failed to read file");
                return FileOutcome::Failed(FailureReason::ReadFailed);
            }
        };

        let text = text.trim();
        if text.is_empty() {
            info!(source = %source, "Skipping empty file");
            return FileOutcome::Failed(FailureReason::EmptyFile);
        }

        let chunks = self.chunker.chunk(text, source);
        let mut chunks_stored = 0;
        let mut failures = Vec::new();

        for chunk in &chunks {
            match self.embedder.embed(&chunk.text).await {
                Ok(vector) => {
                    if self.store.upsert_chunk(chunk, &vector).await {
                        chunks_stored += 1;
                    } else {
                        failures.push(FailureReason::StorageFailed);
                    }
                }
                Err(e) => {
                    warn!(
                        source = %source,
                        sequence_index = chunk.sequence_index,
                        error = %e,
                        "Skipping chunk; embedding failed"
                    );
                    failures.push(FailureReason::EmbeddingFailed);
                }
            }
        }

        match (chunks_stored, failures.is_empty()) {
            (_, true) => FileOutcome::Success { chunks_stored },
            (0, false) => {
                let reason = failures[0];
                FileOutcome::Failed(reason)
            }
            (_, false) => FileOutcome::Partial {
                chunks_stored,
                failures,
            },
        }
    }
}

/// Recursively list `.txt` files under a root, sorted for determinism.
fn scan_text_files(root: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut stack = vec![root.to_path_buf()];

    while let Some(dir) = stack.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else if path.extension().and_then(|ext| ext.to_str()) == Some("txt") {
                files.push(path);
            }
        }
    }

    files.sort();
    Ok(files)
}

//! Knowledge store: the application's handle to the embedded vector store.
//!
//! Wraps a single `sage-vector` collection with the pipeline's operational
//! semantics: routine failures (a bad upsert, a failed search) are caught,
//! logged and surfaced as `false`/empty values so the ingestion orchestrator
//! can keep going, while configuration problems (missing path, dimension
//! conflict with an existing collection) abort construction with a typed
//! error.

use std::collections::HashSet;

use tracing::{error, info, warn};
use uuid::Uuid;

use sage_vector::{Config as VectorConfig, DistanceMetric, Payload, VectorDb};

use crate::config::StoreSettings;
use crate::types::{AppError, Chunk, Result, ScoredChunk, StoreStats, StoreStatus};

/// Namespace for deterministic point ids. Changing it would re-key every
/// stored point, so it is fixed for the life of the on-disk format.
const POINT_NAMESPACE: Uuid = Uuid::from_u128(0x7a33_c1f4_52d9_4b0e_9a6d_52e8_41c7_90bf_u128);

/// Page size used when scrolling the full collection.
const SCROLL_PAGE_SIZE: usize = 256;

/// Deterministic id for a `(source, sequence_index)` pair.
///
/// Stable across process restarts and re-ingestion runs, so re-ingesting a
/// file updates its points in place instead of duplicating them.
pub fn point_id(source: &str, sequence_index: usize) -> String {
    Uuid::new_v5(
        &POINT_NAMESPACE,
        format!("{}:{}", source, sequence_index).as_bytes(),
    )
    .to_string()
}

/// Handle to one collection of the embedded vector store.
pub struct KnowledgeStore {
    db: VectorDb,
    collection: String,
    dimensions: usize,
}

impl KnowledgeStore {
    /// Open (or create) the on-disk store and its collection.
    ///
    /// Fails when the collection exists with a different dimension than the
    /// configured embedding model produces; that is a configuration error
    /// the run must not paper over.
    pub async fn open(settings: &StoreSettings, dimensions: usize) -> Result<Self> {
        let db = VectorDb::open(VectorConfig::persistent(settings.path.clone()))
            .await
            .map_err(|e| AppError::Storage(format!("failed to open vector store: {}", e)))?;

        Self::with_db(db, &settings.collection, dimensions).await
    }

    /// Open an in-memory store (used by tests and dry runs).
    pub async fn open_in_memory(collection: &str, dimensions: usize) -> Result<Self> {
        let db = VectorDb::open(VectorConfig::memory())
            .await
            .map_err(|e| AppError::Storage(format!("failed to open vector store: {}", e)))?;

        Self::with_db(db, collection, dimensions).await
    }

    async fn with_db(db: VectorDb, collection: &str, dimensions: usize) -> Result<Self> {
        db.ensure_collection(collection, dimensions, DistanceMetric::Cosine)
            .await
            .map_err(|e| match e {
                sage_vector::Error::Configuration(message) => AppError::Configuration(message),
                other => AppError::Storage(other.to_string()),
            })?;

        info!(collection, dimensions, "Knowledge store ready");
        Ok(Self {
            db,
            collection: collection.to_string(),
            dimensions,
        })
    }

    /// Vector dimensionality of the collection.
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Store one chunk's embedding. Returns whether the upsert succeeded.
    ///
    /// A dimension mismatch is logged loudly and rejected; nothing malformed
    /// reaches the collection.
    pub async fn upsert_chunk(&self, chunk: &Chunk, vector: &[f32]) -> bool {
        let collection = match self.db.get_collection(&self.collection) {
            Ok(collection) => collection,
            Err(e) => {
                error!(error = %e, "Vector store collection unavailable");
                return false;
            }
        };

        let id = point_id(&chunk.source, chunk.sequence_index);
        match collection.upsert(&id, vector, Payload::new(chunk.text.clone(), chunk.source.clone()))
        {
            Ok(()) => true,
            Err(sage_vector::Error::DimensionMismatch { expected, actual }) => {
                error!(
                    source = %chunk.source,
                    expected,
                    actual,
                    "Refusing to store vector with wrong dimension"
                );
                false
            }
            Err(e) => {
                error!(source = %chunk.source, error = %e, "Failed to store chunk");
                false
            }
        }
    }

    /// Similarity search. Returns matches at or above `score_threshold`,
    /// best first; an empty vec on any failure.
    pub async fn search(
        &self,
        vector: &[f32],
        limit: usize,
        score_threshold: f32,
    ) -> Vec<ScoredChunk> {
        let collection = match self.db.get_collection(&self.collection) {
            Ok(collection) => collection,
            Err(e) => {
                error!(error = %e, "Vector store collection unavailable");
                return Vec::new();
            }
        };

        match collection.search(vector, limit, score_threshold) {
            Ok(results) => results
                .into_iter()
                .map(|hit| ScoredChunk {
                    score: hit.score,
                    text: hit.payload.text,
                    source: hit.payload.source,
                })
                .collect(),
            Err(e) => {
                error!(error = %e, "Search failed");
                Vec::new()
            }
        }
    }

    /// All distinct source identifiers currently stored.
    ///
    /// Scrolls the whole collection page by page; there is no fixed bound on
    /// collection size.
    pub async fn ingested_sources(&self) -> HashSet<String> {
        let mut sources = HashSet::new();
        let collection = match self.db.get_collection(&self.collection) {
            Ok(collection) => collection,
            Err(e) => {
                error!(error = %e, "Vector store collection unavailable");
                return sources;
            }
        };

        let mut offset: Option<String> = None;
        loop {
            let page = collection.scroll(offset.as_deref(), SCROLL_PAGE_SIZE);
            for point in page.points {
                sources.insert(point.payload.source);
            }
            match page.next_offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }

        sources
    }

    /// Number of stored points.
    pub async fn count(&self) -> usize {
        self.db.count(&self.collection).unwrap_or(0)
    }

    /// Destroy and recreate the collection with the same dimension and
    /// metric. Explicit resets only; nothing calls this implicitly.
    pub async fn clear(&self) -> bool {
        match self.db.recreate_collection(&self.collection).await {
            Ok(()) => {
                info!(collection = %self.collection, "Collection cleared");
                true
            }
            Err(e) => {
                error!(error = %e, "Failed to clear collection");
                false
            }
        }
    }

    /// Store health and size.
    pub async fn stats(&self) -> StoreStats {
        match self.db.collection_stats(&self.collection) {
            Ok(stats) => {
                let status = if stats.point_count == 0 {
                    StoreStatus::Yellow
                } else {
                    StoreStatus::Green
                };
                StoreStats {
                    points: stats.point_count,
                    dimensions: stats.dimensions,
                    metric: stats.metric.name().to_string(),
                    status,
                }
            }
            Err(e) => {
                warn!(error = %e, "Collection stats unavailable");
                StoreStats {
                    points: 0,
                    dimensions: self.dimensions,
                    metric: DistanceMetric::Cosine.name().to_string(),
                    status: StoreStatus::Red,
                }
            }
        }
    }

    /// Flush the collection snapshot to disk. Returns whether it succeeded.
    pub async fn persist(&self) -> bool {
        match self.db.persist().await {
            Ok(()) => true,
            Err(e) => {
                error!(error = %e, "Failed to persist vector store");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(text: &str, source: &str, sequence_index: usize) -> Chunk {
        Chunk {
            text: text.to_string(),
            source: source.to_string(),
            sequence_index,
        }
    }

    #[test]
    fn point_ids_are_deterministic_and_distinct() {
        let a1 = point_id("notes/a.txt", 0);
        let a2 = point_id("notes/a.txt", 0);
        let b = point_id("notes/a.txt", 1);
        let c = point_id("notes/b.txt", 0);

        assert_eq!(a1, a2);
        assert_ne!(a1, b);
        assert_ne!(a1, c);
    }

    #[tokio::test]
    async fn reingesting_same_chunk_does_not_grow_the_store() {
        let store = KnowledgeStore::open_in_memory("test", 3).await.unwrap();
        let chunk = chunk("hello", "a.txt", 0);

        assert!(store.upsert_chunk(&chunk, &[1.0, 0.0, 0.0]).await);
        assert!(store.upsert_chunk(&chunk, &[0.9, 0.1, 0.0]).await);

        assert_eq!(store.count().await, 1);
    }

    #[tokio::test]
    async fn wrong_dimension_upsert_fails_and_leaves_count_unchanged() {
        let store = KnowledgeStore::open_in_memory("test", 3).await.unwrap();

        let ok = store
            .upsert_chunk(&chunk("hello", "a.txt", 0), &[1.0, 0.0])
            .await;

        assert!(!ok);
        assert_eq!(store.count().await, 0);
    }

    #[tokio::test]
    async fn search_on_cleared_store_returns_empty() {
        let store = KnowledgeStore::open_in_memory("test", 2).await.unwrap();
        store
            .upsert_chunk(&chunk("hello", "a.txt", 0), &[1.0, 0.0])
            .await;

        assert!(store.clear().await);

        let results = store.search(&[1.0, 0.0], 5, 0.0).await;
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn identical_content_different_sources_are_distinct() {
        let store = KnowledgeStore::open_in_memory("test", 2).await.unwrap();

        store
            .upsert_chunk(&chunk("same words", "a.txt", 0), &[1.0, 0.0])
            .await;
        store
            .upsert_chunk(&chunk("same words", "b.txt", 0), &[1.0, 0.0])
            .await;

        let sources = store.ingested_sources().await;
        assert_eq!(sources.len(), 2);
        assert!(sources.contains("a.txt"));
        assert!(sources.contains("b.txt"));
        assert_eq!(store.count().await, 2);
    }

    #[tokio::test]
    async fn stats_status_transitions() {
        let store = KnowledgeStore::open_in_memory("test", 2).await.unwrap();

        let empty = store.stats().await;
        assert_eq!(empty.status, StoreStatus::Yellow);
        assert_eq!(empty.points, 0);
        assert_eq!(empty.metric, "cosine");

        store
            .upsert_chunk(&chunk("hello", "a.txt", 0), &[1.0, 0.0])
            .await;
        let filled = store.stats().await;
        assert_eq!(filled.status, StoreStatus::Green);
        assert_eq!(filled.points, 1);
    }

    #[tokio::test]
    async fn dimension_conflict_aborts_open() {
        let db = VectorDb::open(VectorConfig::memory()).await.unwrap();
        db.ensure_collection("test", 384, DistanceMetric::Cosine)
            .await
            .unwrap();

        let result = KnowledgeStore::with_db(db, "test", 768).await;
        assert!(matches!(result, Err(AppError::Configuration(_))));
    }
}

//! Persistence layer for sage-vector.
//!
//! On-disk layout, all JSON:
//!
//! ```text
//! <data_path>/
//!   .lock                          held by the single writing process
//!   collections.json               list of collection names
//!   <collection>/
//!     metadata.json                name, dimensions, metric
//!     points.json                  id + vector + payload per point
//! ```

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::collection::Collection;
use crate::distance::DistanceMetric;
use crate::error::{Error, Result};
use crate::types::{Payload, StoredPoint};

const LOCK_FILE: &str = ".lock";
const INDEX_FILE: &str = "collections.json";

/// Collection metadata stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CollectionMetadata {
    name: String,
    dimensions: usize,
    metric: String,
    point_count: usize,
    saved_at: DateTime<Utc>,
}

/// One persisted point.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredPointData {
    id: String,
    vector: Vec<f32>,
    payload: Payload,
}

/// Prepare a data directory for a persistent database.
///
/// Creates the directory, removes a stale lock file left behind by a crashed
/// prior run, then takes the lock for this process. Removing the lock assumes
/// the previous owner is dead; running two processes against the same path is
/// unsupported and will corrupt state.
pub(crate) async fn prepare_data_dir(path: &Path) -> Result<()> {
    tokio::fs::create_dir_all(path).await?;

    let lock_path = path.join(LOCK_FILE);
    if tokio::fs::metadata(&lock_path).await.is_ok() {
        tokio::fs::remove_file(&lock_path).await?;
        warn!(path = %lock_path.display(), "Removed stale lock file from a previous run");
    }

    tokio::fs::write(&lock_path, std::process::id().to_string()).await?;
    debug!(path = %path.display(), "Data directory ready");
    Ok(())
}

/// Write the collection name index.
pub(crate) async fn write_collection_index(base_path: &Path, names: &[String]) -> Result<()> {
    let index_path = base_path.join(INDEX_FILE);
    let data = serde_json::to_string_pretty(names)
        .map_err(|e| Error::Persistence(format!("Failed to serialize collection index: {}", e)))?;
    tokio::fs::write(&index_path, data).await?;
    Ok(())
}

/// Read the collection name index. A missing index means no collections.
pub(crate) async fn read_collection_index(base_path: &Path) -> Result<Vec<String>> {
    let index_path = base_path.join(INDEX_FILE);
    if tokio::fs::metadata(&index_path).await.is_err() {
        return Ok(Vec::new());
    }

    let data = tokio::fs::read_to_string(&index_path).await?;
    serde_json::from_str(&data)
        .map_err(|e| Error::Persistence(format!("Failed to parse {}: {}", INDEX_FILE, e)))
}

/// Save a collection snapshot to disk.
pub(crate) async fn save_collection(
    base_path: &Path,
    name: &str,
    collection: &Collection,
) -> Result<()> {
    let collection_path = base_path.join(name);
    tokio::fs::create_dir_all(&collection_path).await?;

    let points: Vec<StoredPointData> = collection
        .export_all()
        .into_iter()
        .map(|(id, point)| StoredPointData {
            id,
            vector: point.vector,
            payload: point.payload,
        })
        .collect();

    let metadata = CollectionMetadata {
        name: name.to_string(),
        dimensions: collection.dimensions(),
        metric: collection.metric().name().to_string(),
        point_count: points.len(),
        saved_at: Utc::now(),
    };

    let metadata_json = serde_json::to_string_pretty(&metadata)
        .map_err(|e| Error::Persistence(format!("Failed to serialize metadata: {}", e)))?;
    tokio::fs::write(collection_path.join("metadata.json"), metadata_json).await?;

    let points_json = serde_json::to_string(&points)
        .map_err(|e| Error::Persistence(format!("Failed to serialize points: {}", e)))?;
    tokio::fs::write(collection_path.join("points.json"), points_json).await?;

    debug!(name, count = points.len(), "Saved collection snapshot");
    Ok(())
}

/// Load a collection snapshot from disk.
pub(crate) async fn load_collection(base_path: &Path, name: &str) -> Result<Collection> {
    let collection_path = base_path.join(name);
    if !collection_path.exists() {
        return Err(Error::CollectionNotFound(name.to_string()));
    }

    let metadata_json = tokio::fs::read_to_string(collection_path.join("metadata.json")).await?;
    let metadata: CollectionMetadata = serde_json::from_str(&metadata_json)
        .map_err(|e| Error::Persistence(format!("Failed to parse metadata: {}", e)))?;

    let metric: DistanceMetric = metadata
        .metric
        .parse()
        .map_err(Error::Persistence)?;

    let collection = Collection::new(metadata.name.clone(), metadata.dimensions, metric)?;

    let points_path = collection_path.join("points.json");
    if points_path.exists() {
        let points_json = tokio::fs::read_to_string(&points_path).await?;
        let points: Vec<StoredPointData> = serde_json::from_str(&points_json)
            .map_err(|e| Error::Persistence(format!("Failed to parse points: {}", e)))?;

        let entries: Vec<(String, StoredPoint)> = points
            .into_iter()
            .map(|p| {
                (
                    p.id,
                    StoredPoint {
                        vector: p.vector,
                        payload: p.payload,
                    },
                )
            })
            .collect();
        let loaded = collection.import(entries);
        debug!(name, loaded, "Loaded points from snapshot");
    }

    info!(name, dimensions = metadata.dimensions, "Loaded collection");
    Ok(collection)
}

/// Delete a collection's on-disk files.
pub(crate) async fn delete_collection_files(base_path: &Path, name: &str) -> Result<()> {
    let collection_path: PathBuf = base_path.join(name);
    if collection_path.exists() {
        tokio::fs::remove_dir_all(&collection_path).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn save_load_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let base_path = temp_dir.path().to_path_buf();

        let collection =
            Collection::new("test".to_string(), 3, DistanceMetric::Cosine).unwrap();
        collection
            .upsert("p1", &[1.0, 0.0, 0.0], Payload::new("hello", "a.txt"))
            .unwrap();
        collection
            .upsert("p2", &[0.0, 1.0, 0.0], Payload::new("world", "b.txt"))
            .unwrap();

        save_collection(&base_path, "test", &collection).await.unwrap();

        let loaded = load_collection(&base_path, "test").await.unwrap();
        assert_eq!(loaded.name(), "test");
        assert_eq!(loaded.dimensions(), 3);
        assert_eq!(loaded.metric(), DistanceMetric::Cosine);
        assert_eq!(loaded.len(), 2);

        let (vector, payload) = loaded.get("p1").unwrap();
        assert_eq!(vector, vec![1.0, 0.0, 0.0]);
        assert_eq!(payload.source, "a.txt");
    }

    #[tokio::test]
    async fn load_missing_collection_fails() {
        let temp_dir = TempDir::new().unwrap();
        let result = load_collection(&temp_dir.path().to_path_buf(), "nope").await;
        assert!(matches!(result, Err(Error::CollectionNotFound(_))));
    }

    #[tokio::test]
    async fn stale_lock_removed_on_prepare() {
        let temp_dir = TempDir::new().unwrap();
        let base_path = temp_dir.path().to_path_buf();
        let lock_path = base_path.join(LOCK_FILE);

        std::fs::write(&lock_path, "99999").unwrap();

        prepare_data_dir(&base_path).await.unwrap();

        // The stale lock was replaced with one naming this process.
        let contents = std::fs::read_to_string(&lock_path).unwrap();
        assert_eq!(contents, std::process::id().to_string());
    }

    #[tokio::test]
    async fn collection_index_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let base_path = temp_dir.path().to_path_buf();

        assert!(read_collection_index(&base_path).await.unwrap().is_empty());

        write_collection_index(&base_path, &["transcripts".to_string()])
            .await
            .unwrap();
        let names = read_collection_index(&base_path).await.unwrap();
        assert_eq!(names, vec!["transcripts".to_string()]);
    }
}

//! # sage-vector
//!
//! A pure-Rust embedded vector store: named collections of
//! `(id, vector, payload)` points with exact top-k similarity search.
//!
//! ## Features
//!
//! - **Pure Rust**: no native dependencies, compiles anywhere Rust does
//! - **Exact search**: every query scores against every stored vector, so
//!   score thresholds are exact, not approximate
//! - **Stable ids**: upserting an existing id overwrites the point in place
//! - **Scroll**: paginated, id-ordered payload retrieval with a cursor
//! - **Persistence**: JSON snapshots per collection, stale-lock recovery
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use sage_vector::{Config, DistanceMetric, Payload, VectorDb};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), sage_vector::Error> {
//!     let db = VectorDb::open(Config::memory()).await?;
//!     db.create_collection("transcripts", 768, DistanceMetric::Cosine).await?;
//!
//!     let col = db.get_collection("transcripts")?;
//!     col.upsert("chunk-0", &vec![0.1f32; 768], Payload::new("text", "a.txt"))?;
//!
//!     let hits = col.search(&vec![0.1f32; 768], 3, 0.7)?;
//!     Ok(())
//! }
//! ```
//!
//! ## Concurrency
//!
//! The collection registry is an async-safe `scc::HashMap`; each collection
//! guards its points with a reader-writer lock. The *on-disk* format is
//! strictly single-writer: opening a persistent database takes a `.lock`
//! file, and a stale lock from a crashed run is removed on open. Two live
//! processes sharing a data path will corrupt each other's snapshots.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod collection;
pub mod config;
pub mod distance;
pub mod error;
pub mod persistence;
pub mod types;

// Re-exports for convenience
pub use collection::Collection;
pub use config::Config;
pub use distance::DistanceMetric;
pub use error::{Error, Result};
pub use types::{Payload, PointId, PointRecord, ScrollPage, SearchResult};

use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// The main vector database instance.
///
/// `VectorDb` manages named collections, each holding vectors of one fixed
/// dimensionality and one distance metric. Cloning is cheap; all clones share
/// the same underlying state.
#[derive(Clone)]
pub struct VectorDb {
    inner: Arc<VectorDbInner>,
}

struct VectorDbInner {
    config: Config,
    /// Async-safe concurrent hashmap from the scc crate.
    collections: scc::HashMap<String, Arc<Collection>>,
}

impl VectorDb {
    /// Open or create a vector database with the given configuration.
    ///
    /// For a persistent configuration this prepares the data directory
    /// (removing a stale lock file if one exists) and loads every collection
    /// listed in the on-disk index.
    pub async fn open(config: Config) -> Result<Self> {
        info!(persistent = config.data_path.is_some(), "Opening vector database");

        let db = Self {
            inner: Arc::new(VectorDbInner {
                config: config.clone(),
                collections: scc::HashMap::new(),
            }),
        };

        if let Some(ref path) = config.data_path {
            persistence::prepare_data_dir(path).await?;
            db.load_collections(path).await?;
        }

        Ok(db)
    }

    /// Create a new collection with the specified parameters.
    ///
    /// # Errors
    ///
    /// Returns an error if a collection with the same name already exists.
    pub async fn create_collection(
        &self,
        name: &str,
        dimensions: usize,
        metric: DistanceMetric,
    ) -> Result<()> {
        info!(name, dimensions, %metric, "Creating collection");

        if self.inner.collections.contains(name) {
            return Err(Error::CollectionExists(name.to_string()));
        }

        let collection = Collection::new(name.to_string(), dimensions, metric)?;

        // Insert returns Err if the key appeared in the meantime.
        if self
            .inner
            .collections
            .insert(name.to_string(), Arc::new(collection))
            .is_err()
        {
            return Err(Error::CollectionExists(name.to_string()));
        }

        if let Some(ref path) = self.inner.config.data_path {
            persistence::write_collection_index(path, &self.list_collections()).await?;
        }

        Ok(())
    }

    /// Open an existing collection or create it if missing.
    ///
    /// The collection's dimension and metric are fixed for its lifetime:
    /// if an existing collection disagrees with the requested parameters the
    /// call fails with a configuration error instead of silently migrating.
    /// Changing the embedding model requires an explicit, destructive clear.
    pub async fn ensure_collection(
        &self,
        name: &str,
        dimensions: usize,
        metric: DistanceMetric,
    ) -> Result<Arc<Collection>> {
        if let Some(existing) = self.inner.collections.read(name, |_, v| v.clone()) {
            if existing.dimensions() != dimensions {
                return Err(Error::Configuration(format!(
                    "collection '{}' holds {}-dimensional vectors but the configured \
                     embedding dimension is {}; clearing the collection is required to \
                     change embedding models",
                    name,
                    existing.dimensions(),
                    dimensions
                )));
            }
            if existing.metric() != metric {
                return Err(Error::Configuration(format!(
                    "collection '{}' uses the {} metric but {} was requested",
                    name,
                    existing.metric(),
                    metric
                )));
            }
            return Ok(existing);
        }

        self.create_collection(name, dimensions, metric).await?;
        self.get_collection(name)
    }

    /// Delete a collection and all its data.
    pub async fn delete_collection(&self, name: &str) -> Result<()> {
        info!(name, "Deleting collection");

        if self.inner.collections.remove(name).is_none() {
            return Err(Error::CollectionNotFound(name.to_string()));
        }

        if let Some(ref path) = self.inner.config.data_path {
            persistence::delete_collection_files(path, name).await?;
            persistence::write_collection_index(path, &self.list_collections()).await?;
        }

        Ok(())
    }

    /// Drop every point from a collection, keeping its dimension and metric.
    ///
    /// This is the explicit reset primitive; nothing in the store calls it
    /// implicitly. The emptied snapshot is written straight back to disk for
    /// persistent databases.
    pub async fn recreate_collection(&self, name: &str) -> Result<()> {
        let collection = self.get_collection(name)?;
        info!(name, "Recreating collection");
        collection.clear();

        if let Some(ref path) = self.inner.config.data_path {
            persistence::save_collection(path, name, &collection).await?;
        }

        Ok(())
    }

    /// Check if a collection exists.
    pub fn collection_exists(&self, name: &str) -> bool {
        self.inner.collections.contains(name)
    }

    /// List all collection names.
    pub fn list_collections(&self) -> Vec<String> {
        let mut names = Vec::new();
        self.inner.collections.scan(|k, _| {
            names.push(k.clone());
        });
        names.sort();
        names
    }

    /// Get a reference to a collection.
    pub fn get_collection(&self, name: &str) -> Result<Arc<Collection>> {
        self.inner
            .collections
            .read(name, |_, v| v.clone())
            .ok_or_else(|| Error::CollectionNotFound(name.to_string()))
    }

    /// Get the number of points in a collection.
    pub fn count(&self, name: &str) -> Result<usize> {
        Ok(self.get_collection(name)?.len())
    }

    /// Get collection statistics.
    pub fn collection_stats(&self, name: &str) -> Result<CollectionStats> {
        Ok(self.get_collection(name)?.stats())
    }

    /// Persist the current state of every collection to disk.
    ///
    /// A no-op for in-memory databases.
    pub async fn persist(&self) -> Result<()> {
        let Some(ref path) = self.inner.config.data_path else {
            return Ok(());
        };

        let mut to_persist: Vec<(String, Arc<Collection>)> = Vec::new();
        self.inner.collections.scan(|name, collection| {
            to_persist.push((name.clone(), collection.clone()));
        });

        for (name, collection) in &to_persist {
            persistence::save_collection(path, name, collection).await?;
        }
        persistence::write_collection_index(path, &self.list_collections()).await?;

        Ok(())
    }

    // Internal: load collections listed in the on-disk index.
    async fn load_collections(&self, path: &Path) -> Result<()> {
        for name in persistence::read_collection_index(path).await? {
            match persistence::load_collection(path, &name).await {
                Ok(collection) => {
                    let _ = self
                        .inner
                        .collections
                        .insert(name.clone(), Arc::new(collection));
                    info!(name, "Loaded collection");
                }
                Err(e) => {
                    warn!(name, error = %e, "Failed to load collection, skipping");
                }
            }
        }
        Ok(())
    }
}

/// Statistics about a collection.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CollectionStats {
    /// Name of the collection.
    pub name: String,
    /// Number of points in the collection.
    pub point_count: usize,
    /// Dimensionality of vectors.
    pub dimensions: usize,
    /// Distance metric used.
    pub metric: DistanceMetric,
}

//! Configuration for sage-vector.

use std::path::PathBuf;

/// Configuration for the vector database.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Path to store data on disk. If None, data is kept in memory only.
    pub data_path: Option<PathBuf>,
}

impl Config {
    /// Create an in-memory configuration.
    ///
    /// Data will not be persisted and will be lost when the process exits.
    pub fn memory() -> Self {
        Self::default()
    }

    /// Create a persistent configuration.
    ///
    /// Data will be stored at the specified path and loaded on startup.
    /// Opening a persistent database removes a stale `.lock` left behind by
    /// a crashed process and takes the lock for itself; two live processes
    /// must never share one data path.
    pub fn persistent<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            data_path: Some(path.into()),
        }
    }
}

//! Advisory ingestion checkpoint.
//!
//! Written after every processed file so an interrupted batch run can be
//! inspected from outside. It is informational only: the store's own
//! contents, not this file, decide what counts as already ingested.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{AppError, Result};

/// Progress snapshot of a batch ingestion run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Files handled so far in this run.
    pub processed: usize,
    /// Total files this run set out to handle.
    pub total: usize,
    /// Files stored successfully so far.
    pub successful: usize,
    /// Files that failed so far.
    pub failed: usize,
    /// The most recently handled source.
    pub last_source: String,
    /// When this snapshot was taken.
    pub timestamp: DateTime<Utc>,
}

impl Checkpoint {
    /// Overwrite the checkpoint file with this snapshot.
    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let json = serde_json::to_string_pretty(self)
            .map_err(|e| AppError::Storage(format!("failed to serialize checkpoint: {}", e)))?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Read a checkpoint back (used for monitoring, never for resumption).
    pub fn read(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        serde_json::from_str(&json)
            .map_err(|e| AppError::Storage(format!("failed to parse checkpoint: {}", e)))
    }
}

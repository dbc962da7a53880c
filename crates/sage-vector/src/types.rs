//! Common types for sage-vector.

use serde::{Deserialize, Serialize};

/// Unique identifier for a point in a collection.
pub type PointId = String;

/// Payload stored alongside every vector.
///
/// The schema is fixed on purpose: every point carries the chunk text and the
/// identifier of the source it was cut from. There is no runtime schema
/// discovery; a snapshot written by one version of the store is readable by
/// any other.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    /// The chunk text this vector was computed from.
    pub text: String,
    /// Identifier of the originating source (typically a file path).
    pub source: String,
}

impl Payload {
    /// Create a new payload.
    pub fn new(text: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            source: source.into(),
        }
    }
}

/// Result of a similarity search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// ID of the matched point.
    pub id: PointId,
    /// Similarity score (higher = more similar).
    pub score: f32,
    /// Payload stored with the point.
    pub payload: Payload,
}

/// A point as returned by a scroll pass (no vector data).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointRecord {
    /// ID of the point.
    pub id: PointId,
    /// Payload stored with the point.
    pub payload: Payload,
}

/// One page of a scroll pass over a collection.
///
/// `next_offset` is `None` once the collection is exhausted; otherwise it is
/// the cursor to pass to the next `scroll` call.
#[derive(Debug, Clone)]
pub struct ScrollPage {
    /// Points in this page, ordered by id.
    pub points: Vec<PointRecord>,
    /// Cursor for the next page, if any points remain.
    pub next_offset: Option<PointId>,
}

/// Internal representation of a stored point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct StoredPoint {
    /// The vector data.
    pub vector: Vec<f32>,
    /// Payload attached to the vector.
    pub payload: Payload,
}

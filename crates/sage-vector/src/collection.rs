//! Vector collection.
//!
//! A collection is a named container for points sharing one dimensionality
//! and one distance metric. Search is an exact scan: every stored vector is
//! scored against the query, which keeps scores exact and threshold
//! filtering meaningful for the modest collection sizes this store targets.

use std::collections::BTreeMap;
use std::ops::Bound;

use parking_lot::RwLock;

use crate::distance::DistanceMetric;
use crate::error::{Error, Result};
use crate::types::{Payload, PointRecord, ScrollPage, SearchResult, StoredPoint};
use crate::CollectionStats;

/// A named collection of points.
///
/// Points are kept in an id-ordered map so scroll passes are stable and
/// deterministic. All operations take `&self`; interior mutability is a
/// single reader-writer lock around the point map.
pub struct Collection {
    name: String,
    dimensions: usize,
    metric: DistanceMetric,
    points: RwLock<BTreeMap<String, StoredPoint>>,
}

impl Collection {
    /// Create a new, empty collection.
    pub fn new(name: String, dimensions: usize, metric: DistanceMetric) -> Result<Self> {
        if dimensions == 0 {
            return Err(Error::Configuration(
                "collection dimensions must be non-zero".to_string(),
            ));
        }

        Ok(Self {
            name,
            dimensions,
            metric,
            points: RwLock::new(BTreeMap::new()),
        })
    }

    /// Get the collection name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the vector dimensions.
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Get the distance metric.
    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    /// Get the number of points in the collection.
    pub fn len(&self) -> usize {
        self.points.read().len()
    }

    /// Check if the collection is empty.
    pub fn is_empty(&self) -> bool {
        self.points.read().is_empty()
    }

    /// Insert or overwrite a point.
    ///
    /// A point with the same id is replaced in full (vector and payload).
    /// The vector's length must equal the collection dimensions; a mismatch
    /// is rejected before anything is stored.
    pub fn upsert(&self, id: &str, vector: &[f32], payload: Payload) -> Result<()> {
        self.validate_dimensions(vector)?;
        if vector.iter().any(|v| !v.is_finite()) {
            return Err(Error::InvalidVector(format!(
                "vector for point '{}' contains a non-finite component",
                id
            )));
        }

        self.points.write().insert(
            id.to_string(),
            StoredPoint {
                vector: vector.to_vec(),
                payload,
            },
        );
        Ok(())
    }

    /// Get a point's vector and payload by id.
    pub fn get(&self, id: &str) -> Option<(Vec<f32>, Payload)> {
        self.points
            .read()
            .get(id)
            .map(|p| (p.vector.clone(), p.payload.clone()))
    }

    /// Check if a point exists.
    pub fn contains(&self, id: &str) -> bool {
        self.points.read().contains_key(id)
    }

    /// Delete a point by id. Returns whether it existed.
    pub fn delete(&self, id: &str) -> bool {
        self.points.write().remove(id).is_some()
    }

    /// Search for the most similar points.
    ///
    /// Scores every stored vector against `query`, keeps matches at or above
    /// `score_threshold`, sorts descending and truncates to `limit`. An empty
    /// collection yields an empty result, not an error.
    pub fn search(
        &self,
        query: &[f32],
        limit: usize,
        score_threshold: f32,
    ) -> Result<Vec<SearchResult>> {
        self.validate_dimensions(query)?;

        let points = self.points.read();
        let mut results: Vec<SearchResult> = points
            .iter()
            .filter_map(|(id, point)| {
                let score = self.metric.similarity(query, &point.vector);
                if score >= score_threshold {
                    Some(SearchResult {
                        id: id.clone(),
                        score,
                        payload: point.payload.clone(),
                    })
                } else {
                    None
                }
            })
            .collect();

        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(limit);

        Ok(results)
    }

    /// Scroll through the collection's payloads in id order.
    ///
    /// Pass `None` as `offset` for the first page, then the returned
    /// `next_offset` for each subsequent page. The cursor is exclusive: the
    /// point it names is not repeated. There is no upper bound on the total
    /// number of points a full pass can visit.
    pub fn scroll(&self, offset: Option<&str>, limit: usize) -> ScrollPage {
        let points = self.points.read();

        let mut iter: Box<dyn Iterator<Item = (&String, &StoredPoint)>> = match offset {
            Some(after) => {
                Box::new(points.range::<str, _>((Bound::Excluded(after), Bound::Unbounded)))
            }
            None => Box::new(points.iter()),
        };

        let mut page = Vec::with_capacity(limit.min(points.len()));
        for (id, point) in iter.by_ref() {
            if page.len() >= limit {
                break;
            }
            page.push(PointRecord {
                id: id.clone(),
                payload: point.payload.clone(),
            });
        }

        // Only hand out a cursor when something is actually left to read.
        let next_offset = if page.len() == limit && iter.next().is_some() {
            page.last().map(|p| p.id.clone())
        } else {
            None
        };

        ScrollPage {
            points: page,
            next_offset,
        }
    }

    /// Remove every point, keeping the collection's dimension and metric.
    pub fn clear(&self) {
        self.points.write().clear();
    }

    /// Get collection statistics.
    pub fn stats(&self) -> CollectionStats {
        CollectionStats {
            name: self.name.clone(),
            point_count: self.len(),
            dimensions: self.dimensions,
            metric: self.metric,
        }
    }

    /// Export all points for persistence.
    pub(crate) fn export_all(&self) -> Vec<(String, StoredPoint)> {
        self.points
            .read()
            .iter()
            .map(|(id, point)| (id.clone(), point.clone()))
            .collect()
    }

    /// Bulk-load points from a snapshot, skipping malformed entries.
    pub(crate) fn import(&self, entries: Vec<(String, StoredPoint)>) -> usize {
        let mut loaded = 0;
        for (id, point) in entries {
            match self.upsert(&id, &point.vector, point.payload) {
                Ok(()) => loaded += 1,
                Err(e) => {
                    tracing::warn!(id, error = %e, "Skipping point from snapshot");
                }
            }
        }
        loaded
    }

    fn validate_dimensions(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimensions {
            return Err(Error::DimensionMismatch {
                expected: self.dimensions,
                actual: vector.len(),
            });
        }
        Ok(())
    }
}

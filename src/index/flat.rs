//! Flat L2 vector index over post embeddings.
//!
//! Brute-force Euclidean scan. Position `i` of the packed vector block
//! corresponds to `post_ids[i]`; that positional pairing is the index
//! invariant everything downstream relies on. At the documented cap of
//! 20,000 posts an exhaustive scan stays cheap, so no approximate
//! structure is layered on top.

use crate::eid::Eid;

/// Errors that can occur during index operations.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

#[derive(Debug, Clone)]
pub struct FlatL2Index {
    /// post_ids[i] owns the vector at data[i*dimensions..(i+1)*dimensions]
    post_ids: Vec<Eid>,
    data: Vec<f32>,
    dimensions: usize,
}

/// One nearest-neighbor hit.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub post_id: Eid,
    pub distance: f32,
}

impl FlatL2Index {
    pub fn new(dimensions: usize) -> Self {
        Self {
            post_ids: Vec::new(),
            data: Vec::new(),
            dimensions,
        }
    }

    pub fn with_capacity(dimensions: usize, capacity: usize) -> Self {
        Self {
            post_ids: Vec::with_capacity(capacity),
            data: Vec::with_capacity(capacity * dimensions),
            dimensions,
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn len(&self) -> usize {
        self.post_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.post_ids.is_empty()
    }

    pub fn post_ids(&self) -> &[Eid] {
        &self.post_ids
    }

    /// Append a vector at the next position.
    pub fn push(&mut self, post_id: Eid, embedding: &[f32]) -> Result<(), IndexError> {
        if embedding.len() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                got: embedding.len(),
            });
        }

        self.post_ids.push(post_id);
        self.data.extend_from_slice(embedding);
        Ok(())
    }

    pub fn vector_at(&self, position: usize) -> Option<&[f32]> {
        let start = position * self.dimensions;
        self.data.get(start..start + self.dimensions)
    }

    /// Iterate `(post_id, vector)` pairs in position order.
    pub fn iter(&self) -> impl Iterator<Item = (&Eid, &[f32])> {
        // chunks_exact rejects a zero chunk size; an empty index has
        // no dimensionality yet and must still iterate (to nothing)
        self.post_ids
            .iter()
            .zip(self.data.chunks_exact(self.dimensions.max(1)))
    }

    /// Return up to `k` nearest entries ordered ascending by Euclidean
    /// distance. `k` is clamped to the entry count.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>, IndexError> {
        if self.post_ids.is_empty() {
            return Ok(Vec::new());
        }

        if query.len() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                got: query.len(),
            });
        }

        let mut hits: Vec<SearchHit> = self
            .iter()
            .map(|(id, vector)| SearchHit {
                post_id: id.clone(),
                distance: l2_distance(query, vector),
            })
            .collect();

        hits.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        hits.truncate(k.min(self.post_ids.len()));

        Ok(hits)
    }
}

/// Euclidean distance between two vectors of equal length.
pub fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index_with(vectors: &[&[f32]]) -> (FlatL2Index, Vec<Eid>) {
        let mut index = FlatL2Index::new(vectors[0].len());
        let mut ids = Vec::new();
        for vector in vectors {
            let id = Eid::new();
            index.push(id.clone(), vector).unwrap();
            ids.push(id);
        }
        (index, ids)
    }

    #[test]
    fn test_positional_invariant() {
        let (index, ids) = index_with(&[&[1.0, 0.0], &[0.0, 1.0], &[1.0, 1.0]]);

        assert_eq!(index.len(), 3);
        assert_eq!(index.post_ids(), ids.as_slice());
        assert_eq!(index.vector_at(1).unwrap(), &[0.0, 1.0]);
        assert_eq!(index.data.len(), index.len() * index.dimensions());
    }

    #[test]
    fn test_push_dimension_mismatch() {
        let mut index = FlatL2Index::new(3);
        let result = index.push(Eid::new(), &[1.0, 0.0]);
        assert!(matches!(result, Err(IndexError::DimensionMismatch { .. })));
    }

    #[test]
    fn test_search_orders_by_distance_ascending() {
        let (index, ids) = index_with(&[&[10.0, 0.0], &[1.0, 0.0], &[5.0, 0.0]]);

        let hits = index.search(&[0.0, 0.0], 3).unwrap();
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].post_id, ids[1]);
        assert_eq!(hits[1].post_id, ids[2]);
        assert_eq!(hits[2].post_id, ids[0]);
        assert!(hits[0].distance <= hits[1].distance);
        assert!(hits[1].distance <= hits[2].distance);
    }

    #[test]
    fn test_search_clamps_k() {
        let (index, _) = index_with(&[&[1.0, 0.0], &[0.0, 1.0]]);

        assert_eq!(index.search(&[0.0, 0.0], 100).unwrap().len(), 2);
        assert_eq!(index.search(&[0.0, 0.0], 1).unwrap().len(), 1);
    }

    #[test]
    fn test_search_empty_index() {
        let index = FlatL2Index::new(2);
        assert!(index.search(&[0.0, 0.0], 5).unwrap().is_empty());
    }

    #[test]
    fn test_search_query_dimension_checked() {
        let (index, _) = index_with(&[&[1.0, 0.0]]);
        assert!(index.search(&[1.0], 1).is_err());
    }

    #[test]
    fn test_l2_distance() {
        assert_eq!(l2_distance(&[0.0, 0.0], &[3.0, 4.0]), 5.0);
        assert_eq!(l2_distance(&[1.0, 1.0], &[1.0, 1.0]), 0.0);
    }
}

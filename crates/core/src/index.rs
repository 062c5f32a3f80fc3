//! Exact nearest-neighbor index over one topic's chunk embeddings.

use crate::error::{IngestError, SearchError};
use crate::models::{Chunk, EmbeddingRecord, RetrievedChunk};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DistanceMetric {
    /// Squared L2 distance.
    #[default]
    Euclidean,
    /// Negated dot product, so smaller is still closer.
    InnerProduct,
}

impl DistanceMetric {
    pub fn distance(self, left: &[f32], right: &[f32]) -> f32 {
        match self {
            Self::Euclidean => left
                .iter()
                .zip(right)
                .map(|(a, b)| (a - b) * (a - b))
                .sum(),
            Self::InnerProduct => -left.iter().zip(right).map(|(a, b)| a * b).sum::<f32>(),
        }
    }
}

/// Identity of an ordered chunk set, used to skip redundant rebuilds.
pub fn chunk_fingerprint(chunks: &[Chunk]) -> String {
    let mut hasher = Sha256::new();
    for chunk in chunks {
        hasher.update(chunk.index.to_le_bytes());
        hasher.update(chunk.page.to_le_bytes());
        hasher.update((chunk.text.len() as u64).to_le_bytes());
        hasher.update(chunk.text.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

#[derive(Debug, Clone)]
pub struct FlatIndex {
    metric: DistanceMetric,
    dimensions: usize,
    fingerprint: String,
    records: Vec<EmbeddingRecord>,
}

impl FlatIndex {
    /// Pairs each chunk with its vector; counts and dimensions must line up.
    pub fn build(
        chunks: &[Chunk],
        vectors: Vec<Vec<f32>>,
        dimensions: usize,
        metric: DistanceMetric,
    ) -> Result<Self, IngestError> {
        if chunks.len() != vectors.len() {
            return Err(IngestError::InvalidArgument(format!(
                "embedding count {} doesn't match chunk count {}",
                vectors.len(),
                chunks.len()
            )));
        }

        let records = chunks
            .iter()
            .zip(vectors)
            .map(|(chunk, vector)| {
                if vector.len() != dimensions {
                    return Err(IngestError::DimensionMismatch {
                        expected: dimensions,
                        actual: vector.len(),
                    });
                }
                Ok(EmbeddingRecord {
                    chunk: chunk.clone(),
                    vector,
                })
            })
            .collect::<Result<Vec<_>, IngestError>>()?;

        Ok(Self {
            metric,
            dimensions,
            fingerprint: chunk_fingerprint(chunks),
            records,
        })
    }

    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[EmbeddingRecord] {
        &self.records
    }

    pub fn vectors(&self) -> Vec<Vec<f32>> {
        self.records
            .iter()
            .map(|record| record.vector.clone())
            .collect()
    }

    /// Up to `top_k` chunks by ascending distance; equal distances keep chunk order.
    pub fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<RetrievedChunk>, SearchError> {
        if query.len() != self.dimensions {
            return Err(SearchError::DimensionMismatch {
                expected: self.dimensions,
                actual: query.len(),
            });
        }

        let mut scored: Vec<(f32, &EmbeddingRecord)> = self
            .records
            .iter()
            .map(|record| (self.metric.distance(query, &record.vector), record))
            .collect();

        scored.sort_by(|(left_distance, left), (right_distance, right)| {
            left_distance
                .total_cmp(right_distance)
                .then(left.chunk.index.cmp(&right.chunk.index))
        });

        Ok(scored
            .into_iter()
            .take(top_k)
            .map(|(distance, record)| RetrievedChunk {
                chunk: record.chunk.clone(),
                distance,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(index: u64, text: &str) -> Chunk {
        Chunk {
            text: text.to_string(),
            page: 1,
            index,
        }
    }

    fn sample_index(metric: DistanceMetric) -> FlatIndex {
        let chunks = vec![chunk(0, "a"), chunk(1, "b"), chunk(2, "c"), chunk(3, "d")];
        let vectors = vec![
            vec![1.0, 0.0],
            vec![0.0, 1.0],
            vec![0.7, 0.7],
            vec![-1.0, 0.0],
        ];
        FlatIndex::build(&chunks, vectors, 2, metric).unwrap()
    }

    #[test]
    fn results_are_sorted_by_distance() {
        let index = sample_index(DistanceMetric::Euclidean);
        let hits = index.search(&[0.9, 0.2], 4).unwrap();

        assert_eq!(hits.len(), 4);
        assert!(hits.windows(2).all(|pair| pair[0].distance <= pair[1].distance));
        assert_eq!(hits[0].chunk.index, 0);
        assert_eq!(hits[3].chunk.index, 3);
    }

    #[test]
    fn top_one_is_the_global_nearest() {
        let index = sample_index(DistanceMetric::Euclidean);
        let hits = index.search(&[0.6, 0.8], 1).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.index, 2);
    }

    #[test]
    fn equal_distances_resolve_by_chunk_index() {
        let chunks = vec![chunk(0, "first"), chunk(1, "second"), chunk(2, "third")];
        let vectors = vec![vec![0.0, 1.0], vec![1.0, 0.0], vec![0.0, 1.0]];
        let index = FlatIndex::build(&chunks, vectors, 2, DistanceMetric::Euclidean).unwrap();

        let hits = index.search(&[1.0, 1.0], 3).unwrap();
        let order: Vec<u64> = hits.iter().map(|hit| hit.chunk.index).collect();
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[test]
    fn oversized_k_returns_everything() {
        let index = sample_index(DistanceMetric::Euclidean);
        assert_eq!(index.search(&[0.0, 0.0], 50).unwrap().len(), 4);
    }

    #[test]
    fn empty_index_returns_no_hits() {
        let index = FlatIndex::build(&[], Vec::new(), 8, DistanceMetric::Euclidean).unwrap();
        assert!(index.is_empty());
        assert!(index.search(&[0.0; 8], 3).unwrap().is_empty());
    }

    #[test]
    fn inner_product_prefers_aligned_vectors() {
        let index = sample_index(DistanceMetric::InnerProduct);
        let hits = index.search(&[-2.0, 0.1], 1).unwrap();
        assert_eq!(hits[0].chunk.index, 3);
    }

    #[test]
    fn query_dimension_must_match() {
        let index = sample_index(DistanceMetric::Euclidean);
        let error = index.search(&[1.0, 0.0, 0.0], 1).unwrap_err();
        assert!(matches!(
            error,
            SearchError::DimensionMismatch {
                expected: 2,
                actual: 3
            }
        ));
    }

    #[test]
    fn build_rejects_mismatched_inputs() {
        let chunks = vec![chunk(0, "a")];
        assert!(FlatIndex::build(&chunks, Vec::new(), 2, DistanceMetric::Euclidean).is_err());
        assert!(matches!(
            FlatIndex::build(&chunks, vec![vec![1.0]], 2, DistanceMetric::Euclidean),
            Err(IngestError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn fingerprint_tracks_content() {
        let first = chunk_fingerprint(&[chunk(0, "a"), chunk(1, "b")]);
        let same = chunk_fingerprint(&[chunk(0, "a"), chunk(1, "b")]);
        let other = chunk_fingerprint(&[chunk(0, "a"), chunk(1, "c")]);
        assert_eq!(first, same);
        assert_ne!(first, other);
    }
}

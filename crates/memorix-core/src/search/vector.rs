//! Brute-force cosine-similarity vector side-index, grounded in the
//! teacher's `EmbeddingManager::find_most_similar` / `cosine_similarity`.

use std::collections::HashMap;

use crate::embeddings::cosine_similarity;
use crate::model::ObservationId;

pub struct VectorIndex {
    vectors: HashMap<ObservationId, Vec<f32>>,
}

impl VectorIndex {
    pub fn new() -> Self {
        Self {
            vectors: HashMap::new(),
        }
    }

    pub fn insert(&mut self, id: ObservationId, vector: Vec<f32>) {
        self.vectors.insert(id, vector);
    }

    pub fn remove(&mut self, id: ObservationId) {
        self.vectors.remove(&id);
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn similarity(&self, id: ObservationId, query: &[f32]) -> Option<f32> {
        self.vectors.get(&id).map(|v| cosine_similarity(v, query))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn similarity_is_none_for_unindexed_observation() {
        let index = VectorIndex::new();
        assert_eq!(index.similarity(1, &[1.0, 0.0]), None);
    }

    #[test]
    fn similarity_of_identical_vectors_is_one() {
        let mut index = VectorIndex::new();
        index.insert(1, vec![1.0, 0.0]);
        let score = index.similarity(1, &[1.0, 0.0]).unwrap();
        assert!((score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn remove_clears_the_vector() {
        let mut index = VectorIndex::new();
        index.insert(1, vec![1.0, 0.0]);
        index.remove(1);
        assert_eq!(index.similarity(1, &[1.0, 0.0]), None);
    }
}

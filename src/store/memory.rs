//! In-memory [`VectorStore`] implementation for testing and ephemeral sessions.
//!
//! Uses a `HashMap` behind `std::sync::RwLock` for thread safety.
//! Similarity search is brute-force cosine similarity over all stored vectors.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::models::{IndexedVector, ScoredVector};

use super::{rank, VectorStore};

#[derive(Default)]
pub struct InMemoryStore {
    vectors: RwLock<HashMap<String, IndexedVector>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorStore for InMemoryStore {
    async fn upsert(&self, batch: &[IndexedVector]) -> Result<usize> {
        let mut vectors = self
            .vectors
            .write()
            .map_err(|_| anyhow::anyhow!("in-memory store lock poisoned"))?;
        let mut inserted = 0;
        for v in batch {
            if !vectors.contains_key(&v.id) {
                vectors.insert(v.id.clone(), v.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn similarity_search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredVector>> {
        let vectors = self
            .vectors
            .read()
            .map_err(|_| anyhow::anyhow!("in-memory store lock poisoned"))?;
        let hits = vectors
            .values()
            .map(|v| ScoredVector {
                score: cosine_similarity(query, &v.embedding),
                vector: v.clone(),
            })
            .collect();
        Ok(rank(hits, k))
    }

    async fn count(&self) -> Result<usize> {
        let vectors = self
            .vectors
            .read()
            .map_err(|_| anyhow::anyhow!("in-memory store lock poisoned"))?;
        Ok(vectors.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::VectorMetadata;

    fn v(id: &str, path: &str, embedding: Vec<f32>) -> IndexedVector {
        IndexedVector {
            id: id.to_string(),
            embedding,
            chunk_text: format!("text of {id}"),
            metadata: VectorMetadata {
                source_path: path.to_string(),
                start_offset: 0,
            },
        }
    }

    #[tokio::test]
    async fn test_upsert_dedupes_by_id() {
        let store = InMemoryStore::new();
        let batch = vec![v("1", "a.md", vec![1.0, 0.0]), v("2", "b.md", vec![0.0, 1.0])];
        assert_eq!(store.upsert(&batch).await.unwrap(), 2);
        assert_eq!(store.upsert(&batch).await.unwrap(), 0);
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_similarity_search_top_k() {
        let store = InMemoryStore::new();
        store
            .upsert(&[
                v("1", "a.md", vec![1.0, 0.0]),
                v("2", "b.md", vec![0.0, 1.0]),
                v("3", "c.md", vec![0.7, 0.7]),
            ])
            .await
            .unwrap();
        let hits = store.similarity_search(&[1.0, 0.1], 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].vector.id, "1");
        assert_eq!(hits[1].vector.id, "3");
        assert!(hits[0].score >= hits[1].score);
    }

    #[tokio::test]
    async fn test_empty_store_search() {
        let store = InMemoryStore::new();
        assert!(store.similarity_search(&[1.0], 5).await.unwrap().is_empty());
    }
}

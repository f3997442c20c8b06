//! Core data models used throughout the vault harness.
//!
//! These types represent the documents, chunks, vectors, and answers that
//! flow through the ingestion and retrieval pipeline.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A note read from the vault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub text: String,
    /// Path relative to the vault root, `/`-separated.
    pub source_path: String,
}

/// A contiguous window of a [`Document`]'s text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Stable identity, see [`chunk_id`].
    pub id: String,
    pub text: String,
    pub source_path: String,
    /// Character (not byte) offset of the first character in the parent text.
    pub start_offset: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorMetadata {
    pub source_path: String,
    pub start_offset: usize,
}

/// An embedded chunk as persisted by a [`VectorStore`](crate::store::VectorStore).
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedVector {
    pub id: String,
    pub embedding: Vec<f32>,
    pub chunk_text: String,
    pub metadata: VectorMetadata,
}

impl IndexedVector {
    pub fn from_chunk(chunk: &Chunk, embedding: Vec<f32>) -> Self {
        Self {
            id: chunk.id.clone(),
            embedding,
            chunk_text: chunk.text.clone(),
            metadata: VectorMetadata {
                source_path: chunk.source_path.clone(),
                start_offset: chunk.start_offset,
            },
        }
    }
}

/// A similarity search hit.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredVector {
    pub vector: IndexedVector,
    /// Cosine similarity in `[-1.0, 1.0]`.
    pub score: f32,
}

/// A grounded answer plus the notes it was derived from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Answer {
    pub text: String,
    /// Deduplicated and sorted source paths.
    pub sources: Vec<String>,
}

/// Hex SHA-256 over `source_path`, `start_offset` and `text`.
///
/// Identical chunks from a re-run hash to the same id, which is what lets
/// store upserts dedupe.
pub fn chunk_id(source_path: &str, start_offset: usize, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source_path.as_bytes());
    hasher.update([0u8]);
    hasher.update(start_offset.to_le_bytes());
    hasher.update([0u8]);
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

//! Vector storage abstraction.
//!
//! The [`VectorStore`] trait is the whole contract the pipeline has with its
//! storage engine: upsert embedded chunks, then rank them by similarity to a
//! query vector. Eviction, compaction, and versioning are the engine's own
//! business.
//!
//! | Implementation | Durability | Use |
//! |----------------|------------|-----|
//! | [`memory::InMemoryStore`] | process lifetime | tests, throwaway sessions |
//! | [`sqlite::SqliteVectorStore`] | on disk | the CLI and server |
//!
//! Upserts dedupe by [`IndexedVector::id`], so submitting the same chunk
//! twice (e.g. after a failed run is retried) stores it once.

pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use crate::models::{IndexedVector, ScoredVector};

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert vectors whose id is not yet stored. Returns how many were new.
    ///
    /// Once this returns `Ok`, later searches on this store (or a reopened
    /// handle to the same location) can return the data.
    async fn upsert(&self, batch: &[IndexedVector]) -> Result<usize>;

    /// The `k` stored vectors most similar to `query`, best first.
    async fn similarity_search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredVector>>;

    /// Number of stored vectors.
    async fn count(&self) -> Result<usize>;
}

/// Sort hits best-first (ties broken by id for stable output) and keep `k`.
pub(crate) fn rank(mut hits: Vec<ScoredVector>, k: usize) -> Vec<ScoredVector> {
    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.vector.id.cmp(&b.vector.id))
    });
    hits.truncate(k);
    hits
}

/// Short stable identifier for a vault root.
///
/// The root is canonicalized first when possible, so `./notes` and
/// `/home/me/notes` map to the same key.
pub fn vault_key(vault_root: &Path) -> String {
    let canonical = vault_root
        .canonicalize()
        .unwrap_or_else(|_| vault_root.to_path_buf());
    let mut hasher = Sha256::new();
    hasher.update(canonical.to_string_lossy().as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..16].to_string()
}

/// Location of the persistent store for `vault_root` under `data_dir`.
///
/// Each vault gets its own file, so indexing a second vault never mixes
/// its vectors into the first one's index.
pub fn store_path_for(data_dir: &Path, vault_root: &Path) -> PathBuf {
    data_dir.join(format!("{}.sqlite", vault_key(vault_root)))
}

//! Batched, rate-limited embedding of chunks into a vector store.
//!
//! Each batch costs exactly one provider request, and every request first
//! takes a token from the shared [`RequestPacer`]. With the default bucket
//! capacity of one, that spaces requests `batch_delay_secs` apart and never
//! waits after the final batch.
//!
//! Any failing batch aborts the run with [`VaultError::Indexing`]. Batches
//! already upserted stay in the store; a retry skips them cheaply because
//! upserts dedupe by chunk id.

use std::sync::Arc;
use std::time::Instant;

use anyhow::bail;
use tokio_util::sync::CancellationToken;

use crate::embedding::EmbeddingProvider;
use crate::error::{VaultError, VaultResult};
use crate::models::{Chunk, IndexedVector};
use crate::ratelimit::RequestPacer;
use crate::store::VectorStore;

/// Outcome of one [`Indexer::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IndexReport {
    pub chunks: usize,
    pub batches: usize,
    /// Vectors that were not already in the store.
    pub inserted: usize,
}

pub struct Indexer {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    pacer: RequestPacer,
    batch_size: usize,
}

impl Indexer {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        pacer: RequestPacer,
        batch_size: usize,
    ) -> Self {
        Self {
            embedder,
            store,
            pacer,
            batch_size: batch_size.max(1),
        }
    }

    pub async fn run(&self, chunks: &[Chunk], cancel: &CancellationToken) -> VaultResult<IndexReport> {
        let total = chunks.len().div_ceil(self.batch_size);
        let start = Instant::now();
        let mut report = IndexReport {
            chunks: chunks.len(),
            ..IndexReport::default()
        };

        for (i, batch) in chunks.chunks(self.batch_size).enumerate() {
            if cancel.is_cancelled() {
                return Err(VaultError::Cancelled);
            }
            self.pacer.acquire(cancel).await?;

            let inserted = self
                .index_batch(batch)
                .await
                .map_err(|source| VaultError::Indexing { batch: i, source })?;

            report.batches += 1;
            report.inserted += inserted;
            tracing::info!(
                batch = i + 1,
                total,
                chunks = batch.len(),
                inserted,
                "indexed batch {}/{}",
                i + 1,
                total
            );
        }

        tracing::info!(
            chunks = report.chunks,
            batches = report.batches,
            inserted = report.inserted,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "indexing complete"
        );
        Ok(report)
    }

    async fn index_batch(&self, batch: &[Chunk]) -> anyhow::Result<usize> {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embedder.embed(&texts).await?;

        if vectors.len() != batch.len() {
            bail!(
                "provider returned {} embeddings for {} chunks",
                vectors.len(),
                batch.len()
            );
        }
        if let Some(dims) = self.embedder.dims() {
            if let Some(bad) = vectors.iter().find(|v| v.len() != dims) {
                bail!("expected {}-dimensional embeddings, got {}", dims, bad.len());
            }
        }

        let indexed: Vec<IndexedVector> = batch
            .iter()
            .zip(vectors)
            .map(|(chunk, embedding)| IndexedVector::from_chunk(chunk, embedding))
            .collect();
        self.store.upsert(&indexed).await
    }
}

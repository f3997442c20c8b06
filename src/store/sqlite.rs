//! SQLite-backed [`VectorStore`] implementation.
//!
//! One database file per vault (see [`super::store_path_for`]). Embeddings
//! are stored as little-endian `f32` blobs and ranked with a brute-force
//! cosine scan, which is plenty for a personal notes vault.
//!
//! Alongside the vectors, the `index_meta` table records which vault and
//! embedding model produced the index, so a later session can refuse to
//! mix vectors from two different embedding spaces. It also carries the
//! completion marker: written only after a full indexing run succeeds and
//! cleared when the next run starts, so a store left behind by an
//! interrupted run is never resumed as if it were whole.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use std::path::Path;

use crate::db;
use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::error::{VaultError, VaultResult};
use crate::migrate;
use crate::models::{IndexedVector, ScoredVector, VectorMetadata};

use super::{rank, VectorStore};

pub const META_VAULT_ROOT: &str = "vault_root";
pub const META_EMBEDDING_MODEL: &str = "embedding_model";
pub const META_EMBEDDING_DIMS: &str = "embedding_dims";
/// Vector count recorded by the last indexing run that finished.
pub const META_INDEX_COMPLETE: &str = "index_complete";

pub struct SqliteVectorStore {
    pool: SqlitePool,
}

impl SqliteVectorStore {
    /// Open (creating and migrating if needed) the store at `path`.
    pub async fn open(path: &Path) -> Result<Self> {
        let pool = db::connect(path).await?;
        migrate::run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn get_meta(&self, key: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT value FROM index_meta WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get("value")))
    }

    pub async fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO index_meta (key, value) VALUES (?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Bind this store to `vault_root` and `model`.
    ///
    /// A fresh store records both. A store that already holds vectors from
    /// a different embedding model is rejected with
    /// [`VaultError::EmbeddingMismatch`].
    pub async fn claim(&self, vault_root: &Path, model: &str) -> VaultResult<()> {
        let stored = self
            .get_meta(META_EMBEDDING_MODEL)
            .await
            .map_err(VaultError::Store)?;
        match stored {
            Some(stored) if stored != model => {
                let count = self.count().await.map_err(VaultError::Store)?;
                if count > 0 {
                    return Err(VaultError::EmbeddingMismatch {
                        stored,
                        configured: model.to_string(),
                    });
                }
            }
            _ => {}
        }

        self.set_meta(META_EMBEDDING_MODEL, model)
            .await
            .map_err(VaultError::Store)?;
        self.set_meta(META_VAULT_ROOT, &vault_root.to_string_lossy())
            .await
            .map_err(VaultError::Store)?;
        Ok(())
    }

    /// Dimensionality of the stored vectors, if any have been written.
    pub async fn dims(&self) -> Result<Option<usize>> {
        Ok(self
            .get_meta(META_EMBEDDING_DIMS)
            .await?
            .and_then(|v| v.parse().ok()))
    }

    /// Forget that a previous run finished. Called before a run writes
    /// anything, so the marker never outlives a partial run.
    pub async fn clear_complete(&self) -> Result<()> {
        sqlx::query("DELETE FROM index_meta WHERE key = ?")
            .bind(META_INDEX_COMPLETE)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Record that a run finished with `vectors` vectors stored.
    pub async fn mark_complete(&self, vectors: usize) -> Result<()> {
        self.set_meta(META_INDEX_COMPLETE, &vectors.to_string()).await
    }

    /// Vector count of the last finished run, or `None` if the most recent
    /// run never finished.
    pub async fn completed_vectors(&self) -> Result<Option<usize>> {
        Ok(self
            .get_meta(META_INDEX_COMPLETE)
            .await?
            .and_then(|v| v.parse().ok()))
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn upsert(&self, batch: &[IndexedVector]) -> Result<usize> {
        if batch.is_empty() {
            return Ok(0);
        }

        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0usize;

        for v in batch {
            let result = sqlx::query(
                r#"
                INSERT INTO vectors (id, source_path, start_offset, chunk_text, embedding, dims, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO NOTHING
                "#,
            )
            .bind(&v.id)
            .bind(&v.metadata.source_path)
            .bind(v.metadata.start_offset as i64)
            .bind(&v.chunk_text)
            .bind(vec_to_blob(&v.embedding))
            .bind(v.embedding.len() as i64)
            .bind(now)
            .execute(&mut *tx)
            .await?;
            inserted += result.rows_affected() as usize;
        }

        sqlx::query(
            r#"
            INSERT INTO index_meta (key, value) VALUES (?, ?)
            ON CONFLICT(key) DO NOTHING
            "#,
        )
        .bind(META_EMBEDDING_DIMS)
        .bind(batch[0].embedding.len().to_string())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(inserted)
    }

    async fn similarity_search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredVector>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            "SELECT id, source_path, start_offset, chunk_text, embedding FROM vectors",
        )
        .fetch_all(&self.pool)
        .await?;

        let hits = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let embedding = blob_to_vec(&blob);
                let start_offset: i64 = row.get("start_offset");
                ScoredVector {
                    score: cosine_similarity(query, &embedding),
                    vector: IndexedVector {
                        id: row.get("id"),
                        embedding,
                        chunk_text: row.get("chunk_text"),
                        metadata: VectorMetadata {
                            source_path: row.get("source_path"),
                            start_offset: start_offset.max(0) as usize,
                        },
                    },
                }
            })
            .collect();

        Ok(rank(hits, k))
    }

    async fn count(&self) -> Result<usize> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM vectors")
            .fetch_one(&self.pool)
            .await?;
        let n: i64 = row.get("n");
        Ok(n.max(0) as usize)
    }
}

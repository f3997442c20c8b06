//! Session state: the one place that knows whether a vault is ready.
//!
//! A [`Session`] is either empty or holds a fully built [`ActiveIndex`]
//! (store, engine and vault metadata together). Setup builds the next index
//! off to the side and publishes it with a single pointer swap once every
//! step has succeeded, so readers never observe a half-built index and a
//! failed re-setup leaves the previous one in service.
//!
//! ```text
//! initialize_index(root)
//!   ├── validate root
//!   ├── build providers        (credential check, no network)
//!   ├── open store             (<data_dir>/<vault key>.sqlite)
//!   ├── load + chunk           (NoDocuments if nothing to index)
//!   ├── index                  (paced, one request per batch)
//!   ├── mark complete          (index_meta, only after every batch landed)
//!   └── publish                (swap Arc under write lock)
//! ```
//!
//! The on-disk store can outlive a cancelled or failed run with only some
//! batches written. [`Session::open_existing`] resumes a store only if its
//! completion marker is present.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tokio_util::sync::CancellationToken;

use crate::chat::{create_chat_provider, ChatProvider};
use crate::chunk::{chunk_documents, ChunkParams};
use crate::config::{validate, Config};
use crate::embedding::{create_provider, EmbeddingProvider};
use crate::engine::AnsweringEngine;
use crate::error::{VaultError, VaultResult};
use crate::indexer::Indexer;
use crate::loader::load_documents;
use crate::models::Answer;
use crate::ratelimit::{Clock, RequestPacer, TokioClock};
use crate::store::sqlite::SqliteVectorStore;
use crate::store::{store_path_for, VectorStore};

/// What [`Session::status`] reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    Uninitialized,
    Initializing,
    Ready { vault: PathBuf, chunks: usize },
}

impl SessionStatus {
    pub fn label(&self) -> &'static str {
        match self {
            SessionStatus::Uninitialized => "uninitialized",
            SessionStatus::Initializing => "initializing",
            SessionStatus::Ready { .. } => "ready",
        }
    }
}

/// Outcome of a successful [`Session::initialize_index`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSummary {
    pub vault: PathBuf,
    pub store_path: PathBuf,
    pub documents: usize,
    pub skipped: usize,
    pub chunks: usize,
    pub batches: usize,
    /// Vectors new to the store; zero when re-indexing an unchanged vault.
    pub inserted: usize,
    /// Vectors in the store after indexing.
    pub total_vectors: usize,
}

struct ActiveIndex {
    vault: PathBuf,
    vectors: usize,
    engine: AnsweringEngine,
}

struct Providers {
    embedder: Arc<dyn EmbeddingProvider>,
    chat: Arc<dyn ChatProvider>,
}

pub struct Session {
    config: Config,
    injected: Option<Providers>,
    clock: Arc<dyn Clock>,
    setup_lock: tokio::sync::Mutex<()>,
    initializing: AtomicBool,
    active: RwLock<Option<Arc<ActiveIndex>>>,
}

/// Clears the initializing flag however setup exits.
struct InitializingGuard<'a>(&'a AtomicBool);

impl Drop for InitializingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Session {
    /// A session that builds its providers from `config` at setup time.
    pub fn new(config: Config) -> Self {
        Self {
            config,
            injected: None,
            clock: Arc::new(TokioClock::new()),
            setup_lock: tokio::sync::Mutex::new(()),
            initializing: AtomicBool::new(false),
            active: RwLock::new(None),
        }
    }

    /// A session that uses the given providers instead of resolving them.
    pub fn with_providers(
        config: Config,
        embedder: Arc<dyn EmbeddingProvider>,
        chat: Arc<dyn ChatProvider>,
    ) -> Self {
        Self {
            injected: Some(Providers { embedder, chat }),
            ..Self::new(config)
        }
    }

    /// Replace the clock used to pace indexing requests.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn status(&self) -> SessionStatus {
        if self.initializing.load(Ordering::SeqCst) {
            return SessionStatus::Initializing;
        }
        match self.snapshot() {
            Some(active) => SessionStatus::Ready {
                vault: active.vault.clone(),
                chunks: active.vectors,
            },
            None => SessionStatus::Uninitialized,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.snapshot().is_some()
    }

    pub async fn initialize_index(&self, root: &Path) -> VaultResult<IndexSummary> {
        self.initialize_index_with_cancel(root, &CancellationToken::new())
            .await
    }

    /// Like [`Session::initialize_index`], aborting between batches once
    /// `cancel` fires.
    pub async fn initialize_index_with_cancel(
        &self,
        root: &Path,
        cancel: &CancellationToken,
    ) -> VaultResult<IndexSummary> {
        let _setup = self.setup_lock.lock().await;
        self.initializing.store(true, Ordering::SeqCst);
        let _guard = InitializingGuard(&self.initializing);

        let result = self.build_index(root, cancel).await;
        match result {
            Ok((active, summary)) => {
                self.publish(active);
                tracing::info!(
                    vault = %summary.vault.display(),
                    documents = summary.documents,
                    chunks = summary.chunks,
                    inserted = summary.inserted,
                    "vault ready"
                );
                Ok(summary)
            }
            Err(e) => {
                tracing::warn!(error = %e, code = e.code(), "setup failed; keeping previous index");
                Err(e)
            }
        }
    }

    async fn build_index(
        &self,
        root: &Path,
        cancel: &CancellationToken,
    ) -> VaultResult<(ActiveIndex, IndexSummary)> {
        check_config(&self.config)?;
        let vault = canonical_root(root)?;
        let params = ChunkParams::new(
            self.config.chunking.chunk_size,
            self.config.chunking.chunk_overlap,
        )?;
        let providers = self.providers()?;

        let store_path = store_path_for(&self.config.store.data_dir, &vault);
        let sqlite = open_store(&store_path, &vault, providers.embedder.model_name()).await?;
        let store: Arc<dyn VectorStore> = sqlite.clone();

        let report = load_documents(&vault, &self.config.loader).await?;
        for skipped in &report.skipped {
            tracing::warn!(path = %skipped.source_path, reason = %skipped.reason, "skipped file");
        }
        let chunks = chunk_documents(&report.documents, &params);
        if chunks.is_empty() {
            return Err(VaultError::NoDocuments(vault));
        }
        tracing::info!(
            documents = report.documents.len(),
            chunks = chunks.len(),
            "loaded vault"
        );

        let pacer = RequestPacer::from_config(&self.config.indexer, self.clock.clone());
        let indexer = Indexer::new(
            providers.embedder.clone(),
            store.clone(),
            pacer,
            self.config.indexer.batch_size,
        );
        sqlite.clear_complete().await.map_err(VaultError::Store)?;
        let indexed = indexer.run(&chunks, cancel).await?;
        let total_vectors = store.count().await.map_err(VaultError::Store)?;
        sqlite
            .mark_complete(total_vectors)
            .await
            .map_err(VaultError::Store)?;

        let engine = self.engine(&providers, store);
        let summary = IndexSummary {
            vault: vault.clone(),
            store_path,
            documents: report.documents.len(),
            skipped: report.skipped.len(),
            chunks: indexed.chunks,
            batches: indexed.batches,
            inserted: indexed.inserted,
            total_vectors,
        };
        let active = ActiveIndex {
            vault,
            vectors: total_vectors,
            engine,
        };
        Ok((active, summary))
    }

    /// Resume a previously indexed vault from its persistent store, without
    /// re-embedding anything.
    ///
    /// Fails with [`VaultError::Uninitialized`] when the vault was never
    /// indexed, or when its most recent indexing run did not finish.
    pub async fn open_existing(&self, root: &Path) -> VaultResult<usize> {
        let _setup = self.setup_lock.lock().await;

        check_config(&self.config)?;
        let vault = canonical_root(root)?;
        let store_path = store_path_for(&self.config.store.data_dir, &vault);
        if !store_path.exists() {
            return Err(VaultError::Uninitialized);
        }

        let providers = self.providers()?;
        let sqlite = SqliteVectorStore::open(&store_path)
            .await
            .map_err(VaultError::Store)?;
        let vectors = sqlite.count().await.map_err(VaultError::Store)?;
        if vectors == 0 {
            return Err(VaultError::Uninitialized);
        }
        if sqlite
            .completed_vectors()
            .await
            .map_err(VaultError::Store)?
            .is_none()
        {
            tracing::warn!(
                vault = %vault.display(),
                vectors,
                "last indexing run did not finish; re-run index before asking"
            );
            return Err(VaultError::Uninitialized);
        }
        sqlite
            .claim(&vault, providers.embedder.model_name())
            .await?;

        let store: Arc<dyn VectorStore> = Arc::new(sqlite);
        let engine = self.engine(&providers, store);
        tracing::info!(vault = %vault.display(), vectors, "opened existing index");
        self.publish(ActiveIndex {
            vault,
            vectors,
            engine,
        });
        Ok(vectors)
    }

    /// Answer `query` against the active index.
    ///
    /// Fails with [`VaultError::Uninitialized`] (and touches no provider)
    /// until an index has been published.
    pub async fn answer_query(&self, query: &str) -> VaultResult<Answer> {
        let active = self.snapshot().ok_or(VaultError::Uninitialized)?;
        active.engine.answer(query).await
    }

    fn snapshot(&self) -> Option<Arc<ActiveIndex>> {
        self.active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn publish(&self, active: ActiveIndex) {
        let mut slot = self.active.write().unwrap_or_else(PoisonError::into_inner);
        *slot = Some(Arc::new(active));
    }

    fn providers(&self) -> VaultResult<Providers> {
        if let Some(injected) = &self.injected {
            return Ok(Providers {
                embedder: injected.embedder.clone(),
                chat: injected.chat.clone(),
            });
        }
        let embedder = create_provider(&self.config.embedding).map_err(VaultError::from_anyhow)?;
        let chat = create_chat_provider(&self.config.chat).map_err(VaultError::from_anyhow)?;
        Ok(Providers {
            embedder: Arc::from(embedder),
            chat: Arc::from(chat),
        })
    }

    fn engine(&self, providers: &Providers, store: Arc<dyn VectorStore>) -> AnsweringEngine {
        AnsweringEngine::new(
            providers.embedder.clone(),
            store,
            providers.chat.clone(),
            &self.config.retrieval,
            &self.config.chat,
        )
    }
}

fn check_config(config: &Config) -> VaultResult<()> {
    validate(config).map_err(|e| VaultError::Config(format!("{:#}", e)))
}

fn canonical_root(root: &Path) -> VaultResult<PathBuf> {
    if !root.is_dir() {
        return Err(VaultError::InvalidRoot(root.to_path_buf()));
    }
    root.canonicalize()
        .map_err(|_| VaultError::InvalidRoot(root.to_path_buf()))
}

async fn open_store(path: &Path, vault: &Path, model: &str) -> VaultResult<Arc<SqliteVectorStore>> {
    let store = SqliteVectorStore::open(path)
        .await
        .map_err(VaultError::Store)?;
    store.claim(vault, model).await?;
    Ok(Arc::new(store))
}

//! Error taxonomy for the indexing and answering pipeline.
//!
//! Internals use [`anyhow`] the way the rest of the crate does; anything that
//! crosses the [`Session`](crate::session::Session) boundary is a
//! [`VaultError`] so callers can tell "set up first" apart from "the
//! provider fell over" and react differently.

use std::path::PathBuf;
use thiserror::Error;

/// Broad class of a [`VaultError`], used to pick a user-facing message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Caught before any provider call; the user must fix something.
    Configuration,
    /// The indexing run was aborted; no partial index was published.
    Ingestion,
    /// Answering a question failed.
    Query,
}

#[derive(Error, Debug)]
pub enum VaultError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("vault root does not exist or is not a directory: {}", .0.display())]
    InvalidRoot(PathBuf),

    #[error("{0} environment variable not set")]
    MissingCredential(String),

    #[error("chunk_overlap ({overlap}) must be smaller than chunk_size ({size}), and chunk_size must be > 0")]
    InvalidChunking { size: usize, overlap: usize },

    #[error("index was built with embedding model '{stored}' but '{configured}' is configured; re-index or restore the original model")]
    EmbeddingMismatch { stored: String, configured: String },

    #[error("no documents found under {}", .0.display())]
    NoDocuments(PathBuf),

    #[error("indexing failed at batch {batch}: {source}")]
    Indexing {
        batch: usize,
        #[source]
        source: anyhow::Error,
    },

    #[error("indexing cancelled")]
    Cancelled,

    #[error("vector store error: {0}")]
    Store(#[source] anyhow::Error),

    #[error("the vault has not been initialized yet; run setup first")]
    Uninitialized,

    #[error("query must not be empty")]
    EmptyQuery,

    #[error("failed to generate answer: {0}")]
    Generation(#[source] anyhow::Error),
}

impl VaultError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            VaultError::Config(_)
            | VaultError::InvalidRoot(_)
            | VaultError::MissingCredential(_)
            | VaultError::InvalidChunking { .. }
            | VaultError::EmbeddingMismatch { .. } => ErrorKind::Configuration,
            VaultError::NoDocuments(_)
            | VaultError::Indexing { .. }
            | VaultError::Cancelled
            | VaultError::Store(_) => ErrorKind::Ingestion,
            VaultError::Uninitialized | VaultError::EmptyQuery | VaultError::Generation(_) => {
                ErrorKind::Query
            }
        }
    }

    /// Stable machine-readable code, used in HTTP error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            VaultError::Config(_) => "invalid_config",
            VaultError::InvalidRoot(_) => "invalid_root",
            VaultError::MissingCredential(_) => "missing_credential",
            VaultError::InvalidChunking { .. } => "invalid_chunking",
            VaultError::EmbeddingMismatch { .. } => "embedding_mismatch",
            VaultError::NoDocuments(_) => "no_documents",
            VaultError::Indexing { .. } => "indexing_failed",
            VaultError::Cancelled => "cancelled",
            VaultError::Store(_) => "store_error",
            VaultError::Uninitialized => "not_initialized",
            VaultError::EmptyQuery => "bad_request",
            VaultError::Generation(_) => "generation_failed",
        }
    }

    /// Recover a typed error that was threaded through an `anyhow` chain,
    /// e.g. a credential check inside a provider constructor.
    pub fn from_anyhow(err: anyhow::Error) -> Self {
        match err.downcast::<VaultError>() {
            Ok(vault_err) => vault_err,
            Err(other) => VaultError::Config(format!("{:#}", other)),
        }
    }
}

pub type VaultResult<T> = std::result::Result<T, VaultError>;

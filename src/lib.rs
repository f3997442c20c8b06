//! # Vault Harness
//!
//! Retrieval-augmented question answering over a personal notes vault.
//!
//! Vault Harness walks a folder of Markdown notes, splits them into
//! overlapping chunks, embeds the chunks under a provider's rate limit, and
//! persists the vectors in SQLite. Questions are answered by retrieving the
//! closest chunks and handing them to a chat model, together with the list
//! of notes the answer drew on.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌─────────┐   ┌───────────┐   ┌──────────┐
//! │  Loader  │──▶│ Chunker │──▶│  Indexer  │──▶│  SQLite  │
//! │  **/*.md │   │ 2000/400│   │ paced     │   │  vectors │
//! └──────────┘   └─────────┘   └───────────┘   └────┬─────┘
//!                                                   │
//!                  ┌──────────────┐           ┌─────▼─────┐
//!  CLI / HTTP ────▶│   Session    │──────────▶│  Engine   │──▶ chat model
//!                  └──────────────┘           └───────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! vault index ~/notes
//! vault ask --vault ~/notes "what colour is the sky?"
//! vault serve --vault ~/notes
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Typed error taxonomy |
//! | [`models`] | Core data types |
//! | [`loader`] | Vault discovery and concurrent reads |
//! | [`chunk`] | Overlapping fixed-window chunking |
//! | [`ratelimit`] | Token-bucket request pacing |
//! | [`indexer`] | Batched embedding into the store |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`chat`] | Chat-completion provider abstraction |
//! | [`store`] | Vector store trait, in-memory and SQLite backends |
//! | [`engine`] | Retrieval-augmented answering |
//! | [`session`] | Index lifecycle and readiness |
//! | [`server`] | HTTP API |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod chat;
pub mod chunk;
pub mod config;
pub mod db;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod indexer;
pub mod loader;
pub mod migrate;
pub mod models;
pub mod ratelimit;
pub mod server;
pub mod session;
pub mod store;
mod transport;

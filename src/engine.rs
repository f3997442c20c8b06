//! Retrieval-augmented answering.
//!
//! Embeds the question with the provider that built the index, pulls the
//! closest chunks from the store, and asks the chat model to answer from
//! those excerpts only. Sources are the distinct notes whose chunks made it
//! into the prompt.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::chat::ChatProvider;
use crate::config::{ChatConfig, RetrievalConfig};
use crate::embedding::{embed_query, EmbeddingProvider};
use crate::error::{VaultError, VaultResult};
use crate::models::{Answer, ScoredVector};
use crate::store::VectorStore;

const PROMPT_TEMPLATE: &str = "\
You are a helpful assistant that answers questions about the user's personal notes.
Use only the note excerpts in the context below to answer the question.
If the answer is not contained in the context, say that you could not find it in the notes instead of guessing.
Keep the answer concise and refer to the notes where it helps.

Context:
{context}

Question: {question}

Answer:";

pub struct AnsweringEngine {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    chat: Arc<dyn ChatProvider>,
    top_k: usize,
    min_score: f32,
    max_context_chars: usize,
    temperature: f32,
}

impl AnsweringEngine {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        chat: Arc<dyn ChatProvider>,
        retrieval: &RetrievalConfig,
        chat_config: &ChatConfig,
    ) -> Self {
        Self {
            embedder,
            store,
            chat,
            top_k: retrieval.top_k,
            min_score: retrieval.min_score,
            max_context_chars: retrieval.max_context_chars,
            temperature: chat_config.temperature,
        }
    }

    pub async fn answer(&self, query: &str) -> VaultResult<Answer> {
        let question = query.trim();
        if question.is_empty() {
            return Err(VaultError::EmptyQuery);
        }

        let query_vec = embed_query(self.embedder.as_ref(), question)
            .await
            .map_err(VaultError::Generation)?;

        let hits: Vec<ScoredVector> = self
            .store
            .similarity_search(&query_vec, self.top_k)
            .await
            .map_err(VaultError::Store)?
            .into_iter()
            .filter(|hit| hit.score > self.min_score)
            .collect();

        let used = select_context(&hits, self.max_context_chars);
        tracing::debug!(retrieved = hits.len(), used = used.len(), "assembled context");

        let context = used
            .iter()
            .map(|hit| hit.vector.chunk_text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        let prompt = build_prompt(&context, question);

        let text = self
            .chat
            .complete(&prompt, self.temperature)
            .await
            .map_err(VaultError::Generation)?;

        Ok(Answer {
            text,
            sources: dedup_sources(used.iter().map(|hit| hit.vector.metadata.source_path.as_str())),
        })
    }
}

/// Leading hits whose texts, joined by blank lines, fit in `budget` chars.
fn select_context(hits: &[ScoredVector], budget: usize) -> &[ScoredVector] {
    let mut used_chars = 0usize;
    for (i, hit) in hits.iter().enumerate() {
        let sep = if i == 0 { 0 } else { 2 };
        let len = hit.vector.chunk_text.chars().count() + sep;
        if used_chars + len > budget {
            return &hits[..i];
        }
        used_chars += len;
    }
    hits
}

fn build_prompt(context: &str, question: &str) -> String {
    PROMPT_TEMPLATE
        .replace("{context}", context)
        .replace("{question}", question)
}

/// Distinct source paths, sorted.
pub fn dedup_sources<'a>(paths: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    paths
        .into_iter()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(str::to_string)
        .collect()
}

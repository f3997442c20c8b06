//! Fixed-window text chunker.
//!
//! Slides a window of `chunk_size` characters across each document with a
//! stride of `chunk_size - chunk_overlap`, so consecutive chunks share
//! exactly `chunk_overlap` characters. Offsets and sizes are counted in
//! characters, never bytes, so multi-byte text is never split mid-codepoint.
//!
//! Chunk ids are derived from `(source_path, start_offset, text)` and are
//! therefore deterministic across runs.

use crate::error::{VaultError, VaultResult};
use crate::models::{chunk_id, Chunk, Document};

/// Validated chunking parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkParams {
    size: usize,
    overlap: usize,
}

impl ChunkParams {
    /// Rejects `chunk_size == 0` and `chunk_overlap >= chunk_size`; either
    /// would make the stride non-positive and the walk never terminate.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> VaultResult<Self> {
        if chunk_size == 0 || chunk_overlap >= chunk_size {
            return Err(VaultError::InvalidChunking {
                size: chunk_size,
                overlap: chunk_overlap,
            });
        }
        Ok(Self {
            size: chunk_size,
            overlap: chunk_overlap,
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    pub fn stride(&self) -> usize {
        self.size - self.overlap
    }
}

/// Split one document into overlapping windows. Empty text yields no chunks.
pub fn chunk_document(doc: &Document, params: &ChunkParams) -> Vec<Chunk> {
    // Byte offset of every char boundary, plus the end of the string.
    let boundaries: Vec<usize> = doc
        .text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(doc.text.len()))
        .collect();
    let char_len = boundaries.len() - 1;

    let mut chunks = Vec::new();
    let mut start = 0usize;
    while start < char_len {
        let end = (start + params.size).min(char_len);
        let text = &doc.text[boundaries[start]..boundaries[end]];
        chunks.push(Chunk {
            id: chunk_id(&doc.source_path, start, text),
            text: text.to_string(),
            source_path: doc.source_path.clone(),
            start_offset: start,
        });
        if end == char_len {
            break;
        }
        start += params.stride();
    }

    chunks
}

/// Chunk every document, preserving document order then offset order.
pub fn chunk_documents(docs: &[Document], params: &ChunkParams) -> Vec<Chunk> {
    docs.iter()
        .flat_map(|doc| chunk_document(doc, params))
        .collect()
}

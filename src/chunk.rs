//! Fixed-window text chunker with overlap.
//!
//! Splits a segment into windows of at most `size` chars, each window
//! starting `size - overlap` chars after the previous one. Splitting is purely
//! positional: no paragraph or sentence detection, so the output depends only
//! on the text length and the two parameters.
//!
//! Units are `char`s rather than bytes, so a window never ends inside a
//! multi-byte UTF-8 sequence.
//!
//! # Cover invariant
//!
//! Dropping the first `overlap` chars of every chunk after the first and
//! concatenating the rest reproduces the input exactly; see [`reassemble`].
//!
//! ```rust
//! use rag_testgen::chunk::{chunk_text, reassemble};
//!
//! let text = "abcdefghij";
//! let chunks = chunk_text(text, 4, 1);
//! assert_eq!(chunks[0].text, "abcd");
//! assert_eq!(chunks[1].text, "defg");
//! assert_eq!(reassemble(&chunks, 1), text);
//! ```

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::models::Chunk;

/// Split `text` into overlapping windows.
///
/// Returns no chunks for empty text. Panics if `size == 0` or
/// `overlap >= size`; configuration validation rejects both before any
/// chunking happens.
pub fn chunk_text(text: &str, size: usize, overlap: usize) -> Vec<Chunk> {
    assert!(size > 0, "chunk size must be > 0");
    assert!(overlap < size, "chunk overlap must be < chunk size");

    // Byte offset of every char boundary, plus the end of the string.
    let boundaries: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let total = boundaries.len() - 1;

    let step = size - overlap;
    let mut chunks = Vec::new();
    let mut start = 0usize;

    while start < total {
        let end = (start + size).min(total);
        chunks.push(Chunk {
            index: chunks.len(),
            start,
            end,
            text: text[boundaries[start]..boundaries[end]].to_string(),
        });
        if end == total {
            break;
        }
        start += step;
    }

    chunks
}

/// Rebuild the original text from chunks produced with the given overlap.
pub fn reassemble(chunks: &[Chunk], overlap: usize) -> String {
    let mut out = String::new();
    for (i, chunk) in chunks.iter().enumerate() {
        if i == 0 {
            out.push_str(&chunk.text);
        } else {
            out.extend(chunk.text.chars().skip(overlap));
        }
    }
    out
}

/// SHA-256 of a chunk's text, hex encoded.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Deterministic chunk id, stable across re-indexing runs.
pub fn chunk_id(collection: &str, filepath: &str, segment_index: usize, chunk_index: usize) -> String {
    let key = format!("{}/{}#{}:{}", collection, filepath, segment_index, chunk_index);
    Uuid::new_v5(&Uuid::NAMESPACE_OID, key.as_bytes()).to_string()
}

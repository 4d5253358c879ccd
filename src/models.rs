//! Core data models shared by the indexing, retrieval, and generation stages.

use serde::Serialize;

/// A source document: ordered text segments sharing one filepath.
///
/// Each segment is chunked independently; the filepath is attached to every
/// chunk as metadata.
#[derive(Debug, Clone)]
pub struct Document {
    pub filepath: String,
    pub segments: Vec<String>,
}

impl Document {
    pub fn new(filepath: impl Into<String>, segments: &[&str]) -> Self {
        Self {
            filepath: filepath.into(),
            segments: segments.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// A position-based slice of one segment.
///
/// `start` and `end` are char offsets into the segment, `end` exclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub index: usize,
    pub start: usize,
    pub end: usize,
    pub text: String,
}

/// A chunk ready to be written to a collection.
#[derive(Debug, Clone)]
pub struct ChunkRecord {
    pub id: String,
    pub filepath: String,
    pub segment_index: usize,
    pub chunk_index: usize,
    pub content: String,
    pub hash: String,
    pub vector: Option<Vec<f32>>,
    /// Embedding model that produced `vector`.
    pub vector_model: Option<String>,
}

/// What the store already holds for a chunk id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredChunkState {
    pub hash: String,
    /// Model and dimension count of the stored vector, if there is one.
    pub vector: Option<(String, usize)>,
}

impl StoredChunkState {
    /// Whether the stored vector came from `model` with `dims` dimensions.
    pub fn has_vector_from(&self, model: &str, dims: usize) -> bool {
        matches!(&self.vector, Some((m, d)) if m == model && *d == dims)
    }
}

/// A ranked retrieval result.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub id: String,
    pub content: String,
    pub filepath: String,
    pub score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
        }
    }
}

/// One role-tagged message of a generation request.
#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Plain text returned by the model for one message sequence.
#[derive(Debug, Clone)]
pub struct GenerationResult {
    pub text: String,
    pub model: String,
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
}

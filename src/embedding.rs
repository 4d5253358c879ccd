//! Embedding provider abstraction and implementations.
//!
//! - **[`DisabledEmbedder`]**: rejects every call; chunks are stored without
//!   vectors and only keyword search is available.
//! - **[`OpenAiEmbedder`]**: calls `POST {base_url}/embeddings` with
//!   batching and the retry policy from [`crate::http`].
//!
//! Also provides the vector utilities the SQLite store relies on:
//! - [`cosine_similarity`]
//! - [`vec_to_blob`] / [`blob_to_vec`] (little-endian `f32` bytes)
//!
//! ```rust
//! use rag_testgen::config::{Credentials, EmbeddingConfig};
//! use rag_testgen::embedding::create_embedder;
//!
//! let embedder = create_embedder(&EmbeddingConfig::default(), &Credentials::default()).unwrap();
//! assert!(!embedder.is_enabled());
//! assert_eq!(embedder.model_name(), "disabled");
//! ```

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;

use crate::config::{Credentials, EmbeddingConfig, EmbeddingProviderKind};
use crate::error::{Error, Result};
use crate::http::{self, RetryPolicy};

const SERVICE: &str = "openai";

#[async_trait]
pub trait Embedder: Send + Sync {
    fn model_name(&self) -> &str;
    fn dims(&self) -> usize;
    fn is_enabled(&self) -> bool {
        true
    }

    /// One vector per input text, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Embed a single query text.
pub async fn embed_query(embedder: &dyn Embedder, text: &str) -> Result<Vec<f32>> {
    embedder
        .embed(&[text.to_string()])
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| Error::Embedding("empty embedding response".to_string()))
}

pub struct DisabledEmbedder;

#[async_trait]
impl Embedder for DisabledEmbedder {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
    fn is_enabled(&self) -> bool {
        false
    }

    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Err(Error::Embedding("embedding provider is disabled".to_string()))
    }
}

pub struct OpenAiEmbedder {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    dims: usize,
    retry: RetryPolicy,
}

impl OpenAiEmbedder {
    pub fn new(config: &EmbeddingConfig, credentials: &Credentials) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| Error::Embedding("embedding.model required for OpenAI provider".into()))?;
        let dims = config
            .dims
            .ok_or_else(|| Error::Embedding("embedding.dims required for OpenAI provider".into()))?;
        let api_key = credentials.openai_api_key.clone().ok_or_else(|| {
            Error::connection(
                SERVICE,
                format!("{} environment variable not set", config.api_key_env),
            )
        })?;

        Ok(Self {
            client: http::client(config.timeout_secs)?,
            endpoint: format!("{}/embeddings", config.base_url.trim_end_matches('/')),
            api_key,
            model,
            dims,
            retry: config.retry_policy(),
        })
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let json = http::send_with_retry("openai embeddings", self.retry, || {
            self.client
                .request(Method::POST, &self.endpoint)
                .bearer_auth(&self.api_key)
                .json(&body)
        })
        .await
        .and_then(|reply| reply.into_json())
        .map_err(|f| f.into_error(SERVICE, Error::Embedding))?;

        let vectors = parse_embeddings_response(&json)?;
        if vectors.len() != texts.len() {
            return Err(Error::Embedding(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                vectors.len()
            )));
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dims) {
            return Err(Error::Embedding(format!(
                "model returned {} dimensions, configured dims is {}",
                bad.len(),
                self.dims
            )));
        }
        Ok(vectors)
    }
}

/// Extract `data[].embedding`, ordered by each item's `index`.
fn parse_embeddings_response(json: &Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(Value::as_array)
        .ok_or_else(|| Error::Embedding("invalid response: missing data array".into()))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (pos, item) in data.iter().enumerate() {
        let embedding = item
            .get("embedding")
            .and_then(Value::as_array)
            .ok_or_else(|| Error::Embedding("invalid response: missing embedding".into()))?;
        let index = item
            .get("index")
            .and_then(Value::as_u64)
            .map(|i| i as usize)
            .unwrap_or(pos);
        let vec: Vec<f32> = embedding
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();
        indexed.push((index, vec));
    }

    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, vec)| vec).collect())
}

pub fn create_embedder(
    config: &EmbeddingConfig,
    credentials: &Credentials,
) -> Result<Box<dyn Embedder>> {
    match config.provider {
        EmbeddingProviderKind::Disabled => Ok(Box::new(DisabledEmbedder)),
        EmbeddingProviderKind::Openai => Ok(Box::new(OpenAiEmbedder::new(config, credentials)?)),
    }
}

/// Encode a float vector as little-endian `f32` bytes.
///
/// ```rust
/// use rag_testgen::embedding::{blob_to_vec, vec_to_blob};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12);
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

/// Cosine similarity in `[-1.0, 1.0]`; `0.0` for empty, mismatched, or
/// zero-norm inputs.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let (mut dot, mut norm_a, mut norm_b) = (0.0f32, 0.0f32, 0.0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }
    dot / denom
}

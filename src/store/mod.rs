//! Storage abstraction for collections of chunks.
//!
//! The [`VectorStore`] trait is the only seam between the pipeline and the
//! database. Two backends implement it:
//!
//! | Backend | Module | Keyword search | Vector search |
//! |---------|--------|----------------|---------------|
//! | SQLite | [`sqlite`] | FTS5 `bm25()` | cosine over BLOB vectors, in Rust |
//! | Weaviate | [`weaviate`] | GraphQL `bm25` | GraphQL `nearVector` |
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod sqlite;
pub mod weaviate;

use anyhow::Result as AnyResult;
use async_trait::async_trait;

use crate::config::{Config, Credentials, SchemaPolicy, StoreBackend};
use crate::error::Result;
use crate::models::{ChunkRecord, SearchHit, StoredChunkState};
use crate::schema::{CollectionSchema, SchemaOutcome};

/// Abstract collection store.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`ensure_collection`](VectorStore::ensure_collection) | Create a collection under a [`SchemaPolicy`] |
/// | [`write_document`](VectorStore::write_document) | Write one document's chunks and drop its stale ones |
/// | [`chunk_state`](VectorStore::chunk_state) | Stored hash of a chunk, for staleness checks |
/// | [`keyword_search`](VectorStore::keyword_search) | BM25 search over `content` |
/// | [`vector_search`](VectorStore::vector_search) | Cosine similarity search |
/// | [`count`](VectorStore::count) | Number of chunks in a collection |
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Short backend name for display (`"sqlite"`, `"weaviate"`).
    fn backend(&self) -> &'static str;

    /// Whether the store answers requests.
    async fn is_ready(&self) -> Result<bool>;

    async fn ensure_collection(
        &self,
        schema: &CollectionSchema,
        policy: SchemaPolicy,
    ) -> Result<SchemaOutcome>;

    /// Make the chunks stored for `filepath` in `collection` exactly `keep_ids`.
    ///
    /// `records` (a subset of `keep_ids`) are inserted or replaced, and every
    /// other chunk of that file is deleted. Returns the number deleted.
    async fn write_document(
        &self,
        collection: &str,
        filepath: &str,
        keep_ids: &[String],
        records: &[ChunkRecord],
    ) -> Result<u64>;

    /// What the store holds for `id`, if anything.
    ///
    /// Backends that cannot answer cheaply return `None`, which makes the
    /// indexer re-embed and rewrite the chunk.
    async fn chunk_state(&self, _collection: &str, _id: &str) -> Result<Option<StoredChunkState>> {
        Ok(None)
    }

    /// Keyword search, best match first. Empty when nothing matches.
    async fn keyword_search(
        &self,
        collection: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<SearchHit>>;

    /// Vector similarity search, most similar first.
    async fn vector_search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<SearchHit>>;

    async fn count(&self, collection: &str) -> Result<u64>;

    /// Release connections. The default does nothing.
    async fn close(&self) {}
}

/// Open the backend selected by `[store] backend`.
pub async fn open_store(config: &Config, credentials: &Credentials) -> AnyResult<Box<dyn VectorStore>> {
    match config.store.backend {
        StoreBackend::Sqlite => {
            let store = sqlite::SqliteStore::open(&config.store.path).await?;
            Ok(Box::new(store))
        }
        StoreBackend::Weaviate => {
            let store = weaviate::WeaviateStore::new(&config.store, credentials)?;
            Ok(Box::new(store))
        }
    }
}

/// Extract search terms from free text: runs of alphanumerics, lowercased.
///
/// Identifiers split at underscores, so `calculate_discounted_price` yields
/// `calculate`, `discounted`, `price`. Duplicates are dropped, order kept.
pub fn query_terms(query: &str) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();
    for term in query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
    {
        if !terms.contains(&term) {
            terms.push(term);
        }
    }
    terms
}

/// Order hits by score descending, then id ascending, and keep `limit`.
pub(crate) fn rank_hits(mut hits: Vec<SearchHit>, limit: usize) -> Vec<SearchHit> {
    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
    hits.truncate(limit);
    hits
}

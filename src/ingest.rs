//! Indexing pipeline: document → chunks → embeddings → collection.
//!
//! For one [`Document`]:
//!
//! 1. Every segment is chunked independently with the configured size and
//!    overlap; each chunk gets a deterministic id and a content hash.
//! 2. Chunks whose id is already stored with the same hash (and, when
//!    embeddings are enabled, a vector from the same model and dims) are
//!    counted as unchanged and skipped.
//! 3. The remaining chunks are embedded in batches of `embedding.batch_size`.
//! 4. They are written in one [`VectorStore::write_document`] call, which
//!    also drops chunks of the document that the current chunking no longer
//!    produces (after a `chunk_size` change or a shorter segment).
//!
//! Vectors are computed before anything is written, so an embedding failure
//! leaves the collection exactly as it was.

use anyhow::Context;

use crate::chunk::{chunk_id, chunk_text, content_hash};
use crate::config::{ChunkingConfig, Config, Credentials, SchemaPolicy};
use crate::embedding::{create_embedder, Embedder};
use crate::error::{Error, Result};
use crate::fixtures;
use crate::models::{ChunkRecord, Document};
use crate::schema::init_schema;
use crate::store::{self, VectorStore};

/// Counts for one indexed document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexReport {
    pub collection: String,
    pub filepath: String,
    pub chunks: usize,
    pub written: usize,
    pub unchanged: usize,
    pub removed: usize,
    pub embedded: usize,
}

pub struct Indexer<'a> {
    store: &'a dyn VectorStore,
    embedder: &'a dyn Embedder,
    chunking: ChunkingConfig,
    batch_size: usize,
}

impl<'a> Indexer<'a> {
    pub fn new(
        store: &'a dyn VectorStore,
        embedder: &'a dyn Embedder,
        chunking: ChunkingConfig,
        batch_size: usize,
    ) -> Self {
        Self {
            store,
            embedder,
            chunking,
            batch_size: batch_size.max(1),
        }
    }

    /// Chunk records for every segment of `document`, in segment order.
    pub fn plan(&self, collection: &str, document: &Document) -> Vec<ChunkRecord> {
        let mut records = Vec::new();
        for (segment_index, segment) in document.segments.iter().enumerate() {
            for chunk in chunk_text(
                segment,
                self.chunking.chunk_size,
                self.chunking.chunk_overlap,
            ) {
                records.push(ChunkRecord {
                    id: chunk_id(collection, &document.filepath, segment_index, chunk.index),
                    filepath: document.filepath.clone(),
                    segment_index,
                    chunk_index: chunk.index,
                    hash: content_hash(&chunk.text),
                    content: chunk.text,
                    vector: None,
                    vector_model: None,
                });
            }
        }
        records
    }

    pub async fn index_document(
        &self,
        collection: &str,
        document: &Document,
    ) -> Result<IndexReport> {
        let records = self.plan(collection, document);
        let mut report = IndexReport {
            collection: collection.to_string(),
            filepath: document.filepath.clone(),
            chunks: records.len(),
            ..Default::default()
        };

        let keep_ids: Vec<String> = records.iter().map(|r| r.id.clone()).collect();
        let mut pending = Vec::with_capacity(records.len());
        for record in records {
            let current = match self.store.chunk_state(collection, &record.id).await? {
                Some(state) => {
                    state.hash == record.hash
                        && (!self.embedder.is_enabled()
                            || state.has_vector_from(
                                self.embedder.model_name(),
                                self.embedder.dims(),
                            ))
                }
                None => false,
            };
            if current {
                report.unchanged += 1;
            } else {
                pending.push(record);
            }
        }

        if self.embedder.is_enabled() {
            report.embedded = self.embed_all(&mut pending).await?;
        }

        let removed = self
            .store
            .write_document(collection, &document.filepath, &keep_ids, &pending)
            .await?;
        report.written = pending.len();
        report.removed = removed as usize;

        tracing::info!(
            collection,
            filepath = %document.filepath,
            chunks = report.chunks,
            written = report.written,
            unchanged = report.unchanged,
            removed = report.removed,
            "document indexed"
        );
        Ok(report)
    }

    async fn embed_all(&self, records: &mut [ChunkRecord]) -> Result<usize> {
        let mut embedded = 0;
        for batch in records.chunks_mut(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|r| r.content.clone()).collect();
            let vectors = self.embedder.embed(&texts).await?;
            if vectors.len() != batch.len() {
                return Err(Error::Embedding(format!(
                    "expected {} vectors, got {}",
                    batch.len(),
                    vectors.len()
                )));
            }
            for (record, vector) in batch.iter_mut().zip(vectors) {
                record.vector = Some(vector);
                record.vector_model = Some(self.embedder.model_name().to_string());
            }
            embedded += batch.len();
            tracing::debug!(embedded, "embedding batch done");
        }
        Ok(embedded)
    }
}

/// `testgen index`
pub async fn run_index(config: &Config) -> anyhow::Result<()> {
    let credentials = Credentials::from_env(config);
    let store = store::open_store(config, &credentials).await?;
    let embedder = create_embedder(&config.embedding, &credentials)
        .context("failed to create embedding provider")?;

    init_schema(store.as_ref(), &config.schema, SchemaPolicy::Skip)
        .await
        .context("schema initialization failed")?;

    let indexer = Indexer::new(
        store.as_ref(),
        embedder.as_ref(),
        config.chunking,
        config.embedding.batch_size,
    );

    println!("index ({} store)", store.backend());
    for corpus in fixtures::all() {
        let report = indexer
            .index_document(corpus.collection, &corpus.document)
            .await
            .with_context(|| {
                format!(
                    "indexing {} into {} failed",
                    corpus.document.filepath, corpus.collection
                )
            })?;
        println!(
            "  {} ({}): {} chunks, {} written, {} unchanged, {} removed",
            report.collection,
            report.filepath,
            report.chunks,
            report.written,
            report.unchanged,
            report.removed
        );
        if embedder.is_enabled() {
            println!("    embeddings written: {}", report.embedded);
        }
    }
    println!("ok");

    store.close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchemaConfig;
    use crate::embedding::DisabledEmbedder;
    use crate::schema::{CODE_COLLECTION, REQUIREMENTS_COLLECTION};
    use crate::store::sqlite::SqliteStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Two-dimensional embedder counting how many texts it was asked for.
    struct CountingEmbedder {
        texts: AtomicUsize,
        fail: bool,
        model: &'static str,
    }

    impl CountingEmbedder {
        fn new(fail: bool) -> Self {
            Self::with_model(fail, "counting")
        }

        fn with_model(fail: bool, model: &'static str) -> Self {
            Self {
                texts: AtomicUsize::new(0),
                fail,
                model,
            }
        }
    }

    #[async_trait]
    impl Embedder for CountingEmbedder {
        fn model_name(&self) -> &str {
            self.model
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            if self.fail {
                return Err(Error::Embedding("provider down".into()));
            }
            self.texts.fetch_add(texts.len(), Ordering::SeqCst);
            Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0]).collect())
        }
    }

    async fn open_store() -> (TempDir, SqliteStore) {
        let tmp = TempDir::new().unwrap();
        let store = SqliteStore::open(&tmp.path().join("index.sqlite"))
            .await
            .unwrap();
        init_schema(&store, &SchemaConfig::default(), SchemaPolicy::Skip)
            .await
            .unwrap();
        (tmp, store)
    }

    #[tokio::test]
    async fn test_index_fixtures_and_reindex_is_unchanged() {
        let (_tmp, store) = open_store().await;
        let indexer = Indexer::new(&store, &DisabledEmbedder, ChunkingConfig::default(), 64);

        let first = indexer
            .index_document(REQUIREMENTS_COLLECTION, &fixtures::requirements_document())
            .await
            .unwrap();
        assert_eq!(first.chunks, 6);
        assert_eq!(first.written, 6);
        assert_eq!(first.unchanged, 0);

        let second = indexer
            .index_document(REQUIREMENTS_COLLECTION, &fixtures::requirements_document())
            .await
            .unwrap();
        assert_eq!(second.written, 0);
        assert_eq!(second.unchanged, 6);
        assert_eq!(store.count(REQUIREMENTS_COLLECTION).await.unwrap(), 6);
    }

    #[tokio::test]
    async fn test_small_chunks_cover_every_segment() {
        let (_tmp, store) = open_store().await;
        let chunking = ChunkingConfig {
            chunk_size: 64,
            chunk_overlap: 8,
        };
        let indexer = Indexer::new(&store, &DisabledEmbedder, chunking, 64);
        let doc = fixtures::codebase_document();

        let records = indexer.plan(CODE_COLLECTION, &doc);
        for (segment_index, segment) in doc.segments.iter().enumerate() {
            let mut parts: Vec<&ChunkRecord> = records
                .iter()
                .filter(|r| r.segment_index == segment_index)
                .collect();
            parts.sort_by_key(|r| r.chunk_index);
            let mut rebuilt = String::new();
            for (i, r) in parts.iter().enumerate() {
                if i == 0 {
                    rebuilt.push_str(&r.content);
                } else {
                    rebuilt.extend(r.content.chars().skip(8));
                }
            }
            assert_eq!(&rebuilt, segment);
        }

        let report = indexer.index_document(CODE_COLLECTION, &doc).await.unwrap();
        assert_eq!(report.chunks, records.len());
        assert_eq!(store.count(CODE_COLLECTION).await.unwrap() as usize, records.len());
    }

    #[tokio::test]
    async fn test_embeddings_batched_and_skipped_when_current() {
        let (_tmp, store) = open_store().await;
        let embedder = CountingEmbedder::new(false);
        let indexer = Indexer::new(&store, &embedder, ChunkingConfig::default(), 4);

        let report = indexer
            .index_document(REQUIREMENTS_COLLECTION, &fixtures::requirements_document())
            .await
            .unwrap();
        assert_eq!(report.embedded, 6);
        assert_eq!(embedder.texts.load(Ordering::SeqCst), 6);

        let again = indexer
            .index_document(REQUIREMENTS_COLLECTION, &fixtures::requirements_document())
            .await
            .unwrap();
        assert_eq!(again.embedded, 0);
        assert_eq!(again.unchanged, 6);
        assert_eq!(embedder.texts.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn test_rechunking_drops_stale_chunks() {
        let (_tmp, store) = open_store().await;
        let doc = fixtures::codebase_document();

        let small = ChunkingConfig {
            chunk_size: 64,
            chunk_overlap: 8,
        };
        let first = Indexer::new(&store, &DisabledEmbedder, small, 64)
            .index_document(CODE_COLLECTION, &doc)
            .await
            .unwrap();
        assert!(first.chunks > 2);
        assert_eq!(store.count(CODE_COLLECTION).await.unwrap() as usize, first.chunks);

        let indexer = Indexer::new(&store, &DisabledEmbedder, ChunkingConfig::default(), 64);
        let second = indexer.index_document(CODE_COLLECTION, &doc).await.unwrap();
        assert_eq!(second.chunks, 2);
        assert_eq!(second.removed, first.chunks - 2);
        assert_eq!(store.count(CODE_COLLECTION).await.unwrap(), 2);

        let current: Vec<String> = indexer
            .plan(CODE_COLLECTION, &doc)
            .into_iter()
            .map(|r| r.content)
            .collect();
        let hits = store
            .keyword_search(CODE_COLLECTION, "discount price", 10)
            .await
            .unwrap();
        assert!(!hits.is_empty());
        assert!(hits.iter().all(|h| current.contains(&h.content)));
    }

    #[tokio::test]
    async fn test_model_change_reembeds_every_chunk() {
        let (_tmp, store) = open_store().await;
        let doc = fixtures::requirements_document();

        let old = CountingEmbedder::with_model(false, "model-a");
        Indexer::new(&store, &old, ChunkingConfig::default(), 64)
            .index_document(REQUIREMENTS_COLLECTION, &doc)
            .await
            .unwrap();

        let new = CountingEmbedder::with_model(false, "model-b");
        let report = Indexer::new(&store, &new, ChunkingConfig::default(), 64)
            .index_document(REQUIREMENTS_COLLECTION, &doc)
            .await
            .unwrap();
        assert_eq!(report.unchanged, 0);
        assert_eq!(report.embedded, 6);
        assert_eq!(new.texts.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn test_embedding_failure_writes_nothing() {
        let (_tmp, store) = open_store().await;
        let embedder = CountingEmbedder::new(true);
        let indexer = Indexer::new(&store, &embedder, ChunkingConfig::default(), 64);

        let err = indexer
            .index_document(CODE_COLLECTION, &fixtures::codebase_document())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Embedding(_)));
        assert_eq!(store.count(CODE_COLLECTION).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unknown_collection_is_reported() {
        let (_tmp, store) = open_store().await;
        let indexer = Indexer::new(&store, &DisabledEmbedder, ChunkingConfig::default(), 64);
        let err = indexer
            .index_document("Nope", &fixtures::codebase_document())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnknownCollection(_)));
    }
}

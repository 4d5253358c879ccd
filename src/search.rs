//! Retrieval over one collection.
//!
//! | Mode | Ranking |
//! |------|---------|
//! | `keyword` | BM25 over `content` (query reduced to alphanumeric terms) |
//! | `semantic` | cosine similarity between the embedded query and stored vectors |
//!
//! Results are ordered by score descending, ties by chunk id, so repeating a
//! query against an unchanged collection yields the same ordering.

use anyhow::{bail, Context};

use crate::config::{Config, Credentials, SearchMode};
use crate::embedding::{create_embedder, embed_query, Embedder};
use crate::error::{Error, Result};
use crate::models::SearchHit;
use crate::schema::{CODE_COLLECTION, REQUIREMENTS_COLLECTION};
use crate::store::{self, VectorStore};

/// Which fixture collection a CLI search targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionKind {
    Code,
    Requirements,
}

impl CollectionKind {
    pub fn collection_name(self) -> &'static str {
        match self {
            CollectionKind::Code => CODE_COLLECTION,
            CollectionKind::Requirements => REQUIREMENTS_COLLECTION,
        }
    }
}

impl std::str::FromStr for CollectionKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "code" => Ok(Self::Code),
            "requirements" => Ok(Self::Requirements),
            other => Err(format!(
                "unknown collection '{}'; use code or requirements",
                other
            )),
        }
    }
}

pub struct Retriever<'a> {
    store: &'a dyn VectorStore,
    embedder: &'a dyn Embedder,
    mode: SearchMode,
}

impl<'a> Retriever<'a> {
    pub fn new(store: &'a dyn VectorStore, embedder: &'a dyn Embedder, mode: SearchMode) -> Self {
        Self {
            store,
            embedder,
            mode,
        }
    }

    /// Up to `limit` hits, best first. Empty when nothing matches.
    pub async fn search(
        &self,
        collection: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<SearchHit>> {
        if query.trim().is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let hits = match self.mode {
            SearchMode::Keyword => self.store.keyword_search(collection, query, limit).await?,
            SearchMode::Semantic => {
                let vector = embed_query(self.embedder, query).await?;
                self.store.vector_search(collection, &vector, limit).await?
            }
        };

        tracing::info!(collection, query, mode = ?self.mode, hits = hits.len(), "retrieved");
        Ok(hits)
    }

    /// The single best hit, or [`Error::EmptyResult`].
    pub async fn top(&self, collection: &str, query: &str) -> Result<SearchHit> {
        self.search(collection, query, 1)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::EmptyResult {
                collection: collection.to_string(),
                query: query.to_string(),
            })
    }
}

/// `testgen search`
pub async fn run_search(
    config: &Config,
    query: &str,
    collection: CollectionKind,
    mode: Option<SearchMode>,
    limit: Option<usize>,
) -> anyhow::Result<()> {
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }

    let mode = mode.unwrap_or(config.retrieval.mode);
    if mode == SearchMode::Semantic && !config.embedding.is_enabled() {
        bail!("Mode 'semantic' requires embeddings. Set [embedding] provider in config.");
    }

    let credentials = Credentials::from_env(config);
    let store = store::open_store(config, &credentials).await?;
    let embedder = create_embedder(&config.embedding, &credentials)
        .context("failed to create embedding provider")?;
    let retriever = Retriever::new(store.as_ref(), embedder.as_ref(), mode);

    let name = collection.collection_name();
    let hits = retriever
        .search(name, query, limit.unwrap_or(config.retrieval.limit))
        .await
        .with_context(|| format!("search in {} failed", name))?;

    if hits.is_empty() {
        println!("No results.");
    }
    for (i, hit) in hits.iter().enumerate() {
        println!("{}. [{:.2}] {} / {}", i + 1, hit.score, name, hit.filepath);
        println!("    excerpt: \"{}\"", excerpt(&hit.content, 160));
        println!("    id: {}", hit.id);
        println!();
    }

    store.close().await;
    Ok(())
}

/// First `max_chars` chars on one line.
fn excerpt(content: &str, max_chars: usize) -> String {
    let flat = content.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        flat
    } else {
        let cut: String = flat.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}

//! Store readiness and per-collection chunk counts.
//!
//! Used by `testgen status` to confirm the store is reachable and the
//! fixtures were indexed before generation is attempted.

use anyhow::Result;

use crate::config::{Config, Credentials, StoreBackend};
use crate::error::Error;
use crate::schema::{CODE_COLLECTION, REQUIREMENTS_COLLECTION};
use crate::store::{self, VectorStore};

/// Chunk count of one collection, or `None` when it was never initialized.
pub async fn collection_count(store: &dyn VectorStore, collection: &str) -> Result<Option<u64>> {
    match store.count(collection).await {
        Ok(n) => Ok(Some(n)),
        Err(Error::UnknownCollection(_)) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// `testgen status`
pub async fn run_status(config: &Config) -> Result<()> {
    let credentials = Credentials::from_env(config);
    let store = store::open_store(config, &credentials).await?;

    let location = match config.store.backend {
        StoreBackend::Sqlite => config.store.path.display().to_string(),
        StoreBackend::Weaviate => config.store.url.clone().unwrap_or_default(),
    };
    let ready = store.is_ready().await.unwrap_or(false);

    println!("status ({} store)", store.backend());
    println!("  location:  {}", location);
    println!("  ready:     {}", ready);
    if ready {
        for collection in [REQUIREMENTS_COLLECTION, CODE_COLLECTION] {
            match collection_count(store.as_ref(), collection).await? {
                Some(n) => println!("  {}: {} chunks", collection, n),
                None => println!("  {}: not initialized", collection),
            }
        }
    }
    println!(
        "  embeddings: {}",
        if config.embedding.is_enabled() {
            "enabled"
        } else {
            "disabled"
        }
    );

    store.close().await;
    Ok(())
}

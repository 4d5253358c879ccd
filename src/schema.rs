//! Collection schemas and the schema initializer.
//!
//! Two collections are defined, one for requirements sections and one for
//! code files. Both carry a `content` and a `filepath` text property and a
//! vectorizer binding keyed to the configured generation model. What happens
//! when a collection already exists is decided by [`SchemaPolicy`].

use anyhow::{Context, Result};
use serde::Serialize;

use crate::config::{Config, Credentials, SchemaConfig, SchemaPolicy};
use crate::store::{self, VectorStore};

pub const REQUIREMENTS_COLLECTION: &str = "BusinessDocs";
pub const CODE_COLLECTION: &str = "CodeFiles";

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Property {
    pub name: String,
    pub data_type: String,
    pub description: String,
}

impl Property {
    fn text(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            data_type: "text".to_string(),
            description: description.to_string(),
        }
    }
}

/// Definition of one collection as sent to the store.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CollectionSchema {
    pub name: String,
    pub description: String,
    pub vectorizer: String,
    pub generative_model: String,
    pub properties: Vec<Property>,
}

/// Result of ensuring one collection exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaOutcome {
    Created,
    Existing,
    Recreated,
}

impl SchemaOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            SchemaOutcome::Created => "created",
            SchemaOutcome::Existing => "existing",
            SchemaOutcome::Recreated => "recreated",
        }
    }
}

/// The two collection schemas, requirements first.
pub fn collection_schemas(config: &SchemaConfig) -> Vec<CollectionSchema> {
    vec![
        CollectionSchema {
            name: REQUIREMENTS_COLLECTION.to_string(),
            description: "SRS document element.".to_string(),
            vectorizer: config.vectorizer.clone(),
            generative_model: config.generative_model.clone(),
            properties: vec![
                Property::text(
                    "content",
                    "Content from the specific SRS document element.",
                ),
                Property::text("filepath", "The specific SRS document's filepath."),
            ],
        },
        CollectionSchema {
            name: CODE_COLLECTION.to_string(),
            description: "Code file element.".to_string(),
            vectorizer: config.vectorizer.clone(),
            generative_model: config.generative_model.clone(),
            properties: vec![
                Property::text(
                    "content",
                    "Content from the specific code file structure.",
                ),
                Property::text("filepath", "The specific code file's filepath."),
            ],
        },
    ]
}

/// Ensure both collections exist under `policy`.
pub async fn init_schema(
    store: &dyn VectorStore,
    config: &SchemaConfig,
    policy: SchemaPolicy,
) -> crate::error::Result<Vec<(String, SchemaOutcome)>> {
    let mut outcomes = Vec::new();
    for schema in collection_schemas(config) {
        let outcome = store.ensure_collection(&schema, policy).await?;
        tracing::info!(collection = %schema.name, outcome = outcome.as_str(), "schema ensured");
        outcomes.push((schema.name, outcome));
    }
    Ok(outcomes)
}

/// `testgen init`
pub async fn run_init(config: &Config, policy_override: Option<SchemaPolicy>) -> Result<()> {
    let credentials = Credentials::from_env(config);
    let store = store::open_store(config, &credentials).await?;
    let policy = policy_override.unwrap_or(config.schema.on_existing);

    let outcomes = init_schema(store.as_ref(), &config.schema, policy)
        .await
        .context("schema initialization failed")?;

    println!("init ({} store)", store.backend());
    for (name, outcome) in &outcomes {
        println!("  {}: {}", name, outcome.as_str());
    }
    println!("ok");

    store.close().await;
    Ok(())
}

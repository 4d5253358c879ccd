//! Weaviate-backed [`VectorStore`] over the REST and GraphQL APIs.
//!
//! | Operation | Endpoint |
//! |-----------|----------|
//! | readiness | `GET /v1/.well-known/ready` |
//! | schema | `GET/POST/DELETE /v1/schema[/{class}]` |
//! | write | `POST /v1/batch/objects`, then `DELETE /v1/batch/objects` for stale chunks |
//! | search, count | `POST /v1/graphql` (`bm25`, `nearVector`, `Aggregate`) |
//!
//! Unknown classes are detected with a schema lookup before every read and
//! write and surface as [`Error::UnknownCollection`]. Transport and auth
//! failures are [`Error::Connection`]; any other refusal is
//! [`Error::StoreApi`].
//!
//! Requests carry `Authorization: Bearer <store key>` when a key is
//! configured, and forward the OpenAI key as `X-OpenAI-Api-Key` so the
//! server-side vectorizer module can call the embedding API.

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder};
use serde_json::{json, Value};

use super::{rank_hits, VectorStore};
use crate::config::{Credentials, SchemaPolicy, StoreConfig};
use crate::error::{Error, Result};
use crate::http::{self, HttpFailure, Reply, RetryPolicy};
use crate::models::{ChunkRecord, SearchHit};
use crate::schema::{CollectionSchema, SchemaOutcome};

const SERVICE: &str = "weaviate";

pub struct WeaviateStore {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    openai_key: Option<String>,
    retry: RetryPolicy,
}

impl WeaviateStore {
    pub fn new(config: &StoreConfig, credentials: &Credentials) -> Result<Self> {
        let base_url = config
            .url
            .as_deref()
            .ok_or_else(|| Error::connection(SERVICE, "store.url not configured"))?
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            client: http::client(config.timeout_secs)?,
            base_url,
            api_key: credentials.store_api_key.clone(),
            openai_key: credentials.openai_api_key.clone(),
            retry: config.retry_policy(),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let mut req = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        if let Some(key) = &self.openai_key {
            req = req.header("X-OpenAI-Api-Key", key);
        }
        req
    }

    async fn send(&self, label: &str, build: impl Fn() -> RequestBuilder) -> Result<Reply> {
        http::send_with_retry(label, self.retry, build)
            .await
            .map_err(|f| f.into_error(SERVICE, store_error))
    }

    async fn graphql(&self, query: String) -> Result<Value> {
        let body = json!({ "query": query });
        let reply = self
            .send("weaviate graphql", || {
                self.request(Method::POST, "/v1/graphql").json(&body)
            })
            .await?;
        let value = reply
            .into_json()
            .map_err(|f| f.into_error(SERVICE, store_error))?;

        if let Some(errors) = value.get("errors").and_then(Value::as_array) {
            if !errors.is_empty() {
                let messages: Vec<&str> = errors
                    .iter()
                    .filter_map(|e| e.get("message").and_then(Value::as_str))
                    .collect();
                return Err(store_error(format!("graphql: {}", messages.join("; "))));
            }
        }
        Ok(value)
    }

    async fn class_exists(&self, class: &str) -> Result<bool> {
        let path = format!("/v1/schema/{}", class);
        let reply = self
            .send("weaviate schema get", || self.request(Method::GET, &path))
            .await?;
        match reply.status.as_u16() {
            200 => Ok(true),
            404 => Ok(false),
            _ => Err(HttpFailure::Status {
                status: reply.status,
                body: reply.body,
            }
            .into_error(SERVICE, store_error)),
        }
    }

    async fn require_class(&self, class: &str) -> Result<()> {
        if self.class_exists(class).await? {
            Ok(())
        } else {
            Err(Error::UnknownCollection(class.to_string()))
        }
    }

    fn expect_success(reply: Reply) -> Result<()> {
        if reply.is_success() {
            Ok(())
        } else {
            Err(HttpFailure::Status {
                status: reply.status,
                body: reply.body,
            }
            .into_error(SERVICE, store_error))
        }
    }
}

fn store_error(message: String) -> Error {
    Error::StoreApi {
        service: SERVICE.to_string(),
        message,
    }
}

/// Class definition in Weaviate's schema format.
pub fn class_definition(schema: &CollectionSchema) -> Value {
    let properties: Vec<Value> = schema
        .properties
        .iter()
        .map(|p| {
            json!({
                "name": p.name,
                "dataType": [p.data_type],
                "description": p.description,
            })
        })
        .collect();

    json!({
        "class": schema.name,
        "description": schema.description,
        "vectorizer": schema.vectorizer,
        "moduleConfig": {
            "generative-openai": { "model": schema.generative_model }
        },
        "properties": properties,
    })
}

/// Batch payload for `POST /v1/batch/objects`.
pub fn batch_payload(collection: &str, records: &[ChunkRecord]) -> Value {
    let objects: Vec<Value> = records
        .iter()
        .map(|r| {
            let mut obj = json!({
                "class": collection,
                "id": r.id,
                "properties": {
                    "content": r.content,
                    "filepath": r.filepath,
                },
            });
            if let Some(vec) = &r.vector {
                obj["vector"] = json!(vec);
            }
            obj
        })
        .collect();
    json!({ "objects": objects })
}

/// Batch delete body matching every object of `filepath` outside `keep_ids`.
pub fn prune_payload(collection: &str, filepath: &str, keep_ids: &[String]) -> Value {
    let mut operands = vec![json!({
        "path": ["filepath"],
        "operator": "Equal",
        "valueText": filepath,
    })];
    operands.extend(keep_ids.iter().map(|id| {
        json!({
            "path": ["id"],
            "operator": "NotEqual",
            "valueText": id,
        })
    }));
    let filter = if operands.len() == 1 {
        operands.remove(0)
    } else {
        json!({ "operator": "And", "operands": operands })
    };
    json!({
        "match": { "class": collection, "where": filter },
        "output": "minimal",
    })
}

/// Collect per-object errors from a batch response.
pub fn batch_errors(response: &Value) -> Vec<String> {
    response
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.pointer("/result/errors/error"))
                .filter_map(Value::as_array)
                .flatten()
                .filter_map(|e| e.get("message").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// GraphQL `Get` query with a BM25 clause over `content`.
pub fn bm25_query(collection: &str, query: &str, limit: usize) -> String {
    // JSON string escaping is valid GraphQL string escaping.
    let quoted = serde_json::to_string(query).unwrap_or_else(|_| "\"\"".to_string());
    format!(
        "{{ Get {{ {}(bm25: {{query: {}, properties: [\"content\"]}}, limit: {}) \
         {{ content filepath _additional {{ id score }} }} }} }}",
        collection, quoted, limit
    )
}

/// GraphQL `Get` query with a `nearVector` clause.
pub fn near_vector_query(collection: &str, vector: &[f32], limit: usize) -> String {
    let vec_json = serde_json::to_string(vector).unwrap_or_else(|_| "[]".to_string());
    format!(
        "{{ Get {{ {}(nearVector: {{vector: {}}}, limit: {}) \
         {{ content filepath _additional {{ id distance }} }} }} }}",
        collection, vec_json, limit
    )
}

/// Parse the `data.Get.<collection>` array into hits.
///
/// BM25 scores arrive as strings, distances as numbers; distances become
/// similarities via `1 - distance`.
pub fn parse_get_response(response: &Value, collection: &str) -> Vec<SearchHit> {
    let pointer = format!("/data/Get/{}", collection);
    let Some(items) = response.pointer(&pointer).and_then(Value::as_array) else {
        return Vec::new();
    };

    items
        .iter()
        .map(|item| {
            let additional = item.get("_additional");
            let field = |name: &str| additional.and_then(|a| a.get(name));
            let score = match (field("score"), field("distance")) {
                (Some(s), _) if !s.is_null() => as_f64(s),
                (_, Some(d)) if !d.is_null() => 1.0 - as_f64(d),
                _ => 0.0,
            };
            SearchHit {
                id: field("id")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                content: item
                    .get("content")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                filepath: item
                    .get("filepath")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                score,
            }
        })
        .collect()
}

fn as_f64(v: &Value) -> f64 {
    v.as_f64()
        .or_else(|| v.as_str().and_then(|s| s.parse().ok()))
        .unwrap_or(0.0)
}

#[async_trait]
impl VectorStore for WeaviateStore {
    fn backend(&self) -> &'static str {
        "weaviate"
    }

    async fn is_ready(&self) -> Result<bool> {
        let reply = self
            .send("weaviate ready", || {
                self.request(Method::GET, "/v1/.well-known/ready")
            })
            .await?;
        Ok(reply.is_success())
    }

    async fn ensure_collection(
        &self,
        schema: &CollectionSchema,
        policy: SchemaPolicy,
    ) -> Result<SchemaOutcome> {
        let outcome = if self.class_exists(&schema.name).await? {
            match policy {
                SchemaPolicy::Skip => return Ok(SchemaOutcome::Existing),
                SchemaPolicy::Fail => return Err(Error::SchemaConflict(schema.name.clone())),
                SchemaPolicy::Recreate => {
                    let path = format!("/v1/schema/{}", schema.name);
                    let reply = self
                        .send("weaviate schema delete", || {
                            self.request(Method::DELETE, &path)
                        })
                        .await?;
                    Self::expect_success(reply)?;
                    SchemaOutcome::Recreated
                }
            }
        } else {
            SchemaOutcome::Created
        };

        let body = class_definition(schema);
        let reply = self
            .send("weaviate schema create", || {
                self.request(Method::POST, "/v1/schema").json(&body)
            })
            .await?;
        Self::expect_success(reply)?;
        Ok(outcome)
    }

    /// Upserts in one batch, then deletes the file's stale objects.
    ///
    /// Weaviate has no transactions: a failed delete leaves the new chunks
    /// written and the stale ones in place until the next index run.
    async fn write_document(
        &self,
        collection: &str,
        filepath: &str,
        keep_ids: &[String],
        records: &[ChunkRecord],
    ) -> Result<u64> {
        self.require_class(collection).await?;

        if !records.is_empty() {
            let body = batch_payload(collection, records);
            let reply = self
                .send("weaviate batch", || {
                    self.request(Method::POST, "/v1/batch/objects").json(&body)
                })
                .await?;
            let value = reply
                .into_json()
                .map_err(|f| f.into_error(SERVICE, store_error))?;

            let errors = batch_errors(&value);
            if !errors.is_empty() {
                return Err(store_error(format!(
                    "batch rejected {} object(s): {}",
                    errors.len(),
                    errors.join("; ")
                )));
            }
        }

        let body = prune_payload(collection, filepath, keep_ids);
        let reply = self
            .send("weaviate batch delete", || {
                self.request(Method::DELETE, "/v1/batch/objects").json(&body)
            })
            .await?;
        let value = reply
            .into_json()
            .map_err(|f| f.into_error(SERVICE, store_error))?;
        Ok(value
            .pointer("/results/successful")
            .and_then(Value::as_u64)
            .unwrap_or(0))
    }

    async fn keyword_search(
        &self,
        collection: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<SearchHit>> {
        self.require_class(collection).await?;
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }
        let response = self.graphql(bm25_query(collection, query, limit)).await?;
        Ok(rank_hits(parse_get_response(&response, collection), limit))
    }

    async fn vector_search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<SearchHit>> {
        self.require_class(collection).await?;
        let response = self
            .graphql(near_vector_query(collection, vector, limit))
            .await?;
        Ok(rank_hits(parse_get_response(&response, collection), limit))
    }

    async fn count(&self, collection: &str) -> Result<u64> {
        self.require_class(collection).await?;
        let query = format!("{{ Aggregate {{ {} {{ meta {{ count }} }} }} }}", collection);
        let response = self.graphql(query).await?;
        let pointer = format!("/data/Aggregate/{}/0/meta/count", collection);
        Ok(response.pointer(&pointer).and_then(Value::as_u64).unwrap_or(0))
    }
}

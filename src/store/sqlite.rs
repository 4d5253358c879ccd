//! SQLite-backed [`VectorStore`].
//!
//! Collections are rows in `collections`; chunks live in one `chunks` table
//! keyed by collection, mirrored into the `chunks_fts` FTS5 table for BM25
//! ranking. Vectors are little-endian `f32` BLOBs in `chunk_vectors`, and
//! similarity is computed in Rust.

use anyhow::Result as AnyResult;
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use std::collections::HashSet;
use std::path::Path;

use super::{query_terms, rank_hits, VectorStore};
use crate::config::SchemaPolicy;
use crate::db;
use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::error::{Error, Result};
use crate::migrate;
use crate::models::{ChunkRecord, SearchHit, StoredChunkState};
use crate::schema::{CollectionSchema, SchemaOutcome};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path` and run migrations.
    pub async fn open(path: &Path) -> AnyResult<Self> {
        let pool = db::connect(path).await?;
        migrate::run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    async fn collection_exists(&self, name: &str) -> Result<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT COUNT(*) > 0 FROM collections WHERE name = ?")
                .bind(name)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    async fn require_collection(&self, name: &str) -> Result<()> {
        if self.collection_exists(name).await? {
            Ok(())
        } else {
            Err(Error::UnknownCollection(name.to_string()))
        }
    }
}

/// FTS5 match expression: every term quoted, OR-ed together.
fn fts_match_expr(query: &str) -> Option<String> {
    let terms = query_terms(query);
    if terms.is_empty() {
        return None;
    }
    Some(
        terms
            .iter()
            .map(|t| format!("\"{}\"", t))
            .collect::<Vec<_>>()
            .join(" OR "),
    )
}

#[async_trait]
impl VectorStore for SqliteStore {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    async fn is_ready(&self) -> Result<bool> {
        let one: i64 = sqlx::query_scalar("SELECT 1").fetch_one(&self.pool).await?;
        Ok(one == 1)
    }

    async fn ensure_collection(
        &self,
        schema: &CollectionSchema,
        policy: SchemaPolicy,
    ) -> Result<SchemaOutcome> {
        let exists = self.collection_exists(&schema.name).await?;
        let mut tx = self.pool.begin().await?;

        let outcome = match (exists, policy) {
            (false, _) => SchemaOutcome::Created,
            (true, SchemaPolicy::Skip) => return Ok(SchemaOutcome::Existing),
            (true, SchemaPolicy::Fail) => return Err(Error::SchemaConflict(schema.name.clone())),
            (true, SchemaPolicy::Recreate) => {
                sqlx::query(
                    "DELETE FROM chunk_vectors WHERE chunk_id IN (SELECT id FROM chunks WHERE collection = ?)",
                )
                .bind(&schema.name)
                .execute(&mut *tx)
                .await?;
                sqlx::query("DELETE FROM chunks_fts WHERE collection = ?")
                    .bind(&schema.name)
                    .execute(&mut *tx)
                    .await?;
                sqlx::query("DELETE FROM chunks WHERE collection = ?")
                    .bind(&schema.name)
                    .execute(&mut *tx)
                    .await?;
                sqlx::query("DELETE FROM collections WHERE name = ?")
                    .bind(&schema.name)
                    .execute(&mut *tx)
                    .await?;
                SchemaOutcome::Recreated
            }
        };

        let properties_json = serde_json::to_string(&schema.properties)
            .unwrap_or_else(|_| "[]".to_string());
        sqlx::query(
            r#"
            INSERT INTO collections (name, description, vectorizer, generative_model,
                                     properties_json, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&schema.name)
        .bind(&schema.description)
        .bind(&schema.vectorizer)
        .bind(&schema.generative_model)
        .bind(properties_json)
        .bind(chrono::Utc::now().timestamp())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(outcome)
    }

    async fn write_document(
        &self,
        collection: &str,
        filepath: &str,
        keep_ids: &[String],
        records: &[ChunkRecord],
    ) -> Result<u64> {
        self.require_collection(collection).await?;
        let mut tx = self.pool.begin().await?;

        let stored: Vec<String> =
            sqlx::query_scalar("SELECT id FROM chunks WHERE collection = ? AND filepath = ?")
                .bind(collection)
                .bind(filepath)
                .fetch_all(&mut *tx)
                .await?;
        let keep: HashSet<&str> = keep_ids.iter().map(String::as_str).collect();
        let mut removed = 0u64;
        for id in stored.iter().filter(|id| !keep.contains(id.as_str())) {
            sqlx::query("DELETE FROM chunk_vectors WHERE chunk_id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            sqlx::query("DELETE FROM chunks_fts WHERE chunk_id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            removed += sqlx::query("DELETE FROM chunks WHERE id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }

        for record in records {
            sqlx::query(
                r#"
                INSERT INTO chunks (id, collection, filepath, segment_index, chunk_index, content, hash)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    collection = excluded.collection,
                    filepath = excluded.filepath,
                    segment_index = excluded.segment_index,
                    chunk_index = excluded.chunk_index,
                    content = excluded.content,
                    hash = excluded.hash
                "#,
            )
            .bind(&record.id)
            .bind(collection)
            .bind(&record.filepath)
            .bind(record.segment_index as i64)
            .bind(record.chunk_index as i64)
            .bind(&record.content)
            .bind(&record.hash)
            .execute(&mut *tx)
            .await?;

            sqlx::query("DELETE FROM chunks_fts WHERE chunk_id = ?")
                .bind(&record.id)
                .execute(&mut *tx)
                .await?;
            sqlx::query("INSERT INTO chunks_fts (chunk_id, collection, content) VALUES (?, ?, ?)")
                .bind(&record.id)
                .bind(collection)
                .bind(&record.content)
                .execute(&mut *tx)
                .await?;

            match &record.vector {
                Some(vec) => {
                    sqlx::query(
                        r#"
                        INSERT INTO chunk_vectors (chunk_id, dims, model, embedding)
                        VALUES (?, ?, ?, ?)
                        ON CONFLICT(chunk_id) DO UPDATE SET
                            dims = excluded.dims,
                            model = excluded.model,
                            embedding = excluded.embedding
                        "#,
                    )
                    .bind(&record.id)
                    .bind(vec.len() as i64)
                    .bind(record.vector_model.as_deref().unwrap_or_default())
                    .bind(vec_to_blob(vec))
                    .execute(&mut *tx)
                    .await?;
                }
                None => {
                    sqlx::query("DELETE FROM chunk_vectors WHERE chunk_id = ?")
                        .bind(&record.id)
                        .execute(&mut *tx)
                        .await?;
                }
            }
        }

        tx.commit().await?;
        if removed > 0 {
            tracing::debug!(collection, filepath, removed, "stale chunks removed");
        }
        Ok(removed)
    }

    async fn chunk_state(&self, collection: &str, id: &str) -> Result<Option<StoredChunkState>> {
        let row = sqlx::query(
            r#"
            SELECT c.hash AS hash, v.model AS model, v.dims AS dims
            FROM chunks c
            LEFT JOIN chunk_vectors v ON v.chunk_id = c.id
            WHERE c.id = ? AND c.collection = ?
            "#,
        )
        .bind(id)
        .bind(collection)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| {
            let model: Option<String> = r.get("model");
            let dims: Option<i64> = r.get("dims");
            StoredChunkState {
                hash: r.get("hash"),
                vector: model.zip(dims).map(|(m, d)| (m, d as usize)),
            }
        }))
    }

    async fn keyword_search(
        &self,
        collection: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<SearchHit>> {
        self.require_collection(collection).await?;
        let Some(expr) = fts_match_expr(query) else {
            return Ok(Vec::new());
        };

        let rows = sqlx::query(
            r#"
            SELECT chunks_fts.chunk_id AS id,
                   chunks.content AS content,
                   chunks.filepath AS filepath,
                   chunks_fts.rank AS rank
            FROM chunks_fts
            JOIN chunks ON chunks.id = chunks_fts.chunk_id
            WHERE chunks_fts MATCH ? AND chunks_fts.collection = ?
            ORDER BY rank, id
            LIMIT ?
            "#,
        )
        .bind(&expr)
        .bind(collection)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let hits: Vec<SearchHit> = rows
            .iter()
            .map(|row| {
                let rank: f64 = row.get("rank");
                SearchHit {
                    id: row.get("id"),
                    content: row.get("content"),
                    filepath: row.get("filepath"),
                    score: -rank, // negate so higher = better
                }
            })
            .collect();

        Ok(rank_hits(hits, limit))
    }

    async fn vector_search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<SearchHit>> {
        self.require_collection(collection).await?;

        // Fetch all vectors and compute cosine similarity in Rust
        let rows = sqlx::query(
            r#"
            SELECT c.id AS id, c.content AS content, c.filepath AS filepath, v.embedding AS embedding
            FROM chunk_vectors v
            JOIN chunks c ON c.id = v.chunk_id
            WHERE c.collection = ?
            "#,
        )
        .bind(collection)
        .fetch_all(&self.pool)
        .await?;

        let hits: Vec<SearchHit> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let stored = blob_to_vec(&blob);
                SearchHit {
                    id: row.get("id"),
                    content: row.get("content"),
                    filepath: row.get("filepath"),
                    score: cosine_similarity(vector, &stored) as f64,
                }
            })
            .collect();

        Ok(rank_hits(hits, limit))
    }

    async fn count(&self, collection: &str) -> Result<u64> {
        self.require_collection(collection).await?;
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks WHERE collection = ?")
            .bind(collection)
            .fetch_one(&self.pool)
            .await?;
        Ok(n as u64)
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

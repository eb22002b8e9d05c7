//! SQLite-backed [`BaseStore`]
//!
//! ```text
//! store_items
//! ├── prefix      TEXT  namespace segments joined with '.'
//! ├── key         TEXT
//! ├── value       TEXT  JSON
//! ├── embedding   BLOB  little-endian f32 vector, NULL when not indexed
//! ├── created_at  TEXT  RFC 3339
//! └── updated_at  TEXT  RFC 3339
//! PRIMARY KEY (prefix, key)
//! ```
//!
//! Prefix search matches whole segments: `users` selects `users` and `users.*` but not
//! `usersX`. Similarity is computed in process over the rows of the prefix.

use super::{
    collect_namespaces, namespace_key, parse_namespace_key, rank, validate_namespace,
    validate_prefix, BaseStore, Candidate, IndexConfig, Item, ListNamespacesRequest, Namespace,
    Result, SearchItem, SearchRequest, StoreError,
};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use sqlx::sqlite::SqlitePool;

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS store_items (
    prefix TEXT NOT NULL,
    key TEXT NOT NULL,
    value TEXT NOT NULL,
    embedding BLOB,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (prefix, key)
)";

const CREATE_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_store_items_updated ON store_items (prefix, updated_at)";

#[derive(sqlx::FromRow)]
struct ItemRow {
    prefix: String,
    key: String,
    value: String,
    embedding: Option<Vec<u8>>,
    created_at: String,
    updated_at: String,
}

impl ItemRow {
    fn into_candidate(self) -> Result<Candidate> {
        Ok(Candidate {
            item: Item {
                namespace: parse_namespace_key(&self.prefix),
                key: self.key,
                value: serde_json::from_str(&self.value)?,
                created_at: parse_timestamp(&self.created_at)?,
                updated_at: parse_timestamp(&self.updated_at)?,
            },
            embedding: self.embedding.as_deref().map(decode_vector),
        })
    }
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| StoreError::Storage(format!("bad timestamp {raw:?}: {e}")))
}

fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|x| x.to_le_bytes()).collect()
}

fn decode_vector(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Memory store persisted in SQLite; shares the engine's pool
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    index: Option<IndexConfig>,
}

impl SqliteStore {
    /// Wrap an existing pool. Call [`setup`](Self::setup) before first use.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool, index: None }
    }

    /// Enable semantic search
    pub fn with_index(mut self, index: IndexConfig) -> Self {
        self.index = Some(index);
        self
    }

    /// Create the table if needed
    pub async fn setup(&self) -> Result<()> {
        sqlx::query(CREATE_TABLE).execute(&self.pool).await?;
        sqlx::query(CREATE_INDEX).execute(&self.pool).await?;
        Ok(())
    }

    async fn fetch_prefix(&self, prefix: &[String]) -> Result<Vec<ItemRow>> {
        let rows = if prefix.is_empty() {
            sqlx::query_as::<_, ItemRow>(
                "SELECT prefix, key, value, embedding, created_at, updated_at FROM store_items",
            )
            .fetch_all(&self.pool)
            .await?
        } else {
            let exact = namespace_key(prefix);
            let nested = format!("{exact}.");
            sqlx::query_as::<_, ItemRow>(
                "SELECT prefix, key, value, embedding, created_at, updated_at FROM store_items
                 WHERE prefix = ? OR substr(prefix, 1, ?) = ?",
            )
            .bind(&exact)
            .bind(nested.chars().count() as i64)
            .bind(&nested)
            .fetch_all(&self.pool)
            .await?
        };
        Ok(rows)
    }
}

#[async_trait]
impl BaseStore for SqliteStore {
    async fn put(&self, namespace: &[String], key: &str, value: Value) -> Result<()> {
        validate_namespace(namespace)?;

        let embedding = match &self.index {
            Some(index) => index.embed_value(&value).await?,
            None => None,
        };
        let now = timestamp(Utc::now());

        sqlx::query(
            "INSERT INTO store_items (prefix, key, value, embedding, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT (prefix, key) DO UPDATE SET
                 value = excluded.value,
                 embedding = excluded.embedding,
                 updated_at = excluded.updated_at",
        )
        .bind(namespace_key(namespace))
        .bind(key)
        .bind(serde_json::to_string(&value)?)
        .bind(embedding.as_deref().map(encode_vector))
        .bind(now.as_str())
        .bind(now.as_str())
        .execute(&self.pool)
        .await?;

        tracing::debug!(namespace = %namespace_key(namespace), key = %key, "Stored item");
        Ok(())
    }

    async fn get(&self, namespace: &[String], key: &str) -> Result<Option<Item>> {
        validate_namespace(namespace)?;

        let row = sqlx::query_as::<_, ItemRow>(
            "SELECT prefix, key, value, embedding, created_at, updated_at FROM store_items
             WHERE prefix = ? AND key = ?",
        )
        .bind(namespace_key(namespace))
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| row.into_candidate().map(|candidate| candidate.item))
            .transpose()
    }

    async fn delete(&self, namespace: &[String], key: &str) -> Result<()> {
        validate_namespace(namespace)?;

        sqlx::query("DELETE FROM store_items WHERE prefix = ? AND key = ?")
            .bind(namespace_key(namespace))
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn search(&self, request: SearchRequest) -> Result<Vec<SearchItem>> {
        validate_prefix(&request.namespace_prefix)?;

        let query = match (&self.index, &request.query) {
            (Some(index), Some(query)) => Some(index.embed_query(query).await?),
            _ => None,
        };

        let candidates = self
            .fetch_prefix(&request.namespace_prefix)
            .await?
            .into_iter()
            .map(ItemRow::into_candidate)
            .collect::<Result<Vec<_>>>()?;

        Ok(rank(candidates, &request, query.as_deref()))
    }

    async fn list_namespaces(&self, request: ListNamespacesRequest) -> Result<Vec<Namespace>> {
        validate_prefix(&request.prefix)?;

        let prefixes = sqlx::query_scalar::<_, String>("SELECT DISTINCT prefix FROM store_items")
            .fetch_all(&self.pool)
            .await?;
        let namespaces: Vec<Namespace> = prefixes
            .iter()
            .map(|prefix| parse_namespace_key(prefix))
            .collect();

        Ok(collect_namespaces(namespaces.iter(), &request))
    }
}
